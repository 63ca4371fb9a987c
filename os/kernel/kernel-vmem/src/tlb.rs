//! # TLB maintenance
//!
//! Sv39 has no hardware coherence between page-table stores and cached
//! translations. After any change to an entry reachable at `va` the hart
//! must execute `sfence.vma` before `va` is translated again. On the single
//! boot hart no remote shootdown is needed.
//!
//! `sfence.vma` with a non-zero `rs2` only orders translations tagged with
//! that ASID and leaves global entries cached. Global leaves are therefore
//! fenced with [`invalidate_global`].
//!
//! Hosted builds have no TLB; they record the operands of the last fence per
//! thread instead, see [`last_fence`].

use kernel_memory_addresses::{PhysicalPage, Size4K, VirtualAddress};

/// `satp.MODE` value selecting Sv39.
pub const SATP_MODE_SV39: u64 = 8;

/// Encode a `satp` value for the root table `root` tagged with `asid`.
///
/// ```rust
/// # use kernel_memory_addresses::*;
/// # use kernel_vmem::tlb::satp_value;
/// let root = PhysicalPage::<Size4K>::containing(PhysicalAddress::new(0x8021_0000));
/// assert_eq!(satp_value(root, 3), (8 << 60) | (3 << 44) | 0x80210);
/// ```
#[inline]
#[must_use]
pub const fn satp_value(root: PhysicalPage<Size4K>, asid: u16) -> u64 {
    (SATP_MODE_SV39 << 60) | ((asid as u64) << 44) | root.base().ppn()
}

/// Drop cached translations of `va` tagged with `asid`.
#[inline]
pub fn invalidate_page(asid: u16, va: VirtualAddress) {
    log::trace!("sfence.vma {va} asid={asid}");
    arch::sfence_vma(asid, va.as_u64());
}

/// Drop cached translations of `va` in every address space, global
/// entries included.
#[inline]
pub fn invalidate_global(va: VirtualAddress) {
    log::trace!("sfence.vma {va}, zero");
    arch::sfence_vma_global(va.as_u64());
}

/// Drop every cached translation.
#[inline]
pub fn flush_all() {
    arch::sfence_vma_all();
}

/// Point `satp` at `root` and flush the TLB.
///
/// # Safety
/// The code, stack and data the caller is using must stay mapped at the
/// same addresses in the new tree.
#[inline]
pub unsafe fn write_satp(root: PhysicalPage<Size4K>, asid: u16) {
    unsafe { arch::set_satp(root, asid) }
}

#[cfg(all(target_arch = "riscv64", target_os = "none"))]
mod arch {
    use kernel_memory_addresses::{PhysicalPage, Size4K};
    use riscv::register::satp;

    #[inline]
    pub fn sfence_vma(asid: u16, va: u64) {
        // SAFETY: sfence.vma only affects cached translations.
        unsafe {
            core::arch::asm!("sfence.vma {0}, {1}", in(reg) va, in(reg) u64::from(asid), options(nostack));
        }
    }

    #[inline]
    pub fn sfence_vma_global(va: u64) {
        // SAFETY: sfence.vma only affects cached translations.
        unsafe {
            core::arch::asm!("sfence.vma {0}, zero", in(reg) va, options(nostack));
        }
    }

    #[inline]
    pub fn sfence_vma_all() {
        riscv::asm::sfence_vma_all();
    }

    #[inline]
    pub unsafe fn set_satp(root: PhysicalPage<Size4K>, asid: u16) {
        unsafe {
            satp::set(satp::Mode::Sv39, usize::from(asid), root.base().ppn() as usize);
        }
        riscv::asm::sfence_vma_all();
    }
}

/// Operands of an `sfence.vma` issued by a hosted build.
#[cfg(not(all(target_arch = "riscv64", target_os = "none")))]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Fence {
    /// `sfence.vma va, asid`
    Page { asid: u16, va: u64 },
    /// `sfence.vma va, zero`
    Global { va: u64 },
    /// `sfence.vma zero, zero`
    All,
}

/// The most recent fence issued on this thread.
#[cfg(not(all(target_arch = "riscv64", target_os = "none")))]
#[must_use]
pub fn last_fence() -> Option<Fence> {
    arch::LAST.with(core::cell::Cell::get)
}

#[cfg(not(all(target_arch = "riscv64", target_os = "none")))]
mod arch {
    extern crate std;

    use super::Fence;
    use core::cell::Cell;
    use kernel_memory_addresses::{PhysicalPage, Size4K};

    std::thread_local! {
        pub static LAST: Cell<Option<Fence>> = const { Cell::new(None) };
    }

    fn record(fence: Fence) {
        LAST.with(|f| f.set(Some(fence)));
    }

    #[inline]
    pub fn sfence_vma(asid: u16, va: u64) {
        record(Fence::Page { asid, va });
    }

    #[inline]
    pub fn sfence_vma_global(va: u64) {
        record(Fence::Global { va });
    }

    #[inline]
    pub fn sfence_vma_all() {
        record(Fence::All);
    }

    #[inline]
    pub unsafe fn set_satp(root: PhysicalPage<Size4K>, asid: u16) {
        log::debug!("satp <- {:#x} (hosted, not written)", super::satp_value(root, asid));
        record(Fence::All);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_memory_addresses::PhysicalAddress;

    #[test]
    fn global_fences_carry_no_asid() {
        invalidate_page(3, VirtualAddress::new(0x5000));
        assert_eq!(last_fence(), Some(Fence::Page { asid: 3, va: 0x5000 }));
        invalidate_global(VirtualAddress::new(0xFFFF_FFC0_0000_1000));
        assert_eq!(last_fence(), Some(Fence::Global { va: 0xFFFF_FFC0_0000_1000 }));
    }

    #[test]
    fn switching_satp_flushes_everything() {
        let root = PhysicalPage::<Size4K>::containing(PhysicalAddress::new(0x8021_0000));
        unsafe { write_satp(root, 1) };
        assert_eq!(last_fence(), Some(Fence::All));
    }
}
