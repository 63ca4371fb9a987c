//! # Physical mappers
//!
//! Two [`PhysMapper`] implementations:
//!
//! - [`OffsetPhysMapper`] sees physical memory at a fixed offset. With offset
//!   zero it is the identity view used before paging is enabled; hosted
//!   builds point it at a buffer that stands in for RAM. Windowing is a no-op.
//! - [`WindowMapper`] reaches frames through the self-mapping window at
//!   [`WINDOW_BASE`](kernel_info::memory::WINDOW_BASE). The level-0 tables
//!   backing the window are laid out back to back by
//!   [`vm_init`](crate::vm_init::vm_init), so the entry for a frame is found
//!   by arithmetic alone.
//!
//! ```text
//!  frame pa ──(pa - DRAM_BASE)──► off
//!  window table  = l0_base + (off / 2 MiB) × 4 KiB
//!  window index  = (off / 4 KiB) mod 512
//!  window va     = WINDOW_BASE + off
//! ```

use core::sync::atomic::{AtomicU64, Ordering};
use kernel_info::memory::{DRAM_BASE, PDMAP, WINDOW_SIZE, window_address};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};
use kernel_vmem::{PageEntryBits, PageTableEntry, PhysMapper, TableIndex, tlb};

/// Physical memory visible at `pa + offset`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct OffsetPhysMapper {
    offset: u64,
}

impl OffsetPhysMapper {
    /// Physical addresses are directly dereferenceable.
    #[must_use]
    pub const fn identity() -> Self {
        Self { offset: 0 }
    }

    /// Treat the memory at `host` as the physical frame at `base`.
    #[must_use]
    pub fn for_buffer<T>(host: *mut T, base: PhysicalAddress) -> Self {
        Self {
            offset: (host.addr() as u64).wrapping_sub(base.as_u64()),
        }
    }

    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }
}

impl PhysMapper for OffsetPhysMapper {
    fn map_window(&self, _frame: PhysicalPage<Size4K>) {}

    fn unmap_window(&self, _frame: PhysicalPage<Size4K>) {}

    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let va = pa.as_u64().wrapping_add(self.offset) as *mut T;
        // SAFETY: the caller guarantees `pa` is backed and typed as `T`.
        unsafe { &mut *va }
    }
}

/// Where the window entry for `frame` lives.
///
/// `l0_base` is the first of the contiguous level-0 window tables. Returns
/// `None` for frames the window does not cover.
#[must_use]
pub fn window_slot(
    l0_base: PhysicalAddress,
    frame: PhysicalPage<Size4K>,
) -> Option<(PhysicalPage<Size4K>, TableIndex)> {
    let off = frame
        .base()
        .checked_offset_from(PhysicalAddress::new(DRAM_BASE))?;
    if off >= WINDOW_SIZE {
        return None;
    }
    let table = PhysicalPage::containing(l0_base + (off / PDMAP) * 4096);
    #[allow(clippy::cast_possible_truncation)]
    let index = TableIndex::new(((off >> 12) & 0x1ff) as u16);
    Some((table, index))
}

/// Permissions of a window leaf.
#[must_use]
pub const fn window_perm() -> PageEntryBits {
    PageEntryBits::kernel_rw()
        .with_global(true)
        .with_accessed(true)
        .with_dirty(true)
}

/// The self-mapping window, once paging is on.
///
/// Window leaves are global, so every window change is fenced without an
/// ASID.
pub struct WindowMapper {
    l0_base: AtomicU64,
}

impl WindowMapper {
    /// A window without backing tables. Every use panics until
    /// [`configure`](Self::configure) is called.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            l0_base: AtomicU64::new(0),
        }
    }

    /// Use the contiguous level-0 tables starting at `l0_base`.
    pub fn configure(&self, l0_base: PhysicalPage<Size4K>) {
        log::debug!("window tables at {l0_base}");
        self.l0_base.store(l0_base.base().as_u64(), Ordering::Release);
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.l0_base.load(Ordering::Acquire) != 0
    }

    fn slot(&self, frame: PhysicalPage<Size4K>) -> PhysicalAddress {
        let base = self.l0_base.load(Ordering::Acquire);
        assert!(base != 0, "self-mapping window used before it was configured");
        let Some((table, index)) = window_slot(PhysicalAddress::new(base), frame) else {
            panic!("frame {frame} lies outside the self-mapping window");
        };
        table.join(index.byte_offset())
    }

    fn set_slot(&self, frame: PhysicalPage<Size4K>, entry: PageTableEntry) -> PageTableEntry {
        let slot = self.slot(frame);
        // SAFETY: the window tables are themselves windowed by vm_init and
        // never released.
        let current: &mut PageTableEntry = unsafe { self.phys_to_mut(slot) };
        core::mem::replace(current, entry)
    }
}

impl Default for WindowMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysMapper for WindowMapper {
    fn map_window(&self, frame: PhysicalPage<Size4K>) {
        let leaf = PageTableEntry::make_leaf(frame, window_perm());
        if self.set_slot(frame, leaf) == leaf {
            return;
        }
        if let Some(va) = window_address(frame.base().as_u64()) {
            tlb::invalidate_global(VirtualAddress::new(va));
        }
    }

    fn unmap_window(&self, frame: PhysicalPage<Size4K>) {
        self.set_slot(frame, PageTableEntry::zero());
        if let Some(va) = window_address(frame.base().as_u64()) {
            tlb::invalidate_global(VirtualAddress::new(va));
        }
    }

    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let Some(va) = window_address(pa.as_u64()) else {
            panic!("{pa} lies outside the self-mapping window");
        };
        // SAFETY: the caller guarantees the frame is windowed and typed as `T`.
        unsafe { &mut *(va as *mut T) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(align(4096))]
    struct Frame([u64; 512]);

    #[test]
    fn offset_mapper_reaches_the_buffer() {
        let mut ram = vec![Frame([0; 512]), Frame([0; 512])];
        let base = PhysicalAddress::new(DRAM_BASE);
        let mapper = OffsetPhysMapper::for_buffer(ram.as_mut_ptr(), base);

        let word: &mut u64 = unsafe { mapper.phys_to_mut(base + 4096 + 16) };
        *word = 0xfeed;
        assert_eq!(ram[1].0[2], 0xfeed);
    }

    #[test]
    fn identity_mapper_has_no_offset() {
        assert_eq!(OffsetPhysMapper::identity().offset(), 0);
    }

    #[test]
    fn window_slots_are_linear_in_the_frame() {
        let l0 = PhysicalAddress::new(0x8040_0000);
        let frame = |pa| PhysicalPage::containing(PhysicalAddress::new(pa));

        let (t, i) = window_slot(l0, frame(DRAM_BASE)).expect("covered");
        assert_eq!((t.base().as_u64(), i.as_usize()), (0x8040_0000, 0));

        let (t, i) = window_slot(l0, frame(DRAM_BASE + PDMAP + 0x5000)).expect("covered");
        assert_eq!((t.base().as_u64(), i.as_usize()), (0x8040_1000, 5));

        let (t, i) = window_slot(l0, frame(DRAM_BASE + PDMAP - 4096)).expect("covered");
        assert_eq!((t.base().as_u64(), i.as_usize()), (0x8040_0000, 511));

        assert!(window_slot(l0, frame(0x1000_0000)).is_none());
        assert!(window_slot(l0, frame(DRAM_BASE + WINDOW_SIZE)).is_none());
    }

    #[test]
    #[should_panic(expected = "before it was configured")]
    fn unconfigured_window_panics() {
        let window = WindowMapper::new();
        assert!(!window.is_configured());
        window.map_window(PhysicalPage::containing(PhysicalAddress::new(DRAM_BASE)));
    }

    #[test]
    fn window_leaves_are_global_kernel_data() {
        let p = window_perm();
        assert!(p.readable() && p.writable() && p.global());
        assert!(!p.user() && !p.executable());
    }
}
