//! # The kernel's memory manager
//!
//! One [`MemoryManager`] exists once [`page_init`](kernel_pmap::vm_init::page_init)
//! has run. It lives in a spin lock that is only taken with interrupts
//! masked, so a trap handler can never spin on a lock its own hart holds.

use kernel_memory_addresses::VirtualAddress;
use kernel_pmap::{MemoryManager, MmError, PageId, fault};
use kernel_sync::SpinMutex;
use kernel_vmem::AddressSpace;

/// Mapper used once paging is on.
#[cfg(target_os = "none")]
pub type KernelMapper = kernel_pmap::WindowMapper;

/// Hosted kernels address their simulated RAM through a plain offset.
#[cfg(not(target_os = "none"))]
pub type KernelMapper = kernel_pmap::OffsetPhysMapper;

pub type KernelMm = MemoryManager<'static, KernelMapper>;

static MM: SpinMutex<Option<KernelMm>> = SpinMutex::new(None);

/// Publish the manager built by `page_init`.
///
/// # Panics
/// If a manager was already installed.
pub fn install(mm: KernelMm) {
    let mut slot = MM.lock_irq();
    assert!(slot.is_none(), "memory manager installed twice");
    *slot = Some(mm);
}

/// Run `f` with exclusive access to the memory manager.
///
/// # Panics
/// If called before [`install`].
pub fn with_mm<R>(f: impl FnOnce(&mut KernelMm) -> R) -> R {
    let mut slot = MM.lock_irq();
    let Some(mm) = slot.as_mut() else {
        panic!("memory manager used before page_init");
    };
    f(mm)
}

/// Back the faulting page at `va` in `space`.
///
/// # Errors
/// See [`fault::refill`].
pub fn handle_page_fault(
    space: &AddressSpace<'static, KernelMapper>,
    va: VirtualAddress,
) -> Result<PageId, MmError> {
    with_mm(|mm| fault::refill(mm, space, va))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "memory manager used before page_init")]
    fn access_before_install_panics() {
        with_mm(|mm| mm.free_count());
    }
}
