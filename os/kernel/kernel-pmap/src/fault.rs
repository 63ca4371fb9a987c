//! # Page-fault refill
//!
//! Demand paging for user space: a fault at an unmapped user address gets
//! a fresh zeroed page with user read/write access.

use crate::error::MmError;
use crate::page_info::PageId;
use crate::pmap::MemoryManager;
use kernel_info::memory::{UENVS, UPAGES, USER_FLOOR, UTOP};
use kernel_memory_addresses::{Size4K, VirtualAddress};
use kernel_vmem::{AddressSpace, PageEntryBits, PhysMapper};

/// Back the page containing `va` with a new zeroed frame.
///
/// # Errors
/// - [`MmError::InvalidArgument`] for addresses below [`USER_FLOOR`], inside
///   the environment table, or at or above [`UTOP`].
/// - [`MmError::OutOfMemory`] if no page or table frame is left.
pub fn refill<M: PhysMapper>(
    mm: &mut MemoryManager<'_, M>,
    space: &AddressSpace<'_, M>,
    va: VirtualAddress,
) -> Result<PageId, MmError> {
    let raw = va.as_u64();
    if raw < USER_FLOOR {
        log::warn!("page fault at {va} below the user floor");
        return Err(MmError::InvalidArgument("fault below the user floor"));
    }
    if (UENVS..UPAGES).contains(&raw) {
        log::warn!("page fault at {va} inside the environment table");
        return Err(MmError::InvalidArgument("fault inside the environment table"));
    }
    if raw >= UTOP {
        log::warn!("page fault at {va} above the split address");
        return Err(MmError::InvalidArgument("fault above the split address"));
    }

    let page = mm.alloc_page()?;
    let base = va.align_down::<Size4K>();
    if let Err(e) = mm.insert(space, page, base, PageEntryBits::user_rw()) {
        mm.free_page(page);
        return Err(e);
    }
    log::debug!("refilled {base} with {page}");
    Ok(page)
}
