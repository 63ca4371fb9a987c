//! # User-triggered entry points
//!
//! The syscall layer reaches the memory manager only through these
//! wrappers. They admit addresses strictly below [`UTOP`] and sanitize the
//! permissions a user may ask for; the core operations themselves do not
//! look at addresses.

use crate::error::MmError;
use crate::page_info::PageId;
use crate::pmap::MemoryManager;
use core::fmt;
use kernel_info::memory::UTOP;
use kernel_vmem::{AddressSpace, PageEntryBits, PhysMapper};
use kernel_memory_addresses::VirtualAddress;

/// A virtual address below the split address.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct UserVa(VirtualAddress);

impl UserVa {
    /// # Errors
    /// [`MmError::InvalidArgument`] if `va` is at or above [`UTOP`].
    pub const fn new(va: VirtualAddress) -> Result<Self, MmError> {
        if va.as_u64() >= UTOP {
            return Err(MmError::InvalidArgument("address at or above UTOP"));
        }
        Ok(Self(va))
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> VirtualAddress {
        self.0
    }
}

impl fmt::Debug for UserVa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserVa({:#x})", self.0.as_u64())
    }
}

/// Permissions a user may request, with `V` and `U` forced on and `G`
/// cleared.
///
/// # Errors
/// [`MmError::InvalidArgument`] if
/// - none of `R`, `W` and `X` is set, which would make the leaf a table
///   pointer,
/// - `W` is set without `R`, which Sv39 reserves,
/// - the copy-on-write or fixed marker is set; only the kernel sets those.
pub const fn check_perm(perm: PageEntryBits) -> Result<PageEntryBits, MmError> {
    if !perm.is_leaf() {
        return Err(MmError::InvalidArgument("no access permission requested"));
    }
    if perm.writable() && !perm.readable() {
        return Err(MmError::InvalidArgument("write access requires read access"));
    }
    if perm.copy_on_write() || perm.fixed() {
        return Err(MmError::InvalidArgument("kernel-only marker requested"));
    }
    Ok(perm
        .permissions()
        .with_valid(true)
        .with_user(true)
        .with_global(false))
}

/// Allocate a zeroed page and map it at `va`.
///
/// # Errors
/// - [`MmError::InvalidArgument`] for disallowed permissions.
/// - [`MmError::OutOfMemory`] if no page or table frame is left; the page
///   is returned in that case.
pub fn mem_alloc<M: PhysMapper>(
    mm: &mut MemoryManager<'_, M>,
    space: &AddressSpace<'_, M>,
    va: UserVa,
    perm: PageEntryBits,
) -> Result<PageId, MmError> {
    let perm = check_perm(perm)?;
    let page = mm.alloc_page()?;
    if let Err(e) = mm.insert(space, page, va.get(), perm) {
        mm.free_page(page);
        return Err(e);
    }
    Ok(page)
}

/// Map the page behind `src_va` in `src` at `dst_va` in `dst`.
///
/// # Errors
/// - [`MmError::InvalidArgument`] if nothing is mapped at `src_va`, for
///   disallowed permissions, or when asking for write access to a page
///   that is read-only at the source.
/// - [`MmError::OutOfMemory`] if a table frame could not be allocated.
pub fn mem_map<M: PhysMapper>(
    mm: &mut MemoryManager<'_, M>,
    src: &AddressSpace<'_, M>,
    src_va: UserVa,
    dst: &AddressSpace<'_, M>,
    dst_va: UserVa,
    perm: PageEntryBits,
) -> Result<(), MmError> {
    let perm = check_perm(perm)?;
    let (page, slot) = mm
        .lookup(src, src_va.get())
        .ok_or(MmError::InvalidArgument("source address is not mapped"))?;
    if perm.writable() && !src.entry(slot).flags().writable() {
        return Err(MmError::InvalidArgument("cannot map a read-only page writable"));
    }
    mm.insert(dst, page, dst_va.get(), perm)
}

/// Unmap `va`. Unmapping an unmapped address succeeds.
pub fn mem_unmap<M: PhysMapper>(mm: &mut MemoryManager<'_, M>, space: &AddressSpace<'_, M>, va: UserVa) {
    mm.remove(space, va.get());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_split_address_is_not_user_reachable() {
        assert!(UserVa::new(VirtualAddress::new(UTOP - 1)).is_ok());
        assert_eq!(
            UserVa::new(VirtualAddress::new(UTOP)),
            Err(MmError::InvalidArgument("address at or above UTOP"))
        );
        assert!(UserVa::new(VirtualAddress::new(0xFFFF_FFC0_0000_0000)).is_err());
    }

    #[test]
    fn check_perm_forces_valid_and_user() {
        let p = check_perm(PageEntryBits::new().with_readable(true)).expect("allowed");
        assert!(p.valid() && p.user() && p.readable() && !p.writable());
    }

    #[test]
    fn check_perm_rejects_copy_on_write() {
        let cow = PageEntryBits::user_ro().with_copy_on_write(true);
        assert!(matches!(check_perm(cow), Err(MmError::InvalidArgument(_))));
        let fixed = PageEntryBits::user_ro().with_fixed(true);
        assert!(matches!(check_perm(fixed), Err(MmError::InvalidArgument(_))));
    }

    #[test]
    fn check_perm_rejects_encodings_that_are_not_leaves() {
        assert_eq!(
            check_perm(PageEntryBits::new().with_user(true)),
            Err(MmError::InvalidArgument("no access permission requested"))
        );
        assert_eq!(
            check_perm(PageEntryBits::new().with_writable(true)),
            Err(MmError::InvalidArgument("write access requires read access"))
        );
        assert!(check_perm(PageEntryBits::new().with_executable(true)).is_ok());
    }
}
