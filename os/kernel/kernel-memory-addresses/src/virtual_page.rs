use crate::{PageSize, VirtualAddress};
use core::fmt;
use core::marker::PhantomData;

/// Page-aligned base of a virtual page of size `S`.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let page = VirtualPage::<Size4K>::containing(VirtualAddress::new(0x7f80_0123));
/// assert_eq!(page.base().as_u64(), 0x7f80_0000);
/// assert_eq!(page.next().map(|p| p.base().as_u64()), Some(0x7f80_1000));
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualPage<S: PageSize> {
    base: u64,
    _size: PhantomData<S>,
}

impl<S: PageSize> VirtualPage<S> {
    /// The page that contains `va` (aligns down).
    #[inline]
    #[must_use]
    pub const fn containing(va: VirtualAddress) -> Self {
        Self {
            base: va.as_u64() & !S::MASK,
            _size: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub const fn from_aligned(va: VirtualAddress) -> Option<Self> {
        if va.is_aligned::<S>() {
            Some(Self::containing(va))
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress::new(self.base)
    }

    #[inline]
    #[must_use]
    pub const fn join(self, offset: u64) -> VirtualAddress {
        debug_assert!(offset < S::SIZE, "offset must be < page size");
        VirtualAddress::new(self.base + (offset & S::MASK))
    }

    #[inline]
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self.base.checked_add(S::SIZE) {
            Some(base) => Some(Self {
                base,
                _size: PhantomData,
            }),
            None => None,
        }
    }
}

impl<S: PageSize> fmt::Display for VirtualPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.base)
    }
}

impl<S: PageSize> fmt::Debug for VirtualPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualPage<{:?}>({:#x})", S::SIZE, self.base)
    }
}
