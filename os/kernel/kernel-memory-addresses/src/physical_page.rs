use crate::{PageSize, PhysicalAddress};
use core::fmt;
use core::marker::PhantomData;

/// Page-aligned base of a physical frame of size `S`.
///
/// ### Invariants
/// - The low `S::SHIFT` bits of the base are always zero.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let frame = PhysicalPage::<Size4K>::containing(PhysicalAddress::new(0x8000_3fff));
/// assert_eq!(frame.base().as_u64(), 0x8000_3000);
/// assert_eq!(frame.join(0x10).as_u64(), 0x8000_3010);
/// assert!(PhysicalPage::<Size4K>::from_aligned(PhysicalAddress::new(0x8000_3010)).is_none());
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalPage<S: PageSize> {
    base: u64,
    _size: PhantomData<S>,
}

impl<S: PageSize> PhysicalPage<S> {
    /// The frame that contains `pa` (aligns down).
    #[inline]
    #[must_use]
    pub const fn containing(pa: PhysicalAddress) -> Self {
        Self {
            base: pa.as_u64() & !S::MASK,
            _size: PhantomData,
        }
    }

    /// The frame starting exactly at `pa`, or `None` if `pa` is unaligned.
    #[inline]
    #[must_use]
    pub const fn from_aligned(pa: PhysicalAddress) -> Option<Self> {
        if pa.is_aligned::<S>() {
            Some(Self::containing(pa))
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new(self.base)
    }

    /// Physical address `offset` bytes into this frame.
    #[inline]
    #[must_use]
    pub const fn join(self, offset: u64) -> PhysicalAddress {
        debug_assert!(offset < S::SIZE, "offset must be < page size");
        PhysicalAddress::new(self.base + (offset & S::MASK))
    }

    /// The frame directly following this one, or `None` on overflow.
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

impl<S: PageSize> fmt::Display for PhysicalPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.base)
    }
}

impl<S: PageSize> fmt::Debug for PhysicalPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PhysicalPage<{:?}>({:#x})", S::SIZE, self.base)
    }
}
