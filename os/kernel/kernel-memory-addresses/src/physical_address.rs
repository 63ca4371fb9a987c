use crate::{PageSize, PhysicalPage, Size4K};
use core::fmt;
use core::ops::{Add, AddAssign};

/// Physical memory address.
///
/// Carries *physical* intent at the type level so that page-table code can't
/// accidentally hand a virtual address to the translation hardware.
///
/// On Sv39 the hardware consumes physical addresses as a **physical page
/// number** (PPN, `pa >> 12`) plus a 12-bit offset; [`ppn`](Self::ppn) and
/// [`from_ppn`](Self::from_ppn) convert between the two forms.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let pa = PhysicalAddress::new(0x8020_1234);
/// assert_eq!(pa.ppn(), 0x80201);
/// assert_eq!(PhysicalAddress::from_ppn(pa.ppn()).as_u64(), 0x8020_1000);
/// assert_eq!(pa.offset::<Size4K>(), 0x234);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(u64);

impl PhysicalAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Take the numeric value of a pointer as a physical address.
    ///
    /// Only meaningful while the pointer is identity mapped (before paging is
    /// enabled, or for linker symbols of an identity-mapped kernel image).
    #[inline]
    #[must_use]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(ptr.addr() as u64)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Physical page number (`pa >> 12`).
    #[inline]
    #[must_use]
    pub const fn ppn(self) -> u64 {
        self.0 >> Size4K::SHIFT
    }

    /// Build the base address of physical page number `ppn`.
    #[inline]
    #[must_use]
    pub const fn from_ppn(ppn: u64) -> Self {
        Self(ppn << Size4K::SHIFT)
    }

    /// The page of size `S` containing this address.
    #[inline]
    #[must_use]
    pub const fn page<S: PageSize>(self) -> PhysicalPage<S> {
        PhysicalPage::containing(self)
    }

    /// The offset of this address within its page of size `S`.
    #[inline]
    #[must_use]
    pub const fn offset<S: PageSize>(self) -> u64 {
        self.0 & S::MASK
    }

    #[inline]
    #[must_use]
    pub const fn is_aligned<S: PageSize>(self) -> bool {
        self.offset::<S>() == 0
    }

    /// Round up to the next multiple of `S::SIZE`, or `None` on overflow.
    #[inline]
    #[must_use]
    pub const fn checked_align_up<S: PageSize>(self) -> Option<Self> {
        match self.0.checked_add(S::MASK) {
            Some(v) => Some(Self(v & !S::MASK)),
            None => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: u64) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Distance in bytes from `base` up to `self`, or `None` if `self < base`.
    #[inline]
    #[must_use]
    pub const fn checked_offset_from(self, base: Self) -> Option<u64> {
        self.0.checked_sub(base.0)
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA(0x{:016X})", self.0)
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u64> for PhysicalAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl From<PhysicalAddress> for u64 {
    #[inline]
    fn from(pa: PhysicalAddress) -> Self {
        pa.0
    }
}

impl<S: PageSize> From<PhysicalPage<S>> for PhysicalAddress {
    #[inline]
    fn from(page: PhysicalPage<S>) -> Self {
        page.base()
    }
}

impl Add<u64> for PhysicalAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for PhysicalAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}
