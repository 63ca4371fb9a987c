use crate::{PageSize, Size4K, VirtualPage};
use core::fmt;
use core::ops::{Add, AddAssign};

/// Number of significant virtual-address bits under Sv39.
pub const SV39_VA_BITS: u32 = 39;

/// Bits of virtual page number consumed per translation level.
pub const VPN_BITS: u32 = 9;

/// Virtual memory address.
///
/// Carries *virtual* intent at the type level. Canonicality is not enforced
/// by construction; use [`is_canonical`](Self::is_canonical) where the value
/// comes from an untrusted source.
///
/// ### Sv39 layout
///
/// ```text
/// | 63‒39        | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
/// | sign (= b38) | VPN2  | VPN1  | VPN0  | offset |
/// ```
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let va = VirtualAddress::new(0x7f40_1234);
/// assert_eq!(va.vpn(2), 1);
/// assert_eq!(va.vpn(1), 0x1fa);
/// assert_eq!(va.vpn(0), 0x001);
/// assert!(va.is_canonical());
/// assert!(!VirtualAddress::new(0x0000_0040_0000_0000).is_canonical());
/// assert!(VirtualAddress::new(0xFFFF_FFC0_0000_0000).is_canonical());
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(u64);

impl VirtualAddress {
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

    #[inline]
    #[must_use]
    pub const fn as_ptr<T>(self) -> *mut T {
        self.0 as usize as *mut T
    }

    /// Nine-bit virtual page number for translation level `level` (0 = leaf).
    #[inline]
    #[must_use]
    pub const fn vpn(self, level: usize) -> usize {
        debug_assert!(level < 3);
        ((self.0 >> (Size4K::SHIFT + VPN_BITS * level as u32)) & 0x1ff) as usize
    }

    /// Whether bits 63..39 replicate bit 38 as Sv39 requires.
    #[inline]
    #[must_use]
    pub const fn is_canonical(self) -> bool {
        let upper = self.0 >> (SV39_VA_BITS - 1);
        upper == 0 || upper == (u64::MAX >> (SV39_VA_BITS - 1))
    }

    #[inline]
    #[must_use]
    pub const fn page<S: PageSize>(self) -> VirtualPage<S> {
        VirtualPage::containing(self)
    }

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

    /// Round down to a multiple of `S::SIZE`.
    #[inline]
    #[must_use]
    pub const fn align_down<S: PageSize>(self) -> Self {
        Self(self.0 & !S::MASK)
    }

    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: u64) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA(0x{:016X})", self.0)
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u64> for VirtualAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl<S: PageSize> From<VirtualPage<S>> for VirtualAddress {
    #[inline]
    fn from(page: VirtualPage<S>) -> Self {
        page.base()
    }
}

impl Add<u64> for VirtualAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for VirtualAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}
