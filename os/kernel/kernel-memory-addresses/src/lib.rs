//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for raw memory addresses and page bases used by
//! the Sv39 paging and physical memory management code.
//!
//! ## Overview
//!
//! The types prevent mixing virtual and physical addresses at compile time
//! while remaining zero-cost wrappers around `u64` values.
//!
//! | Wrapper | Meaning |
//! |----------|----------|
//! | [`VirtualAddress`] / [`VirtualPage<S>`] | Virtual (page-table translated) memory. |
//! | [`PhysicalAddress`] / [`PhysicalPage<S>`] | Physical memory or MMIO regions. |
//!
//! Page sizes are expressed through the sealed [`PageSize`] trait. Only
//! [`Size4K`] exists; every leaf mapping made by the kernel is 4 KiB.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0x0040_1234);
//! let page = va.page::<Size4K>();
//! assert_eq!(page.join(va.offset::<Size4K>()), va);
//!
//! let pa = PhysicalAddress::new(0x8040_0042);
//! assert_eq!(PhysicalAddress::from_ppn(pa.ppn()), pa.page::<Size4K>().base());
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod page_size;
mod physical_address;
mod physical_page;
mod virtual_address;
mod virtual_page;

pub use page_size::{PageSize, Size4K};
pub use physical_address::PhysicalAddress;
pub use physical_page::PhysicalPage;
pub use virtual_address::{SV39_VA_BITS, VPN_BITS, VirtualAddress};
pub use virtual_page::VirtualPage;

/// Number of bytes in a base page.
pub const PAGE_SIZE: u64 = Size4K::SIZE;

/// Round `value` down to a multiple of the 4 KiB page size.
#[inline]
#[must_use]
pub const fn page_align_down(value: u64) -> u64 {
    value & !Size4K::MASK
}

/// Round `value` up to a multiple of the 4 KiB page size.
///
/// Saturates at the highest aligned value instead of wrapping.
#[inline]
#[must_use]
pub const fn page_align_up(value: u64) -> u64 {
    match value.checked_add(Size4K::MASK) {
        Some(v) => v & !Size4K::MASK,
        None => u64::MAX & !Size4K::MASK,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ppn_round_trips_page_base() {
        let pa = PhysicalAddress::new(0x8765_4321);
        assert_eq!(pa.ppn(), 0x87654);
        assert_eq!(PhysicalAddress::from_ppn(pa.ppn()).as_u64(), 0x8765_4000);
    }

    #[test]
    fn vpn_extracts_each_level() {
        // 1 GiB + 2 MiB * 3 + 4 KiB * 5 + 0x67
        let va = VirtualAddress::new((1 << 30) | (3 << 21) | (5 << 12) | 0x67);
        assert_eq!(va.vpn(2), 1);
        assert_eq!(va.vpn(1), 3);
        assert_eq!(va.vpn(0), 5);
        assert_eq!(va.offset::<Size4K>(), 0x67);
    }

    #[test]
    fn canonical_checks_sign_extension() {
        assert!(VirtualAddress::new(0).is_canonical());
        assert!(VirtualAddress::new(0x3F_FFFF_FFFF).is_canonical());
        assert!(!VirtualAddress::new(0x40_0000_0000).is_canonical());
        assert!(VirtualAddress::new(0xFFFF_FFC0_0000_0000).is_canonical());
        assert!(!VirtualAddress::new(0xFFFF_FF80_0000_0000).is_canonical());
    }

    #[test]
    fn pages_align_down() {
        let vp = VirtualPage::<Size4K>::containing(VirtualAddress::new(0x1fff));
        assert_eq!(vp.base().as_u64(), 0x1000);
        let pp = PhysicalPage::<Size4K>::containing(PhysicalAddress::new(0x8000_0001));
        assert_eq!(pp.base().as_u64(), 0x8000_0000);
        assert_eq!(pp.next().map(PhysicalPage::base), Some(PhysicalAddress::new(0x8000_1000)));
    }

    #[test]
    fn align_helpers() {
        assert_eq!(page_align_down(0x1234), 0x1000);
        assert_eq!(page_align_up(0x1234), 0x2000);
        assert_eq!(page_align_up(0x2000), 0x2000);
        assert_eq!(page_align_up(u64::MAX), u64::MAX & !0xfff);
        assert_eq!(
            PhysicalAddress::new(0x8000_0001).checked_align_up::<Size4K>(),
            Some(PhysicalAddress::new(0x8000_1000))
        );
        assert_eq!(PhysicalAddress::new(u64::MAX).checked_align_up::<Size4K>(), None);
    }

    #[test]
    fn offset_from_requires_order() {
        let base = PhysicalAddress::new(0x8000_0000);
        assert_eq!(PhysicalAddress::new(0x8000_3000).checked_offset_from(base), Some(0x3000));
        assert_eq!(PhysicalAddress::new(0x7000_0000).checked_offset_from(base), None);
    }
}
