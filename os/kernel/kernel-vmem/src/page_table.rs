//! # Sv39 Page Table
//!
//! - [`Level`]: the three translation levels, root first.
//! - [`TableIndex`]: a 9-bit index derived from one VPN field.
//! - [`PageTableEntry`]: one entry, either invalid, a table pointer, or a leaf.
//! - [`PageTable`]: a 4 KiB-aligned array of 512 entries.
//!
//! ## Invariants & Notes
//!
//! - [`PageTable`] is 4 KiB-aligned and contains exactly 512 entries.
//! - Interior entries written by this crate carry only `V`.
//! - After modifying active mappings, the caller must perform the required
//!   TLB maintenance (see [`tlb`](crate::tlb)).

use crate::PageEntryBits;
use kernel_memory_addresses::{PhysicalPage, Size4K, VirtualAddress};

/// Number of entries in one table.
pub const ENTRIES: usize = 512;

/// Translation level. The walk goes `L2 → L1 → L0`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Level {
    /// Leaf level; every valid entry maps a 4 KiB page.
    L0 = 0,
    /// Middle level; each entry spans 2 MiB.
    L1 = 1,
    /// Root level; each entry spans 1 GiB.
    L2 = 2,
}

impl Level {
    /// All levels in walk order.
    pub const WALK: [Self; 3] = [Self::L2, Self::L1, Self::L0];

    /// The level below this one, or `None` at the leaf.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::L2 => Some(Self::L1),
            Self::L1 => Some(Self::L0),
            Self::L0 => None,
        }
    }

    /// Index of `va` within a table at this level.
    #[inline]
    #[must_use]
    pub const fn index_of(self, va: VirtualAddress) -> TableIndex {
        TableIndex::new(va.vpn(self as usize) as u16)
    }

    /// Bytes covered by one entry at this level.
    #[inline]
    #[must_use]
    pub const fn span(self) -> u64 {
        1 << (12 + 9 * self as u32)
    }
}

/// Index into a page table (`0..512`).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TableIndex(u16);

impl TableIndex {
    /// ### Debug assertions
    /// - Asserts `v < 512` in debug builds.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!(v < 512);
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Byte offset of this entry within its table.
    #[inline]
    #[must_use]
    pub const fn byte_offset(self) -> u64 {
        self.0 as u64 * 8
    }
}

/// A single entry of any level.
#[doc(alias = "PTE")]
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PageTableEntry(PageEntryBits);

impl PageTableEntry {
    /// An invalid entry.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(PageEntryBits::new())
    }

    #[inline]
    #[must_use]
    pub const fn from_bits(bits: PageEntryBits) -> Self {
        Self(bits)
    }

    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0.valid()
    }

    /// Expose the underlying bitfield.
    #[inline]
    #[must_use]
    pub const fn flags(self) -> PageEntryBits {
        self.0
    }

    /// If valid and not a leaf, the frame of the next-level table.
    #[inline]
    #[must_use]
    pub const fn next_table(self) -> Option<PhysicalPage<Size4K>> {
        if self.0.is_table() {
            Some(self.0.frame())
        } else {
            None
        }
    }

    /// If valid, the mapped frame and the entry's flags.
    #[inline]
    #[must_use]
    pub const fn page_4k(self) -> Option<(PhysicalPage<Size4K>, PageEntryBits)> {
        if self.is_valid() {
            Some((self.0.frame(), self.0.permissions()))
        } else {
            None
        }
    }

    /// Leaf entry for `frame` with `perm | V`.
    #[inline]
    #[must_use]
    pub const fn make_leaf(frame: PhysicalPage<Size4K>, perm: PageEntryBits) -> Self {
        Self(PageEntryBits::leaf(frame, perm))
    }

    /// Interior entry pointing at the table in `frame`.
    #[inline]
    #[must_use]
    pub const fn make_table(frame: PhysicalPage<Size4K>) -> Self {
        Self(PageEntryBits::table_pointer(frame))
    }

    /// The same entry with `V` cleared. The frame bits are left in place.
    #[inline]
    #[must_use]
    pub const fn invalidated(self) -> Self {
        Self(self.0.with_valid(false))
    }

    #[inline]
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0.into()
    }

    #[inline]
    #[must_use]
    pub fn from_raw(v: u64) -> Self {
        Self(PageEntryBits::from(v))
    }
}

/// One table of any level: 512 entries, 4 KiB-aligned.
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageTableEntry; ENTRIES],
}

impl PageTable {
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [PageTableEntry::zero(); ENTRIES],
        }
    }

    /// Invalidate every entry.
    #[inline]
    pub fn zero(&mut self) {
        self.entries.fill(PageTableEntry::zero());
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, i: TableIndex) -> PageTableEntry {
        self.entries[i.as_usize()]
    }

    /// Plain store; does not imply any TLB synchronization.
    #[inline]
    pub const fn set(&mut self, i: TableIndex, e: PageTableEntry) {
        self.entries[i.as_usize()] = e;
    }

    /// Number of valid entries.
    #[must_use]
    pub fn valid_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_valid()).count()
    }
}

const _: () = assert!(size_of::<PageTable>() == 4096);

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_memory_addresses::PhysicalAddress;

    #[test]
    fn levels_index_the_right_vpn() {
        let va = VirtualAddress::new(0x7f40_1000);
        assert_eq!(Level::L2.index_of(va).as_usize(), 1);
        assert_eq!(Level::L1.index_of(va).as_usize(), 0x1fa);
        assert_eq!(Level::L0.index_of(va).as_usize(), 1);
        assert_eq!(Level::L1.span(), 2 * 1024 * 1024);
    }

    #[test]
    fn leaf_and_table_entries_are_distinguished() {
        let frame = PhysicalPage::containing(PhysicalAddress::new(0x8000_9000));
        let table = PageTableEntry::make_table(frame);
        assert_eq!(table.next_table(), Some(frame));

        let leaf = PageTableEntry::make_leaf(frame, PageEntryBits::kernel_rw());
        assert_eq!(leaf.next_table(), None);
        let (f, perm) = leaf.page_4k().expect("leaf is valid");
        assert_eq!(f, frame);
        assert!(perm.valid() && perm.writable());

        assert!(leaf.invalidated().page_4k().is_none());
    }

    #[test]
    fn zero_clears_all_entries() {
        let mut t = PageTable::zeroed();
        let frame = PhysicalPage::containing(PhysicalAddress::new(0x8000_1000));
        t.set(TableIndex::new(3), PageTableEntry::make_table(frame));
        assert_eq!(t.valid_count(), 1);
        t.zero();
        assert_eq!(t.valid_count(), 0);
    }
}
