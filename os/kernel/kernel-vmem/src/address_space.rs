//! # Address Space (Sv39, root-table rooted)
//!
//! A handle to one translation tree: the root table frame, the ASID its
//! translations are tagged with, and the [`PhysMapper`] through which the
//! tables are reached.
//!
//! ## Highlights
//!
//! - [`AddressSpace::walk`] finds the leaf slot for a VA without allocating.
//! - [`AddressSpace::walk_create`] allocates missing interior tables. Every
//!   needed frame is reserved **before** the first entry is written, so an
//!   out-of-memory failure never leaves a dangling interior entry.
//! - [`AddressSpace::translate`] resolves a VA to a PA.
//! - [`AddressSpace::activate`] loads `satp`; [`AddressSpace::invalidate`]
//!   drops one cached translation and [`AddressSpace::replace_entry`]
//!   rewrites a leaf together with its fence. Global leaves are fenced in
//!   every address space.
//!
//! ## Safety
//!
//! Every table frame reachable from the root must stay windowed while it is
//! installed. New tables are windowed by the staging protocol in
//! [`staging`](crate::staging) before they are written.

use crate::page_table::{Level, PageTable, PageTableEntry, TableIndex};
use crate::staging::{Allocated, StagedTable};
use crate::{FrameAlloc, PhysMapper, WalkError, tlb};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};

/// Handle to a single, concrete address space.
pub struct AddressSpace<'m, M: PhysMapper> {
    root: PhysicalPage<Size4K>,
    asid: u16,
    mapper: &'m M,
}

impl<M: PhysMapper> Clone for AddressSpace<'_, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: PhysMapper> Copy for AddressSpace<'_, M> {}

/// Location of a level-0 entry: the leaf table's frame and the index in it.
///
/// Returned by the walkers so callers can both read and overwrite the entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LeafSlot {
    table: PhysicalPage<Size4K>,
    index: TableIndex,
}

impl LeafSlot {
    #[inline]
    #[must_use]
    pub const fn table(&self) -> PhysicalPage<Size4K> {
        self.table
    }

    #[inline]
    #[must_use]
    pub const fn index(&self) -> TableIndex {
        self.index
    }

    /// Physical address of the entry itself.
    #[inline]
    #[must_use]
    pub const fn address(&self) -> PhysicalAddress {
        self.table.join(self.index.byte_offset())
    }
}

impl<'m, M: PhysMapper> AddressSpace<'m, M> {
    /// Wrap an existing root table. The root must already be windowed.
    #[inline]
    pub const fn from_root(mapper: &'m M, root: PhysicalPage<Size4K>, asid: u16) -> Self {
        Self { root, asid, mapper }
    }

    /// Allocate, window and zero a fresh root table.
    ///
    /// # Errors
    /// [`WalkError::OutOfMemory`] if `alloc` has no frame left.
    pub fn create<A: FrameAlloc>(
        mapper: &'m M,
        alloc: &mut A,
        asid: u16,
    ) -> Result<Self, WalkError> {
        let frame = alloc.alloc_frame().ok_or(WalkError::OutOfMemory)?;
        let root = StagedTable::new(frame)
            .map_window(mapper)
            .zeroed(mapper)
            .into_root();
        log::debug!("new address space: root={root} asid={asid}");
        Ok(Self { root, asid, mapper })
    }

    #[inline]
    pub const fn root(&self) -> PhysicalPage<Size4K> {
        self.root
    }

    #[inline]
    pub const fn asid(&self) -> u16 {
        self.asid
    }

    #[inline]
    pub const fn mapper(&self) -> &'m M {
        self.mapper
    }

    /// Borrow the table in `frame`.
    #[inline]
    fn table(&self, frame: PhysicalPage<Size4K>) -> &'m mut PageTable {
        // SAFETY: installed tables are windowed for as long as they are linked.
        unsafe { self.mapper.phys_to_mut::<PageTable>(frame.base()) }
    }

    /// Follow valid interior entries for `va` as far as they go.
    ///
    /// Returns the deepest existing table and its level.
    fn descend(&self, va: VirtualAddress) -> (PhysicalPage<Size4K>, Level) {
        let mut table = self.root;
        let mut level = Level::L2;
        while let Some(below) = level.next() {
            let entry = self.table(table).get(level.index_of(va));
            match entry.next_table() {
                Some(next) => {
                    table = next;
                    level = below;
                }
                None => {
                    assert!(
                        !entry.is_valid(),
                        "superpage leaf at {level:?} for {va}; only 4 KiB leaves are supported"
                    );
                    break;
                }
            }
        }
        (table, level)
    }

    /// Locate the level-0 slot for `va` without creating tables.
    ///
    /// `None` means an interior table on the path is missing. A returned slot
    /// may still hold an invalid entry.
    #[must_use]
    pub fn walk(&self, va: VirtualAddress) -> Option<LeafSlot> {
        match self.descend(va) {
            (table, Level::L0) => Some(LeafSlot {
                table,
                index: Level::L0.index_of(va),
            }),
            _ => None,
        }
    }

    /// Locate the level-0 slot for `va`, allocating missing interior tables.
    ///
    /// All frames for the missing levels are reserved first. If any
    /// reservation fails the others are released and no entry is written.
    /// Each new table then passes `Allocated → WindowMapped → Installed`.
    ///
    /// # Errors
    /// [`WalkError::OutOfMemory`] if `alloc` cannot supply every missing table.
    pub fn walk_create<A: FrameAlloc>(
        &self,
        alloc: &mut A,
        va: VirtualAddress,
    ) -> Result<LeafSlot, WalkError> {
        let (mut table, mut level) = self.descend(va);
        let missing = level as usize;

        let mut reserved: [Option<StagedTable<Allocated>>; 2] = [None, None];
        for slot in 0..missing {
            let Some(frame) = alloc.alloc_frame() else {
                for staged in reserved.iter_mut().filter_map(Option::take) {
                    alloc.release_frame(staged.abandon());
                }
                log::warn!("walk {va}: no frame for {missing} missing table(s)");
                return Err(WalkError::OutOfMemory);
            };
            reserved[slot] = Some(StagedTable::new(frame));
        }

        for staged in reserved.into_iter().flatten() {
            let parent = self.table(table);
            let installed = staged
                .map_window(self.mapper)
                .zeroed(self.mapper)
                .install(parent, level.index_of(va));
            log::debug!("walk {va}: new {:?} table {}", level.next(), installed.frame());
            table = installed.frame();
            level = level.next().unwrap_or(Level::L0);
        }

        debug_assert_eq!(level, Level::L0);
        Ok(LeafSlot {
            table,
            index: Level::L0.index_of(va),
        })
    }

    /// Read the entry at `slot`.
    #[inline]
    #[must_use]
    pub fn entry(&self, slot: LeafSlot) -> PageTableEntry {
        self.table(slot.table).get(slot.index)
    }

    /// Overwrite the entry at `slot`. No TLB maintenance is implied.
    #[inline]
    pub fn set_entry(&self, slot: LeafSlot, entry: PageTableEntry) {
        self.table(slot.table).set(slot.index, entry);
    }

    /// Overwrite the leaf for `va` at `slot` and fence `va`.
    ///
    /// The fence covers every address space when either the old or the new
    /// entry is global.
    pub fn replace_entry(&self, slot: LeafSlot, va: VirtualAddress, entry: PageTableEntry) {
        let old = self.entry(slot);
        self.set_entry(slot, entry);
        self.fence(va, old.flags().global() || entry.flags().global());
    }

    /// Translate `va` if a valid leaf maps it.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let slot = self.walk(va)?;
        let (frame, _) = self.entry(slot).page_4k()?;
        Some(frame.join(va.offset::<Size4K>()))
    }

    /// The `satp` value selecting this tree.
    #[inline]
    #[must_use]
    pub const fn satp(&self) -> u64 {
        tlb::satp_value(self.root, self.asid)
    }

    /// Switch the hart to this address space and flush the TLB.
    ///
    /// # Safety
    /// The currently executing code, stack and window must be mapped at the
    /// same addresses in this tree.
    #[inline]
    pub unsafe fn activate(&self) {
        log::info!("activating address space root={} asid={}", self.root, self.asid);
        unsafe { tlb::write_satp(self.root, self.asid) }
    }

    /// Drop any cached translation of `va` in this address space.
    ///
    /// If the leaf slot for `va` carries `G`, valid or not, the fence is
    /// issued without an ASID.
    pub fn invalidate(&self, va: VirtualAddress) {
        let global = self
            .walk(va)
            .is_some_and(|slot| self.entry(slot).flags().global());
        self.fence(va, global);
    }

    fn fence(&self, va: VirtualAddress, global: bool) {
        if global {
            tlb::invalidate_global(va);
        } else {
            tlb::invalidate_page(self.asid, va);
        }
    }
}
