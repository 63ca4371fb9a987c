//! # Staged page-table frames
//!
//! A freshly allocated table frame goes through three states before it is
//! part of the translation tree:
//!
//! ```text
//!  Allocated ──map_window──► WindowMapped ──install──► Installed
//!  (address only)            (may be written)          (linked into parent)
//! ```
//!
//! Only a [`StagedTable<WindowMapped>`] hands out a reference to the table
//! contents, so a frame can never be dereferenced before it is reachable
//! through the self-mapping window. Skipping a state does not type-check.

use crate::page_table::{PageTable, PageTableEntry, TableIndex};
use crate::PhysMapper;
use core::fmt;
use core::marker::PhantomData;
use kernel_memory_addresses::{PhysicalPage, Size4K};

/// Frame reserved, contents untouched and unreachable.
pub enum Allocated {}
/// Frame reachable through the window; contents may be written.
pub enum WindowMapped {}
/// Frame linked into its parent table.
pub enum Installed {}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Allocated {}
    impl Sealed for super::WindowMapped {}
    impl Sealed for super::Installed {}
}

/// Run-time view of a staging state, for diagnostics.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TableState {
    Allocated,
    WindowMapped,
    Installed,
}

impl fmt::Display for TableState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Allocated => "allocated",
            Self::WindowMapped => "window-mapped",
            Self::Installed => "installed",
        })
    }
}

pub trait Stage: sealed::Sealed {
    const STATE: TableState;
}

impl Stage for Allocated {
    const STATE: TableState = TableState::Allocated;
}

impl Stage for WindowMapped {
    const STATE: TableState = TableState::WindowMapped;
}

impl Stage for Installed {
    const STATE: TableState = TableState::Installed;
}

/// A table frame tagged with its staging state `S`.
#[must_use]
pub struct StagedTable<S: Stage> {
    frame: PhysicalPage<Size4K>,
    _state: PhantomData<S>,
}

impl<S: Stage> StagedTable<S> {
    #[inline]
    pub const fn frame(&self) -> PhysicalPage<Size4K> {
        self.frame
    }

    #[inline]
    pub const fn state(&self) -> TableState {
        S::STATE
    }

    const fn transition<T: Stage>(self) -> StagedTable<T> {
        StagedTable {
            frame: self.frame,
            _state: PhantomData,
        }
    }
}

impl StagedTable<Allocated> {
    /// Take ownership of a frame that was just reserved for a table.
    #[inline]
    pub const fn new(frame: PhysicalPage<Size4K>) -> Self {
        Self {
            frame,
            _state: PhantomData,
        }
    }

    /// Make the frame reachable through the window.
    #[inline]
    pub fn map_window<M: PhysMapper>(self, mapper: &M) -> StagedTable<WindowMapped> {
        mapper.map_window(self.frame);
        log::trace!("table {} {}", self.frame, TableState::WindowMapped);
        self.transition()
    }

    /// Hand an untouched frame back, e.g. when a later reservation failed.
    #[inline]
    pub const fn abandon(self) -> PhysicalPage<Size4K> {
        self.frame
    }
}

impl StagedTable<WindowMapped> {
    /// The table contents.
    #[inline]
    pub fn table<'a, M: PhysMapper>(&self, mapper: &M) -> &'a mut PageTable {
        // SAFETY: the frame is windowed (typestate) and holds a table.
        unsafe { mapper.phys_to_mut::<PageTable>(self.frame.base()) }
    }

    /// Invalidate every entry of the new table.
    #[inline]
    pub fn zeroed<M: PhysMapper>(self, mapper: &M) -> Self {
        self.table(mapper).zero();
        self
    }

    /// Link the table into `parent[index]` with a `V`-only pointer entry.
    #[inline]
    pub fn install(self, parent: &mut PageTable, index: TableIndex) -> StagedTable<Installed> {
        debug_assert!(!parent.get(index).is_valid(), "parent slot already in use");
        parent.set(index, PageTableEntry::make_table(self.frame));
        log::trace!("table {} {} at slot {}", self.frame, TableState::Installed, index.as_usize());
        self.transition()
    }

    /// Use the table as the root of a new address space.
    #[inline]
    pub const fn into_root(self) -> PhysicalPage<Size4K> {
        self.frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::TestPhys;

    #[test]
    fn states_advance_in_order() {
        let phys = TestPhys::with_frames(4);
        let parent_frame = phys.frame(0);
        let child_frame = phys.frame(1);

        let parent = StagedTable::new(parent_frame).map_window(&phys).zeroed(&phys);
        let child = StagedTable::new(child_frame);
        assert_eq!(child.state(), TableState::Allocated);
        assert!(!phys.is_windowed(child_frame));

        let child = child.map_window(&phys);
        assert_eq!(child.state(), TableState::WindowMapped);
        assert!(phys.is_windowed(child_frame));

        let child = child.zeroed(&phys).install(parent.table(&phys), TableIndex::new(5));
        assert_eq!(child.state(), TableState::Installed);
        assert_eq!(parent.table(&phys).get(TableIndex::new(5)).next_table(), Some(child_frame));
    }

    #[test]
    fn abandoned_frame_is_never_windowed() {
        let phys = TestPhys::with_frames(1);
        let frame = StagedTable::new(phys.frame(0)).abandon();
        assert!(!phys.is_windowed(frame));
    }
}
