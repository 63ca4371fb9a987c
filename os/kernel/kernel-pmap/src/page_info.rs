//! # Page descriptors
//!
//! One [`PageInfo`] per physical frame, stored in a dense arena indexed by
//! [`PageId`]. The frame of descriptor `i` is `DRAM base + i × 4 KiB`.

use core::fmt;
use core::num::NonZeroU32;
use kernel_info::memory::{REGION, WINDOW_SIZE};
use kernel_memory_addresses::PAGE_SIZE;

/// Index of a page descriptor in the arena.
///
/// Stored off-by-one so `Option<PageId>` stays four bytes wide.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PageId(NonZeroU32);

impl PageId {
    /// ### Panics
    /// If `index` does not fit the arena's index type.
    #[inline]
    #[must_use]
    pub const fn from_index(index: usize) -> Self {
        assert!(index < u32::MAX as usize, "page index out of range");
        match NonZeroU32::new(index as u32 + 1) {
            Some(v) => Self(v),
            None => unreachable!(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

impl fmt::Debug for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page#{}", self.index())
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Bookkeeping for one frame: reference count and free-list link.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct PageInfo {
    pub(crate) refs: u16,
    pub(crate) on_free_list: bool,
    pub(crate) prev: Option<PageId>,
    pub(crate) next: Option<PageId>,
}

impl PageInfo {
    /// A descriptor pinned with one reference and not on any list.
    #[must_use]
    pub const fn pinned() -> Self {
        Self {
            refs: 1,
            on_free_list: false,
            prev: None,
            next: None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn refs(&self) -> u16 {
        self.refs
    }

    #[inline]
    #[must_use]
    pub const fn is_free(&self) -> bool {
        self.on_free_list
    }
}

/// Bytes of arena needed to describe `frames` frames, rounded up to pages.
#[must_use]
pub const fn arena_bytes(frames: usize) -> u64 {
    let raw = (frames * size_of::<PageInfo>()) as u64;
    raw.div_ceil(PAGE_SIZE) * PAGE_SIZE
}

const _: () = {
    assert!(size_of::<PageInfo>() == 12);
    assert!(size_of::<Option<PageId>>() == 4);
    // The largest arena the window allows must fit its user-visible region.
    assert!(arena_bytes((WINDOW_SIZE / PAGE_SIZE) as usize) <= REGION);
};
