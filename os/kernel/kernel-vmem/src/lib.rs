//! # Virtual Memory Support
//!
//! Sv39 paging for a RISC-V kernel: the entry encoding the translation
//! hardware expects, the three-level table walker, and the protocol by which
//! newly allocated table frames become writable.
//!
//! ## What you get
//! - [`PageEntryBits`]: the hardware entry layout as a bitfield.
//! - [`PageTable`] / [`PageTableEntry`] / [`Level`] / [`TableIndex`].
//! - An [`AddressSpace`] handle with walk, walk-with-create and translate.
//! - The staged-table state machine in [`staging`].
//! - [`tlb`] helpers wrapping `sfence.vma` and `satp`.
//! - The two seams to the physical allocator: [`FrameAlloc`] and [`PhysMapper`].
//!
//! ## Sv39 Virtual Address → Physical Address Walk
//!
//! ```text
//! | 63‒39 | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//! | sign  | VPN2  | VPN1  | VPN0  | Offset |
//! ```
//!
//! ```text
//!  satp.PPN → L2 table ─VPN2─► L1 table ─VPN1─► L0 table ─VPN0─► 4 KiB frame
//! ```
//!
//! Each table is one 4 KiB frame of 512 eight-byte entries. An entry with
//! `V=1` and `R=W=X=0` points to the next table; only level-0 entries map
//! data frames here.
//!
//! ## Self-mapping window
//!
//! Table frames come from the same allocator as every other frame. The
//! kernel can only write a frame after it has been made reachable through
//! the [`PhysMapper`] window, so a new table is always
//! `Allocated → WindowMapped → Installed`, in that order.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

pub mod address_space;
mod page_entry_bits;
pub mod page_table;
pub mod staging;
pub mod tlb;

pub use crate::address_space::{AddressSpace, LeafSlot};
pub use crate::page_entry_bits::PageEntryBits;
pub use crate::page_table::{Level, PageTable, PageTableEntry, TableIndex};

use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// Errors raised by the walker.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalkError {
    #[error("out of memory while allocating a page table")]
    OutOfMemory,
}

/// Source of **physical** 4 KiB frames for page tables.
///
/// Returned frames need not be windowed or zeroed; the walker stages them
/// itself.
pub trait FrameAlloc {
    /// Reserve one frame, or `None` when exhausted.
    fn alloc_frame(&mut self) -> Option<PhysicalPage<Size4K>>;

    /// Give back a frame obtained from [`alloc_frame`](Self::alloc_frame)
    /// that was never installed.
    fn release_frame(&mut self, frame: PhysicalPage<Size4K>);
}

/// The self-mapping window: how the kernel reaches physical frames.
///
/// Before paging is enabled this is an identity (or fixed-offset) view and
/// windowing is a no-op. Afterwards [`map_window`](Self::map_window) writes
/// the window leaf for the frame and fences it.
pub trait PhysMapper {
    /// Make `frame` reachable. Idempotent.
    fn map_window(&self, frame: PhysicalPage<Size4K>);

    /// Remove the window mapping of `frame`.
    fn unmap_window(&self, frame: PhysicalPage<Size4K>);

    /// Convert a *physical* address to a usable reference.
    ///
    /// # Safety
    /// - The frame containing `pa` must be windowed for the whole of `'a`.
    /// - Type `T` must match the bytes at `pa` and no other live reference
    ///   may alias them mutably.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::{RefCell, UnsafeCell};
    use std::collections::BTreeSet;

    const BASE: u64 = 0x8000_0000;

    /// A 4 KiB-aligned raw frame.
    #[repr(align(4096))]
    struct Aligned4K([u8; 4096]);

    /// In-memory "RAM" starting at `BASE`, with a record of windowed frames.
    ///
    /// Dereferencing a frame that was never windowed panics.
    pub struct TestPhys {
        frames: Vec<UnsafeCell<Aligned4K>>,
        windowed: RefCell<BTreeSet<u64>>,
    }

    impl TestPhys {
        pub fn with_frames(n: usize) -> Self {
            Self {
                frames: (0..n).map(|_| UnsafeCell::new(Aligned4K([0xa5; 4096]))).collect(),
                windowed: RefCell::new(BTreeSet::new()),
            }
        }

        pub fn frame(&self, idx: usize) -> PhysicalPage<Size4K> {
            assert!(idx < self.frames.len());
            PhysicalPage::containing(PhysicalAddress::new(BASE + ((idx as u64) << 12)))
        }

        pub fn len(&self) -> usize {
            self.frames.len()
        }

        pub fn is_windowed(&self, frame: PhysicalPage<Size4K>) -> bool {
            self.windowed.borrow().contains(&frame.base().as_u64())
        }
    }

    impl PhysMapper for TestPhys {
        fn map_window(&self, frame: PhysicalPage<Size4K>) {
            self.windowed.borrow_mut().insert(frame.base().as_u64());
        }

        fn unmap_window(&self, frame: PhysicalPage<Size4K>) {
            self.windowed.borrow_mut().remove(&frame.base().as_u64());
        }

        unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
            let frame = PhysicalPage::<Size4K>::containing(pa);
            assert!(self.is_windowed(frame), "dereferenced un-windowed frame {frame}");
            let idx = ((frame.base().as_u64() - BASE) >> 12) as usize;
            let off = pa.offset::<Size4K>() as usize;
            // SAFETY: in bounds of the owned frame; the caller promises the type.
            unsafe { &mut *self.frames[idx].get().cast::<u8>().add(off).cast::<T>() }
        }
    }

    /// Hands out every frame of a [`TestPhys`], lowest first.
    pub struct StackAlloc {
        free: Vec<PhysicalPage<Size4K>>,
    }

    impl StackAlloc {
        pub fn all_of(phys: &TestPhys) -> Self {
            Self {
                free: (0..phys.len()).rev().map(|i| phys.frame(i)).collect(),
            }
        }

        pub fn remaining(&self) -> usize {
            self.free.len()
        }
    }

    impl FrameAlloc for StackAlloc {
        fn alloc_frame(&mut self) -> Option<PhysicalPage<Size4K>> {
            self.free.pop()
        }

        fn release_frame(&mut self, frame: PhysicalPage<Size4K>) {
            self.free.push(frame);
        }
    }

    #[test]
    #[should_panic(expected = "un-windowed")]
    fn test_mapper_rejects_unwindowed_frames() {
        let phys = TestPhys::with_frames(1);
        let _ = unsafe { phys.phys_to_mut::<PageTable>(phys.frame(0).base()) };
    }

    #[test]
    fn walk_error_formats() {
        assert_eq!(
            WalkError::OutOfMemory.to_string(),
            "out of memory while allocating a page table"
        );
    }
}
