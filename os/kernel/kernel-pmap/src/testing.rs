//! Simulated RAM for unit tests.

use core::cell::{RefCell, UnsafeCell};
use kernel_info::boot::PhysicalMemory;
use kernel_info::memory::DRAM_BASE;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};
use kernel_vmem::PhysMapper;
use std::collections::BTreeSet;

#[repr(align(4096))]
struct Frame([u8; 4096]);

/// `frames` frames of RAM at [`DRAM_BASE`], filled with garbage.
///
/// Tracks which frames are windowed and panics when an un-windowed frame
/// is dereferenced.
pub struct SimRam {
    frames: Box<[UnsafeCell<Frame>]>,
    windowed: RefCell<BTreeSet<u64>>,
}

impl SimRam {
    pub fn new(frames: usize) -> Self {
        Self {
            frames: (0..frames).map(|_| UnsafeCell::new(Frame([0xa5; 4096]))).collect(),
            windowed: RefCell::new(BTreeSet::new()),
        }
    }

    pub fn memory(&self) -> PhysicalMemory {
        PhysicalMemory::dram(self.frames.len() as u64 * 4096)
    }

    pub fn is_windowed(&self, frame: PhysicalPage<Size4K>) -> bool {
        self.windowed.borrow().contains(&frame.base().as_u64())
    }

    fn index(frame: PhysicalPage<Size4K>) -> usize {
        ((frame.base().as_u64() - DRAM_BASE) >> 12) as usize
    }

    /// Inspect a frame regardless of the window.
    pub fn bytes(&self, frame: PhysicalPage<Size4K>) -> &[u8; 4096] {
        // SAFETY: test-only inspection; no mutable reference is live.
        unsafe { &(*self.frames[Self::index(frame)].get()).0 }
    }
}

impl PhysMapper for SimRam {
    fn map_window(&self, frame: PhysicalPage<Size4K>) {
        assert!(Self::index(frame) < self.frames.len(), "{frame} is not RAM");
        self.windowed.borrow_mut().insert(frame.base().as_u64());
    }

    fn unmap_window(&self, frame: PhysicalPage<Size4K>) {
        self.windowed.borrow_mut().remove(&frame.base().as_u64());
    }

    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let frame = PhysicalPage::<Size4K>::containing(pa);
        assert!(self.is_windowed(frame), "dereferenced un-windowed frame {frame}");
        let base = self.frames.as_ptr().cast::<u8>().cast_mut();
        let off = (pa.as_u64() - DRAM_BASE) as usize;
        // SAFETY: in bounds of the frame array, which is contiguous.
        unsafe { &mut *base.add(off).cast::<T>() }
    }
}
