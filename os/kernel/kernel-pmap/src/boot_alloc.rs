//! # Bootstrap allocator
//!
//! A high-water-mark allocator used only while the kernel address space and
//! the page descriptor arena are being built. It never frees (apart from
//! rolling back its most recent frame, which the walker does on failure)
//! and it panics when it would run past the end of RAM.
//!
//! [`page_init`](crate::vm_init::page_init) consumes it by value; the
//! high-water mark becomes the boundary between pinned and free frames.

use kernel_info::boot::PhysicalMemory;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, PhysicalPage, Size4K};
use kernel_vmem::{FrameAlloc, PhysMapper};

/// Bump allocator over `[start, mem.end())`.
pub struct BootAllocator<'m, M: PhysMapper> {
    mapper: &'m M,
    mem: PhysicalMemory,
    next: PhysicalAddress,
}

impl<'m, M: PhysMapper> BootAllocator<'m, M> {
    /// Start handing out memory at `start`, typically the end of the kernel
    /// image.
    ///
    /// ### Panics
    /// If `start` lies outside `mem`.
    pub fn new(mapper: &'m M, mem: PhysicalMemory, start: PhysicalAddress) -> Self {
        assert!(
            start >= mem.base && start <= mem.end(),
            "boot allocator start {start} outside RAM"
        );
        Self {
            mapper,
            mem,
            next: start,
        }
    }

    #[inline]
    pub const fn mapper(&self) -> &'m M {
        self.mapper
    }

    #[inline]
    pub const fn memory(&self) -> PhysicalMemory {
        self.mem
    }

    /// First byte not yet handed out.
    #[inline]
    pub const fn high_water(&self) -> PhysicalAddress {
        self.next
    }

    fn try_alloc(&mut self, n: u64, align: u64) -> Option<PhysicalAddress> {
        debug_assert!(align.is_power_of_two());
        let start = self.next.as_u64().checked_next_multiple_of(align)?;
        let end = start.checked_add(n)?;
        if end > self.mem.end().as_u64() {
            return None;
        }
        self.next = PhysicalAddress::new(end);
        Some(PhysicalAddress::new(start))
    }

    /// Reserve `n` bytes aligned to `align`, zeroing them if `clear` is set.
    ///
    /// Every frame touched by the reservation is windowed before it is
    /// written.
    ///
    /// ### Panics
    /// If the reservation would run past the end of RAM.
    pub fn boot_alloc(&mut self, n: u64, align: u64, clear: bool) -> PhysicalAddress {
        let Some(start) = self.try_alloc(n, align) else {
            log::error!(
                "boot allocator exhausted: {n} bytes requested at {}, RAM ends at {}",
                self.next,
                self.mem.end()
            );
            panic!("out of memory during bootstrap");
        };
        log::trace!("boot_alloc {n:#x} bytes at {start}, high water now {}", self.next);

        let mut frame = PhysicalPage::<Size4K>::containing(start);
        while frame.base() < self.next {
            self.mapper.map_window(frame);
            let Some(next) = frame.next() else { break };
            frame = next;
        }

        if clear && n > 0 {
            #[allow(clippy::cast_possible_truncation)]
            let len = n as usize;
            // SAFETY: `[start, start + n)` was just reserved and its frames
            // are windowed; the window is linear over DRAM.
            unsafe {
                let first: &mut u8 = self.mapper.phys_to_mut(start);
                core::ptr::write_bytes(core::ptr::from_mut(first), 0, len);
            }
        }
        start
    }
}

impl<M: PhysMapper> FrameAlloc for BootAllocator<'_, M> {
    fn alloc_frame(&mut self) -> Option<PhysicalPage<Size4K>> {
        self.try_alloc(PAGE_SIZE, PAGE_SIZE).map(PhysicalPage::containing)
    }

    fn release_frame(&mut self, frame: PhysicalPage<Size4K>) {
        if frame.base() + PAGE_SIZE == self.next {
            self.next = frame.base();
        } else {
            log::warn!("boot allocator cannot release {frame}; leaking it");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SimRam;
    use kernel_info::memory::DRAM_BASE;

    #[test]
    fn allocations_are_aligned_and_monotonic() {
        let ram = SimRam::new(8);
        let mut boot = BootAllocator::new(&ram, ram.memory(), ram.memory().base + 0x10);

        let a = boot.boot_alloc(24, 8, false);
        assert_eq!(a.as_u64(), DRAM_BASE + 0x10);
        let b = boot.boot_alloc(4096, 4096, true);
        assert_eq!(b.as_u64(), DRAM_BASE + 0x1000);
        assert_eq!(boot.high_water().as_u64(), DRAM_BASE + 0x2000);
    }

    #[test]
    fn cleared_memory_is_zero_and_windowed() {
        let ram = SimRam::new(4);
        let mut boot = BootAllocator::new(&ram, ram.memory(), ram.memory().base);
        let pa = boot.boot_alloc(2 * 4096, 4096, true);
        for i in 0..2 {
            let frame = PhysicalPage::containing(pa + i * 4096);
            assert!(ram.is_windowed(frame));
            assert!(ram.bytes(frame).iter().all(|&b| b == 0));
        }
        assert!(!ram.is_windowed(PhysicalPage::containing(pa + 2 * 4096)));
    }

    #[test]
    fn frame_release_rolls_back_only_the_last_frame() {
        let ram = SimRam::new(4);
        let mut boot = BootAllocator::new(&ram, ram.memory(), ram.memory().base);
        let a = boot.alloc_frame().expect("frame");
        let b = boot.alloc_frame().expect("frame");
        boot.release_frame(a);
        assert_eq!(boot.high_water(), b.base() + 4096);
        boot.release_frame(b);
        assert_eq!(boot.high_water(), b.base());
    }

    #[test]
    fn frame_alloc_reports_exhaustion() {
        let ram = SimRam::new(1);
        let mut boot = BootAllocator::new(&ram, ram.memory(), ram.memory().base);
        assert!(boot.alloc_frame().is_some());
        assert!(boot.alloc_frame().is_none());
    }

    #[test]
    #[should_panic(expected = "out of memory during bootstrap")]
    fn running_past_ram_panics() {
        let ram = SimRam::new(2);
        let mut boot = BootAllocator::new(&ram, ram.memory(), ram.memory().base);
        let _ = boot.boot_alloc(3 * 4096, 4096, false);
    }
}
