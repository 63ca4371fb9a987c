//! # Boot Information

use crate::memory::{DRAM_BASE, WINDOW_SIZE};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, page_align_down};

/// Physical RAM as reported by the memory probe.
///
/// Consumed exactly once at boot to size the page descriptor arena.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PhysicalMemory {
    /// First byte of RAM.
    pub base: PhysicalAddress,
    /// Usable bytes from `base`, always a multiple of the page size.
    pub size: u64,
}

impl PhysicalMemory {
    /// Describe `size` bytes of DRAM starting at [`DRAM_BASE`].
    ///
    /// The size is truncated to whole pages and clamped to what the
    /// self-mapping window can reach.
    ///
    /// ```rust
    /// # use kernel_info::boot::PhysicalMemory;
    /// let mem = PhysicalMemory::dram(64 * 1024 * 1024 + 123);
    /// assert_eq!(mem.frames(), 16384);
    /// ```
    #[must_use]
    pub const fn dram(size: u64) -> Self {
        let size = if size > WINDOW_SIZE { WINDOW_SIZE } else { size };
        Self {
            base: PhysicalAddress::new(DRAM_BASE),
            size: page_align_down(size),
        }
    }

    /// Number of 4 KiB frames.
    #[must_use]
    pub const fn frames(&self) -> usize {
        (self.size / PAGE_SIZE) as usize
    }

    /// One past the last byte of RAM.
    #[must_use]
    pub const fn end(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.base.as_u64() + self.size)
    }

    #[must_use]
    pub const fn contains(&self, pa: PhysicalAddress) -> bool {
        pa.as_u64() >= self.base.as_u64() && pa.as_u64() < self.end().as_u64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dram_is_clamped_to_window() {
        let mem = PhysicalMemory::dram(8 * WINDOW_SIZE);
        assert_eq!(mem.size, WINDOW_SIZE);
    }

    #[test]
    fn contains_is_half_open() {
        let mem = PhysicalMemory::dram(0x10_0000);
        assert!(mem.contains(PhysicalAddress::new(DRAM_BASE)));
        assert!(mem.contains(PhysicalAddress::new(DRAM_BASE + 0xf_ffff)));
        assert!(!mem.contains(mem.end()));
    }
}
