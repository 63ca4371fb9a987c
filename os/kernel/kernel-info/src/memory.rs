//! # Memory Layout
//!
//! Physical placement of the kernel on the QEMU `virt` board and the fixed
//! virtual regions shared by every Sv39 address space.

/// Start of DRAM on the QEMU `virt` machine.
pub const DRAM_BASE: u64 = 0x8000_0000;

/// Where OpenSBI hands control to the kernel image (LMA == VMA).
///
/// # Kernel Build
/// This information is sourced in the kernel's `build.rs` and must match
/// the `. = ...` origin of the linker script.
pub const KERNEL_LOAD: u64 = 0x8020_0000;

/// Memory size assumed when the firmware does not describe RAM.
pub const DEFAULT_MEMORY_SIZE: u64 = 64 * 1024 * 1024;

/// Bytes spanned by a single level-0 table (512 × 4 KiB).
pub const PDMAP: u64 = 2 * 1024 * 1024;

/// Legacy name of the 4 MiB region granule used by the fixed user regions.
pub const REGION: u64 = 4 * 1024 * 1024;

/// Highest address (exclusive) of the region shared with user space.
pub const ULIM: u64 = 0x8000_0000;

/// Read-only view of the page tables for user space.
pub const UVPT: u64 = ULIM - REGION;

/// Read-only view of the page descriptor arena for user space.
pub const UPAGES: u64 = UVPT - REGION;

/// Read-only view of the environment table for user space.
pub const UENVS: u64 = UPAGES - REGION;

/// Split address: user-triggered paths never reach `UTOP` or above.
pub const UTOP: u64 = UENVS;

/// Lowest address a user page fault may be serviced for.
pub const USER_FLOOR: u64 = 0x1_0000;

/// Base of the self-mapping window through which the kernel reaches
/// physical frames once paging is enabled. Covered by root index 256.
pub const WINDOW_BASE: u64 = 0xFFFF_FFC0_0000_0000;

/// Size of the self-mapping window (one level-1 table).
pub const WINDOW_SIZE: u64 = 1024 * 1024 * 1024;

/// Number of environment records reserved at boot.
pub const NENV: usize = 1024;

/// Bytes reserved per environment record.
pub const ENV_RECORD_BYTES: usize = 256;

/// The size of the boot hart's kernel stack.
pub const KERNEL_STACK_SIZE: usize = 32 * 1024;

/// Window address for the physical address `pa`.
///
/// Returns `None` if `pa` lies outside the part of DRAM the window covers.
///
/// ```rust
/// # use kernel_info::memory::*;
/// assert_eq!(window_address(DRAM_BASE + 0x3000), Some(WINDOW_BASE + 0x3000));
/// assert_eq!(window_address(0x1000_0000), None);
/// ```
#[must_use]
pub const fn window_address(pa: u64) -> Option<u64> {
    match pa.checked_sub(DRAM_BASE) {
        Some(off) if off < WINDOW_SIZE => Some(WINDOW_BASE + off),
        _ => None,
    }
}

const _: () = {
    assert!(KERNEL_STACK_SIZE.is_multiple_of(4096));
    assert!(KERNEL_LOAD > DRAM_BASE);
    assert!(UTOP < UPAGES && UPAGES < UVPT && UVPT < ULIM);
    assert!(UTOP > USER_FLOOR);
    assert!(ULIM <= DRAM_BASE);
    assert!(WINDOW_BASE.is_multiple_of(WINDOW_SIZE));
    assert!(WINDOW_SIZE >= DEFAULT_MEMORY_SIZE);
    assert!((NENV * ENV_RECORD_BYTES) as u64 <= REGION);
    // The window lives in the upper half of the Sv39 space (bit 38 set).
    assert!((WINDOW_BASE >> 38) == (u64::MAX >> 38));
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_regions_are_stacked_below_ulim() {
        assert_eq!(UVPT, 0x7fc0_0000);
        assert_eq!(UPAGES, 0x7f80_0000);
        assert_eq!(UENVS, 0x7f40_0000);
        assert_eq!(UTOP, UENVS);
    }

    #[test]
    fn window_covers_only_dram() {
        assert_eq!(window_address(DRAM_BASE), Some(WINDOW_BASE));
        assert_eq!(window_address(DRAM_BASE + WINDOW_SIZE - 1), Some(WINDOW_BASE + WINDOW_SIZE - 1));
        assert_eq!(window_address(DRAM_BASE + WINDOW_SIZE), None);
        assert_eq!(window_address(DRAM_BASE - 1), None);
    }
}
