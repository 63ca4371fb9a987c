//! # Physical memory detection

use fdt::Fdt;
use kernel_info::boot::PhysicalMemory;
use kernel_info::memory::{DEFAULT_MEMORY_SIZE, DRAM_BASE, WINDOW_SIZE};
use log::{info, warn};

/// Size RAM from the device tree at `dtb`.
///
/// Falls back to [`DEFAULT_MEMORY_SIZE`] when there is no device tree or it
/// does not describe a bank at [`DRAM_BASE`].
///
/// # Safety
/// `dtb` is null or points at a flattened device tree.
pub unsafe fn detect_memory(dtb: *const u8) -> PhysicalMemory {
    let size = if dtb.is_null() {
        None
    } else {
        // SAFETY: guaranteed by the caller.
        match unsafe { Fdt::from_ptr(dtb) } {
            Ok(fdt) => dram_size(&fdt),
            Err(e) => {
                warn!("ignoring unreadable device tree: {e:?}");
                None
            }
        }
    };
    memory_of_size(size)
}

/// Size of the `/memory` bank starting at [`DRAM_BASE`].
fn dram_size(fdt: &Fdt<'_>) -> Option<u64> {
    fdt.all_nodes()
        .filter(|node| node.name.split('@').next() == Some("memory"))
        .filter_map(|node| node.reg())
        .flatten()
        .find(|region| region.starting_address.addr() as u64 == DRAM_BASE)
        .and_then(|region| region.size)
        .map(|size| size as u64)
}

fn memory_of_size(size: Option<u64>) -> PhysicalMemory {
    let size = size.unwrap_or_else(|| {
        info!("no memory size reported, assuming {}K", DEFAULT_MEMORY_SIZE / 1024);
        DEFAULT_MEMORY_SIZE
    });
    if size > WINDOW_SIZE {
        warn!(
            "clamping {}K of RAM to the {}K reachable through the window",
            size / 1024,
            WINDOW_SIZE / 1024
        );
    }

    let mem = PhysicalMemory::dram(size);
    info!("Physical memory: {}K available", mem.size / 1024);
    mem
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_device_tree_means_default_size() {
        let mem = unsafe { detect_memory(core::ptr::null()) };
        assert_eq!(mem.base.as_u64(), DRAM_BASE);
        assert_eq!(mem.size, DEFAULT_MEMORY_SIZE);
        assert_eq!(mem.frames(), 16384);
    }

    #[test]
    fn oversized_memory_is_clamped_to_the_window() {
        let mem = memory_of_size(Some(4 * WINDOW_SIZE));
        assert_eq!(mem.size, WINDOW_SIZE);
    }

    #[test]
    fn partial_pages_are_dropped() {
        let mem = memory_of_size(Some(128 * 1024 * 1024 + 100));
        assert_eq!(mem.size, 128 * 1024 * 1024);
    }
}
