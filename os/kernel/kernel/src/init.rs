//! # Memory bring-up
//!
//! The steps shared by the bare-metal and the hosted kernel: build the
//! kernel address space with the bootstrap allocator, switch to the mapper
//! that is valid once paging is on, hand every remaining frame to the
//! memory manager, and check the result.

use kernel_pmap::check::{self, CheckError};
use kernel_pmap::vm_init::{BootLayout, Segment, page_init, vm_init};
use kernel_pmap::{BootAllocator, MemoryManager, MmError};
use kernel_vmem::PhysMapper;
use log::info;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BootError {
    #[error("memory bring-up failed: {0}")]
    Memory(#[from] MmError),
    #[error("boot self-check failed: {0}")]
    Check(#[from] CheckError),
}

/// Build the kernel address space and the memory manager.
///
/// `enable_paging` runs between [`vm_init`] and [`page_init`]. It turns on
/// translation and returns the mapper the manager uses from then on.
///
/// # Errors
/// [`MmError::OutOfMemory`] if RAM is too small for the kernel tables.
pub fn init_memory<'m, B, M>(
    mut boot: BootAllocator<'_, B>,
    segments: &[Segment],
    enable_paging: impl FnOnce(&BootLayout) -> &'m M,
) -> Result<MemoryManager<'m, M>, MmError>
where
    B: PhysMapper,
    M: PhysMapper,
{
    let layout = vm_init(&mut boot, segments)?;
    info!(
        "kernel address space built: root {}, {} window tables",
        layout.root, layout.window.count
    );

    let mapper = enable_paging(&layout);
    Ok(page_init(boot, &layout, mapper))
}

/// Run the boot self-checks against a fresh manager.
///
/// # Errors
/// The first failed expectation.
pub fn run_checks<M: PhysMapper>(mm: &mut MemoryManager<'_, M>) -> Result<(), CheckError> {
    check::physical_memory_manage_check(mm)?;
    check::page_check(mm)?;
    info!("{} pages free after self-checks", mm.free_count());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image;
    use kernel_info::boot::PhysicalMemory;
    use kernel_pmap::OffsetPhysMapper;

    #[repr(align(4096))]
    struct Frame([u8; 4096]);

    #[test]
    fn bring_up_over_simulated_ram_passes_the_checks() {
        let mem = PhysicalMemory::dram(8 * 1024 * 1024);
        let mut ram: Vec<Frame> = (0..mem.frames()).map(|_| Frame([0; 4096])).collect();
        let mapper = OffsetPhysMapper::for_buffer(ram.as_mut_ptr(), mem.base);

        let segments = image::hosted_segments();
        let boot = BootAllocator::new(&mapper, mem, image::hosted_image_end());
        let mut paging_enabled = false;
        let mut mm = init_memory(boot, &segments, |_| {
            paging_enabled = true;
            &mapper
        })
        .expect("bring-up");
        assert!(paging_enabled);

        let kernel = mm.kernel_space();
        for segment in &segments {
            assert_eq!(mm.translate(&kernel, segment.start.as_u64().into()), Some(segment.start));
        }
        run_checks(&mut mm).expect("self-checks");
        assert!(mm.free_count() > 0);
        assert!(!mm.is_free(mm.pa_to_page(mem.base).expect("in RAM")));
    }

    #[test]
    fn errors_read_as_one_line() {
        assert_eq!(
            BootError::from(MmError::OutOfMemory).to_string(),
            "memory bring-up failed: out of memory"
        );
    }
}
