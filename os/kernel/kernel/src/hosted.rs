//! # Hosted bring-up
//!
//! Runs the kernel's memory bring-up inside a normal process. RAM is a
//! leaked, page-aligned buffer of the detected size, addressed through an
//! offset mapper, so every step from `vm_init` to the page-fault path runs
//! exactly as it would on the board, minus the `satp` write.

use crate::init::{BootError, init_memory, run_checks};
use crate::{image, memory, vm};
use kernel_memory_addresses::VirtualAddress;
use kernel_pmap::{BootAllocator, OffsetPhysMapper};
use kernel_qemu::QemuLogger;
use kernel_vmem::AddressSpace;
use log::{LevelFilter, info};

#[repr(align(4096))]
struct Frame([u8; 4096]);

/// First user page touched by the fault demonstration.
const PROBE_VA: u64 = 0x0040_0000;

pub fn run() -> Result<(), BootError> {
    let _ = QemuLogger::new(LevelFilter::Info).init();

    // SAFETY: null means "no device tree".
    let mem = unsafe { memory::detect_memory(core::ptr::null()) };
    let ram: &'static mut [Frame] = (0..mem.frames())
        .map(|_| Frame([0; 4096]))
        .collect::<Vec<_>>()
        .leak();
    let mapper: &'static OffsetPhysMapper =
        Box::leak(Box::new(OffsetPhysMapper::for_buffer(ram.as_mut_ptr(), mem.base)));

    let boot = BootAllocator::new(mapper, mem, image::hosted_image_end());
    let mut mm = init_memory(boot, &image::hosted_segments(), |layout| {
        let satp = AddressSpace::from_root(mapper, layout.root, 0).satp();
        info!("skipping satp write ({satp:#018x}) in a hosted build");
        mapper
    })?;
    run_checks(&mut mm)?;
    vm::install(mm);

    let space = vm::with_mm(|mm| mm.create_space(1))?;
    for i in 0..4 {
        let va = VirtualAddress::new(PROBE_VA + i * 0x1000 + 0x10);
        let page = vm::handle_page_fault(&space, va)?;
        info!("fault at {va} refilled with {page}");
    }
    vm::with_mm(|mm| {
        let refilled = mm.translate(&space, VirtualAddress::new(PROBE_VA));
        info!("{PROBE_VA:#x} now maps {refilled:?}");
        mm.destroy_space(space);
        info!("{} pages free", mm.free_count());
    });
    Ok(())
}
