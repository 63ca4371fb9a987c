//! # RISC-V Entry
//!
//! OpenSBI enters [`_start`] in supervisor mode on the boot hart with
//! `a0 = hart id` and `a1 = device tree`. The entry stub clears `.bss`,
//! switches to the kernel stack and calls [`kernel_main`], which brings up
//! memory management and then idles.

mod trap;

use crate::init::{init_memory, run_checks};
use crate::{image, memory, vm};
use core::panic::PanicInfo;
use kernel_pmap::vm_init::BootLayout;
use kernel_pmap::{BootAllocator, OffsetPhysMapper, WindowMapper};
use kernel_qemu::{QemuLogger, qemu_trace};
use kernel_vmem::AddressSpace;
use log::{LevelFilter, error, info};

/// Physical memory as seen before paging is on.
static IDENTITY: OffsetPhysMapper = OffsetPhysMapper::identity();

/// Physical memory as seen after paging is on.
pub static WINDOW: WindowMapper = WindowMapper::new();

/// User page written once after bring-up to exercise demand paging.
const PROBE_VA: usize = 0x0040_0000;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    kernel_sync::disable_interrupts();
    qemu_trace!("kernel panic: {info}\n");
    halt()
}

fn halt() -> ! {
    loop {
        // SAFETY: waits for an interrupt, no memory effects.
        unsafe { core::arch::asm!("wfi", options(nomem, nostack)) };
    }
}

#[unsafe(no_mangle)]
#[unsafe(naked)]
#[unsafe(link_section = ".text.entry")]
pub extern "C" fn _start() -> ! {
    core::arch::naked_asm!(
        "la sp, __stack_top",
        "la t0, __bss_start",
        "la t1, __bss_end",
        "1:",
        "bgeu t0, t1, 2f",
        "sd zero, 0(t0)",
        "addi t0, t0, 8",
        "j 1b",
        "2:",
        // a0 and a1 are untouched and become the arguments.
        "tail {main}",
        main = sym kernel_main,
    );
}

extern "C" fn kernel_main(hartid: usize, dtb: *const u8) -> ! {
    let _ = QemuLogger::new(LevelFilter::Info).init();
    info!("hart {hartid} entered the kernel, device tree at {dtb:p}");

    // SAFETY: OpenSBI passes a valid device tree or none at all.
    let mem = unsafe { memory::detect_memory(dtb) };
    let boot = BootAllocator::new(&IDENTITY, mem, image::image_end());
    let mut mm = match init_memory(boot, &image::segments(), enable_paging) {
        Ok(mm) => mm,
        Err(e) => {
            error!("memory bring-up failed: {e}");
            halt()
        }
    };
    if let Err(e) = run_checks(&mut mm) {
        error!("{e}");
        halt()
    }
    vm::install(mm);

    trap::init();
    probe_demand_paging();

    info!("memory management up, idling");
    halt()
}

fn enable_paging(layout: &BootLayout) -> &'static WindowMapper {
    WINDOW.configure(layout.window.l0_base);
    let kernel = AddressSpace::from_root(&IDENTITY, layout.root, 0);
    // SAFETY: `vm_init` mapped the image, the stack and the UART at their
    // physical addresses, so execution continues unchanged.
    unsafe { kernel.activate() };
    info!("paging enabled, satp {:#018x}", kernel.satp());
    &WINDOW
}

/// Touch an unmapped user page; the fault handler backs it with a zeroed
/// frame and the store is retried.
fn probe_demand_paging() {
    let probe = PROBE_VA as *mut u64;
    // SAFETY: the address is below UTOP and not otherwise in use; the fault
    // handler maps it on first access.
    let before = unsafe {
        let before = probe.read_volatile();
        probe.write_volatile(0xfeed_f00d);
        before
    };
    // SAFETY: mapped by the fault above.
    let after = unsafe { probe.read_volatile() };
    info!("demand paging at {PROBE_VA:#x}: read {before:#x}, then {after:#x}");
}
