//! # Kernel image layout
//!
//! The regions of the running image that the kernel address space maps at
//! their physical addresses. On the bare-metal target they come from the
//! linker script; hosted builds use a fixed layout of the same shape.

use kernel_memory_addresses::PhysicalAddress;
use kernel_pmap::vm_init::Segment;
use kernel_vmem::PageEntryBits;

/// MMIO page of the NS16550 console on the QEMU `virt` machine.
pub const UART0: u64 = 0x1000_0000;

const fn global(perm: PageEntryBits) -> PageEntryBits {
    perm.with_global(true)
}

const fn uart() -> Segment {
    Segment::new(
        "uart",
        PhysicalAddress::new(UART0),
        PhysicalAddress::new(UART0 + 0x1000),
        global(PageEntryBits::kernel_rw()),
    )
}

#[cfg(target_os = "none")]
mod linked {
    use super::{Segment, global, uart};
    use kernel_memory_addresses::PhysicalAddress;
    use kernel_vmem::PageEntryBits;

    unsafe extern "C" {
        static __text_start: u8;
        static __text_end: u8;
        static __rodata_start: u8;
        static __rodata_end: u8;
        static __data_start: u8;
        static __bss_end: u8;
        static __stack_bottom: u8;
        static __stack_top: u8;
        static __kernel_end: u8;
    }

    fn pa(symbol: *const u8) -> PhysicalAddress {
        PhysicalAddress::new(symbol.addr() as u64)
    }

    /// Everything the kernel touches after paging is switched on.
    pub fn segments() -> [Segment; 5] {
        [
            Segment::new(
                ".text",
                pa(&raw const __text_start),
                pa(&raw const __text_end),
                global(PageEntryBits::kernel_rx()),
            ),
            Segment::new(
                ".rodata",
                pa(&raw const __rodata_start),
                pa(&raw const __rodata_end),
                global(PageEntryBits::kernel_ro()),
            ),
            Segment::new(
                ".data",
                pa(&raw const __data_start),
                pa(&raw const __bss_end),
                global(PageEntryBits::kernel_rw()),
            ),
            Segment::new(
                "stack",
                pa(&raw const __stack_bottom),
                pa(&raw const __stack_top),
                global(PageEntryBits::kernel_rw()),
            ),
            uart(),
        ]
    }

    /// First byte past the loaded image.
    pub fn image_end() -> PhysicalAddress {
        pa(&raw const __kernel_end)
    }
}

#[cfg(target_os = "none")]
pub use linked::{image_end, segments};

#[cfg(not(target_os = "none"))]
mod hosted_layout {
    use kernel_info::memory::{KERNEL_LOAD, KERNEL_STACK_SIZE};

    pub const TEXT: u64 = KERNEL_LOAD;
    pub const RODATA: u64 = TEXT + 0x4_0000;
    pub const DATA: u64 = RODATA + 0x1_0000;
    pub const STACK: u64 = DATA + 0x1_0000;
    pub const END: u64 = STACK + KERNEL_STACK_SIZE as u64;
}

/// A made-up image at `KERNEL_LOAD` with the same segments as the real one.
#[cfg(not(target_os = "none"))]
pub fn hosted_segments() -> [Segment; 5] {
    use hosted_layout::{DATA, END, RODATA, STACK, TEXT};
    let pa = PhysicalAddress::new;
    [
        Segment::new(".text", pa(TEXT), pa(RODATA), global(PageEntryBits::kernel_rx())),
        Segment::new(".rodata", pa(RODATA), pa(DATA), global(PageEntryBits::kernel_ro())),
        Segment::new(".data", pa(DATA), pa(STACK), global(PageEntryBits::kernel_rw())),
        Segment::new("stack", pa(STACK), pa(END), global(PageEntryBits::kernel_rw())),
        uart(),
    ]
}

#[cfg(not(target_os = "none"))]
pub const fn hosted_image_end() -> PhysicalAddress {
    PhysicalAddress::new(hosted_layout::END)
}
