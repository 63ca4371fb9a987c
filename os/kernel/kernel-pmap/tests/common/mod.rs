#![allow(dead_code)]

use kernel_info::boot::PhysicalMemory;
use kernel_memory_addresses::PhysicalAddress;
use kernel_pmap::vm_init::{BootLayout, page_init, vm_init};
use kernel_pmap::{BootAllocator, MemoryManager, OffsetPhysMapper};

#[repr(align(4096))]
struct Frame([u8; 4096]);

/// Host memory standing in for `frames` frames of DRAM.
pub struct Ram {
    frames: Vec<Frame>,
}

impl Ram {
    pub fn new(frames: usize) -> Self {
        Self {
            frames: (0..frames).map(|_| Frame([0x5a; 4096])).collect(),
        }
    }

    pub fn memory(&self) -> PhysicalMemory {
        PhysicalMemory::dram(self.frames.len() as u64 * 4096)
    }

    pub fn mapper(&mut self) -> OffsetPhysMapper {
        OffsetPhysMapper::for_buffer(self.frames.as_mut_ptr(), self.memory().base)
    }
}

/// Run bring-up over `mapper` with the kernel image ending at `image_end`
/// bytes into RAM.
pub fn boot(mapper: &OffsetPhysMapper, mem: PhysicalMemory, image_end: u64) -> (BootLayout, MemoryManager<'_, OffsetPhysMapper>) {
    let mut boot = BootAllocator::new(mapper, mem, PhysicalAddress::new(mem.base.as_u64() + image_end));
    let layout = vm_init(&mut boot, &[]).expect("vm_init");
    let mm = page_init(boot, &layout, mapper);
    (layout, mm)
}
