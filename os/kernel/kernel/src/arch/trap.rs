//! # Supervisor trap handling
//!
//! Only page faults are expected. They are resolved against the address
//! space currently installed in `satp`; anything else is fatal.

use super::WINDOW;
use crate::vm;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, VirtualAddress};
use kernel_vmem::AddressSpace;
use log::debug;
use riscv::register::stvec::{self, Stvec};
use riscv::register::{satp, sstatus};

const INSTRUCTION_PAGE_FAULT: usize = 12;
const LOAD_PAGE_FAULT: usize = 13;
const STORE_PAGE_FAULT: usize = 15;

core::arch::global_asm!(
    ".section .text",
    ".global trap_entry",
    ".align 2",
    "trap_entry:",
    "addi sp, sp, -128",
    "sd ra, 0(sp)",
    "sd t0, 8(sp)",
    "sd t1, 16(sp)",
    "sd t2, 24(sp)",
    "sd t3, 32(sp)",
    "sd t4, 40(sp)",
    "sd t5, 48(sp)",
    "sd t6, 56(sp)",
    "sd a0, 64(sp)",
    "sd a1, 72(sp)",
    "sd a2, 80(sp)",
    "sd a3, 88(sp)",
    "sd a4, 96(sp)",
    "sd a5, 104(sp)",
    "sd a6, 112(sp)",
    "sd a7, 120(sp)",
    "csrr a0, scause",
    "csrr a1, stval",
    "csrr a2, sepc",
    "call {handler}",
    "ld ra, 0(sp)",
    "ld t0, 8(sp)",
    "ld t1, 16(sp)",
    "ld t2, 24(sp)",
    "ld t3, 32(sp)",
    "ld t4, 40(sp)",
    "ld t5, 48(sp)",
    "ld t6, 56(sp)",
    "ld a0, 64(sp)",
    "ld a1, 72(sp)",
    "ld a2, 80(sp)",
    "ld a3, 88(sp)",
    "ld a4, 96(sp)",
    "ld a5, 104(sp)",
    "ld a6, 112(sp)",
    "ld a7, 120(sp)",
    "addi sp, sp, 128",
    "sret",
    handler = sym handle_trap,
);

unsafe extern "C" {
    fn trap_entry();
}

/// Install the trap vector and allow the kernel to touch user pages.
pub fn init() {
    let vector = Stvec::new(trap_entry as *const () as usize, stvec::TrapMode::Direct);
    // SAFETY: `trap_entry` is 4-byte aligned and preserves every register
    // the interrupted code may still need.
    unsafe {
        stvec::write(vector);
        sstatus::set_sum();
    }
}

/// The address space `satp` currently points at.
fn current_space() -> AddressSpace<'static, vm::KernelMapper> {
    let satp = satp::read();
    let root = PhysicalPage::containing(PhysicalAddress::from_ppn(satp.ppn() as u64));
    let asid = u16::try_from(satp.asid()).unwrap_or_default();
    AddressSpace::from_root(&WINDOW, root, asid)
}

extern "C" fn handle_trap(cause: usize, tval: usize, epc: usize) {
    match cause {
        INSTRUCTION_PAGE_FAULT | LOAD_PAGE_FAULT | STORE_PAGE_FAULT => {
            let va = VirtualAddress::new(tval as u64);
            match vm::handle_page_fault(&current_space(), va) {
                Ok(page) => debug!("page fault at {va} (sepc {epc:#x}) served by {page}"),
                Err(e) => panic!("unhandled page fault at {va} (sepc {epc:#x}): {e}"),
            }
        }
        _ => panic!("unexpected trap: scause {cause:#x}, stval {tval:#x}, sepc {epc:#x}"),
    }
}
