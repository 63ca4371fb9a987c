//! # Kernel Entry Point
//!
//! On the QEMU `virt` machine the kernel is entered from OpenSBI through
//! [`arch`]. Hosted builds run the same memory bring-up over a simulated
//! RAM image, which is how the boot path is exercised on a development
//! machine.

#![cfg_attr(target_os = "none", no_std, no_main)]
#![allow(unsafe_code)]

#[cfg(all(target_arch = "riscv64", target_os = "none"))]
mod arch;
#[cfg(not(target_os = "none"))]
mod hosted;
mod image;
mod init;
mod memory;
mod vm;

#[cfg(not(target_os = "none"))]
fn main() {
    if let Err(e) = hosted::run() {
        log::error!("bring-up failed: {e}");
        std::process::exit(1);
    }
}
