use kernel_info::memory;
use std::{env, path::PathBuf};

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("set by cargo"));
    let ld = manifest_dir.join("kernel.ld");

    let kernel_load = memory::KERNEL_LOAD;
    assert_eq!(
        kernel_load & ((1u64 << 21) - 1),
        0,
        "KERNEL_LOAD must be 2 MiB aligned (got {kernel_load:#x})"
    );
    assert!(
        kernel_load >= memory::DRAM_BASE && kernel_load - memory::DRAM_BASE < memory::DEFAULT_MEMORY_SIZE,
        "KERNEL_LOAD must lie inside the default RAM size (got {kernel_load:#x})"
    );

    println!("cargo:rerun-if-changed={}", ld.display());
    println!("cargo:rerun-if-changed=build.rs");

    // Hosted builds link as an ordinary executable.
    if env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("none") {
        return;
    }

    println!("cargo:rustc-link-arg-bins=-T{}", ld.display());
    println!("cargo:rustc-link-arg-bins=--defsym=KERNEL_LOAD={kernel_load:#x}");
    println!(
        "cargo:rustc-link-arg-bins=--defsym=KERNEL_STACK_SIZE={:#x}",
        memory::KERNEL_STACK_SIZE
    );
}
