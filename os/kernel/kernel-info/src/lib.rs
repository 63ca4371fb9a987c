//! # Kernel Configuration and Boot Interface
//!
//! Memory layout constants shared by the kernel binary, its `build.rs`, and
//! the memory-management crates, plus the description of physical memory
//! handed from the boot probe to the page allocator.
//!
//! ## Virtual Memory Architecture
//!
//! Every Sv39 address space carries the same fixed regions:
//!
//! ```text
//! 0x0000_0000_0000_0000 ┌─────────────────────────────────┐
//!                       │         (unmapped)              │
//! USER_FLOOR            ├─────────────────────────────────┤ 0x0001_0000
//!                       │         User Space              │
//! UTOP = UENVS          ├─────────────────────────────────┤ 0x7f40_0000
//!                       │   Environment table (RO)        │
//! UPAGES                ├─────────────────────────────────┤ 0x7f80_0000
//!                       │   Page descriptors (RO)         │
//! UVPT                  ├─────────────────────────────────┤ 0x7fc0_0000
//!                       │   Page tables (RO)              │
//! ULIM = DRAM_BASE      ├─────────────────────────────────┤ 0x8000_0000
//!                       │   Kernel image (identity)       │
//!                       │   KERNEL_LOAD = 0x8020_0000     │
//!                       └─────────────────────────────────┘
//! WINDOW_BASE           ┌─────────────────────────────────┐ 0xffff_ffc0_0000_0000
//!                       │   Self-mapping window (1 GiB)   │
//!                       └─────────────────────────────────┘
//! ```
//!
//! * **Split Address**: [`UTOP`](memory::UTOP) bounds every user-triggered mapping.
//! * **Identity Kernel**: the kernel runs where OpenSBI loaded it.
//! * **Window**: frame `pa` is reachable at `WINDOW_BASE + (pa - DRAM_BASE)`
//!   once it has been windowed.
//!
//! ## Build Script Integration
//! ```rust
//! use kernel_info::memory::KERNEL_LOAD;
//!
//! println!("cargo:rustc-link-arg=--defsym=KERNEL_LOAD={:#x}", KERNEL_LOAD);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod memory;
