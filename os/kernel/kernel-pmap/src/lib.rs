//! # Physical Memory Management
//!
//! This crate tracks every physical frame of RAM, hands frames out and takes
//! them back, and maps them into Sv39 address spaces with reference counts
//! that follow the mappings. It also contains the bring-up sequence that
//! builds the kernel address space before the allocator exists.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │   user / fault            syscall and trap wrappers │
//! │    • UTOP boundary, permission sanitizing           │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │   MemoryManager           page lifecycle            │
//! │    • alloc / free / decref                          │
//! │    • insert / lookup / remove / map_segment         │
//! └─────────────────┬───────────────────────────────────┘
//!                   │  FrameAlloc, PhysMapper
//! ┌─────────────────▼───────────────────────────────────┐
//! │   kernel-vmem             Sv39 walker, TLB          │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Bring-up
//!
//! 1. [`BootAllocator`] bumps through RAM past the kernel image.
//! 2. [`vm_init::vm_init`] builds the kernel tables, the descriptor arena,
//!    the environment table and the self-mapping window with it.
//! 3. Paging is switched on; from here the kernel reaches frames through
//!    [`WindowMapper`].
//! 4. [`vm_init::page_init`] consumes the bootstrap allocator and returns
//!    the [`MemoryManager`].
//! 5. [`check`] runs the boot self-checks.
//!
//! ## Error Handling
//!
//! Out-of-memory and bad arguments are returned as [`MmError`]. Reference
//! count underflow, double frees and bootstrap exhaustion panic.
//!
//! ## Safety Considerations
//!
//! Frames are only dereferenced through a [`PhysMapper`](kernel_vmem::PhysMapper)
//! after they were windowed. Page tables stay windowed for as long as they
//! are installed; data pages are windowed only while the manager touches
//! them.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod boot_alloc;
pub mod check;
mod error;
pub mod fault;
pub mod free_list;
pub mod page_info;
pub mod phys_mapper;
pub mod pmap;
pub mod user;
pub mod vm_init;

#[cfg(test)]
pub(crate) mod testing;

pub use crate::boot_alloc::BootAllocator;
pub use crate::error::MmError;
pub use crate::page_info::{PageId, PageInfo};
pub use crate::phys_mapper::{OffsetPhysMapper, WindowMapper};
pub use crate::pmap::MemoryManager;
