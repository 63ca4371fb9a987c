//! # Kernel synchronization primitives
//!
//! The memory manager runs on a single hart, so the only concurrency it has
//! to survive is an interrupt arriving in the middle of a table edit.
//! [`IrqGuard`] masks supervisor interrupts for a scope and restores the
//! previous state on every exit path; [`SpinMutex`] guards the process-wide
//! singletons and [`Mutex::lock_irq`] combines the two.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod irq;
mod mutex;
mod raw_spin;

pub use irq::{IrqGuard, IrqMutex, disable_interrupts, enable_interrupts, interrupts_enabled};
pub use mutex::{Mutex, MutexGuard};
pub use raw_spin::RawSpin;

pub type SpinMutex<T> = Mutex<T, RawSpin>;

impl<T> SpinMutex<T> {
    pub const fn new(value: T) -> Self {
        Self::from_raw(RawSpin::new(), value)
    }
}

/// A lock word without data attached, as wrapped by [`Mutex`].
pub trait RawLock {
    /// Spin until the lock is taken.
    fn acquire(&self);

    /// Take the lock if it is free.
    fn try_acquire(&self) -> bool;

    /// # Safety
    /// The caller must hold the lock.
    unsafe fn release(&self);
}
