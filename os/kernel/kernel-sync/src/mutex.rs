use crate::RawLock;
use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};

/// A value guarded by a raw lock word `R`.
pub struct Mutex<T, R> {
    raw: R,
    cell: UnsafeCell<T>,
}

// SAFETY: the value is only reachable through a guard, which exists while
// `raw` is held.
unsafe impl<T: Send, R: Sync> Sync for Mutex<T, R> {}
unsafe impl<T: Send, R: Send> Send for Mutex<T, R> {}

impl<T, R> Mutex<T, R> {
    pub const fn from_raw(raw: R, value: T) -> Self {
        Self {
            raw,
            cell: UnsafeCell::new(value),
        }
    }
}

impl<T, R: RawLock> Mutex<T, R> {
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, T, R> {
        self.raw.acquire();
        MutexGuard { mutex: self }
    }

    #[inline]
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T, R>> {
        self.raw.try_acquire().then(|| MutexGuard { mutex: self })
    }

    /// Run `f` with the lock held.
    #[inline]
    pub fn with_lock<U>(&self, f: impl FnOnce(&mut T) -> U) -> U {
        f(&mut self.lock())
    }
}

/// Exclusive access to the value of a [`Mutex`]; releases the lock on drop.
pub struct MutexGuard<'a, T, R: RawLock> {
    mutex: &'a Mutex<T, R>,
}

impl<T, R: RawLock> Deref for MutexGuard<'_, T, R> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard proves the lock is held.
        unsafe { &*self.mutex.cell.get() }
    }
}

impl<T, R: RawLock> DerefMut for MutexGuard<'_, T, R> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard proves the lock is held exclusively.
        unsafe { &mut *self.mutex.cell.get() }
    }
}

impl<T, R: RawLock> Drop for MutexGuard<'_, T, R> {
    fn drop(&mut self) {
        // SAFETY: a guard exists only while the lock is held.
        unsafe { self.mutex.raw.release() }
    }
}
