use crate::RawLock;
use core::hint::spin_loop;
use core::sync::atomic::{AtomicBool, Ordering};

/// Test-and-test-and-set spin lock word.
///
/// On the single boot hart contention only arises from an interrupt handler
/// touching a lock its own hart holds, which [`Mutex::lock_irq`](crate::Mutex::lock_irq)
/// rules out.
pub struct RawSpin {
    held: AtomicBool,
}

impl Default for RawSpin {
    fn default() -> Self {
        Self::new()
    }
}

impl RawSpin {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }
}

impl RawLock for RawSpin {
    #[inline]
    fn acquire(&self) {
        while self.held.swap(true, Ordering::Acquire) {
            while self.held.load(Ordering::Relaxed) {
                spin_loop();
            }
        }
    }

    #[inline]
    fn try_acquire(&self) -> bool {
        !self.held.swap(true, Ordering::Acquire)
    }

    #[inline]
    unsafe fn release(&self) {
        self.held.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_held_word_cannot_be_taken_twice() {
        let word = RawSpin::new();
        word.acquire();
        assert!(!word.try_acquire());
        unsafe { word.release() };
        assert!(word.try_acquire());
    }
}
