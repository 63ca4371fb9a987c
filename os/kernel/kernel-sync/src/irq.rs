use crate::{Mutex, MutexGuard, RawLock};

/// A mutex guard that also masks supervisor interrupts while held.
///
/// When created via [`Mutex::lock_irq`], it:
///
/// 1. saves `sstatus.SIE` and clears it, and
/// 2. acquires the underlying mutex,
///
/// releasing them in reverse order on drop. An interrupt handler can
/// therefore never observe the protected value half-updated, nor spin on a
/// lock held by the code it interrupted.
///
/// # Examples
///
/// ```
/// use kernel_sync::{SpinMutex, interrupts_enabled};
///
/// static M: SpinMutex<u64> = SpinMutex::new(0);
///
/// {
///     let mut g = M.lock_irq();
///     assert!(!interrupts_enabled());
///     *g += 1;
/// }
/// assert_eq!(*M.lock(), 1);
/// ```
pub struct IrqMutex<'a, T, R: RawLock> {
    // Field order matters: the lock is released before interrupts return.
    guard: MutexGuard<'a, T, R>,
    _irq: IrqGuard,
}

impl<T, R: RawLock> core::ops::Deref for IrqMutex<'_, T, R> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T, R: RawLock> core::ops::DerefMut for IrqMutex<'_, T, R> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T, R: RawLock> Mutex<T, R> {
    /// Acquires the mutex with interrupts masked for the guard's lifetime.
    #[inline]
    pub fn lock_irq(&self) -> IrqMutex<'_, T, R> {
        let irq = IrqGuard::new();
        let guard = self.lock();
        IrqMutex { guard, _irq: irq }
    }
}

/// Whether supervisor interrupts are currently enabled (`sstatus.SIE`).
#[inline]
#[must_use]
pub fn interrupts_enabled() -> bool {
    arch::sie()
}

/// Masks supervisor interrupts (clears `sstatus.SIE`).
#[inline]
pub fn disable_interrupts() {
    arch::clear_sie();
}

/// Unmasks supervisor interrupts (sets `sstatus.SIE`).
///
/// # Safety
/// A trap vector must be installed and every critical section the caller is
/// nested in must tolerate preemption from this point on.
#[inline]
pub unsafe fn enable_interrupts() {
    unsafe { arch::set_sie() }
}

/// RAII guard that masks interrupts on creation and restores them on drop.
///
/// `IrqGuard::new()` snapshots `sstatus.SIE`. If interrupts were enabled it
/// clears the bit; on drop the bit is set again **only** if it was set
/// before, so guards nest.
///
/// # Examples
///
/// ```
/// use kernel_sync::{IrqGuard, interrupts_enabled};
///
/// let before = interrupts_enabled();
/// {
///     let _outer = IrqGuard::new();
///     {
///         let _inner = IrqGuard::new();
///     }
///     assert!(!interrupts_enabled());
/// }
/// assert_eq!(interrupts_enabled(), before);
/// ```
pub struct IrqGuard {
    /// Whether interrupts were enabled (SIE=1) when the guard was created.
    were_enabled: bool,
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqGuard {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        let enabled = arch::sie();
        if enabled {
            arch::clear_sie();
        }
        Self {
            were_enabled: enabled,
        }
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        if self.were_enabled {
            unsafe { arch::set_sie() }
        }
    }
}

#[cfg(all(target_arch = "riscv64", target_os = "none"))]
mod arch {
    use riscv::register::sstatus;

    #[inline]
    pub fn sie() -> bool {
        sstatus::read().sie()
    }

    #[inline]
    pub fn clear_sie() {
        // SAFETY: masking interrupts can't break memory safety.
        unsafe { sstatus::clear_sie() }
    }

    #[inline]
    pub unsafe fn set_sie() {
        unsafe { sstatus::set_sie() }
    }
}

/// Hosted builds have no `sstatus`; the flag is simulated per thread so the
/// masking discipline stays observable in tests. It starts out enabled.
#[cfg(not(all(target_arch = "riscv64", target_os = "none")))]
mod arch {
    extern crate std;

    use core::cell::Cell;

    std::thread_local! {
        static SIE: Cell<bool> = const { Cell::new(true) };
    }

    #[inline]
    pub fn sie() -> bool {
        SIE.with(Cell::get)
    }

    #[inline]
    pub fn clear_sie() {
        SIE.with(|f| f.set(false));
    }

    #[inline]
    pub unsafe fn set_sie() {
        SIE.with(|f| f.set(true));
    }
}
