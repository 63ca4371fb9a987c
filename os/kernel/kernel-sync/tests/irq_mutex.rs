use kernel_sync::{IrqGuard, SpinMutex, disable_interrupts, enable_interrupts, interrupts_enabled};
use std::sync::Arc;
use std::thread;

#[test]
fn guard_masks_and_restores() {
    assert!(interrupts_enabled());
    {
        let _g = IrqGuard::new();
        assert!(!interrupts_enabled());
    }
    assert!(interrupts_enabled());
}

#[test]
fn guard_leaves_masked_state_alone() {
    disable_interrupts();
    {
        let _g = IrqGuard::new();
        assert!(!interrupts_enabled());
    }
    // was masked before, must stay masked
    assert!(!interrupts_enabled());
    unsafe { enable_interrupts() };
}

#[test]
fn guard_restores_on_early_return() {
    fn fails() -> Result<(), &'static str> {
        let _g = IrqGuard::new();
        Err::<(), _>("out of memory")?;
        Ok(())
    }

    assert!(fails().is_err());
    assert!(interrupts_enabled());
}

#[test]
fn lock_irq_masks_for_guard_lifetime() {
    let m = SpinMutex::new(0_u32);
    {
        let mut g = m.lock_irq();
        *g = 7;
        assert!(!interrupts_enabled());
        assert!(m.try_lock().is_none());
    }
    assert!(interrupts_enabled());
    assert_eq!(*m.lock(), 7);
}

#[test]
fn try_lock_semantics() {
    let m = SpinMutex::new(1_u8);

    let g1 = m.try_lock();
    assert!(g1.is_some());
    assert!(m.try_lock().is_none());

    drop(g1);
    assert!(m.try_lock().is_some());
}

#[test]
fn with_lock_unlocks() {
    let m = SpinMutex::new(vec![1, 2]);
    let len = m.with_lock(|v| {
        v.push(3);
        v.len()
    });
    assert_eq!(len, 3);
    assert!(m.try_lock().is_some());
}

#[test]
fn contended_increments_are_not_lost() {
    let m = Arc::new(SpinMutex::new(0_usize));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let m = Arc::clone(&m);
            thread::spawn(move || {
                for _ in 0..1000 {
                    *m.lock_irq() += 1;
                }
            })
        })
        .collect();
    for h in handles {
        h.join().expect("worker panicked");
    }
    assert_eq!(*m.lock(), 4000);
}
