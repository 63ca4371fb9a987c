//! # QEMU Debug Output
//!
//! Logging and raw trace output for the kernel while it runs on the QEMU
//! `virt` machine. Output goes to the NS16550 UART that QEMU wires to the
//! serial console (`-serial stdio`, or `-nographic`). Hosted builds write
//! to standard error instead, so the same bring-up code can be run and
//! tested on a development machine.
//!
//! ```text
//! log::info!()          qemu_trace!()
//!      │                     │
//! QemuLogger ──────────► qemu_write(fmt::Arguments)
//!                            │
//!                  ┌─────────┴─────────┐
//!             NS16550 THR          stderr (host)
//!             0x1000_0000
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use kernel_qemu::QemuLogger;
//! use log::LevelFilter;
//!
//! QemuLogger::new(LevelFilter::Debug).init().expect("logger installed once");
//! log::info!("memory manager ready");
//! ```
//!
//! [`qemu_trace!`] bypasses the logger and is meant for places where the
//! logger may not be usable, such as the panic handler:
//!
//! ```rust
//! kernel_qemu::qemu_trace!("hart {} parked\n", 0);
//! ```
//!
//! ## Features
//!
//! * `enabled` (default): output is written. Without it every write is a
//!   no-op and the UART is never touched.
//!
//! ## Safety
//!
//! The UART registers are accessed at their physical address. The kernel
//! keeps that page identity-mapped once paging is on.

#![cfg_attr(target_os = "none", no_std)]
#![allow(unsafe_code)]

mod logger;

pub use logger::QemuLogger;

#[cfg(feature = "enabled")]
#[doc(hidden)]
pub mod qemu_fmt {
    use core::fmt::{self, Write};

    #[cfg(target_os = "none")]
    mod uart {
        /// MMIO base of the first NS16550 on the QEMU `virt` machine.
        pub const UART0_BASE: usize = 0x1000_0000;

        const THR: usize = 0;
        const LSR: usize = 5;
        const LSR_THR_EMPTY: u8 = 1 << 5;

        /// Write a single byte, spinning until the transmitter has room.
        #[inline]
        pub fn putc(c: u8) {
            let base = UART0_BASE as *mut u8;
            // SAFETY: the UART page is identity-mapped, and device registers
            // are only touched through volatile accesses.
            unsafe {
                while base.add(LSR).read_volatile() & LSR_THR_EMPTY == 0 {
                    core::hint::spin_loop();
                }
                base.add(THR).write_volatile(c);
            }
        }
    }

    /// Byte sink for the debug console.
    pub struct QemuSink;

    impl Write for QemuSink {
        #[cfg(target_os = "none")]
        #[inline]
        fn write_str(&mut self, s: &str) -> fmt::Result {
            for b in s.bytes() {
                if b == b'\n' {
                    uart::putc(b'\r');
                }
                uart::putc(b);
            }
            Ok(())
        }

        #[cfg(not(target_os = "none"))]
        fn write_str(&mut self, s: &str) -> fmt::Result {
            use std::io::Write as _;
            std::io::stderr()
                .lock()
                .write_all(s.as_bytes())
                .map_err(|_| fmt::Error)
        }
    }

    #[inline]
    pub fn qemu_write(args: fmt::Arguments) {
        // Best effort; there is nowhere to report a failed debug write.
        let _ = fmt::write(&mut QemuSink, args);
    }
}

#[cfg(not(feature = "enabled"))]
#[doc(hidden)]
pub mod qemu_fmt {
    use core::fmt;

    #[inline(always)]
    #[allow(clippy::inline_always)]
    pub const fn qemu_write(_: fmt::Arguments) {}
}

/// Formatted output straight to the debug console, without going through
/// the `log` facade.
#[macro_export]
macro_rules! qemu_trace {
    ($($arg:tt)*) => {{
        $crate::qemu_fmt::qemu_write(core::format_args!($($arg)*));
    }};
}
