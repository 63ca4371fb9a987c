use crate::qemu_fmt::qemu_write;
use core::fmt;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// `log` backend writing `[LEVEL] target: message` lines to the debug
/// console.
pub struct QemuLogger {
    max_level: LevelFilter,
}

/// The installed logger. Filtering goes through [`log::max_level`], so the
/// instance itself carries no state.
static LOGGER: Sink = Sink;

struct Sink;

impl QemuLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self { max_level }
    }

    /// Install the logger. Call once during early init.
    ///
    /// # Errors
    /// If a logger was already installed.
    pub fn init(self) -> Result<(), SetLoggerError> {
        log::set_logger(&LOGGER)?;
        log::set_max_level(self.max_level);
        Ok(())
    }
}

impl Log for Sink {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            qemu_write(format_args!("{}", Line(record)));
        }
    }

    fn flush(&self) {}
}

/// One formatted log line, including the trailing newline.
struct Line<'a, 'r>(&'a Record<'r>);

impl fmt::Display for Line<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record = self.0;
        writeln!(f, "[{}] {}: {}", record.level(), record.target(), record.args())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write;
    use log::Level;

    #[test]
    fn lines_carry_level_and_target() {
        let free = 15872;
        let mut out = String::new();
        write!(
            out,
            "{}",
            Line(
                &Record::builder()
                    .level(Level::Info)
                    .target("kernel_pmap::vm_init")
                    .args(format_args!("{free} pages free"))
                    .build()
            )
        )
        .expect("formatting into a String");
        assert_eq!(out, "[INFO] kernel_pmap::vm_init: 15872 pages free\n");
    }

    #[test]
    fn second_install_is_rejected() {
        let _ = QemuLogger::new(LevelFilter::Warn).init();
        assert!(QemuLogger::new(LevelFilter::Trace).init().is_err());
    }
}
