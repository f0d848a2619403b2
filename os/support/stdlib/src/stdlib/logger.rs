//! `log` backend for userland programs.
//!
//! Records are written as `[LEVEL] target: message` lines through the
//! debug-byte syscall. The logger keeps no state and never allocates, which
//! lets the heap log from inside its critical section.

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

pub struct SyscallLogger;

static LOGGER: SyscallLogger = SyscallLogger;

impl SyscallLogger {
    /// Install the logger and set the global level filter.
    ///
    /// Call once early in `_start`.
    ///
    /// # Errors
    /// Fails if another logger was installed before.
    pub fn init(max_level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_logger(&LOGGER)?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl Log for SyscallLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        crate::println!(
            "[{}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod test {
    use super::*;
    use log::Level;

    #[test]
    fn filters_on_the_global_level() {
        log::set_max_level(LevelFilter::Warn);
        let at = |level| Metadata::builder().level(level).target("heap").build();

        assert!(SyscallLogger.enabled(&at(Level::Error)));
        assert!(SyscallLogger.enabled(&at(Level::Warn)));
        assert!(!SyscallLogger.enabled(&at(Level::Debug)));
    }
}
