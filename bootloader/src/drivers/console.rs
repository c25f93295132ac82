//! UEFI console logger
//!
//! Routes `log` records to the firmware text consoles: errors to the error
//! stream, everything else to standard output. The console is a boot service,
//! so the logger is muted before boot services are exited.

use core::fmt::Write;
use core::sync::atomic::{AtomicBool, Ordering};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use uefi::system;

pub struct ConsoleLogger {
    muted: AtomicBool,
}

static LOGGER: ConsoleLogger = ConsoleLogger {
    muted: AtomicBool::new(false),
};

impl ConsoleLogger {
    /// Install the console logger as the global `log` backend
    pub fn init(level: LevelFilter) -> Result<&'static Self, SetLoggerError> {
        log::set_logger(&LOGGER)?;
        log::set_max_level(level);
        Ok(&LOGGER)
    }

    /// Stop touching the console. Called right before boot services are
    /// exited.
    pub fn mute() {
        LOGGER.muted.store(true, Ordering::SeqCst);
    }

    /// Undo [`ConsoleLogger::mute`] when the exit attempt failed and the
    /// console is still there.
    pub fn resume() {
        LOGGER.muted.store(false, Ordering::SeqCst);
    }
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        !self.muted.load(Ordering::SeqCst) && metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let level = record.level();
        let args = record.args();
        if level == Level::Error {
            system::with_stderr(|err| {
                let _ = writeln!(err, "[{}] {}", level, args);
            });
        } else {
            system::with_stdout(|out| {
                let _ = writeln!(out, "[{}] {}", level, args);
            });
        }
    }

    fn flush(&self) {}
}

/// Clear standard output. Failure is not fatal to the boot.
pub fn clear_screen() {
    if let Err(e) = system::with_stdout(|out| out.clear()) {
        log::warn!("failed to clear the console: {:?}", e.status());
    }
}
