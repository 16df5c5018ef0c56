// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Logging via the `log` crate facade.

use core::fmt::{Arguments, Write};
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::{Once, mutex::SpinMutex};

/// True if the build is configured with debug assertions on.
const DEBUG: bool = cfg!(debug_assertions);

/// The log sink type used by this build.
#[cfg(not(test))]
pub type LogSinkImpl = LockedWriter<arm_pl011_uart::Uart<'static>>;

/// The log sink type used by this build.
#[cfg(test)]
pub type LogSinkImpl = StdOutSink;

static LOGGER: Once<Logger> = Once::new();

struct Logger {
    sink: LogSinkImpl,
}

impl Log for Logger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        writeln!(self.sink, "{}: {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

/// Initialises the logger with the given sink.
pub fn init(sink: LogSinkImpl) -> Result<(), SetLoggerError> {
    let logger = LOGGER.call_once(|| Logger { sink });
    log::set_logger(logger)?;
    log::set_max_level(build_time_log_level());
    Ok(())
}

/// Gets a reference to the log sink, if it has been set.
#[allow(unused)]
pub fn get_log_sink() -> Option<&'static LogSinkImpl> {
    LOGGER.get().map(|logger| &logger.sink)
}

/// Returns the logging [`LevelFilter`] set by the build-time environment
/// variable `LOG_LEVEL`. `LOG_LEVEL` can have the lower-case string values
/// "off", "error", "warn", "info", "debug", or "trace", corresponding to the
/// named values of [`LevelFilter`]. If `LOG_LEVEL` is absent or has some other
/// value, this function returns `LevelFilter::Debug` for debug builds,
/// otherwise `LevelFilter::Info`.
pub const fn build_time_log_level() -> LevelFilter {
    let level = match option_env!("LOG_LEVEL") {
        Some(level) => level,
        None => "",
    };
    match level.as_bytes() {
        b"off" => LevelFilter::Off,
        b"error" => LevelFilter::Error,
        b"warn" => LevelFilter::Warn,
        b"info" => LevelFilter::Info,
        b"debug" => LevelFilter::Debug,
        b"trace" => LevelFilter::Trace,
        _ => {
            if DEBUG {
                LevelFilter::Debug
            } else {
                LevelFilter::Info
            }
        }
    }
}

/// Something to which logs can be sent.
///
/// Note that unlike `core::fmt::Write`, the `write_fmt` method on this trait
/// takes `&self` rather than `&mut self`. This means that the implementation
/// is responsible for handling locking if necessary, or can be made
/// lock-free.
pub trait LogSink {
    /// Writes the given format arguments to the log sink.
    fn write_fmt(&self, args: Arguments);
}

/// An implementation of `LogSink` that wraps around any implementation of
/// `core::fmt::Write`.
///
/// This wraps the given writer in a spin mutex, to allow a single instance to
/// be used safely from multiple cores. This also ensures that a complete log
/// line is written at once, rather than being interleaved with characters
/// from another core.
pub struct LockedWriter<W: Write> {
    writer: SpinMutex<W>,
}

impl<W: Write> LockedWriter<W> {
    /// Creates a new `LockedWriter` wrapping the given [`Write`]
    /// implementation.
    #[allow(unused)]
    pub const fn new(writer: W) -> Self {
        Self {
            writer: SpinMutex::new(writer),
        }
    }
}

impl<W: Write> LogSink for LockedWriter<W> {
    fn write_fmt(&self, args: Arguments) {
        // Ignore errors.
        let _ = self.writer.lock().write_fmt(args);
    }
}

/// A log sink for tests which writes logs to standard output.
#[cfg(test)]
pub struct StdOutSink;

#[cfg(test)]
impl LogSink for StdOutSink {
    fn write_fmt(&self, args: Arguments) {
        use std::io::Write;

        std::io::stdout().write_fmt(args).unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_logging() {
        let writer = StdOutSink;
        writeln!(writer, "hello");
    }
}
