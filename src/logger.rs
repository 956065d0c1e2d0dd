/*
 * Kernel Logging (ambient, spec §7 error-handling support)
 *
 * Grounded in the teacher's `utils/debug/logger.rs` `CluuLogger` — same
 * `log::Log` shape, same "print at Info and above" policy — but writing
 * straight to `drivers::serial::COM2` instead of going through the
 * teacher's `utils::writer::Writer` (which wrapped an `arch::x86_64`
 * peripheral this kernel no longer has).
 */

use core::fmt::Write;

use log::{Level, LevelFilter, Metadata, Record};

use crate::drivers::serial::COM2;

struct SerialLogger;

impl log::Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let _ = writeln!(COM2.lock(), "[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: SerialLogger = SerialLogger;

/// Brings up COM2 and installs the global logger. Must run before any
/// other module logs (everything after `arch::x86::gdt::init` in the
/// boot sequence assumes this has already happened).
pub fn init() {
    crate::drivers::serial::init_debug_port();
    log::set_logger(&LOGGER)
        .map(|()| log::set_max_level(LevelFilter::Info))
        .expect("logger installed twice");
}
