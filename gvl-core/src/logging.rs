use std::sync::Arc;

use crate::config::Severity;

/// The host-supplied log callback from the device-create configuration
/// structure (§6).
pub type LogCallback = Arc<dyn Fn(Severity, &str) + Send + Sync>;

fn severity_from_level(level: log::Level) -> Severity {
    match level {
        log::Level::Error => Severity::Error,
        log::Level::Warn => Severity::Warning,
        log::Level::Info => Severity::Info,
        log::Level::Debug => Severity::Debug,
        log::Level::Trace => Severity::Trace,
    }
}

/// Bridges the `log` facade (used throughout the workspace, per the teacher
/// crates) to the layer's own callback-based configuration, so a host can
/// either install this as its `log::Log` sink or just pass a callback.
pub struct LogBridge {
    mask: Severity,
    callback: LogCallback,
}

impl LogBridge {
    pub fn new(mask: Severity, callback: LogCallback) -> Self {
        Self { mask, callback }
    }
}

impl log::Log for LogBridge {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        severity_from_level(metadata.level()) >= self.mask
    }

    fn log(&self, record: &log::Record) {
        let severity = severity_from_level(record.level());
        if severity < self.mask {
            return;
        }
        (self.callback)(severity, &format!("{}", record.args()));
    }

    fn flush(&self) {}
}
