//! Build event reporting.
//!
//! The engine never depends on how build logs are stored. It emits
//! [`EventRecord`]s through an [`EventLogger`] supplied by the caller.

use std::sync::Arc;

/// Step tag for clone/pull start messages.
pub const STEP_CLONE: &str = "clone_code";

/// Step tag for transport progress lines.
pub const STEP_PROGRESS: &str = "progress";

/// Step tag for terminal failure messages.
pub const STEP_CALLBACK: &str = "callback";

/// Status tag attached to failures.
pub const STATUS_FAILURE: &str = "failure";

/// Severity of a build event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operator-relevant milestone.
    Info,
    /// High-volume detail such as progress lines.
    Debug,
    /// Failure.
    Error,
}

/// One record emitted to the build log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// Severity.
    pub severity: Severity,
    /// Human-readable message.
    pub message: String,
    /// Pipeline step tag.
    pub step: String,
    /// Optional status tag.
    pub status: Option<String>,
}

impl EventRecord {
    /// Creates a record without status.
    pub fn new(severity: Severity, message: impl Into<String>, step: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            step: step.into(),
            status: None,
        }
    }

    /// Attaches a status tag.
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

/// Sink for build events.
pub trait EventLogger: Send + Sync {
    /// Records one event.
    fn record(&self, event: EventRecord);
}

/// Shared, optional logger handle as held by the engine.
pub type SharedLogger = Option<Arc<dyn EventLogger>>;

pub(crate) fn emit(logger: &SharedLogger, event: EventRecord) {
    if let Some(logger) = logger {
        logger.record(event);
    }
}

pub(crate) fn emit_failure(logger: &SharedLogger, message: impl Into<String>) {
    emit(
        logger,
        EventRecord::new(Severity::Error, message, STEP_CALLBACK).with_status(STATUS_FAILURE),
    );
}

/// Logger forwarding build events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl EventLogger for TracingLogger {
    fn record(&self, event: EventRecord) {
        let status = event.status.as_deref().unwrap_or("");
        match event.severity {
            Severity::Info => tracing::info!(step = %event.step, status, "{}", event.message),
            Severity::Debug => tracing::debug!(step = %event.step, status, "{}", event.message),
            Severity::Error => tracing::error!(step = %event.step, status, "{}", event.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct Collect(Mutex<Vec<EventRecord>>);

    impl EventLogger for Collect {
        fn record(&self, event: EventRecord) {
            self.0.lock().push(event);
        }
    }

    #[test]
    fn test_emit_failure_tags() {
        let collect = Arc::new(Collect::default());
        let logger: SharedLogger = Some(collect.clone());

        emit_failure(&logger, "boom");

        let events = collect.0.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].severity, Severity::Error);
        assert_eq!(events[0].step, STEP_CALLBACK);
        assert_eq!(events[0].status.as_deref(), Some(STATUS_FAILURE));
    }

    #[test]
    fn test_emit_without_logger_is_noop() {
        emit(&None, EventRecord::new(Severity::Info, "hello", STEP_CLONE));
    }
}
