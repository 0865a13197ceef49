//! Diagnostics sink
//!
//! Every component reports faults here instead of unwinding the caller's stack.
//! Most faults originate on the camera worker, where nobody is waiting on a
//! `Result`, so the sink is the only channel that always reaches the caller.
//!
//! Severity contract:
//! - `error`: the session should be considered broken or a request was abandoned
//! - `warning`: recoverable oddity, state preserved, operation skipped
//! - `info`: queue and state transitions

use crate::errors::CameraError;

pub trait DiagnosticsSink: Send + Sync {
    fn error(&self, message: &str, cause: Option<&CameraError>);
    fn warning(&self, message: &str);
    fn info(&self, message: &str);
}

/// Forwards diagnostics to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDiagnostics;

impl DiagnosticsSink for LogDiagnostics {
    fn error(&self, message: &str, cause: Option<&CameraError>) {
        match cause {
            Some(cause) => log::error!(target: "shutterbug", "{}: {}", message, cause),
            None => log::error!(target: "shutterbug", "{}", message),
        }
    }

    fn warning(&self, message: &str) {
        log::warn!(target: "shutterbug", "{}", message);
    }

    fn info(&self, message: &str) {
        log::info!(target: "shutterbug", "{}", message);
    }
}
