//! Invariant registry for runtime contract checks
//!
//! Production code states its invariants with `assert_invariant!`. A checked
//! invariant is recorded in a process-wide registry so contract tests can prove
//! it was exercised; a violated invariant is logged and recorded, never
//! panicked on, because most checks run on the camera worker thread.
//!
//! ```rust,ignore
//! use shutterbug::invariant_ppt::*;
//!
//! assert_invariant!(
//!     handle.is_some() == (state != CameraState::WaitingDeviceOpen),
//!     "Device handle present iff device is open",
//!     "machine"
//! );
//!
//! #[test]
//! fn contract_machine() {
//!     // drive the machine...
//!     contract_test("machine", &["Device handle present iff device is open"]);
//! }
//! ```

use std::collections::HashSet;
use std::sync::Mutex;

lazy_static::lazy_static! {
    static ref CHECKED: Mutex<HashSet<String>> = Mutex::new(HashSet::new());
    static ref VIOLATIONS: Mutex<Vec<String>> = Mutex::new(Vec::new());
}

/// Check an invariant and record it for contract testing.
#[macro_export]
macro_rules! assert_invariant {
    ($condition:expr, $message:expr) => {
        $crate::invariant_ppt::__assert_invariant_impl($condition, $message, None)
    };
    ($condition:expr, $message:expr, $context:expr) => {
        $crate::invariant_ppt::__assert_invariant_impl($condition, $message, Some($context))
    };
}

#[doc(hidden)]
pub fn __assert_invariant_impl(condition: bool, message: &str, context: Option<&str>) -> bool {
    CHECKED
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .insert(message.to_string());

    if !condition {
        let ctx = context.unwrap_or("unknown");
        log::error!("INVARIANT VIOLATION [{}]: {}", ctx, message);
        VIOLATIONS
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(format!("[{}] {}", ctx, message));
    }
    condition
}

/// Panics if any of `required_invariants` was never checked in this process.
pub fn contract_test(test_name: &str, required_invariants: &[&str]) {
    let checked = CHECKED.lock().unwrap_or_else(|e| e.into_inner()).clone();

    let missing: Vec<&str> = required_invariants
        .iter()
        .copied()
        .filter(|inv| !checked.contains(*inv))
        .collect();

    if !missing.is_empty() {
        panic!(
            "CONTRACT FAILURE [{}]: The following invariants were not checked:\n  - {}",
            test_name,
            missing.join("\n  - ")
        );
    }
}

/// Violations recorded so far, oldest first
pub fn violations() -> Vec<String> {
    VIOLATIONS.lock().unwrap_or_else(|e| e.into_inner()).clone()
}
