use crate::platform::{AePrecaptureTrigger, AfTrigger, NativeRequest};
use crate::still::StillHandler;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Opaque adjustment applied to a native request before it is submitted.
#[derive(Clone)]
pub struct RequestConfig {
    apply: Option<Arc<dyn Fn(&mut NativeRequest) + Send + Sync>>,
}

impl RequestConfig {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut NativeRequest) + Send + Sync + 'static,
    {
        Self {
            apply: Some(Arc::new(f)),
        }
    }

    /// Leaves the request as built
    pub fn none() -> Self {
        Self { apply: None }
    }

    /// Starts the auto-exposure precapture sequence
    pub fn precapture_trigger() -> Self {
        Self::new(|req| {
            req.ae_precapture_trigger = AePrecaptureTrigger::Start;
            req.af_trigger = AfTrigger::Idle;
        })
    }

    /// Stamps `key = value` into the request extras; devices that support
    /// tagging copy it into the resulting image metadata.
    pub fn tagged(key: impl Into<String>, value: i64) -> Self {
        let key = key.into();
        Self::new(move |req| {
            req.extras.insert(key.clone(), value);
        })
    }

    /// Apply `self`, then `next`
    pub fn then(self, next: RequestConfig) -> Self {
        match (self.apply, next.apply) {
            (None, next) => Self { apply: next },
            (first, None) => Self { apply: first },
            (Some(a), Some(b)) => Self::new(move |req| {
                a(req);
                b(req);
            }),
        }
    }

    pub fn apply(&self, request: &mut NativeRequest) {
        if let Some(f) = &self.apply {
            f(request);
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self::none()
    }
}

impl fmt::Debug for RequestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.apply {
            Some(_) => write!(f, "RequestConfig(<fn>)"),
            None => write!(f, "RequestConfig(none)"),
        }
    }
}

/// One queued still capture. Consumed exactly once by the state machine.
#[derive(Debug)]
pub struct CaptureRequest {
    sequence: u64,
    target: StillHandler,
    precapture_config: Option<RequestConfig>,
    capture_config: RequestConfig,
}

impl CaptureRequest {
    pub fn new(
        target: StillHandler,
        precapture_config: Option<RequestConfig>,
        capture_config: RequestConfig,
    ) -> Self {
        Self {
            sequence: NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed),
            target,
            precapture_config,
            capture_config,
        }
    }

    /// Process-wide increasing number, used in diagnostics
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn target(&self) -> &StillHandler {
        &self.target
    }

    pub fn precapture_config(&self) -> Option<&RequestConfig> {
        self.precapture_config.as_ref()
    }

    pub fn capture_config(&self) -> &RequestConfig {
        &self.capture_config
    }
}
