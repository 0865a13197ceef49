use thiserror::Error;

/// Coarse classification of a [`CameraError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Illegal argument, double bind, or a call that is not valid in the current state
    Precondition,
    /// Open/access/configure failure reported by the hardware layer
    Device,
    /// The exclusive open/close lock could not be acquired in time
    LockTimeout,
    /// A bounded buffer is full
    ResourceExhausted,
    /// Configuration could not be read or is invalid
    Config,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("Precondition violation: {0}")]
    PreconditionViolation(String),
    #[error("Handler {handler} is already bound to controller {bound_to}")]
    HandlerAlreadyBound { handler: u64, bound_to: u64 },
    #[error("Device fault: {0}")]
    DeviceFault(String),
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("Timed out after {waited_ms}ms waiting for the camera open/close lock")]
    LockTimeout { waited_ms: u64 },
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),
    #[error("Frame queue full ({depth} frames outstanding)")]
    QueueFull { depth: usize },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(String),
}

impl CameraError {
    pub fn precondition(message: impl Into<String>) -> Self {
        CameraError::PreconditionViolation(message.into())
    }

    pub fn device(message: impl Into<String>) -> Self {
        CameraError::DeviceFault(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CameraError::PreconditionViolation(_) | CameraError::HandlerAlreadyBound { .. } => {
                ErrorKind::Precondition
            }
            CameraError::DeviceFault(_) | CameraError::DeviceUnavailable(_) => ErrorKind::Device,
            CameraError::LockTimeout { .. } => ErrorKind::LockTimeout,
            CameraError::ResourceExhausted(_) | CameraError::QueueFull { .. } => {
                ErrorKind::ResourceExhausted
            }
            CameraError::Config(_) | CameraError::Io(_) => ErrorKind::Config,
        }
    }
}

impl From<std::io::Error> for CameraError {
    fn from(e: std::io::Error) -> Self {
        CameraError::Io(e.to_string())
    }
}
