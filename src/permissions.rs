use crate::errors::CameraError;

/// Permission status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PermissionStatus {
    /// Permission granted
    Granted,
    /// Permission denied
    Denied,
    /// Permission not determined (user hasn't been asked yet)
    NotDetermined,
    /// Permission restricted (parental controls, etc)
    Restricted,
}

impl std::fmt::Display for PermissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionStatus::Granted => write!(f, "granted"),
            PermissionStatus::Denied => write!(f, "denied"),
            PermissionStatus::NotDetermined => write!(f, "not_determined"),
            PermissionStatus::Restricted => write!(f, "restricted"),
        }
    }
}

/// Detailed permission information as reported by a device manager
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PermissionInfo {
    pub status: PermissionStatus,
    pub message: String,
    pub can_request: bool,
}

impl PermissionInfo {
    pub fn granted() -> Self {
        Self {
            status: PermissionStatus::Granted,
            message: "Camera access granted".to_string(),
            can_request: false,
        }
    }

    pub fn denied(message: impl Into<String>) -> Self {
        Self {
            status: PermissionStatus::Denied,
            message: message.into(),
            can_request: true,
        }
    }

    /// Permission is never requested here; anything but `Granted` is a
    /// precondition failure for opening the device.
    pub fn ensure_granted(&self) -> Result<(), CameraError> {
        match self.status {
            PermissionStatus::Granted => Ok(()),
            status => Err(CameraError::precondition(format!(
                "camera permission {}: {}",
                status, self.message
            ))),
        }
    }
}
