//! Device abstraction
//!
//! The hardware layer is consumed through three traits:
//! [`DeviceManager`] enumerates and opens devices, [`CameraDevice`] is an open
//! exclusive handle, and [`NativeSession`] is a configured set of output
//! streams accepting requests. Every asynchronous answer from the hardware is
//! posted through [`DeviceEvents`] onto the camera worker's task queue; nothing
//! in this layer calls back into controller state directly.

pub mod metadata;

pub use metadata::{
    AeMode, AePrecaptureTrigger, AeState, AfMode, AfState, AfTrigger, CaptureResult,
    NativeRequest, RawImage, RequestTemplate,
};

use crate::capture::events::WorkerTask;
use crate::errors::CameraError;
use crate::permissions::PermissionInfo;
use crate::types::{DeviceId, DeviceInfo, ImageFormat, OutputId, Size};
use crossbeam_channel::Sender;
use std::fmt;

/// Identifies one native capture session; results carrying a stale token are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken(pub u64);

/// What a configured output stream feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Preview,
    Still { format: ImageFormat, max_images: usize },
    Recorder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputConfig {
    pub id: OutputId,
    pub kind: OutputKind,
    pub size: Size,
}

pub trait DeviceManager: Send + Sync {
    fn list_devices(&self) -> Result<Vec<DeviceId>, CameraError>;

    fn characteristics(&self, id: &DeviceId) -> Result<DeviceInfo, CameraError>;

    fn permission(&self) -> PermissionInfo {
        PermissionInfo::granted()
    }

    /// Issue an open request. Completion is reported later through
    /// `events.opened`, `events.disconnected` or `events.error`.
    fn open(&self, id: &DeviceId, events: DeviceEvents) -> Result<(), CameraError>;
}

/// An open, exclusive device handle.
pub trait CameraDevice: Send {
    fn id(&self) -> &DeviceId;

    fn create_capture_session(
        &mut self,
        token: SessionToken,
        outputs: &[OutputConfig],
    ) -> Result<Box<dyn NativeSession>, CameraError>;

    fn close(&mut self);
}

pub trait NativeSession: Send {
    fn set_repeating(&mut self, request: &NativeRequest) -> Result<(), CameraError>;

    fn stop_repeating(&mut self) -> Result<(), CameraError>;

    /// Submit a one-shot request, returning the device's request id.
    fn capture(&mut self, request: &NativeRequest) -> Result<u64, CameraError>;

    fn close(&mut self);
}

/// Asynchronous answers from the device.
pub enum DeviceEvent {
    Opened(Box<dyn CameraDevice>),
    Disconnected,
    Error(String),
    CaptureResult {
        token: SessionToken,
        result: CaptureResult,
    },
    CaptureCompleted {
        token: SessionToken,
        request_id: u64,
    },
    CaptureFailed {
        token: SessionToken,
        request_id: u64,
        reason: String,
    },
    ImageAvailable {
        output: OutputId,
        image: RawImage,
    },
}

impl fmt::Debug for DeviceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceEvent::Opened(device) => write!(f, "Opened({})", device.id()),
            DeviceEvent::Disconnected => write!(f, "Disconnected"),
            DeviceEvent::Error(msg) => write!(f, "Error({})", msg),
            DeviceEvent::CaptureResult { token, result } => {
                write!(f, "CaptureResult({:?}, {:?})", token, result)
            }
            DeviceEvent::CaptureCompleted { token, request_id } => {
                write!(f, "CaptureCompleted({:?}, {})", token, request_id)
            }
            DeviceEvent::CaptureFailed {
                token,
                request_id,
                reason,
            } => write!(f, "CaptureFailed({:?}, {}, {})", token, request_id, reason),
            DeviceEvent::ImageAvailable { output, image } => {
                write!(f, "ImageAvailable({}, frame {})", output, image.frame_number)
            }
        }
    }
}

/// Posts device events onto the camera worker's task queue.
///
/// Cloneable and `Send`; once the worker has stopped every post is dropped
/// and reports `false`.
#[derive(Clone)]
pub struct DeviceEvents {
    tx: Sender<WorkerTask>,
}

impl DeviceEvents {
    pub(crate) fn new(tx: Sender<WorkerTask>) -> Self {
        Self { tx }
    }

    pub fn post(&self, event: DeviceEvent) -> bool {
        self.tx.send(WorkerTask::Device(event)).is_ok()
    }

    pub fn opened(&self, device: Box<dyn CameraDevice>) -> bool {
        self.post(DeviceEvent::Opened(device))
    }

    pub fn disconnected(&self) -> bool {
        self.post(DeviceEvent::Disconnected)
    }

    pub fn error(&self, message: impl Into<String>) -> bool {
        self.post(DeviceEvent::Error(message.into()))
    }

    pub fn capture_result(&self, token: SessionToken, result: CaptureResult) -> bool {
        self.post(DeviceEvent::CaptureResult { token, result })
    }

    pub fn capture_completed(&self, token: SessionToken, request_id: u64) -> bool {
        self.post(DeviceEvent::CaptureCompleted { token, request_id })
    }

    pub fn capture_failed(
        &self,
        token: SessionToken,
        request_id: u64,
        reason: impl Into<String>,
    ) -> bool {
        self.post(DeviceEvent::CaptureFailed {
            token,
            request_id,
            reason: reason.into(),
        })
    }

    pub fn image_available(&self, output: OutputId, image: RawImage) -> bool {
        self.post(DeviceEvent::ImageAvailable { output, image })
    }
}

impl fmt::Debug for DeviceEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceEvents").finish_non_exhaustive()
    }
}
