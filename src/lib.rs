//! shutterbug: exclusive camera capture sequencing
//!
//! This crate coordinates access to one exclusive camera device with an
//! asynchronous, callback-driven control API. It opens and closes the device,
//! keeps a preview stream running, and interleaves queued still captures and
//! video recordings with the camera's autofocus and auto-exposure convergence.
//!
//! # Features
//! - Capture state machine run on a dedicated camera worker thread
//! - FIFO still-capture queue that survives pause/resume
//! - Bounded-wait open/close lock, shareable across controllers
//! - Still handlers with bounded frame readers, video handlers with recorder sinks
//! - Diagnostics sink for every fault, forwarded to `log` by default
//! - Simulated backend for offline testing
//!
//! # Usage
//! ```rust,ignore
//! use shutterbug::prelude::*;
//!
//! let sim = Arc::new(SimulatedCameraManager::new());
//! let controller = CameraController::new(sim);
//! let (sink, frames) = ChannelFrameSink::new();
//! let still = StillHandler::new(ImageFormat::Jpeg, Size::new(4032, 3024), sink);
//! let session = Session::builder("0")
//!     .preview(PreviewSpec::new(OutputId::next(), Size::new(1920, 1080)))
//!     .still_handler(still.clone())
//!     .build();
//!
//! controller.start(session)?;
//! controller.request_still_capture(&still, None, RequestConfig::none())?;
//! let frame = frames.recv()?;
//! ```
pub mod capture;
pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod invariant_ppt;
pub mod permissions;
pub mod platform;
pub mod recording;
pub mod still;
mod sync;
pub mod testing;
pub mod timing;
pub mod types;

// Re-exports for convenience
pub use capture::{
    CameraController, CameraState, ControllerBuilder, OpenCloseLock, PreviewSpec, RequestConfig,
    Session,
};
pub use config::ShutterbugConfig;
pub use diagnostics::{DiagnosticsSink, LogDiagnostics};
pub use errors::{CameraError, ErrorKind};
pub use types::{DeviceId, ImageFormat, Orientation, OutputId, Size};

pub mod prelude {
    pub use crate::capture::{
        CameraController, CameraState, PreviewSpec, RequestConfig, Session,
    };
    pub use crate::errors::CameraError;
    pub use crate::recording::{RecorderSink, VideoHandler};
    pub use crate::still::{CapturedImage, FrameDisposition, FrameSink, StillHandler};
    pub use crate::testing::{ChannelFrameSink, SimulatedCameraManager};
    pub use crate::types::{DeviceId, ImageFormat, Orientation, OutputId, Size};
    pub use std::sync::Arc;
}
