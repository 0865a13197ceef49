//! Capture core: session description, request queue and the state machine
//!
//! Callers build a [`Session`], hand it to a [`CameraController`] and queue
//! still requests against its handlers. One worker thread per started session
//! owns the device handle and runs the state machine; device callbacks and
//! controller commands reach it as [`events::WorkerTask`]s over one channel.

pub(crate) mod events;
mod controller;
mod lifecycle;
mod machine;
mod mirror;
mod queue;
mod request;
mod session;
mod state;

pub use controller::{CameraController, ControllerBuilder};
pub use lifecycle::{LockPermit, OpenCloseLock};
pub use queue::RequestQueue;
pub use request::{CaptureRequest, RequestConfig};
pub use session::{PreviewSpec, Session, SessionBuilder};
pub use state::{after_focus_result, precapture_finished, precapture_started, CameraState, FocusStep};

/// Invariant names the state machine checks on every transition
pub mod invariants {
    pub use super::machine::{CURRENT_INVARIANT, HANDLE_INVARIANT};
}
