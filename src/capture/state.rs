//! Capture states and the convergence decisions that move between them

use crate::platform::{AeState, CaptureResult};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CameraState {
    /// No device handle; waiting for the open callback
    WaitingDeviceOpen,
    /// Preview (or idle) session running, no still in flight
    Preview,
    /// AF trigger sent, waiting for focus to lock
    WaitingFocusLock,
    /// Precapture trigger sent, waiting for AE to start the sequence
    WaitingPrecapture,
    /// Waiting for AE to leave the precapture sequence
    WaitingNonPrecapture,
    RecordingVideo,
}

impl CameraState {
    /// A still request is current in these states
    pub fn is_converging(&self) -> bool {
        matches!(
            self,
            CameraState::WaitingFocusLock
                | CameraState::WaitingPrecapture
                | CameraState::WaitingNonPrecapture
        )
    }

    pub fn has_device(&self) -> bool {
        *self != CameraState::WaitingDeviceOpen
    }
}

impl fmt::Display for CameraState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CameraState::WaitingDeviceOpen => "waiting-device-open",
            CameraState::Preview => "preview",
            CameraState::WaitingFocusLock => "waiting-focus-lock",
            CameraState::WaitingPrecapture => "waiting-precapture",
            CameraState::WaitingNonPrecapture => "waiting-non-precapture",
            CameraState::RecordingVideo => "recording-video",
        };
        f.write_str(name)
    }
}

/// Next step after a result arrives in `WaitingFocusLock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusStep {
    Capture,
    RunPrecapture,
    KeepWaiting,
}

/// An unreported AF or AE state counts as converged. Some devices never
/// report one or the other, and waiting on them would stall the queue.
pub fn after_focus_result(result: &CaptureResult, has_precapture: bool) -> FocusStep {
    let af = match result.af_state {
        None => return FocusStep::Capture,
        Some(af) => af,
    };
    if !af.is_locked() {
        return FocusStep::KeepWaiting;
    }
    match result.ae_state {
        None | Some(AeState::Converged) => FocusStep::Capture,
        Some(_) if has_precapture => FocusStep::RunPrecapture,
        Some(_) => FocusStep::Capture,
    }
}

/// `WaitingPrecapture` advances once AE has entered the precapture sequence.
pub fn precapture_started(result: &CaptureResult) -> bool {
    matches!(
        result.ae_state,
        None | Some(AeState::Precapture) | Some(AeState::FlashRequired)
    )
}

/// `WaitingNonPrecapture` captures once AE has left the precapture sequence.
pub fn precapture_finished(result: &CaptureResult) -> bool {
    result.ae_state != Some(AeState::Precapture)
}
