//! Native request and result metadata exchanged with the device

use crate::types::{ImageFormat, OutputId, Size};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Autofocus state reported in a capture result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AfState {
    Inactive,
    PassiveScan,
    PassiveFocused,
    PassiveUnfocused,
    ActiveScan,
    FocusedLocked,
    NotFocusedLocked,
}

impl AfState {
    /// Focus has settled after a trigger, whether or not it found focus
    pub fn is_locked(&self) -> bool {
        matches!(self, AfState::FocusedLocked | AfState::NotFocusedLocked)
    }
}

/// Auto-exposure state reported in a capture result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AeState {
    Inactive,
    Searching,
    Converged,
    Locked,
    FlashRequired,
    Precapture,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AfMode {
    Off,
    Auto,
    ContinuousPicture,
    ContinuousVideo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AeMode {
    Off,
    On,
    OnAutoFlash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AfTrigger {
    #[default]
    Idle,
    Start,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AePrecaptureTrigger {
    #[default]
    Idle,
    Start,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestTemplate {
    Preview,
    StillCapture,
    Record,
}

/// A request as submitted to the native capture session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeRequest {
    pub template: RequestTemplate,
    pub targets: Vec<OutputId>,
    pub af_mode: Option<AfMode>,
    pub ae_mode: Option<AeMode>,
    pub af_trigger: AfTrigger,
    pub ae_precapture_trigger: AePrecaptureTrigger,
    /// Free-form keys (effects, vendor tags); copied to image metadata by
    /// devices that support request tagging.
    pub extras: BTreeMap<String, i64>,
}

impl NativeRequest {
    pub fn new(template: RequestTemplate, targets: Vec<OutputId>) -> Self {
        Self {
            template,
            targets,
            af_mode: None,
            ae_mode: None,
            af_trigger: AfTrigger::Idle,
            ae_precapture_trigger: AePrecaptureTrigger::Idle,
            extras: BTreeMap::new(),
        }
    }

    pub fn with_af_trigger(mut self, trigger: AfTrigger) -> Self {
        self.af_trigger = trigger;
        self
    }

    pub fn with_modes(mut self, af: AfMode, ae: AeMode) -> Self {
        self.af_mode = Some(af);
        self.ae_mode = Some(ae);
        self
    }
}

/// Convergence readings of one completed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureResult {
    pub frame_number: u64,
    pub af_state: Option<AfState>,
    pub ae_state: Option<AeState>,
}

impl CaptureResult {
    pub fn new(frame_number: u64, af_state: Option<AfState>, ae_state: Option<AeState>) -> Self {
        Self {
            frame_number,
            af_state,
            ae_state,
        }
    }
}

/// Image produced by the device for a still output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawImage {
    pub frame_number: u64,
    pub size: Size,
    pub format: ImageFormat,
    pub sensor_timestamp_ns: u64,
    pub metadata: BTreeMap<String, i64>,
    pub data: Vec<u8>,
}

impl RawImage {
    /// Tag value copied from the originating request, if any
    pub fn tag(&self, key: &str) -> Option<i64> {
        self.metadata.get(key).copied()
    }
}
