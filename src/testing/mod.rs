//! Testing utilities for shutterbug
//!
//! A simulated device backend with scripted convergence, plus recording
//! doubles for the diagnostics, frame and recorder sinks, so the capture core
//! can be exercised offline.

mod doubles;
pub mod simulated;
pub mod synthetic_data;

pub use doubles::{
    ChannelFrameSink, CollectingDiagnostics, DeliveredFrame, Diagnostic, DiagnosticLevel,
    MemoryRecorder, RecorderCall, RecorderLog,
};
pub use simulated::{SimulatedCameraManager, SubmittedRequest};
pub use synthetic_data::synthetic_still_image;
