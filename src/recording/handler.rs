//! Video handler wrapping a recorder sink

use crate::errors::CameraError;
use crate::platform::{OutputConfig, OutputKind};
use crate::sync::lock;
use crate::types::{ControllerId, HandlerId, Orientation, OutputId, Size};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Encoder/writer the core hands a recording surface to.
///
/// The core never touches the file; it only drives this lifecycle:
/// `prepare` → `start` → `stop`.
pub trait RecorderSink: Send {
    fn prepare(&mut self, path: &Path, orientation: Orientation) -> Result<(), CameraError>;
    fn start(&mut self) -> Result<(), CameraError>;
    fn stop(&mut self) -> Result<(), CameraError>;
    /// Input surface the device streams frames into
    fn surface(&self) -> OutputId;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    // claimed by a controller, waiting for the camera worker
    Starting,
    Prepared,
    Recording,
}

struct VideoState {
    recorder: Box<dyn RecorderSink>,
    phase: Phase,
    output_path: Option<PathBuf>,
    bound_to: Option<ControllerId>,
}

struct VideoInner {
    id: HandlerId,
    size: Size,
    state: Mutex<VideoState>,
}

/// Video stream: a recorder sink plus its recording flag and output path.
#[derive(Clone)]
pub struct VideoHandler {
    inner: Arc<VideoInner>,
}

impl VideoHandler {
    pub fn new<R>(size: Size, recorder: R) -> Self
    where
        R: RecorderSink + 'static,
    {
        Self {
            inner: Arc::new(VideoInner {
                id: HandlerId::next(),
                size,
                state: Mutex::new(VideoState {
                    recorder: Box::new(recorder),
                    phase: Phase::Idle,
                    output_path: None,
                    bound_to: None,
                }),
            }),
        }
    }

    pub fn id(&self) -> HandlerId {
        self.inner.id
    }

    pub fn size(&self) -> Size {
        self.inner.size
    }

    pub fn is_recording(&self) -> bool {
        lock(&self.inner.state).phase == Phase::Recording
    }

    /// Recording, or asked to record and not yet started
    pub fn is_active(&self) -> bool {
        lock(&self.inner.state).phase != Phase::Idle
    }

    /// Path of the current or most recent recording
    pub fn output_path(&self) -> Option<PathBuf> {
        lock(&self.inner.state).output_path.clone()
    }

    pub fn surface(&self) -> OutputId {
        lock(&self.inner.state).recorder.surface()
    }

    pub(crate) fn output_config(&self) -> OutputConfig {
        OutputConfig {
            id: self.surface(),
            kind: OutputKind::Recorder,
            size: self.inner.size,
        }
    }

    pub fn bound_to(&self) -> Option<ControllerId> {
        lock(&self.inner.state).bound_to
    }

    pub(crate) fn bind(&self, controller: ControllerId) -> Result<(), CameraError> {
        let mut state = lock(&self.inner.state);
        match state.bound_to {
            Some(bound) if bound != controller => Err(CameraError::HandlerAlreadyBound {
                handler: self.inner.id.0,
                bound_to: bound.0,
            }),
            _ => {
                state.bound_to = Some(controller);
                Ok(())
            }
        }
    }

    pub(crate) fn unbind(&self, controller: ControllerId) {
        let mut state = lock(&self.inner.state);
        if state.bound_to == Some(controller) {
            state.bound_to = None;
        }
    }

    /// Claim the handler for a recording the worker will start. Only one
    /// start may be outstanding.
    pub(crate) fn reserve(&self) -> Result<(), CameraError> {
        let mut state = lock(&self.inner.state);
        if state.phase != Phase::Idle {
            return Err(CameraError::precondition(format!(
                "{} is already recording",
                self.inner.id
            )));
        }
        state.phase = Phase::Starting;
        Ok(())
    }

    /// Stop recording, returning the file the recorder was given.
    pub(crate) fn stop(&self) -> Result<PathBuf, CameraError> {
        let mut state = lock(&self.inner.state);
        if state.phase != Phase::Recording {
            return Err(CameraError::precondition(format!(
                "{} is not recording",
                self.inner.id
            )));
        }
        state.phase = Phase::Idle;
        let result = state.recorder.stop();
        let path = state.output_path.clone().unwrap_or_default();
        result.map(|_| path)
    }

    pub(crate) fn prepare(&self, path: &Path, orientation: Orientation) -> Result<(), CameraError> {
        let mut state = lock(&self.inner.state);
        if matches!(state.phase, Phase::Prepared | Phase::Recording) {
            return Err(CameraError::precondition(format!(
                "{} is already recording",
                self.inner.id
            )));
        }
        state.recorder.prepare(path, orientation)?;
        state.phase = Phase::Prepared;
        state.output_path = Some(path.to_path_buf());
        Ok(())
    }

    pub(crate) fn begin(&self) -> Result<(), CameraError> {
        let mut state = lock(&self.inner.state);
        match state.phase {
            Phase::Prepared => {
                state.recorder.start()?;
                state.phase = Phase::Recording;
                Ok(())
            }
            Phase::Recording => Err(CameraError::precondition(format!(
                "{} is already recording",
                self.inner.id
            ))),
            Phase::Idle | Phase::Starting => Err(CameraError::precondition(format!(
                "{} was not prepared",
                self.inner.id
            ))),
        }
    }

    /// Forget a claimed or prepared recording that never started
    pub(crate) fn abandon_prepared(&self) {
        let mut state = lock(&self.inner.state);
        if matches!(state.phase, Phase::Starting | Phase::Prepared) {
            state.phase = Phase::Idle;
        }
    }
}

impl PartialEq for VideoHandler {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for VideoHandler {}

impl fmt::Debug for VideoHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoHandler")
            .field("id", &self.inner.id)
            .field("size", &self.inner.size)
            .field("recording", &self.is_recording())
            .finish()
    }
}
