use super::reader::{CapturedImage, FrameReader};
use super::{FrameDisposition, FrameSink};
use crate::errors::CameraError;
use crate::platform::{OutputConfig, RawImage};
use crate::sync::lock;
use crate::timing::CaptureClock;
use crate::types::{ControllerId, HandlerId, ImageFormat, OutputId, Size};
use std::fmt;
use std::sync::{Arc, Mutex};

/// What a controller hands its handlers when binding them.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub controller: ControllerId,
    pub buffer_depth: usize,
    pub clock: CaptureClock,
}

struct StillState {
    bound_to: Option<ControllerId>,
    reader: Option<FrameReader>,
    clock: Option<CaptureClock>,
    retained: Vec<CapturedImage>,
    delivered: u64,
}

struct StillInner {
    id: HandlerId,
    format: ImageFormat,
    size: Size,
    sink: Arc<dyn FrameSink>,
    state: Mutex<StillState>,
}

/// Still capture stream: a frame reader plus the sink its images go to.
///
/// Cheap to clone; clones refer to the same handler. The binding to a
/// controller is kept as a [`ControllerId`] only.
#[derive(Clone)]
pub struct StillHandler {
    inner: Arc<StillInner>,
}

impl StillHandler {
    pub fn new<S>(format: ImageFormat, size: Size, sink: S) -> Self
    where
        S: FrameSink + 'static,
    {
        Self::with_sink(format, size, Arc::new(sink))
    }

    pub fn with_sink(format: ImageFormat, size: Size, sink: Arc<dyn FrameSink>) -> Self {
        Self {
            inner: Arc::new(StillInner {
                id: HandlerId::next(),
                format,
                size,
                sink,
                state: Mutex::new(StillState {
                    bound_to: None,
                    reader: None,
                    clock: None,
                    retained: Vec::new(),
                    delivered: 0,
                }),
            }),
        }
    }

    pub fn id(&self) -> HandlerId {
        self.inner.id
    }

    pub fn format(&self) -> ImageFormat {
        self.inner.format
    }

    pub fn size(&self) -> Size {
        self.inner.size
    }

    /// Bind to `ctx.controller` and create the frame reader.
    ///
    /// Re-initialising against the same controller recreates a closed reader
    /// and is otherwise a no-op.
    pub fn initialize(&self, ctx: &HandlerContext) -> Result<(), CameraError> {
        let mut state = lock(&self.inner.state);
        if let Some(bound) = state.bound_to {
            if bound != ctx.controller {
                return Err(CameraError::HandlerAlreadyBound {
                    handler: self.inner.id.0,
                    bound_to: bound.0,
                });
            }
        }

        state.bound_to = Some(ctx.controller);
        state.clock = Some(ctx.clock.clone());
        if state.reader.is_none() {
            let reader = FrameReader::new(self.inner.size, self.inner.format, ctx.buffer_depth);
            log::debug!(
                "{} initialized for {} ({} {:?}, depth {})",
                self.inner.id,
                ctx.controller,
                self.inner.size,
                self.inner.format,
                reader.depth()
            );
            state.reader = Some(reader);
        }
        Ok(())
    }

    pub fn bound_to(&self) -> Option<ControllerId> {
        lock(&self.inner.state).bound_to
    }

    /// Output id of the live frame reader, if initialised
    pub fn output(&self) -> Option<OutputId> {
        lock(&self.inner.state).reader.as_ref().map(FrameReader::output)
    }

    pub(crate) fn output_config(&self) -> Option<OutputConfig> {
        lock(&self.inner.state)
            .reader
            .as_ref()
            .map(FrameReader::output_config)
    }

    /// Destroy the frame reader and release retained images. Idempotent.
    pub fn close(&self) {
        let mut state = lock(&self.inner.state);
        if state.reader.take().is_some() {
            log::debug!("{} closed its frame reader", self.inner.id);
        }
        state.retained.clear();
    }

    /// Drop the binding if it points at `controller`, closing the reader.
    pub(crate) fn unbind(&self, controller: ControllerId) {
        let mut state = lock(&self.inner.state);
        if state.bound_to == Some(controller) {
            state.bound_to = None;
            state.reader = None;
            state.retained.clear();
        }
    }

    /// Acquire a reader slot for `image` and hand it to the sink.
    pub(crate) fn deliver(&self, image: RawImage) -> Result<FrameDisposition, CameraError> {
        let captured = {
            let state = lock(&self.inner.state);
            let reader = state.reader.as_ref().ok_or_else(|| {
                CameraError::precondition(format!("{} has no live output target", self.inner.id))
            })?;
            let now = state.clock.as_ref().map(CaptureClock::micros).unwrap_or(0);
            reader.acquire(self.inner.id, image, now)?
        };

        // The sink runs without the state lock so it may call back into the handler.
        let disposition = self.inner.sink.on_frame(&captured);

        let mut state = lock(&self.inner.state);
        state.delivered += 1;
        if disposition == FrameDisposition::KeepOpen && state.reader.is_some() {
            state.retained.push(captured);
        }
        Ok(disposition)
    }

    /// Hand retained images to the caller; dropping them frees reader slots.
    pub fn take_retained(&self) -> Vec<CapturedImage> {
        std::mem::take(&mut lock(&self.inner.state).retained)
    }

    pub fn retained_count(&self) -> usize {
        lock(&self.inner.state).retained.len()
    }

    pub fn delivered_count(&self) -> u64 {
        lock(&self.inner.state).delivered
    }
}

impl PartialEq for StillHandler {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for StillHandler {}

impl fmt::Debug for StillHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StillHandler")
            .field("id", &self.inner.id)
            .field("format", &self.inner.format)
            .field("size", &self.inner.size)
            .finish()
    }
}
