use crate::errors::CameraError;
use crate::platform::{OutputConfig, OutputKind};
use crate::recording::VideoHandler;
use crate::still::StillHandler;
use crate::types::{DeviceId, OutputId, Size};
use std::collections::HashSet;
use std::sync::Arc;

/// Opaque drawable target the preview stream renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewSpec {
    pub target: OutputId,
    pub size: Size,
}

impl PreviewSpec {
    pub fn new(target: OutputId, size: Size) -> Self {
        Self { target, size }
    }

    pub(crate) fn output_config(&self) -> OutputConfig {
        OutputConfig {
            id: self.target,
            kind: OutputKind::Preview,
            size: self.size,
        }
    }
}

#[derive(Debug)]
struct SessionInner {
    device_id: DeviceId,
    preview: Option<PreviewSpec>,
    still_handlers: Vec<StillHandler>,
    video_handlers: Vec<VideoHandler>,
}

/// Immutable description of one capture arrangement.
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn builder(device_id: impl Into<DeviceId>) -> SessionBuilder {
        SessionBuilder {
            device_id: device_id.into(),
            preview: None,
            still_handlers: Vec::new(),
            video_handlers: Vec::new(),
        }
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.inner.device_id
    }

    pub fn preview(&self) -> Option<&PreviewSpec> {
        self.inner.preview.as_ref()
    }

    pub fn still_handlers(&self) -> &[StillHandler] {
        &self.inner.still_handlers
    }

    pub fn video_handlers(&self) -> &[VideoHandler] {
        &self.inner.video_handlers
    }

    pub fn contains_still(&self, handler: &StillHandler) -> bool {
        self.inner.still_handlers.iter().any(|h| h == handler)
    }

    pub fn contains_video(&self, handler: &VideoHandler) -> bool {
        self.inner.video_handlers.iter().any(|h| h == handler)
    }

    pub(crate) fn still_for_output(&self, output: OutputId) -> Option<&StillHandler> {
        self.inner
            .still_handlers
            .iter()
            .find(|h| h.output() == Some(output))
    }

    /// Checks that can fail before any device is touched.
    pub fn validate(&self) -> Result<(), CameraError> {
        let inner = &self.inner;
        if inner.preview.is_none()
            && inner.still_handlers.is_empty()
            && inner.video_handlers.is_empty()
        {
            return Err(CameraError::precondition(
                "session has no preview target and no capture handlers",
            ));
        }
        if inner.device_id.as_str().is_empty() {
            return Err(CameraError::precondition("session device id is empty"));
        }
        if let Some(preview) = &inner.preview {
            if preview.size.is_empty() {
                return Err(CameraError::precondition("preview size is empty"));
            }
        }

        let mut seen = HashSet::new();
        for h in &inner.still_handlers {
            if h.size().is_empty() {
                return Err(CameraError::precondition(format!("{} has an empty size", h.id())));
            }
            if !seen.insert(h.id()) {
                return Err(CameraError::precondition(format!(
                    "{} registered twice in one session",
                    h.id()
                )));
            }
        }
        for v in &inner.video_handlers {
            if !seen.insert(v.id()) {
                return Err(CameraError::precondition(format!(
                    "{} registered twice in one session",
                    v.id()
                )));
            }
        }
        Ok(())
    }
}

pub struct SessionBuilder {
    device_id: DeviceId,
    preview: Option<PreviewSpec>,
    still_handlers: Vec<StillHandler>,
    video_handlers: Vec<VideoHandler>,
}

impl SessionBuilder {
    pub fn preview(mut self, preview: PreviewSpec) -> Self {
        self.preview = Some(preview);
        self
    }

    pub fn still_handler(mut self, handler: StillHandler) -> Self {
        self.still_handlers.push(handler);
        self
    }

    pub fn video_handler(mut self, handler: VideoHandler) -> Self {
        self.video_handlers.push(handler);
        self
    }

    pub fn build(self) -> Session {
        Session {
            inner: Arc::new(SessionInner {
                device_id: self.device_id,
                preview: self.preview,
                still_handlers: self.still_handlers,
                video_handlers: self.video_handlers,
            }),
        }
    }
}
