//! Recording test doubles for the consumer-facing traits

use crate::diagnostics::DiagnosticsSink;
use crate::errors::CameraError;
use crate::recording::RecorderSink;
use crate::still::{CapturedImage, FrameDisposition, FrameSink};
use crate::sync::lock;
use crate::types::{HandlerId, Orientation, OutputId, Size};
use crossbeam_channel::{Receiver, Sender};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
    pub cause: Option<CameraError>,
}

impl Diagnostic {
    /// Message and cause rendered together, for substring checks
    pub fn text(&self) -> String {
        match &self.cause {
            Some(cause) => format!("{}: {}", self.message, cause),
            None => self.message.clone(),
        }
    }
}

/// Diagnostics sink that keeps everything it is given.
#[derive(Default)]
pub struct CollectingDiagnostics {
    entries: Mutex<Vec<Diagnostic>>,
    cv: Condvar,
}

impl CollectingDiagnostics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, level: DiagnosticLevel, message: &str, cause: Option<&CameraError>) {
        log::debug!("diagnostic {:?}: {}", level, message);
        lock(&self.entries).push(Diagnostic {
            level,
            message: message.to_string(),
            cause: cause.cloned(),
        });
        self.cv.notify_all();
    }

    pub fn entries(&self) -> Vec<Diagnostic> {
        lock(&self.entries).clone()
    }

    pub fn at_level(&self, level: DiagnosticLevel) -> Vec<Diagnostic> {
        lock(&self.entries)
            .iter()
            .filter(|d| d.level == level)
            .cloned()
            .collect()
    }

    pub fn errors(&self) -> Vec<Diagnostic> {
        self.at_level(DiagnosticLevel::Error)
    }

    pub fn warnings(&self) -> Vec<Diagnostic> {
        self.at_level(DiagnosticLevel::Warning)
    }

    pub fn infos(&self) -> Vec<Diagnostic> {
        self.at_level(DiagnosticLevel::Info)
    }

    /// Wait until some entry satisfies `pred`.
    pub fn wait_for<F>(&self, timeout: Duration, pred: F) -> bool
    where
        F: Fn(&Diagnostic) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut entries = lock(&self.entries);
        loop {
            if entries.iter().any(&pred) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            entries = match self.cv.wait_timeout(entries, deadline - now) {
                Ok((g, _)) => g,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    pub fn wait_for_error(&self, needle: &str, timeout: Duration) -> bool {
        self.wait_for(timeout, |d| {
            d.level == DiagnosticLevel::Error && d.text().contains(needle)
        })
    }
}

impl DiagnosticsSink for CollectingDiagnostics {
    fn error(&self, message: &str, cause: Option<&CameraError>) {
        self.push(DiagnosticLevel::Error, message, cause);
    }

    fn warning(&self, message: &str) {
        self.push(DiagnosticLevel::Warning, message, None);
    }

    fn info(&self, message: &str) {
        self.push(DiagnosticLevel::Info, message, None);
    }
}

/// What a [`ChannelFrameSink`] forwards for each frame it sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredFrame {
    pub frame_number: u64,
    pub handler: HandlerId,
    pub output: OutputId,
    pub size: Size,
    pub tags: BTreeMap<String, i64>,
    pub bytes: usize,
}

/// Frame sink forwarding a summary of each frame over a channel.
pub struct ChannelFrameSink {
    tx: Sender<DeliveredFrame>,
    disposition: FrameDisposition,
}

impl ChannelFrameSink {
    /// Sink that closes every frame right away
    pub fn new() -> (Self, Receiver<DeliveredFrame>) {
        Self::with_disposition(FrameDisposition::Close)
    }

    pub fn with_disposition(disposition: FrameDisposition) -> (Self, Receiver<DeliveredFrame>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx, disposition }, rx)
    }
}

impl FrameSink for ChannelFrameSink {
    fn on_frame(&self, image: &CapturedImage) -> FrameDisposition {
        let _ = self.tx.send(DeliveredFrame {
            frame_number: image.frame_number(),
            handler: image.handler(),
            output: image.output(),
            size: image.size(),
            tags: image.raw().metadata.clone(),
            bytes: image.data().len(),
        });
        self.disposition
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderCall {
    Prepare(PathBuf, Orientation),
    Start,
    Stop,
}

/// Shared view of the calls a [`MemoryRecorder`] received.
#[derive(Debug, Clone, Default)]
pub struct RecorderLog {
    calls: Arc<Mutex<Vec<RecorderCall>>>,
}

impl RecorderLog {
    pub fn snapshot(&self) -> Vec<RecorderCall> {
        lock(&self.calls).clone()
    }

    fn push(&self, call: RecorderCall) {
        lock(&self.calls).push(call);
    }
}

/// Recorder sink that writes nothing and logs every call.
#[derive(Debug)]
pub struct MemoryRecorder {
    surface: OutputId,
    log: RecorderLog,
    fail_prepare: Option<String>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self {
            surface: OutputId::next(),
            log: RecorderLog::default(),
            fail_prepare: None,
        }
    }

    /// Recorder whose `prepare` always fails with `reason`
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            fail_prepare: Some(reason.into()),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> RecorderLog {
        self.log.clone()
    }
}

impl Default for MemoryRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl RecorderSink for MemoryRecorder {
    fn prepare(&mut self, path: &Path, orientation: Orientation) -> Result<(), CameraError> {
        if let Some(reason) = &self.fail_prepare {
            return Err(CameraError::device(reason.clone()));
        }
        self.log
            .push(RecorderCall::Prepare(path.to_path_buf(), orientation));
        Ok(())
    }

    fn start(&mut self) -> Result<(), CameraError> {
        self.log.push(RecorderCall::Start);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CameraError> {
        self.log.push(RecorderCall::Stop);
        Ok(())
    }

    fn surface(&self) -> OutputId {
        self.surface
    }
}
