//! Capture state machine, run on the camera worker thread

use super::events::WorkerTask;
use super::lifecycle::DeviceLifecycle;
use super::mirror::StateMirror;
use super::queue::RequestQueue;
use super::request::CaptureRequest;
use super::session::Session;
use super::state::{after_focus_result, precapture_finished, precapture_started, CameraState, FocusStep};
use crate::assert_invariant;
use crate::diagnostics::DiagnosticsSink;
use crate::errors::CameraError;
use crate::platform::{
    AeMode, AfMode, AfTrigger, CaptureResult, DeviceEvent, DeviceEvents, NativeRequest, RawImage,
    RequestTemplate, SessionToken,
};
use crate::recording::VideoHandler;
use crate::types::{ControllerId, Orientation, OutputId};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const HANDLE_INVARIANT: &str = "Device handle present iff device is open";
pub const CURRENT_INVARIANT: &str = "A request is current only while converging";

struct InFlight {
    request: CaptureRequest,
    since: Instant,
}

/// A submitted still whose completion has not arrived yet.
struct PendingStill {
    sequence: u64,
    since: Instant,
}

/// Everything the worker needs from its controller.
pub(crate) struct MachineParts {
    pub controller: ControllerId,
    pub session: Session,
    pub convergence_timeout: Option<Duration>,
    pub diagnostics: Arc<dyn DiagnosticsSink>,
    pub queue: Arc<RequestQueue>,
    pub mirror: Arc<StateMirror>,
    pub lifecycle: DeviceLifecycle,
    pub events: DeviceEvents,
    pub stop: Arc<AtomicBool>,
}

pub(crate) struct Machine {
    controller: ControllerId,
    session: Session,
    convergence_timeout: Option<Duration>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    queue: Arc<RequestQueue>,
    mirror: Arc<StateMirror>,
    lifecycle: DeviceLifecycle,
    events: DeviceEvents,
    stop: Arc<AtomicBool>,
    state: CameraState,
    current: Option<InFlight>,
    recording: Option<VideoHandler>,
    token: SessionToken,
    next_token: u64,
    // keyed by device request id
    pending_stills: HashMap<u64, PendingStill>,
    // repeating preview was stopped for a still and not yet restarted
    preview_stopped: bool,
}

impl Machine {
    pub(crate) fn new(parts: MachineParts) -> Self {
        Self {
            controller: parts.controller,
            session: parts.session,
            convergence_timeout: parts.convergence_timeout,
            diagnostics: parts.diagnostics,
            queue: parts.queue,
            mirror: parts.mirror,
            lifecycle: parts.lifecycle,
            events: parts.events,
            stop: parts.stop,
            state: CameraState::WaitingDeviceOpen,
            current: None,
            recording: None,
            token: SessionToken(0),
            next_token: 0,
            pending_stills: HashMap::new(),
            preview_stopped: false,
        }
    }

    /// Worker entry point. Returns after `Shutdown`.
    pub(crate) fn run(mut self, rx: Receiver<WorkerTask>) {
        self.mirror.publish(CameraState::WaitingDeviceOpen);
        self.open_device();

        loop {
            let task = match self.convergence_deadline() {
                Some(deadline) => match rx.recv_deadline(deadline) {
                    Ok(task) => task,
                    Err(RecvTimeoutError::Timeout) => {
                        self.on_convergence_timeout();
                        self.drain_if_preview();
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match rx.recv() {
                    Ok(task) => task,
                    Err(_) => break,
                },
            };

            if !self.handle(task) {
                break;
            }
            self.drain_if_preview();
        }

        self.teardown();
        log::debug!("camera worker for {} exiting", self.controller);
    }

    fn handle(&mut self, task: WorkerTask) -> bool {
        match task {
            WorkerTask::Drain => {}
            WorkerTask::StartVideo {
                handler,
                path,
                orientation,
            } => self.start_video(handler, path, orientation),
            WorkerTask::StopVideo { handler } => self.stop_video(handler),
            WorkerTask::Shutdown => return false,
            WorkerTask::Device(event) => self.on_device_event(event),
        }
        true
    }

    fn open_device(&mut self) {
        let id = self.session.device_id().clone();
        match self.lifecycle.open(&id, self.events.clone(), &self.stop) {
            Ok(()) => self.diagnostics.info(&format!("open requested for camera {}", id)),
            Err(_) if self.stop.load(Ordering::Relaxed) => {
                self.diagnostics.info(&format!("open of camera {} cancelled", id))
            }
            Err(e) => self
                .diagnostics
                .error(&format!("could not open camera {}", id), Some(&e)),
        }
    }

    fn on_device_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::Opened(device) => self.on_opened(device),
            DeviceEvent::Disconnected => self.device_lost("camera disconnected", None),
            DeviceEvent::Error(message) => {
                let cause = CameraError::device(message);
                self.device_lost("camera reported an error", Some(&cause));
            }
            DeviceEvent::CaptureResult { token, result } => {
                if token == self.token {
                    self.on_capture_result(&result);
                }
            }
            DeviceEvent::CaptureCompleted { token, request_id } => {
                if token == self.token {
                    self.on_capture_completed(request_id);
                }
            }
            DeviceEvent::CaptureFailed {
                token,
                request_id,
                reason,
            } => {
                if token == self.token {
                    self.on_capture_failed(request_id, reason);
                }
            }
            DeviceEvent::ImageAvailable { output, image } => self.on_image(output, image),
        }
    }

    fn on_opened(&mut self, device: Box<dyn crate::platform::CameraDevice>) {
        let id = device.id().clone();
        self.lifecycle.on_opened(device);
        match self.configure_preview() {
            Ok(()) => {
                self.diagnostics.info(&format!("camera {} open", id));
                self.transition(CameraState::Preview);
            }
            Err(e) => {
                self.diagnostics
                    .error(&format!("could not configure a session on camera {}", id), Some(&e));
                self.lifecycle.close();
                self.transition(CameraState::WaitingDeviceOpen);
            }
        }
    }

    fn device_lost(&mut self, message: &str, cause: Option<&CameraError>) {
        self.diagnostics.error(message, cause);
        if let Some(inflight) = self.current.take() {
            self.abandon(&inflight.request, "device lost", None);
        }
        self.pending_stills.clear();
        self.stop_recorder();
        self.lifecycle.on_open_aborted();
        self.lifecycle.close();
        self.transition(CameraState::WaitingDeviceOpen);
    }

    /// Preview (or idle) session: preview target plus every still reader.
    fn configure_preview(&mut self) -> Result<(), CameraError> {
        let mut outputs = Vec::new();
        if let Some(preview) = self.session.preview() {
            outputs.push(preview.output_config());
        }
        outputs.extend(
            self.session
                .still_handlers()
                .iter()
                .filter_map(|h| h.output_config()),
        );

        let token = self.fresh_token();
        self.lifecycle.configure(token, &outputs)?;
        self.token = token;

        if let Some(request) = self.preview_request() {
            self.native_session()?.set_repeating(&request)?;
        }
        self.preview_stopped = false;
        Ok(())
    }

    fn preview_request(&self) -> Option<NativeRequest> {
        self.session.preview().map(|p| {
            NativeRequest::new(RequestTemplate::Preview, vec![p.target])
                .with_modes(AfMode::ContinuousPicture, AeMode::On)
        })
    }

    fn native_session(
        &mut self,
    ) -> Result<&mut (dyn crate::platform::NativeSession + 'static), CameraError> {
        self.lifecycle
            .session_mut()
            .ok_or_else(|| CameraError::device("no native capture session"))
    }

    /// New session token. Completions of the old session will be ignored,
    /// so stills still waiting on one are forgotten.
    fn fresh_token(&mut self) -> SessionToken {
        if !self.pending_stills.is_empty() {
            log::debug!(
                "{}: {} still(s) left the session before completing",
                self.controller,
                self.pending_stills.len()
            );
            self.pending_stills.clear();
        }
        self.next_token += 1;
        SessionToken(self.next_token)
    }

    fn transition(&mut self, next: CameraState) {
        if next != self.state {
            log::debug!("{}: {} -> {}", self.controller, self.state, next);
            self.state = next;
            self.mirror.publish(next);
        }
        assert_invariant!(
            self.lifecycle.has_device() == next.has_device(),
            HANDLE_INVARIANT,
            "machine"
        );
        assert_invariant!(
            self.current.is_some() == next.is_converging(),
            CURRENT_INVARIANT,
            "machine"
        );
    }

    /// Settle after a failed step: `Preview` if the device survived.
    fn settle(&mut self) {
        let next = if self.lifecycle.has_device() {
            CameraState::Preview
        } else {
            CameraState::WaitingDeviceOpen
        };
        self.transition(next);
    }

    fn abandon(&self, request: &CaptureRequest, reason: &str, cause: Option<&CameraError>) {
        self.diagnostics.error(
            &format!(
                "still request #{} for {} abandoned: {}",
                request.sequence(),
                request.target().id(),
                reason
            ),
            cause,
        );
    }

    /// Start the next queued request once the camera is in `Preview` and the
    /// previous still has completed and unlocked focus.
    fn drain_if_preview(&mut self) {
        while self.state == CameraState::Preview
            && self.current.is_none()
            && self.pending_stills.is_empty()
        {
            let request = match self.queue.try_dequeue() {
                Some(r) => r,
                None => return,
            };
            self.diagnostics.info(&format!(
                "dequeued still request #{} ({} pending)",
                request.sequence(),
                self.queue.len()
            ));
            self.begin(request);
        }
    }

    fn begin(&mut self, request: CaptureRequest) {
        let target = request.target();
        if target.bound_to() != Some(self.controller) || !self.session.contains_still(target) {
            self.abandon(&request, "handler no longer belongs to this session", None);
            return;
        }
        if target.output().is_none() {
            self.abandon(&request, "handler has no live output target", None);
            return;
        }

        let preview_target = self.session.preview().map(|p| p.target);
        let preview_target = match preview_target {
            Some(t) => t,
            None => {
                self.current = Some(InFlight {
                    request,
                    since: Instant::now(),
                });
                self.capture_still();
                return;
            }
        };

        let repeating = NativeRequest::new(RequestTemplate::Preview, vec![preview_target])
            .with_modes(AfMode::ContinuousPicture, AeMode::On);
        let trigger = repeating.clone().with_af_trigger(AfTrigger::Start);
        let rearm = self.preview_stopped;
        let submitted = self.native_session().and_then(|s| {
            // Convergence results come from the repeating stream.
            if rearm {
                s.set_repeating(&repeating)?;
            }
            s.capture(&trigger)
        });
        if rearm && submitted.is_ok() {
            self.preview_stopped = false;
        }
        match submitted {
            Ok(_) => {
                self.current = Some(InFlight {
                    request,
                    since: Instant::now(),
                });
                self.transition(CameraState::WaitingFocusLock);
            }
            Err(e) => {
                self.abandon(&request, "focus trigger was rejected", Some(&e));
                self.settle();
            }
        }
    }

    fn on_capture_result(&mut self, result: &CaptureResult) {
        let has_precapture = match &self.current {
            Some(inflight) => inflight.request.precapture_config().is_some(),
            None => return,
        };
        let state = self.state;
        match state {
            CameraState::WaitingFocusLock => match after_focus_result(result, has_precapture) {
                FocusStep::Capture => self.capture_still(),
                FocusStep::RunPrecapture => self.run_precapture(),
                FocusStep::KeepWaiting => {}
            },
            CameraState::WaitingPrecapture => {
                if precapture_started(result) {
                    self.transition(CameraState::WaitingNonPrecapture);
                }
            }
            CameraState::WaitingNonPrecapture => {
                if precapture_finished(result) {
                    self.capture_still();
                }
            }
            _ => {}
        }
    }

    fn run_precapture(&mut self) {
        let preview_target = match self.session.preview() {
            Some(p) => p.target,
            None => {
                self.capture_still();
                return;
            }
        };
        let mut request = NativeRequest::new(RequestTemplate::Preview, vec![preview_target])
            .with_modes(AfMode::ContinuousPicture, AeMode::On);
        if let Some(config) = self
            .current
            .as_ref()
            .and_then(|c| c.request.precapture_config())
        {
            config.apply(&mut request);
        }

        match self.native_session().and_then(|s| s.capture(&request)) {
            Ok(_) => self.transition(CameraState::WaitingPrecapture),
            Err(e) => {
                if let Some(inflight) = self.current.take() {
                    self.abandon(&inflight.request, "precapture trigger was rejected", Some(&e));
                }
                self.settle();
            }
        }
    }

    fn capture_still(&mut self) {
        let inflight = match self.current.take() {
            Some(c) => c,
            None => {
                self.diagnostics
                    .error("still capture requested with no current request", None);
                return;
            }
        };
        let request = inflight.request;

        let output = match request.target().output() {
            Some(o) => o,
            None => {
                self.abandon(&request, "handler has no live output target", None);
                self.settle();
                return;
            }
        };

        let mut native = NativeRequest::new(RequestTemplate::StillCapture, vec![output])
            .with_modes(AfMode::ContinuousPicture, AeMode::On);
        request.capture_config().apply(&mut native);

        let submitted = self.native_session().and_then(|s| {
            if let Err(e) = s.stop_repeating() {
                log::warn!("stop_repeating before still capture failed: {}", e);
            }
            s.capture(&native)
        });
        if self.session.preview().is_some() {
            self.preview_stopped = true;
        }

        match submitted {
            Ok(request_id) => {
                self.pending_stills.insert(
                    request_id,
                    PendingStill {
                        sequence: request.sequence(),
                        since: Instant::now(),
                    },
                );
                self.diagnostics.info(&format!(
                    "submitted still request #{} to {}",
                    request.sequence(),
                    output
                ));
                self.transition(CameraState::Preview);
            }
            Err(e) => {
                self.abandon(&request, "still capture was rejected", Some(&e));
                self.settle();
                self.unlock_focus();
            }
        }
    }

    fn on_capture_completed(&mut self, request_id: u64) {
        if let Some(pending) = self.pending_stills.remove(&request_id) {
            self.diagnostics
                .info(&format!("still request #{} completed", pending.sequence));
            self.unlock_focus();
        }
    }

    fn on_capture_failed(&mut self, request_id: u64, reason: String) {
        let cause = CameraError::device(reason);
        if let Some(pending) = self.pending_stills.remove(&request_id) {
            self.diagnostics.error(
                &format!("still request #{} abandoned: capture failed", pending.sequence),
                Some(&cause),
            );
            self.unlock_focus();
        } else if let Some(inflight) = self.current.take() {
            self.abandon(&inflight.request, "convergence request failed", Some(&cause));
            self.settle();
        } else {
            self.diagnostics
                .warning(&format!("capture {} failed: {}", request_id, cause));
        }
    }

    /// Cancel the AF lock and restart the repeating preview. Only in `Preview`.
    fn unlock_focus(&mut self) {
        if self.state != CameraState::Preview {
            return;
        }
        let repeating = match self.preview_request() {
            Some(r) => r,
            None => return,
        };
        let cancel = repeating.clone().with_af_trigger(AfTrigger::Cancel);
        let result = self.native_session().and_then(|s| {
            s.capture(&cancel)?;
            s.set_repeating(&repeating)
        });
        match result {
            Ok(()) => self.preview_stopped = false,
            Err(e) => self
                .diagnostics
                .warning(&format!("could not unlock focus: {}", e)),
        }
    }

    fn on_image(&mut self, output: OutputId, image: RawImage) {
        let handler = match self.session.still_for_output(output) {
            Some(h) => h.clone(),
            None => {
                self.diagnostics
                    .warning(&format!("image for unknown output {} dropped", output));
                return;
            }
        };
        let frame = image.frame_number;
        match handler.deliver(image) {
            Ok(disposition) => {
                log::debug!("frame {} delivered to {} ({:?})", frame, handler.id(), disposition)
            }
            Err(e) => self.diagnostics.error(
                &format!("frame {} for {} dropped", frame, handler.id()),
                Some(&e),
            ),
        }
    }

    /// Deadline of the converging request, or of the oldest still still
    /// waiting for its completion.
    fn convergence_deadline(&self) -> Option<Instant> {
        let timeout = self.convergence_timeout?;
        if self.state.is_converging() {
            return self.current.as_ref().map(|c| c.since + timeout);
        }
        self.pending_stills
            .values()
            .map(|p| p.since + timeout)
            .min()
    }

    fn on_convergence_timeout(&mut self) {
        if let Some(inflight) = &self.current {
            self.diagnostics.warning(&format!(
                "still request #{} did not converge in {} ms, capturing anyway",
                inflight.request.sequence(),
                inflight.since.elapsed().as_millis()
            ));
            self.capture_still();
            return;
        }

        let timeout = match self.convergence_timeout {
            Some(t) => t,
            None => return,
        };
        let overdue: Vec<u64> = self
            .pending_stills
            .iter()
            .filter(|(_, p)| p.since.elapsed() >= timeout)
            .map(|(id, _)| *id)
            .collect();
        if overdue.is_empty() {
            return;
        }
        for id in overdue {
            if let Some(pending) = self.pending_stills.remove(&id) {
                self.diagnostics.warning(&format!(
                    "still request #{} never reported completion",
                    pending.sequence
                ));
            }
        }
        self.unlock_focus();
    }

    fn start_video(&mut self, handler: VideoHandler, path: PathBuf, orientation: Orientation) {
        if self.state != CameraState::Preview {
            handler.abandon_prepared();
            self.diagnostics.warning(&format!(
                "cannot start recording on {} in state {}",
                handler.id(),
                self.state
            ));
            return;
        }

        self.lifecycle.close_session();
        if let Err(e) = handler.prepare(&path, orientation) {
            handler.abandon_prepared();
            self.diagnostics
                .error(&format!("could not prepare recorder for {}", path.display()), Some(&e));
            self.restore_preview();
            return;
        }

        match self.open_record_session(&handler) {
            Ok(()) => {
                self.diagnostics
                    .info(&format!("recording {} to {}", handler.id(), path.display()));
                self.recording = Some(handler);
                self.transition(CameraState::RecordingVideo);
            }
            Err(e) => {
                handler.abandon_prepared();
                self.diagnostics
                    .error(&format!("could not start recording {}", handler.id()), Some(&e));
                self.restore_preview();
            }
        }
    }

    fn open_record_session(&mut self, handler: &VideoHandler) -> Result<(), CameraError> {
        let surface = handler.surface();
        let mut outputs = vec![handler.output_config()];
        let mut targets = vec![surface];
        if let Some(preview) = self.session.preview() {
            outputs.push(preview.output_config());
            targets.push(preview.target);
        }

        let token = self.fresh_token();
        self.lifecycle.configure(token, &outputs)?;
        self.token = token;

        let record = NativeRequest::new(RequestTemplate::Record, targets)
            .with_modes(AfMode::ContinuousVideo, AeMode::On);
        self.native_session()?.set_repeating(&record)?;
        handler.begin()
    }

    fn stop_video(&mut self, handler: VideoHandler) {
        let is_current = self.recording.as_ref() == Some(&handler);
        if self.state != CameraState::RecordingVideo || !is_current {
            self.diagnostics
                .warning(&format!("{} is not recording on this camera", handler.id()));
            return;
        }

        self.recording = None;
        match handler.stop() {
            Ok(path) => self
                .diagnostics
                .info(&format!("recording saved to {}", path.display())),
            Err(e) => self
                .diagnostics
                .error(&format!("recorder for {} failed to stop", handler.id()), Some(&e)),
        }
        self.restore_preview();
    }

    /// Rebuild the preview session, dropping to `WaitingDeviceOpen` if that fails.
    fn restore_preview(&mut self) {
        match self.configure_preview() {
            Ok(()) => self.transition(CameraState::Preview),
            Err(e) => {
                self.diagnostics
                    .error("could not rebuild the preview session", Some(&e));
                self.lifecycle.close();
                self.transition(CameraState::WaitingDeviceOpen);
            }
        }
    }

    fn stop_recorder(&mut self) {
        if let Some(handler) = self.recording.take() {
            if let Err(e) = handler.stop() {
                self.diagnostics
                    .warning(&format!("recorder for {} failed to stop: {}", handler.id(), e));
            }
        }
    }

    fn teardown(&mut self) {
        if let Some(inflight) = self.current.take() {
            self.diagnostics.info(&format!(
                "still request #{} discarded by pause",
                inflight.request.sequence()
            ));
        }
        self.pending_stills.clear();
        self.stop_recorder();
        // Starts still queued behind the shutdown will never run.
        for handler in self.session.video_handlers() {
            handler.abandon_prepared();
        }
        if !self.lifecycle.close() {
            self.diagnostics.warning("close requested with no camera open");
        }
        self.transition(CameraState::WaitingDeviceOpen);
    }
}
