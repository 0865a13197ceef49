//! Public capture controller
//!
//! [`CameraController`] is the caller-facing half of the capture core. It owns
//! the request queue and the state mirror, binds handlers, and starts and
//! stops the camera worker that runs the state machine. Public methods never
//! wait on device work, except `pause` which joins the worker with a bounded
//! timeout.

use super::events::WorkerTask;
use super::lifecycle::{DeviceLifecycle, OpenCloseLock};
use super::machine::{Machine, MachineParts};
use super::mirror::StateMirror;
use super::queue::RequestQueue;
use super::request::{CaptureRequest, RequestConfig};
use super::session::Session;
use super::state::CameraState;
use crate::config::ShutterbugConfig;
use crate::diagnostics::{DiagnosticsSink, LogDiagnostics};
use crate::errors::CameraError;
use crate::platform::{DeviceEvents, DeviceManager};
use crate::recording::{RecordingConfig, VideoHandler};
use crate::still::{HandlerContext, StillHandler};
use crate::sync::lock;
use crate::timing::CaptureClock;
use crate::types::{ControllerId, Orientation};
use crossbeam_channel::Sender;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{JoinHandle, ThreadId};
use std::time::{Duration, Instant};

const WORKER_THREAD_NAME: &str = "shutterbug-camera-worker";

struct Worker {
    tx: Sender<WorkerTask>,
    handle: JoinHandle<()>,
    stop: Arc<AtomicBool>,
}

#[derive(Default)]
struct Runtime {
    session: Option<Session>,
    worker: Option<Worker>,
}

pub struct ControllerBuilder {
    config: ShutterbugConfig,
    manager: Option<Arc<dyn DeviceManager>>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    lock: Option<OpenCloseLock>,
}

impl ControllerBuilder {
    pub fn config(mut self, config: ShutterbugConfig) -> Self {
        self.config = config;
        self
    }

    pub fn device_manager(mut self, manager: Arc<dyn DeviceManager>) -> Self {
        self.manager = Some(manager);
        self
    }

    pub fn diagnostics(mut self, diagnostics: Arc<dyn DiagnosticsSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Share an open/close lock with other controllers of the same device.
    pub fn open_close_lock(mut self, lock: OpenCloseLock) -> Self {
        self.lock = Some(lock);
        self
    }

    pub fn build(self) -> CameraController {
        let recording = RecordingConfig::from(self.config.recording.clone());
        CameraController {
            id: ControllerId::next(),
            config: self.config,
            manager: self.manager,
            diagnostics: self.diagnostics,
            lock: self.lock.unwrap_or_default(),
            queue: Arc::new(RequestQueue::new()),
            mirror: Arc::new(StateMirror::new()),
            clock: CaptureClock::new(),
            recording,
            runtime: Mutex::new(Runtime::default()),
            worker_thread: Mutex::new(None),
        }
    }
}

/// Drives one exclusive camera through a [`Session`].
pub struct CameraController {
    id: ControllerId,
    config: ShutterbugConfig,
    manager: Option<Arc<dyn DeviceManager>>,
    diagnostics: Arc<dyn DiagnosticsSink>,
    lock: OpenCloseLock,
    queue: Arc<RequestQueue>,
    mirror: Arc<StateMirror>,
    clock: CaptureClock,
    recording: RecordingConfig,
    runtime: Mutex<Runtime>,
    // Kept apart from `runtime` so the worker can check it while pause joins.
    worker_thread: Mutex<Option<ThreadId>>,
}

impl CameraController {
    pub fn builder() -> ControllerBuilder {
        ControllerBuilder {
            config: ShutterbugConfig::default(),
            manager: None,
            diagnostics: Arc::new(LogDiagnostics),
            lock: None,
        }
    }

    /// Controller with default configuration, logging diagnostics.
    pub fn new(manager: Arc<dyn DeviceManager>) -> Self {
        Self::builder().device_manager(manager).build()
    }

    pub fn id(&self) -> ControllerId {
        self.id
    }

    pub fn config(&self) -> &ShutterbugConfig {
        &self.config
    }

    pub fn open_close_lock(&self) -> &OpenCloseLock {
        &self.lock
    }

    pub fn session(&self) -> Option<Session> {
        lock(&self.runtime).session.clone()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.runtime).worker.is_some()
    }

    /// Last state published by the camera worker
    pub fn state(&self) -> CameraState {
        self.mirror.get()
    }

    pub fn wait_for_state(&self, state: CameraState, timeout: Duration) -> bool {
        self.mirror.wait_for(state, timeout)
    }

    /// Recent state transitions, oldest first
    pub fn state_history(&self) -> Vec<CameraState> {
        self.mirror.history()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Sequence numbers of queued requests, oldest first
    pub fn pending_requests(&self) -> Vec<u64> {
        self.queue.pending_sequences()
    }

    /// Replace the active session and open its device.
    ///
    /// Any previous session is stopped first; its handlers not carried into
    /// `session` are unbound. Queued requests survive.
    pub fn start(&self, session: Session) -> Result<(), CameraError> {
        self.guard_worker_thread("start")?;
        session.validate().map_err(|e| self.reject(e))?;
        if let Some(manager) = &self.manager {
            manager
                .permission()
                .ensure_granted()
                .map_err(|e| self.reject(e))?;
        }

        self.bind_handlers(&session).map_err(|e| self.reject(e))?;

        let (old_session, old_worker) = {
            let mut rt = lock(&self.runtime);
            (rt.session.replace(session.clone()), rt.worker.take())
        };
        let stopped = match old_worker {
            Some(worker) => self.stop_worker(worker),
            None => Ok(()),
        };
        if let Some(old) = old_session {
            self.release_replaced(&old, &session);
        }
        if let Err(e) = stopped {
            self.diagnostics
                .warning(&format!("previous camera worker did not stop cleanly: {}", e));
        }

        let mut rt = lock(&self.runtime);
        let worker = self.spawn_worker(&session)?;
        rt.worker = Some(worker);
        self.diagnostics.info(&format!(
            "{} started session on camera {}",
            self.id,
            session.device_id()
        ));
        Ok(())
    }

    /// Stop the camera worker, closing the device. Queued requests are kept.
    pub fn pause(&self) -> Result<(), CameraError> {
        self.guard_worker_thread("pause")?;
        let (worker, session) = {
            let mut rt = lock(&self.runtime);
            (rt.worker.take(), rt.session.clone())
        };
        let worker = match worker {
            Some(w) => w,
            None => {
                self.diagnostics.warning("pause with no running camera worker");
                return Ok(());
            }
        };

        let result = self.stop_worker(worker);
        if let Some(session) = session {
            for handler in session.still_handlers() {
                handler.close();
            }
        }
        self.diagnostics.info(&format!(
            "{} paused with {} request(s) queued",
            self.id,
            self.queue.len()
        ));
        result
    }

    /// Restart the worker for the current session.
    pub fn resume(&self) -> Result<(), CameraError> {
        self.guard_worker_thread("resume")?;
        let mut rt = lock(&self.runtime);
        if rt.worker.is_some() {
            self.diagnostics.warning("resume while the camera worker is running");
            return Ok(());
        }
        let session = rt
            .session
            .clone()
            .ok_or_else(|| self.reject(CameraError::precondition("resume before start")))?;

        let ctx = self.handler_context();
        for handler in session.still_handlers() {
            handler.initialize(&ctx).map_err(|e| self.reject(e))?;
        }
        rt.worker = Some(self.spawn_worker(&session)?);
        self.diagnostics.info(&format!("{} resumed", self.id));
        Ok(())
    }

    /// Queue a still capture for `handler`, returning the request sequence.
    ///
    /// Never waits on the device: if the camera sits in `Preview` the worker
    /// is nudged, otherwise the request waits for the next return to `Preview`.
    ///
    /// While running, the handler must have a live frame reader. A paused
    /// controller has closed every reader and still accepts requests; they
    /// drain after `resume`.
    pub fn request_still_capture(
        &self,
        handler: &StillHandler,
        precapture_config: Option<RequestConfig>,
        capture_config: RequestConfig,
    ) -> Result<u64, CameraError> {
        let rt = lock(&self.runtime);
        let session = rt
            .session
            .as_ref()
            .ok_or_else(|| self.reject(CameraError::precondition("no session started")))?;
        if handler.bound_to() != Some(self.id) {
            return Err(self.reject(CameraError::precondition(format!(
                "{} is not bound to {}",
                handler.id(),
                self.id
            ))));
        }
        if !session.contains_still(handler) {
            return Err(self.reject(CameraError::precondition(format!(
                "{} is not part of the current session",
                handler.id()
            ))));
        }
        if rt.worker.is_some() && handler.output().is_none() {
            return Err(self.reject(CameraError::precondition(format!(
                "{} has no live output target",
                handler.id()
            ))));
        }

        let request = CaptureRequest::new(handler.clone(), precapture_config, capture_config);
        let sequence = request.sequence();
        let pending = self.queue.enqueue(request);
        self.diagnostics.info(&format!(
            "queued still request #{} for {} ({} pending)",
            sequence,
            handler.id(),
            pending
        ));

        if self.mirror.get() == CameraState::Preview {
            if let Some(worker) = &rt.worker {
                let _ = worker.tx.send(WorkerTask::Drain);
            }
        }
        Ok(sequence)
    }

    /// Ask the worker to switch to recording. Returns the output path.
    ///
    /// Without `path` a timestamped name under the configured recording
    /// directory is used. The switch completes asynchronously; failures are
    /// reported through diagnostics. The handler counts as active from the
    /// moment this returns, so an immediate `stop_video_capture` is accepted.
    pub fn start_video_capture(
        &self,
        handler: &VideoHandler,
        path: Option<PathBuf>,
        orientation: Orientation,
    ) -> Result<PathBuf, CameraError> {
        let rt = lock(&self.runtime);
        let session = rt
            .session
            .as_ref()
            .ok_or_else(|| self.reject(CameraError::precondition("no session started")))?;
        if !session.contains_video(handler) || handler.bound_to() != Some(self.id) {
            return Err(self.reject(CameraError::precondition(format!(
                "{} is not part of the current session",
                handler.id()
            ))));
        }
        let worker = rt
            .worker
            .as_ref()
            .ok_or_else(|| self.reject(CameraError::precondition("camera is paused")))?;
        let state = self.mirror.get();
        if state != CameraState::Preview {
            return Err(self.reject(CameraError::precondition(format!(
                "cannot start recording in state {}",
                state
            ))));
        }

        handler.reserve().map_err(|e| self.reject(e))?;

        let path = path.unwrap_or_else(|| self.recording.next_path());
        let sent = self.send(
            worker,
            WorkerTask::StartVideo {
                handler: handler.clone(),
                path: path.clone(),
                orientation,
            },
        );
        if let Err(e) = sent {
            handler.abandon_prepared();
            return Err(e);
        }
        Ok(path)
    }

    pub fn stop_video_capture(&self, handler: &VideoHandler) -> Result<(), CameraError> {
        if !handler.is_active() {
            return Err(self.reject(CameraError::precondition(format!(
                "{} is not recording",
                handler.id()
            ))));
        }
        let rt = lock(&self.runtime);
        let worker = rt
            .worker
            .as_ref()
            .ok_or_else(|| self.reject(CameraError::precondition("camera is paused")))?;
        self.send(
            worker,
            WorkerTask::StopVideo {
                handler: handler.clone(),
            },
        )
    }

    fn send(&self, worker: &Worker, task: WorkerTask) -> Result<(), CameraError> {
        worker
            .tx
            .send(task)
            .map_err(|_| CameraError::device("camera worker is gone"))
    }

    fn reject(&self, e: CameraError) -> CameraError {
        self.diagnostics.warning(&e.to_string());
        e
    }

    fn on_worker_thread(&self) -> bool {
        *lock(&self.worker_thread) == Some(std::thread::current().id())
    }

    fn guard_worker_thread(&self, operation: &str) -> Result<(), CameraError> {
        if self.on_worker_thread() {
            return Err(self.reject(CameraError::precondition(format!(
                "{} called from the camera worker thread",
                operation
            ))));
        }
        Ok(())
    }

    fn handler_context(&self) -> HandlerContext {
        HandlerContext {
            controller: self.id,
            buffer_depth: self.config.capture.frame_buffer_depth,
            clock: self.clock.clone(),
        }
    }

    /// Bind every handler of `session`, undoing fresh bindings on failure.
    fn bind_handlers(&self, session: &Session) -> Result<(), CameraError> {
        let ctx = self.handler_context();
        let mut fresh_stills = Vec::new();
        let mut fresh_videos = Vec::new();

        let result = (|| -> Result<(), CameraError> {
            for handler in session.still_handlers() {
                let fresh = handler.bound_to() != Some(self.id);
                handler.initialize(&ctx)?;
                if fresh {
                    fresh_stills.push(handler.clone());
                }
            }
            for handler in session.video_handlers() {
                let fresh = handler.bound_to() != Some(self.id);
                handler.bind(self.id)?;
                if fresh {
                    fresh_videos.push(handler.clone());
                }
            }
            Ok(())
        })();

        if result.is_err() {
            for handler in &fresh_stills {
                handler.unbind(self.id);
            }
            for handler in &fresh_videos {
                handler.unbind(self.id);
            }
        }
        result
    }

    fn release_replaced(&self, old: &Session, new: &Session) {
        for handler in old.still_handlers() {
            if !new.contains_still(handler) {
                handler.unbind(self.id);
            }
        }
        for handler in old.video_handlers() {
            if !new.contains_video(handler) {
                handler.unbind(self.id);
            }
        }
    }

    fn spawn_worker(&self, session: &Session) -> Result<Worker, CameraError> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let machine = Machine::new(MachineParts {
            controller: self.id,
            session: session.clone(),
            convergence_timeout: self.config.capture.convergence_timeout(),
            diagnostics: self.diagnostics.clone(),
            queue: self.queue.clone(),
            mirror: self.mirror.clone(),
            lifecycle: DeviceLifecycle::new(
                self.manager.clone(),
                self.lock.clone(),
                self.config.device.lock_timeout(),
            ),
            events: DeviceEvents::new(tx.clone()),
            stop: stop.clone(),
        });

        let handle = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || machine.run(rx))
            .map_err(|e| CameraError::Io(format!("spawn failed: {e}")))?;
        *lock(&self.worker_thread) = Some(handle.thread().id());

        Ok(Worker { tx, handle, stop })
    }

    /// Shut the worker down and join it, bounded by the configured timeout.
    fn stop_worker(&self, worker: Worker) -> Result<(), CameraError> {
        worker.stop.store(true, Ordering::Relaxed);
        let _ = worker.tx.send(WorkerTask::Shutdown);

        // Joining from inside the worker would wait on ourselves.
        if self.on_worker_thread() {
            return Ok(());
        }

        let join_timeout = self.config.device.worker_join_timeout();
        let start = Instant::now();
        let mut handle = Some(worker.handle);
        loop {
            let finished = handle.as_ref().is_some_and(|h| h.is_finished());
            if finished {
                if let Some(h) = handle.take() {
                    if h.join().is_err() {
                        self.diagnostics.error("camera worker panicked", None);
                    }
                }
                break;
            }
            if start.elapsed() >= join_timeout {
                self.diagnostics.warning(&format!(
                    "camera worker did not stop within {} ms; detaching it",
                    join_timeout.as_millis()
                ));
                *lock(&self.worker_thread) = None;
                return Err(CameraError::device("camera worker did not stop in time"));
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        *lock(&self.worker_thread) = None;
        Ok(())
    }
}

impl Drop for CameraController {
    fn drop(&mut self) {
        let (worker, session) = {
            let mut rt = lock(&self.runtime);
            (rt.worker.take(), rt.session.take())
        };
        if let Some(worker) = worker {
            let _ = self.stop_worker(worker);
        }
        if let Some(session) = session {
            for handler in session.still_handlers() {
                handler.unbind(self.id);
            }
            for handler in session.video_handlers() {
                handler.unbind(self.id);
            }
        }
    }
}

impl std::fmt::Debug for CameraController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraController")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("queued", &self.queue.len())
            .finish()
    }
}
