//! Simulated camera backend
//!
//! A scriptable [`DeviceManager`] that answers synchronously through the
//! device event channel, the way a real HAL answers from its own threads.
//! Convergence is driven by scripts: an AF trigger replays the focus script
//! as capture results, a precapture trigger replays the precapture script.

use super::synthetic_data::synthetic_still_image;
use crate::errors::CameraError;
use crate::permissions::PermissionInfo;
use crate::platform::{
    AePrecaptureTrigger, AeState, AfState, AfTrigger, CameraDevice, CaptureResult, DeviceEvents,
    DeviceManager, NativeRequest, NativeSession, OutputConfig, OutputKind, RequestTemplate,
    SessionToken,
};
use crate::sync::lock;
use crate::types::{DeviceId, DeviceInfo, LensFacing, Orientation, Size};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One request as the simulated session received it.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedRequest {
    pub token: SessionToken,
    pub repeating: bool,
    pub request: NativeRequest,
}

struct SimState {
    permission: PermissionInfo,
    open_delay: Duration,
    focus_script: Vec<(Option<AfState>, Option<AeState>)>,
    precapture_script: Vec<Option<AeState>>,
    silent_focus: bool,
    fail_next_still: Option<String>,
    fail_next_open: Option<String>,
    open_devices: HashSet<DeviceId>,
    live_events: Option<DeviceEvents>,
    sessions: Vec<Vec<OutputConfig>>,
    submitted: Vec<SubmittedRequest>,
    open_requests: usize,
    closes: usize,
    repeating_stops: usize,
    next_request_id: u64,
    next_frame: u64,
}

struct SimInner {
    devices: Vec<DeviceInfo>,
    state: Mutex<SimState>,
}

/// Scriptable in-process camera backend.
#[derive(Clone)]
pub struct SimulatedCameraManager {
    inner: Arc<SimInner>,
}

impl SimulatedCameraManager {
    /// Back camera "0" and front camera "1"
    pub fn new() -> Self {
        Self::with_devices(vec![
            Self::device_info("0", "Simulated back camera", LensFacing::Back),
            Self::device_info("1", "Simulated front camera", LensFacing::Front),
        ])
    }

    pub fn with_devices(devices: Vec<DeviceInfo>) -> Self {
        Self {
            inner: Arc::new(SimInner {
                devices,
                state: Mutex::new(SimState {
                    permission: PermissionInfo::granted(),
                    open_delay: Duration::ZERO,
                    focus_script: vec![
                        (Some(AfState::ActiveScan), Some(AeState::Searching)),
                        (Some(AfState::FocusedLocked), Some(AeState::Converged)),
                    ],
                    precapture_script: vec![Some(AeState::Precapture), Some(AeState::Converged)],
                    silent_focus: false,
                    fail_next_still: None,
                    fail_next_open: None,
                    open_devices: HashSet::new(),
                    live_events: None,
                    sessions: Vec::new(),
                    submitted: Vec::new(),
                    open_requests: 0,
                    closes: 0,
                    repeating_stops: 0,
                    next_request_id: 1,
                    next_frame: 1,
                }),
            }),
        }
    }

    pub fn device_info(id: &str, name: &str, facing: LensFacing) -> DeviceInfo {
        DeviceInfo {
            id: DeviceId::new(id),
            name: name.to_string(),
            facing,
            sensor_orientation: match facing {
                LensFacing::Front => Orientation::Deg270,
                _ => Orientation::Deg90,
            },
            supports_autofocus: true,
            supports_flash: facing == LensFacing::Back,
            still_sizes: vec![Size::new(4032, 3024), Size::new(1920, 1080), Size::new(640, 480)],
        }
    }

    pub fn set_permission(&self, permission: PermissionInfo) {
        lock(&self.inner.state).permission = permission;
    }

    /// Delay between the open request and the opened callback
    pub fn set_open_delay(&self, delay: Duration) {
        lock(&self.inner.state).open_delay = delay;
    }

    /// Results replayed after each AF trigger
    pub fn set_focus_script(&self, script: Vec<(Option<AfState>, Option<AeState>)>) {
        lock(&self.inner.state).focus_script = script;
    }

    /// AE states replayed after each precapture trigger
    pub fn set_precapture_script(&self, script: Vec<Option<AeState>>) {
        lock(&self.inner.state).precapture_script = script;
    }

    /// While set, AF triggers produce no results at all
    pub fn set_silent_focus(&self, silent: bool) {
        lock(&self.inner.state).silent_focus = silent;
    }

    pub fn fail_next_still(&self, reason: impl Into<String>) {
        lock(&self.inner.state).fail_next_still = Some(reason.into());
    }

    /// The next open answers with a device error instead of a handle
    pub fn fail_next_open(&self, reason: impl Into<String>) {
        lock(&self.inner.state).fail_next_open = Some(reason.into());
    }

    /// Report a disconnect to whoever opened last. False if nobody listens.
    pub fn disconnect(&self) -> bool {
        let events = lock(&self.inner.state).live_events.clone();
        events.is_some_and(|e| e.disconnected())
    }

    pub fn inject_error(&self, message: &str) -> bool {
        let events = lock(&self.inner.state).live_events.clone();
        events.is_some_and(|e| e.error(message))
    }

    pub fn submitted(&self) -> Vec<SubmittedRequest> {
        lock(&self.inner.state).submitted.clone()
    }

    /// Output sets of every capture session created so far
    pub fn sessions(&self) -> Vec<Vec<OutputConfig>> {
        lock(&self.inner.state).sessions.clone()
    }

    pub fn open_requests(&self) -> usize {
        lock(&self.inner.state).open_requests
    }

    pub fn close_count(&self) -> usize {
        lock(&self.inner.state).closes
    }

    /// Number of `stop_repeating` calls across all sessions
    pub fn repeating_stops(&self) -> usize {
        lock(&self.inner.state).repeating_stops
    }

    pub fn is_open(&self, id: &DeviceId) -> bool {
        lock(&self.inner.state).open_devices.contains(id)
    }

    fn deliver_open(inner: &Arc<SimInner>, id: DeviceId, events: DeviceEvents) {
        let failure = {
            let mut state = lock(&inner.state);
            match state.fail_next_open.take() {
                Some(reason) => Some(reason),
                None if state.open_devices.contains(&id) => Some(format!("camera {} in use", id)),
                None => {
                    state.open_devices.insert(id.clone());
                    None
                }
            }
        };
        match failure {
            Some(reason) => {
                events.error(reason);
            }
            None => {
                let device = SimulatedDevice {
                    id,
                    inner: inner.clone(),
                    events: events.clone(),
                    closed: false,
                };
                // A refused post drops the device, which closes it.
                events.opened(Box::new(device));
            }
        }
    }
}

impl Default for SimulatedCameraManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceManager for SimulatedCameraManager {
    fn list_devices(&self) -> Result<Vec<DeviceId>, CameraError> {
        Ok(self.inner.devices.iter().map(|d| d.id.clone()).collect())
    }

    fn characteristics(&self, id: &DeviceId) -> Result<DeviceInfo, CameraError> {
        self.inner
            .devices
            .iter()
            .find(|d| &d.id == id)
            .cloned()
            .ok_or_else(|| CameraError::DeviceUnavailable(format!("unknown camera {}", id)))
    }

    fn permission(&self) -> PermissionInfo {
        lock(&self.inner.state).permission.clone()
    }

    fn open(&self, id: &DeviceId, events: DeviceEvents) -> Result<(), CameraError> {
        if !self.inner.devices.iter().any(|d| &d.id == id) {
            return Err(CameraError::DeviceUnavailable(format!("unknown camera {}", id)));
        }
        let delay = {
            let mut state = lock(&self.inner.state);
            state.open_requests += 1;
            state.live_events = Some(events.clone());
            state.open_delay
        };

        let inner = self.inner.clone();
        let id = id.clone();
        if delay.is_zero() {
            Self::deliver_open(&inner, id, events);
        } else {
            std::thread::Builder::new()
                .name("shutterbug-sim-open".to_string())
                .spawn(move || {
                    std::thread::sleep(delay);
                    Self::deliver_open(&inner, id, events);
                })
                .map_err(|e| CameraError::Io(format!("spawn failed: {e}")))?;
        }
        Ok(())
    }
}

struct SimulatedDevice {
    id: DeviceId,
    inner: Arc<SimInner>,
    events: DeviceEvents,
    closed: bool,
}

impl CameraDevice for SimulatedDevice {
    fn id(&self) -> &DeviceId {
        &self.id
    }

    fn create_capture_session(
        &mut self,
        token: SessionToken,
        outputs: &[OutputConfig],
    ) -> Result<Box<dyn NativeSession>, CameraError> {
        if self.closed {
            return Err(CameraError::device("device is closed"));
        }
        lock(&self.inner.state).sessions.push(outputs.to_vec());
        Ok(Box::new(SimulatedSession {
            token,
            outputs: outputs.to_vec(),
            inner: self.inner.clone(),
            events: self.events.clone(),
            repeating: false,
            closed: false,
        }))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut state = lock(&self.inner.state);
        state.open_devices.remove(&self.id);
        state.closes += 1;
    }
}

impl Drop for SimulatedDevice {
    fn drop(&mut self) {
        self.close();
    }
}

struct SimulatedSession {
    token: SessionToken,
    outputs: Vec<OutputConfig>,
    inner: Arc<SimInner>,
    events: DeviceEvents,
    // AF/AE results are only reported while a repeating request streams
    repeating: bool,
    closed: bool,
}

impl SimulatedSession {
    fn record(&self, request: &NativeRequest, repeating: bool) -> Result<(), CameraError> {
        if self.closed {
            return Err(CameraError::device("capture session is closed"));
        }
        for target in &request.targets {
            if !self.outputs.iter().any(|o| o.id == *target) {
                return Err(CameraError::device(format!(
                    "{} is not an output of this session",
                    target
                )));
            }
        }
        lock(&self.inner.state).submitted.push(SubmittedRequest {
            token: self.token,
            repeating,
            request: request.clone(),
        });
        Ok(())
    }

    fn next_frame(state: &mut SimState) -> u64 {
        let n = state.next_frame;
        state.next_frame += 1;
        n
    }
}

impl NativeSession for SimulatedSession {
    fn set_repeating(&mut self, request: &NativeRequest) -> Result<(), CameraError> {
        self.record(request, true)?;
        self.repeating = true;
        Ok(())
    }

    fn stop_repeating(&mut self) -> Result<(), CameraError> {
        if self.closed {
            return Err(CameraError::device("capture session is closed"));
        }
        self.repeating = false;
        lock(&self.inner.state).repeating_stops += 1;
        Ok(())
    }

    fn capture(&mut self, request: &NativeRequest) -> Result<u64, CameraError> {
        self.record(request, false)?;

        let mut state = lock(&self.inner.state);
        let request_id = state.next_request_id;
        state.next_request_id += 1;

        if request.template == RequestTemplate::StillCapture {
            if let Some(reason) = state.fail_next_still.take() {
                drop(state);
                self.events.capture_failed(self.token, request_id, reason);
                return Ok(request_id);
            }
            let mut images = Vec::new();
            for target in &request.targets {
                let still = self.outputs.iter().find(|o| o.id == *target);
                if let Some(OutputConfig {
                    kind: OutputKind::Still { format, .. },
                    size,
                    ..
                }) = still
                {
                    let mut image = synthetic_still_image(Self::next_frame(&mut state), *size, *format);
                    image.metadata = request.extras.clone();
                    images.push((*target, image));
                }
            }
            drop(state);
            for (output, image) in images {
                self.events.image_available(output, image);
            }
        } else if request.af_trigger == AfTrigger::Start {
            let script = if state.silent_focus || !self.repeating {
                Vec::new()
            } else {
                state.focus_script.clone()
            };
            let results: Vec<CaptureResult> = script
                .into_iter()
                .map(|(af, ae)| CaptureResult::new(Self::next_frame(&mut state), af, ae))
                .collect();
            drop(state);
            for result in results {
                self.events.capture_result(self.token, result);
            }
        } else if request.ae_precapture_trigger == AePrecaptureTrigger::Start {
            let script = if self.repeating {
                state.precapture_script.clone()
            } else {
                Vec::new()
            };
            let results: Vec<CaptureResult> = script
                .into_iter()
                .map(|ae| {
                    CaptureResult::new(Self::next_frame(&mut state), Some(AfState::FocusedLocked), ae)
                })
                .collect();
            drop(state);
            for result in results {
                self.events.capture_result(self.token, result);
            }
        } else {
            drop(state);
        }

        self.events.capture_completed(self.token, request_id);
        Ok(request_id)
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
