use shutterbug::capture::{CameraController, CameraState, PreviewSpec, Session};
use shutterbug::config::ShutterbugConfig;
use shutterbug::still::{FrameDisposition, StillHandler};
use shutterbug::testing::{
    ChannelFrameSink, CollectingDiagnostics, DeliveredFrame, SimulatedCameraManager,
};
use shutterbug::types::{ImageFormat, OutputId, Size};
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(5);
pub const QUIET: Duration = Duration::from_millis(200);

/// Short lock timeout so contention tests finish quickly
pub fn test_config() -> ShutterbugConfig {
    let mut config = ShutterbugConfig::default();
    config.device.lock_timeout_ms = 200;
    config.device.worker_join_timeout_ms = 3000;
    config
}

pub struct Rig {
    pub sim: SimulatedCameraManager,
    pub diagnostics: Arc<CollectingDiagnostics>,
    pub controller: CameraController,
}

pub fn rig() -> Rig {
    rig_with(test_config())
}

pub fn rig_with(config: ShutterbugConfig) -> Rig {
    let sim = SimulatedCameraManager::new();
    let diagnostics = CollectingDiagnostics::new();
    let controller = CameraController::builder()
        .config(config)
        .device_manager(Arc::new(sim.clone()))
        .diagnostics(diagnostics.clone())
        .build();
    Rig {
        sim,
        diagnostics,
        controller,
    }
}

pub fn preview() -> PreviewSpec {
    PreviewSpec::new(OutputId::next(), Size::new(1280, 720))
}

pub fn still_handler() -> (StillHandler, Receiver<DeliveredFrame>) {
    still_handler_with(FrameDisposition::Close)
}

pub fn still_handler_with(disposition: FrameDisposition) -> (StillHandler, Receiver<DeliveredFrame>) {
    let (sink, frames) = ChannelFrameSink::with_disposition(disposition);
    (
        StillHandler::new(ImageFormat::Jpeg, Size::new(640, 480), sink),
        frames,
    )
}

pub fn preview_session(still: &StillHandler) -> Session {
    Session::builder("0")
        .preview(preview())
        .still_handler(still.clone())
        .build()
}

pub fn start_and_wait_preview(controller: &CameraController, session: Session) {
    controller.start(session).expect("start should succeed");
    assert!(
        controller.wait_for_state(CameraState::Preview, WAIT),
        "camera never reached preview, history {:?}",
        controller.state_history()
    );
}

/// Poll `done` until it holds or `WAIT` runs out
pub fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + WAIT;
    while std::time::Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    done()
}

pub fn recv_frames(frames: &Receiver<DeliveredFrame>, n: usize) -> Vec<DeliveredFrame> {
    (0..n)
        .map(|i| {
            frames
                .recv_timeout(WAIT)
                .unwrap_or_else(|e| panic!("frame {} of {} never arrived: {}", i + 1, n, e))
        })
        .collect()
}

pub fn index_tags(frames: &[DeliveredFrame]) -> Vec<i64> {
    frames
        .iter()
        .map(|f| f.tags.get("index").copied().unwrap_or(-1))
        .collect()
}
