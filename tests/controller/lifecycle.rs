use super::support::*;
use shutterbug::capture::invariants::{CURRENT_INVARIANT, HANDLE_INVARIANT};
use shutterbug::capture::{CameraController, CameraState, OpenCloseLock, RequestConfig, Session};
use shutterbug::errors::{CameraError, ErrorKind};
use shutterbug::invariant_ppt::{contract_test, violations};
use shutterbug::permissions::PermissionInfo;
use shutterbug::still::{CapturedImage, FrameDisposition, StillHandler};
use shutterbug::testing::{CollectingDiagnostics, SimulatedCameraManager};
use shutterbug::types::{DeviceId, ImageFormat, Size};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[test]
fn test_start_without_preview_or_handlers_is_rejected() {
    let rig = rig();
    let err = rig
        .controller
        .start(Session::builder("0").build())
        .unwrap_err();
    assert!(matches!(err, CameraError::PreconditionViolation(_)));
    std::thread::sleep(QUIET);
    assert_eq!(rig.sim.open_requests(), 0);
    assert!(!rig.controller.is_running());
    assert_eq!(rig.controller.state(), CameraState::WaitingDeviceOpen);
}

#[test]
fn test_pause_resume_keeps_queued_requests() {
    let rig = rig();
    let (still, frames) = still_handler();
    start_and_wait_preview(&rig.controller, preview_session(&still));

    rig.controller.pause().unwrap();
    assert_eq!(rig.controller.state(), CameraState::WaitingDeviceOpen);
    assert!(!rig.sim.is_open(&DeviceId::from("0")));
    assert!(still.output().is_none(), "pause closes the frame reader");

    for i in 0..3 {
        rig.controller
            .request_still_capture(&still, None, RequestConfig::tagged("index", i))
            .unwrap();
    }
    assert_eq!(rig.controller.queue_len(), 3);
    assert!(frames.recv_timeout(QUIET).is_err());

    rig.controller.resume().unwrap();
    assert!(rig.controller.wait_for_state(CameraState::Preview, WAIT));
    assert_eq!(index_tags(&recv_frames(&frames, 3)), vec![0, 1, 2]);
    assert_eq!(rig.sim.open_requests(), 2);
}

#[test]
fn test_pause_discards_in_flight_request_quietly() {
    let rig = rig();
    rig.sim.set_silent_focus(true);
    let (still, _frames) = still_handler();
    start_and_wait_preview(&rig.controller, preview_session(&still));

    rig.controller
        .request_still_capture(&still, None, RequestConfig::none())
        .unwrap();
    assert!(rig
        .controller
        .wait_for_state(CameraState::WaitingFocusLock, WAIT));
    rig.controller.pause().unwrap();

    assert!(rig
        .diagnostics
        .infos()
        .iter()
        .any(|d| d.message.contains("discarded by pause")));
    assert!(rig.diagnostics.errors().is_empty());
}

#[test]
fn test_handler_cannot_bind_to_two_live_controllers() {
    let a = rig();
    let b = rig();
    let (still, _frames) = still_handler();
    start_and_wait_preview(&a.controller, preview_session(&still));

    let err = b.controller.start(preview_session(&still)).unwrap_err();
    assert!(matches!(err, CameraError::HandlerAlreadyBound { .. }));
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert_eq!(still.bound_to(), Some(a.controller.id()));
    assert_eq!(b.sim.open_requests(), 0);

    // Once the first controller is gone the handler is free again.
    drop(a);
    start_and_wait_preview(&b.controller, preview_session(&still));
    assert_eq!(still.bound_to(), Some(b.controller.id()));
}

#[test]
fn test_lock_contention_reports_timeout() {
    let lock = OpenCloseLock::new();
    let permit = lock
        .try_acquire_for(Duration::ZERO)
        .expect("fresh lock is free");

    let sim = SimulatedCameraManager::new();
    let diagnostics = CollectingDiagnostics::new();
    let controller = CameraController::builder()
        .config(test_config())
        .device_manager(Arc::new(sim.clone()))
        .diagnostics(diagnostics.clone())
        .open_close_lock(lock.clone())
        .build();
    let (still, _frames) = still_handler();

    controller.start(preview_session(&still)).unwrap();
    assert!(diagnostics.wait_for(WAIT, |d| {
        matches!(d.cause, Some(CameraError::LockTimeout { .. }))
    }));
    assert_eq!(controller.state(), CameraState::WaitingDeviceOpen);
    assert_eq!(sim.open_requests(), 0);

    drop(permit);
    controller.pause().unwrap();
    controller.resume().unwrap();
    assert!(controller.wait_for_state(CameraState::Preview, WAIT));
}

#[test]
fn test_disconnect_mid_focus_abandons_request() {
    let rig = rig();
    rig.sim.set_silent_focus(true);
    let (still, frames) = still_handler();
    start_and_wait_preview(&rig.controller, preview_session(&still));

    rig.controller
        .request_still_capture(&still, None, RequestConfig::none())
        .unwrap();
    assert!(rig
        .controller
        .wait_for_state(CameraState::WaitingFocusLock, WAIT));

    assert!(rig.sim.disconnect());
    assert!(rig
        .controller
        .wait_for_state(CameraState::WaitingDeviceOpen, WAIT));
    assert!(rig.diagnostics.wait_for_error("abandoned", WAIT));
    assert!(rig.diagnostics.wait_for_error("disconnected", WAIT));
    assert!(!rig.sim.is_open(&DeviceId::from("0")));
    assert!(frames.recv_timeout(QUIET).is_err());
}

#[test]
fn test_device_error_closes_handle() {
    let rig = rig();
    let (still, _frames) = still_handler();
    start_and_wait_preview(&rig.controller, preview_session(&still));

    assert!(rig.sim.inject_error("overheated"));
    assert!(rig
        .controller
        .wait_for_state(CameraState::WaitingDeviceOpen, WAIT));
    assert!(rig.diagnostics.wait_for_error("overheated", WAIT));
    assert_eq!(rig.sim.close_count(), 1);
}

#[test]
fn test_permission_denied_blocks_start() {
    let rig = rig();
    rig.sim
        .set_permission(PermissionInfo::denied("user said no"));
    let (still, _frames) = still_handler();

    let err = rig.controller.start(preview_session(&still)).unwrap_err();
    assert!(matches!(err, CameraError::PreconditionViolation(ref m) if m.contains("user said no")));
    assert_eq!(rig.sim.open_requests(), 0);
    assert_eq!(rig.diagnostics.warnings().len(), 1);
}

#[test]
fn test_unknown_device_is_reported_unavailable() {
    let rig = rig();
    let (still, _frames) = still_handler();
    let session = Session::builder("42")
        .preview(preview())
        .still_handler(still)
        .build();

    rig.controller.start(session).unwrap();
    assert!(rig.diagnostics.wait_for(WAIT, |d| {
        matches!(d.cause, Some(CameraError::DeviceUnavailable(_)))
    }));
    assert_eq!(rig.controller.state(), CameraState::WaitingDeviceOpen);
}

#[test]
fn test_open_failure_leaves_device_closed() {
    let rig = rig();
    rig.sim.fail_next_open("camera service busy");
    let (still, _frames) = still_handler();

    rig.controller.start(preview_session(&still)).unwrap();
    assert!(rig.diagnostics.wait_for_error("camera service busy", WAIT));
    std::thread::sleep(QUIET);
    assert_eq!(rig.controller.state(), CameraState::WaitingDeviceOpen);
    assert!(!rig.controller.open_close_lock().is_held());
}

#[test]
fn test_controller_calls_from_worker_thread_are_rejected() {
    let rig = rig();
    let slot: Arc<Mutex<Option<Arc<CameraController>>>> = Arc::new(Mutex::new(None));
    let (tx, rx) = crossbeam_channel::unbounded();

    let sink_slot = slot.clone();
    let still = StillHandler::new(ImageFormat::Jpeg, Size::new(64, 48), move |_: &CapturedImage| {
        let controller = sink_slot.lock().unwrap().clone();
        if let Some(controller) = controller {
            let _ = tx.send(controller.pause());
        }
        FrameDisposition::Close
    });

    let controller = Arc::new(rig.controller);
    *slot.lock().unwrap() = Some(controller.clone());
    start_and_wait_preview(&controller, preview_session(&still));
    controller
        .request_still_capture(&still, None, RequestConfig::none())
        .unwrap();

    let result = rx.recv_timeout(WAIT).expect("sink ran");
    assert!(matches!(result, Err(CameraError::PreconditionViolation(ref m)) if m.contains("worker thread")));
    assert!(controller.is_running());

    // Break the controller -> handler -> sink -> controller cycle.
    slot.lock().unwrap().take();
}

#[test]
fn test_replacing_session_unbinds_old_handlers() {
    let rig = rig();
    let (first, _f1) = still_handler();
    let (second, f2) = still_handler();
    start_and_wait_preview(&rig.controller, preview_session(&first));

    start_and_wait_preview(&rig.controller, preview_session(&second));
    assert_eq!(first.bound_to(), None);
    assert_eq!(second.bound_to(), Some(rig.controller.id()));
    assert_eq!(rig.sim.open_requests(), 2);
    assert_eq!(rig.sim.close_count(), 1);

    assert!(rig
        .controller
        .request_still_capture(&first, None, RequestConfig::none())
        .is_err());
    rig.controller
        .request_still_capture(&second, None, RequestConfig::none())
        .unwrap();
    recv_frames(&f2, 1);
}

#[test]
fn test_shared_lock_second_controller_sees_device_in_use() {
    let lock = OpenCloseLock::new();
    let sim = SimulatedCameraManager::new();
    let build = |diagnostics: Arc<CollectingDiagnostics>| {
        CameraController::builder()
            .config(test_config())
            .device_manager(Arc::new(sim.clone()))
            .diagnostics(diagnostics)
            .open_close_lock(lock.clone())
            .build()
    };
    let diag_a = CollectingDiagnostics::new();
    let diag_b = CollectingDiagnostics::new();
    let a = build(diag_a.clone());
    let b = build(diag_b.clone());

    let (still_a, _fa) = still_handler();
    let (still_b, _fb) = still_handler();
    start_and_wait_preview(&a, preview_session(&still_a));
    b.start(preview_session(&still_b)).unwrap();

    assert!(diag_b.wait_for_error("in use", WAIT));
    std::thread::sleep(QUIET);
    assert_eq!(b.state(), CameraState::WaitingDeviceOpen);
    assert_eq!(a.state(), CameraState::Preview);
    assert!(!lock.is_held());
}

#[test]
fn test_dropping_controller_closes_device() {
    let rig = rig();
    let (still, _frames) = still_handler();
    start_and_wait_preview(&rig.controller, preview_session(&still));
    assert!(rig.sim.is_open(&DeviceId::from("0")));

    let sim = rig.sim.clone();
    drop(rig);
    assert!(!sim.is_open(&DeviceId::from("0")));
    assert_eq!(still.bound_to(), None);
}

#[test]
fn test_state_machine_invariants_hold() {
    let rig = rig();
    let (still, frames) = still_handler();
    start_and_wait_preview(&rig.controller, preview_session(&still));
    rig.controller
        .request_still_capture(&still, None, RequestConfig::none())
        .unwrap();
    recv_frames(&frames, 1);
    rig.controller.pause().unwrap();

    contract_test("capture state machine", &[HANDLE_INVARIANT, CURRENT_INVARIANT]);
    let machine_violations: Vec<String> = violations()
        .into_iter()
        .filter(|v| v.starts_with("[machine]"))
        .collect();
    assert!(machine_violations.is_empty(), "{:?}", machine_violations);
}
