use super::support::*;
use shutterbug::capture::{CameraState, RequestConfig, Session};
use shutterbug::errors::CameraError;
use shutterbug::platform::{AePrecaptureTrigger, AeState, AfState, AfTrigger, RequestTemplate};
use shutterbug::testing::SubmittedRequest;
use shutterbug::still::FrameDisposition;
use std::time::Duration;

fn tagged(i: i64) -> RequestConfig {
    RequestConfig::tagged("index", i)
}

fn label(s: &SubmittedRequest) -> &'static str {
    if s.repeating {
        "repeat"
    } else if s.request.template == RequestTemplate::StillCapture {
        "still"
    } else if s.request.af_trigger == AfTrigger::Start {
        "af-start"
    } else if s.request.af_trigger == AfTrigger::Cancel {
        "af-cancel"
    } else if s.request.ae_precapture_trigger == AePrecaptureTrigger::Start {
        "precapture"
    } else {
        "other"
    }
}

#[test]
fn test_requests_complete_in_fifo_order() {
    let rig = rig();
    let (still, frames) = still_handler();
    start_and_wait_preview(&rig.controller, preview_session(&still));

    for i in 0..5 {
        rig.controller
            .request_still_capture(&still, None, tagged(i))
            .expect("request should be accepted");
    }

    let delivered = recv_frames(&frames, 5);
    assert_eq!(index_tags(&delivered), vec![0, 1, 2, 3, 4]);
    assert!(frames.recv_timeout(QUIET).is_err(), "no extra frames");

    // Every focus cycle returns to Preview before the next one starts.
    let history = rig.controller.state_history();
    let cycles = history
        .iter()
        .filter(|s| **s == CameraState::WaitingFocusLock)
        .count();
    assert_eq!(cycles, 5, "history {:?}", history);
    for pair in history.windows(2) {
        if pair[0] == CameraState::WaitingFocusLock {
            assert_eq!(pair[1], CameraState::Preview, "history {:?}", history);
        }
    }
    assert!(rig.diagnostics.errors().is_empty(), "{:?}", rig.diagnostics.errors());
}

#[test]
fn test_requests_before_open_are_serviced_after_preview() {
    let rig = rig();
    rig.sim.set_open_delay(Duration::from_millis(150));
    let (still, frames) = still_handler();

    rig.controller.start(preview_session(&still)).unwrap();
    assert_eq!(rig.controller.state(), CameraState::WaitingDeviceOpen);
    rig.controller
        .request_still_capture(&still, None, tagged(0))
        .unwrap();
    rig.controller
        .request_still_capture(&still, None, tagged(1))
        .unwrap();

    let delivered = recv_frames(&frames, 2);
    assert_eq!(index_tags(&delivered), vec![0, 1]);
    assert_eq!(rig.controller.queue_len(), 0);
}

#[test]
fn test_precapture_runs_when_exposure_is_searching() {
    let rig = rig();
    rig.sim
        .set_focus_script(vec![(Some(AfState::FocusedLocked), Some(AeState::Searching))]);
    rig.sim
        .set_precapture_script(vec![Some(AeState::Precapture), Some(AeState::Converged)]);
    let (still, frames) = still_handler();
    start_and_wait_preview(&rig.controller, preview_session(&still));

    rig.controller
        .request_still_capture(&still, Some(RequestConfig::precapture_trigger()), tagged(7))
        .unwrap();
    let delivered = recv_frames(&frames, 1);
    assert_eq!(index_tags(&delivered), vec![7]);

    let submitted = rig.sim.submitted();
    let precapture = submitted
        .iter()
        .position(|s| s.request.ae_precapture_trigger == AePrecaptureTrigger::Start)
        .expect("precapture trigger was issued");
    let still_capture = submitted
        .iter()
        .position(|s| s.request.template == RequestTemplate::StillCapture)
        .expect("still was submitted");
    assert!(precapture < still_capture);

    let history = rig.controller.state_history();
    assert!(history.contains(&CameraState::WaitingPrecapture));
    assert!(history.contains(&CameraState::WaitingNonPrecapture));
}

#[test]
fn test_searching_exposure_without_precapture_config_captures_directly() {
    let rig = rig();
    rig.sim
        .set_focus_script(vec![(Some(AfState::FocusedLocked), Some(AeState::Searching))]);
    let (still, frames) = still_handler();
    start_and_wait_preview(&rig.controller, preview_session(&still));

    rig.controller
        .request_still_capture(&still, None, tagged(0))
        .unwrap();
    recv_frames(&frames, 1);

    assert!(rig
        .sim
        .submitted()
        .iter()
        .all(|s| s.request.ae_precapture_trigger == AePrecaptureTrigger::Idle));
    assert!(!rig
        .controller
        .state_history()
        .contains(&CameraState::WaitingPrecapture));
}

#[test]
fn test_unreported_focus_state_counts_as_converged() {
    let rig = rig();
    rig.sim.set_focus_script(vec![(None, None)]);
    let (still, frames) = still_handler();
    start_and_wait_preview(&rig.controller, preview_session(&still));

    rig.controller
        .request_still_capture(&still, Some(RequestConfig::precapture_trigger()), tagged(0))
        .unwrap();
    recv_frames(&frames, 1);
    assert!(!rig
        .controller
        .state_history()
        .contains(&CameraState::WaitingPrecapture));
}

#[test]
fn test_capture_fault_abandons_request_and_continues() {
    let rig = rig();
    let (still, frames) = still_handler();
    start_and_wait_preview(&rig.controller, preview_session(&still));

    rig.sim.fail_next_still("sensor glitch");
    rig.controller
        .request_still_capture(&still, None, tagged(0))
        .unwrap();
    rig.controller
        .request_still_capture(&still, None, tagged(1))
        .unwrap();

    let delivered = recv_frames(&frames, 1);
    assert_eq!(index_tags(&delivered), vec![1]);
    assert!(rig.diagnostics.wait_for_error("sensor glitch", WAIT));
    assert!(rig
        .diagnostics
        .errors()
        .iter()
        .any(|d| d.message.contains("abandoned")));
    assert!(rig.controller.wait_for_state(CameraState::Preview, WAIT));
}

#[test]
fn test_session_without_preview_captures_immediately() {
    let rig = rig();
    let (still, frames) = still_handler();
    let session = Session::builder("0").still_handler(still.clone()).build();
    start_and_wait_preview(&rig.controller, session);

    for i in 0..3 {
        rig.controller
            .request_still_capture(&still, None, tagged(i))
            .unwrap();
    }
    assert_eq!(index_tags(&recv_frames(&frames, 3)), vec![0, 1, 2]);
    assert!(!rig
        .controller
        .state_history()
        .contains(&CameraState::WaitingFocusLock));
    assert!(rig
        .sim
        .submitted()
        .iter()
        .all(|s| s.request.template == RequestTemplate::StillCapture));
}

#[test]
fn test_retained_frames_exhaust_reader_depth() {
    let rig = rig();
    let (still, frames) = still_handler_with(FrameDisposition::KeepOpen);
    start_and_wait_preview(&rig.controller, preview_session(&still));

    for i in 0..3 {
        rig.controller
            .request_still_capture(&still, None, tagged(i))
            .unwrap();
    }
    recv_frames(&frames, 2);
    assert!(rig.diagnostics.wait_for_error("Frame queue full", WAIT));
    assert_eq!(still.retained_count(), 2);

    // Releasing the retained frames frees the reader again.
    drop(still.take_retained());
    rig.controller
        .request_still_capture(&still, None, tagged(3))
        .unwrap();
    assert_eq!(index_tags(&recv_frames(&frames, 1)), vec![3]);
}

#[test]
fn test_convergence_timeout_captures_anyway() {
    let mut config = test_config();
    config.capture.convergence_timeout_ms = 100;
    let rig = rig_with(config);
    rig.sim.set_silent_focus(true);
    let (still, frames) = still_handler();
    start_and_wait_preview(&rig.controller, preview_session(&still));

    rig.controller
        .request_still_capture(&still, None, tagged(0))
        .unwrap();
    recv_frames(&frames, 1);
    assert!(rig
        .diagnostics
        .warnings()
        .iter()
        .any(|d| d.message.contains("did not converge")));
}

#[test]
fn test_request_preconditions() {
    let rig = rig();
    let (still, _frames) = still_handler();

    let err = rig
        .controller
        .request_still_capture(&still, None, RequestConfig::none())
        .unwrap_err();
    assert!(matches!(err, CameraError::PreconditionViolation(_)));

    start_and_wait_preview(&rig.controller, preview_session(&still));
    let (stranger, _) = still_handler();
    let err = rig
        .controller
        .request_still_capture(&stranger, None, RequestConfig::none())
        .unwrap_err();
    assert!(matches!(err, CameraError::PreconditionViolation(_)));

    // Caller-side failures are reported as warnings as well.
    assert!(rig.diagnostics.warnings().len() >= 2);
    assert_eq!(rig.controller.queue_len(), 0);
}

#[test]
fn test_each_still_unlocks_focus_before_the_next_trigger() {
    let rig = rig();
    let (still, frames) = still_handler();
    start_and_wait_preview(&rig.controller, preview_session(&still));

    rig.controller
        .request_still_capture(&still, None, tagged(0))
        .unwrap();
    rig.controller
        .request_still_capture(&still, None, tagged(1))
        .unwrap();
    assert_eq!(index_tags(&recv_frames(&frames, 2)), vec![0, 1]);

    assert!(wait_until(|| rig.sim.submitted().len() >= 9));
    let labels: Vec<&str> = rig.sim.submitted().iter().map(label).collect();
    assert_eq!(
        labels,
        vec![
            "repeat", "af-start", "still", "af-cancel", "repeat", "af-start", "still",
            "af-cancel", "repeat",
        ]
    );
    assert_eq!(rig.sim.repeating_stops(), 2);
    assert!(rig
        .diagnostics
        .warnings()
        .iter()
        .all(|d| !d.message.contains("did not converge")));
}

#[test]
fn test_flash_required_runs_precapture_sequence() {
    let rig = rig();
    rig.sim.set_focus_script(vec![(
        Some(AfState::FocusedLocked),
        Some(AeState::FlashRequired),
    )]);
    rig.sim
        .set_precapture_script(vec![Some(AeState::FlashRequired), Some(AeState::Converged)]);
    let (still, frames) = still_handler();
    start_and_wait_preview(&rig.controller, preview_session(&still));

    rig.controller
        .request_still_capture(&still, Some(RequestConfig::precapture_trigger()), tagged(4))
        .unwrap();
    assert_eq!(index_tags(&recv_frames(&frames, 1)), vec![4]);

    let history = rig.controller.state_history();
    let precapture = history
        .iter()
        .position(|s| *s == CameraState::WaitingPrecapture)
        .expect("precapture was started");
    assert_eq!(history[precapture + 1], CameraState::WaitingNonPrecapture);
    assert_eq!(history[precapture + 2], CameraState::Preview);
    assert!(rig.sim.submitted().iter().any(|s| label(s) == "precapture"));
}

#[test]
fn test_request_for_closed_reader_is_rejected_while_running() {
    let rig = rig();
    let (still, _frames) = still_handler();
    start_and_wait_preview(&rig.controller, preview_session(&still));

    still.close();
    let err = rig
        .controller
        .request_still_capture(&still, None, RequestConfig::none())
        .unwrap_err();
    assert!(matches!(err, CameraError::PreconditionViolation(ref m) if m.contains("output target")));
    assert_eq!(rig.controller.queue_len(), 0);
}
