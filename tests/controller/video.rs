use super::support::*;
use shutterbug::capture::{CameraState, RequestConfig, Session};
use shutterbug::errors::CameraError;
use shutterbug::platform::{OutputKind, RequestTemplate};
use shutterbug::recording::VideoHandler;
use shutterbug::still::StillHandler;
use shutterbug::testing::{MemoryRecorder, RecorderCall};
use shutterbug::types::{Orientation, Size};
use std::path::PathBuf;
use tempfile::tempdir;

fn video_session(video: &VideoHandler, still: Option<&StillHandler>) -> Session {
    let mut builder = Session::builder("0")
        .preview(preview())
        .video_handler(video.clone());
    if let Some(still) = still {
        builder = builder.still_handler(still.clone());
    }
    builder.build()
}

#[test]
fn test_stop_without_start_is_precondition_violation() {
    let rig = rig();
    let recorder = MemoryRecorder::new();
    let calls = recorder.calls();
    let video = VideoHandler::new(Size::new(1920, 1080), recorder);
    start_and_wait_preview(&rig.controller, video_session(&video, None));

    let err = rig.controller.stop_video_capture(&video).unwrap_err();
    assert!(matches!(err, CameraError::PreconditionViolation(_)));
    assert_eq!(rig.controller.state(), CameraState::Preview);
    assert!(calls.snapshot().is_empty());
}

#[test]
fn test_record_cycle_returns_to_preview() {
    let rig = rig();
    let recorder = MemoryRecorder::new();
    let calls = recorder.calls();
    let video = VideoHandler::new(Size::new(1920, 1080), recorder);
    let surface = video.surface();
    start_and_wait_preview(&rig.controller, video_session(&video, None));

    let requested = PathBuf::from("/tmp/shutterbug-test.mp4");
    let path = rig
        .controller
        .start_video_capture(&video, Some(requested.clone()), Orientation::Deg90)
        .unwrap();
    assert_eq!(path, requested);
    assert!(rig
        .controller
        .wait_for_state(CameraState::RecordingVideo, WAIT));
    assert!(video.is_recording());

    let sessions = rig.sim.sessions();
    let record_outputs = sessions.last().expect("a recording session");
    assert!(record_outputs
        .iter()
        .any(|o| o.id == surface && o.kind == OutputKind::Recorder));
    assert!(record_outputs.iter().any(|o| o.kind == OutputKind::Preview));
    assert!(rig
        .sim
        .submitted()
        .iter()
        .any(|s| s.repeating && s.request.template == RequestTemplate::Record));

    rig.controller.stop_video_capture(&video).unwrap();
    assert!(rig.controller.wait_for_state(CameraState::Preview, WAIT));
    assert!(!video.is_recording());
    assert_eq!(video.output_path(), Some(requested.clone()));
    assert_eq!(
        calls.snapshot(),
        vec![
            RecorderCall::Prepare(requested, Orientation::Deg90),
            RecorderCall::Start,
            RecorderCall::Stop,
        ]
    );
    let last = rig.sim.sessions().pop().unwrap();
    assert!(last.iter().all(|o| o.kind != OutputKind::Recorder));
}

#[test]
fn test_generated_path_uses_recording_config() {
    let dir = tempdir().unwrap();
    let mut config = test_config();
    config.recording.output_directory = dir.path().display().to_string();
    config.recording.file_prefix = "CLIP".to_string();
    let rig = rig_with(config);
    let video = VideoHandler::new(Size::new(1280, 720), MemoryRecorder::new());
    start_and_wait_preview(&rig.controller, video_session(&video, None));

    let path = rig
        .controller
        .start_video_capture(&video, None, Orientation::Deg0)
        .unwrap();
    assert!(path.starts_with(dir.path()));
    let name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("CLIP_"), "{}", name);
    assert!(name.ends_with(".mp4"), "{}", name);

    assert!(rig
        .controller
        .wait_for_state(CameraState::RecordingVideo, WAIT));
    rig.controller.stop_video_capture(&video).unwrap();
    assert!(rig.controller.wait_for_state(CameraState::Preview, WAIT));
}

#[test]
fn test_recorder_failure_restores_preview() {
    let rig = rig();
    let video = VideoHandler::new(Size::new(1280, 720), MemoryRecorder::failing("disk full"));
    start_and_wait_preview(&rig.controller, video_session(&video, None));

    rig.controller
        .start_video_capture(&video, Some(PathBuf::from("/tmp/x.mp4")), Orientation::Deg0)
        .unwrap();
    assert!(rig.diagnostics.wait_for_error("disk full", WAIT));
    assert!(rig.controller.wait_for_state(CameraState::Preview, WAIT));
    assert!(!video.is_recording());
    assert!(!rig
        .controller
        .state_history()
        .contains(&CameraState::RecordingVideo));
}

#[test]
fn test_stills_wait_while_recording() {
    let rig = rig();
    let video = VideoHandler::new(Size::new(1280, 720), MemoryRecorder::new());
    let (still, frames) = still_handler();
    start_and_wait_preview(&rig.controller, video_session(&video, Some(&still)));

    rig.controller
        .start_video_capture(&video, Some(PathBuf::from("/tmp/y.mp4")), Orientation::Deg0)
        .unwrap();
    assert!(rig
        .controller
        .wait_for_state(CameraState::RecordingVideo, WAIT));

    rig.controller
        .request_still_capture(&still, None, RequestConfig::tagged("index", 9))
        .unwrap();
    assert!(frames.recv_timeout(QUIET).is_err());
    assert_eq!(rig.controller.queue_len(), 1);

    rig.controller.stop_video_capture(&video).unwrap();
    assert_eq!(index_tags(&recv_frames(&frames, 1)), vec![9]);
}

#[test]
fn test_start_video_while_paused_is_rejected() {
    let rig = rig();
    let video = VideoHandler::new(Size::new(1280, 720), MemoryRecorder::new());
    start_and_wait_preview(&rig.controller, video_session(&video, None));
    rig.controller.pause().unwrap();

    let err = rig
        .controller
        .start_video_capture(&video, None, Orientation::Deg0)
        .unwrap_err();
    assert!(matches!(err, CameraError::PreconditionViolation(_)));
}

#[test]
fn test_disconnect_while_recording_stops_recorder() {
    let rig = rig();
    let recorder = MemoryRecorder::new();
    let calls = recorder.calls();
    let video = VideoHandler::new(Size::new(1280, 720), recorder);
    start_and_wait_preview(&rig.controller, video_session(&video, None));

    rig.controller
        .start_video_capture(&video, Some(PathBuf::from("/tmp/z.mp4")), Orientation::Deg0)
        .unwrap();
    assert!(rig
        .controller
        .wait_for_state(CameraState::RecordingVideo, WAIT));

    assert!(rig.sim.disconnect());
    assert!(rig
        .controller
        .wait_for_state(CameraState::WaitingDeviceOpen, WAIT));
    assert!(!video.is_recording());
    assert_eq!(calls.snapshot().last(), Some(&RecorderCall::Stop));
}

#[test]
fn test_stop_right_after_start_is_accepted() {
    let rig = rig();
    let recorder = MemoryRecorder::new();
    let calls = recorder.calls();
    let video = VideoHandler::new(Size::new(1280, 720), recorder);
    start_and_wait_preview(&rig.controller, video_session(&video, None));

    let path = PathBuf::from("/tmp/quick.mp4");
    rig.controller
        .start_video_capture(&video, Some(path.clone()), Orientation::Deg0)
        .unwrap();
    assert!(video.is_active());
    rig.controller.stop_video_capture(&video).unwrap();

    assert!(wait_until(|| calls.snapshot().len() == 3));
    assert_eq!(
        calls.snapshot(),
        vec![
            RecorderCall::Prepare(path, Orientation::Deg0),
            RecorderCall::Start,
            RecorderCall::Stop,
        ]
    );
    assert!(rig.controller.wait_for_state(CameraState::Preview, WAIT));
    assert!(!video.is_active());
}

#[test]
fn test_second_start_before_recording_begins_is_rejected() {
    let rig = rig();
    let recorder = MemoryRecorder::new();
    let calls = recorder.calls();
    let video = VideoHandler::new(Size::new(1280, 720), recorder);
    start_and_wait_preview(&rig.controller, video_session(&video, None));

    rig.controller
        .start_video_capture(&video, Some(PathBuf::from("/tmp/a.mp4")), Orientation::Deg0)
        .unwrap();
    let err = rig
        .controller
        .start_video_capture(&video, Some(PathBuf::from("/tmp/b.mp4")), Orientation::Deg0)
        .unwrap_err();
    assert!(matches!(err, CameraError::PreconditionViolation(_)));

    assert!(rig
        .controller
        .wait_for_state(CameraState::RecordingVideo, WAIT));
    rig.controller.stop_video_capture(&video).unwrap();
    assert!(rig.controller.wait_for_state(CameraState::Preview, WAIT));
    let prepares = calls
        .snapshot()
        .iter()
        .filter(|c| matches!(c, RecorderCall::Prepare(..)))
        .count();
    assert_eq!(prepares, 1);
}

#[test]
fn test_failed_recorder_start_releases_the_handler() {
    let rig = rig();
    let video = VideoHandler::new(Size::new(1280, 720), MemoryRecorder::failing("no codec"));
    start_and_wait_preview(&rig.controller, video_session(&video, None));

    rig.controller
        .start_video_capture(&video, Some(PathBuf::from("/tmp/c.mp4")), Orientation::Deg0)
        .unwrap();
    assert!(rig.diagnostics.wait_for_error("no codec", WAIT));
    assert!(wait_until(|| !video.is_active()));
    assert!(rig.controller.wait_for_state(CameraState::Preview, WAIT));
    rig.controller
        .start_video_capture(&video, Some(PathBuf::from("/tmp/d.mp4")), Orientation::Deg0)
        .unwrap();
}

#[test]
fn test_pause_right_after_start_leaves_handler_idle() {
    let rig = rig();
    let video = VideoHandler::new(Size::new(1280, 720), MemoryRecorder::new());
    start_and_wait_preview(&rig.controller, video_session(&video, None));

    rig.controller
        .start_video_capture(&video, Some(PathBuf::from("/tmp/e.mp4")), Orientation::Deg0)
        .unwrap();
    rig.controller.pause().unwrap();
    assert_eq!(rig.controller.state(), CameraState::WaitingDeviceOpen);
    assert!(!video.is_active());
    assert!(!video.is_recording());
}
