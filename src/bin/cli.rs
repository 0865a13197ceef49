use anyhow::{anyhow, bail, Context};
use shutterbug::capture::{CameraController, CameraState, PreviewSpec, RequestConfig, Session};
use shutterbug::platform::DeviceManager;
use shutterbug::recording::VideoHandler;
use shutterbug::still::StillHandler;
use shutterbug::testing::{ChannelFrameSink, MemoryRecorder, SimulatedCameraManager};
use shutterbug::types::{DeviceId, ImageFormat, Orientation, OutputId, Size};
use shutterbug::ShutterbugConfig;
use std::env;
use std::sync::Arc;
use std::time::Duration;

const STATE_TIMEOUT: Duration = Duration::from_secs(5);

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: shutterbug-cli <command> [args] [--config <file>] [--json]");
        eprintln!("Commands: list-devices, capture <device_id>, record <device_id>");
        std::process::exit(1);
    }

    let command = &args[1];
    match command.as_str() {
        "list-devices" => cmd_list_devices(&args),
        "capture" => cmd_capture(&args),
        "record" => cmd_record(&args),
        _ => {
            eprintln!("Unknown command: {}", command);
            std::process::exit(1);
        }
    }
}

/// `--config <file>` if given, otherwise `shutterbug.toml` or defaults
fn load_config(args: &[String]) -> anyhow::Result<ShutterbugConfig> {
    match flag_value(args, "--config") {
        Some(path) => ShutterbugConfig::load_from_file(path)
            .with_context(|| format!("loading config from {}", path)),
        None => Ok(ShutterbugConfig::load_or_default()),
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

/// First argument after the command that is neither a flag nor a flag value
fn positional(args: &[String]) -> Option<&str> {
    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "--ms" | "--config" => i += 2,
            a if a.starts_with("--") => i += 1,
            a => return Some(a),
        }
    }
    None
}

fn cmd_list_devices(args: &[String]) -> anyhow::Result<()> {
    let sim = SimulatedCameraManager::new();
    let mut devices = Vec::new();
    for id in sim.list_devices()? {
        devices.push(sim.characteristics(&id)?);
    }

    if args.contains(&"--json".to_string()) {
        println!("{}", serde_json::to_string(&devices)?);
    } else {
        for d in devices {
            println!("{}: {} ({:?}, sensor {}°)", d.id, d.name, d.facing, d.sensor_orientation.degrees());
        }
    }
    Ok(())
}

fn controller_for(args: &[String]) -> anyhow::Result<(CameraController, DeviceId)> {
    let config = load_config(args)?;
    let device_id = DeviceId::new(positional(args).ok_or_else(|| anyhow!("device_id required"))?);
    let sim: Arc<dyn DeviceManager> = Arc::new(SimulatedCameraManager::new());
    let controller = CameraController::builder()
        .config(config)
        .device_manager(sim)
        .build();
    Ok((controller, device_id))
}

fn cmd_capture(args: &[String]) -> anyhow::Result<()> {
    // capture <device_id> [--count <n>] [--precapture] [--json]
    let count: usize = match flag_value(args, "--count") {
        Some(v) => v.parse().context("--count expects a number")?,
        None => 1,
    };
    let precapture = args.contains(&"--precapture".to_string());
    let json = args.contains(&"--json".to_string());

    let (controller, device_id) = controller_for(args)?;
    let (sink, frames) = ChannelFrameSink::new();
    let still = StillHandler::new(ImageFormat::Jpeg, Size::new(4032, 3024), sink);
    let session = Session::builder(device_id.clone())
        .preview(PreviewSpec::new(OutputId::next(), Size::new(1920, 1080)))
        .still_handler(still.clone())
        .build();

    controller.start(session)?;
    if !controller.wait_for_state(CameraState::Preview, STATE_TIMEOUT) {
        bail!("camera {} never reached preview", device_id);
    }

    for i in 0..count {
        let precapture_config = precapture.then(RequestConfig::precapture_trigger);
        controller.request_still_capture(
            &still,
            precapture_config,
            RequestConfig::tagged("cli.index", i as i64),
        )?;
    }

    for _ in 0..count {
        let frame = frames
            .recv_timeout(STATE_TIMEOUT)
            .context("timed out waiting for a frame")?;
        if json {
            println!(
                "{}",
                serde_json::json!({
                    "frame": frame.frame_number,
                    "handler": frame.handler.to_string(),
                    "width": frame.size.width,
                    "height": frame.size.height,
                    "bytes": frame.bytes,
                    "index": frame.tags.get("cli.index"),
                })
            );
        } else {
            println!("Frame: {} {} bytes {}", frame.size, frame.bytes, frame.frame_number);
        }
    }

    controller.pause()?;
    Ok(())
}

fn cmd_record(args: &[String]) -> anyhow::Result<()> {
    // record <device_id> [--ms <n>] [--json]
    let ms: u64 = match flag_value(args, "--ms") {
        Some(v) => v.parse().context("--ms expects a number")?,
        None => 1000,
    };
    let json = args.contains(&"--json".to_string());

    let (controller, device_id) = controller_for(args)?;
    let recorder = MemoryRecorder::new();
    let calls = recorder.calls();
    let video = VideoHandler::new(Size::new(1920, 1080), recorder);
    let session = Session::builder(device_id.clone())
        .preview(PreviewSpec::new(OutputId::next(), Size::new(1280, 720)))
        .video_handler(video.clone())
        .build();

    controller.start(session)?;
    if !controller.wait_for_state(CameraState::Preview, STATE_TIMEOUT) {
        bail!("camera {} never reached preview", device_id);
    }

    let path = controller.start_video_capture(&video, None, Orientation::Deg90)?;
    if !controller.wait_for_state(CameraState::RecordingVideo, STATE_TIMEOUT) {
        bail!("recording did not start");
    }
    std::thread::sleep(Duration::from_millis(ms));
    controller.stop_video_capture(&video)?;
    if !controller.wait_for_state(CameraState::Preview, STATE_TIMEOUT) {
        bail!("recording did not stop");
    }
    controller.pause()?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "path": path.display().to_string(),
                "duration_ms": ms,
                "recorder_calls": calls.snapshot().len(),
            })
        );
    } else {
        println!("Recorded {} ms to {}", ms, path.display());
    }
    Ok(())
}
