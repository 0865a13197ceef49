//! Video recording handlers
//!
//! The core never encodes or writes video itself. A [`VideoHandler`] wraps a
//! consumer-supplied [`RecorderSink`] and tracks whether it is recording; the
//! capture state machine streams frames into the sink's surface.
//!
//! # Example
//! ```rust,ignore
//! use shutterbug::recording::{RecordingConfig, VideoHandler};
//!
//! let video = VideoHandler::new(Size::new(1920, 1080), my_recorder);
//! let path = RecordingConfig::new("/sdcard/Movies").next_path();
//! controller.start_video_capture(&video, Some(path), Orientation::Deg90)?;
//! // ...
//! controller.stop_video_capture(&video)?;
//! ```

mod config;
mod handler;

pub use config::RecordingConfig;
pub use handler::{RecorderSink, VideoHandler};
