use crate::platform::DeviceEvent;
use crate::recording::VideoHandler;
use crate::types::Orientation;
use std::path::PathBuf;

/// Everything the camera worker consumes, in arrival order.
#[derive(Debug)]
pub(crate) enum WorkerTask {
    /// A request was queued while the controller saw `Preview`
    Drain,
    StartVideo {
        handler: VideoHandler,
        path: PathBuf,
        orientation: Orientation,
    },
    StopVideo {
        handler: VideoHandler,
    },
    /// Close the session and device, then exit the worker loop
    Shutdown,
    Device(DeviceEvent),
}
