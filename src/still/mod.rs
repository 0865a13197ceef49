//! Still image capture handlers
//!
//! A [`StillHandler`] owns the frame reader a still stream is captured into
//! and the consumer-supplied [`FrameSink`] every delivered image is handed to.

mod handler;
mod reader;

pub use handler::{HandlerContext, StillHandler};
pub use reader::{CapturedImage, FrameReader};

/// What the handler does with an image once the sink returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDisposition {
    /// Release the image immediately
    Close,
    /// Keep the image (and its reader slot) until `StillHandler::take_retained`
    KeepOpen,
}

/// Consumer of captured still images. Called on the camera worker thread.
pub trait FrameSink: Send + Sync {
    fn on_frame(&self, image: &CapturedImage) -> FrameDisposition;
}

impl<F> FrameSink for F
where
    F: Fn(&CapturedImage) -> FrameDisposition + Send + Sync,
{
    fn on_frame(&self, image: &CapturedImage) -> FrameDisposition {
        self(image)
    }
}
