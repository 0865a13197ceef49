//! Bounded frame reader backing a still output stream

use crate::errors::CameraError;
use crate::platform::{OutputConfig, OutputKind, RawImage};
use crate::types::{HandlerId, ImageFormat, OutputId, Size};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Device output target of a still handler.
///
/// At most `depth` images may be outstanding; each [`CapturedImage`] holds one
/// slot until it is dropped.
pub struct FrameReader {
    output: OutputId,
    size: Size,
    format: ImageFormat,
    depth: usize,
    outstanding: Arc<AtomicUsize>,
}

impl FrameReader {
    pub fn new(size: Size, format: ImageFormat, depth: usize) -> Self {
        Self {
            output: OutputId::next(),
            size,
            format,
            depth: depth.max(1),
            outstanding: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn output(&self) -> OutputId {
        self.output
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    pub fn output_config(&self) -> OutputConfig {
        OutputConfig {
            id: self.output,
            kind: OutputKind::Still {
                format: self.format,
                max_images: self.depth,
            },
            size: self.size,
        }
    }

    /// Take a slot for `image`, failing with `QueueFull` when every slot is held.
    pub fn acquire(
        &self,
        handler: HandlerId,
        image: RawImage,
        delivered_at_us: u64,
    ) -> Result<CapturedImage, CameraError> {
        let mut current = self.outstanding.load(Ordering::Acquire);
        loop {
            if current >= self.depth {
                return Err(CameraError::QueueFull { depth: self.depth });
            }
            match self.outstanding.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        Ok(CapturedImage {
            image,
            output: self.output,
            handler,
            delivered_at_us,
            _slot: ReaderSlot {
                outstanding: self.outstanding.clone(),
            },
        })
    }
}

impl fmt::Debug for FrameReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameReader")
            .field("output", &self.output)
            .field("size", &self.size)
            .field("depth", &self.depth)
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

struct ReaderSlot {
    outstanding: Arc<AtomicUsize>,
}

impl Drop for ReaderSlot {
    fn drop(&mut self) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A still image handed to a frame sink. Dropping it releases its reader slot.
pub struct CapturedImage {
    image: RawImage,
    output: OutputId,
    handler: HandlerId,
    delivered_at_us: u64,
    _slot: ReaderSlot,
}

impl CapturedImage {
    pub fn frame_number(&self) -> u64 {
        self.image.frame_number
    }

    pub fn size(&self) -> Size {
        self.image.size
    }

    pub fn format(&self) -> ImageFormat {
        self.image.format
    }

    pub fn data(&self) -> &[u8] {
        &self.image.data
    }

    pub fn tag(&self, key: &str) -> Option<i64> {
        self.image.tag(key)
    }

    pub fn handler(&self) -> HandlerId {
        self.handler
    }

    pub fn output(&self) -> OutputId {
        self.output
    }

    /// Microseconds on the controller's capture clock at delivery
    pub fn delivered_at_us(&self) -> u64 {
        self.delivered_at_us
    }

    pub fn raw(&self) -> &RawImage {
        &self.image
    }
}

impl fmt::Debug for CapturedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedImage")
            .field("frame_number", &self.image.frame_number)
            .field("size", &self.image.size)
            .field("format", &self.image.format)
            .field("bytes", &self.image.data.len())
            .field("handler", &self.handler)
            .finish()
    }
}
