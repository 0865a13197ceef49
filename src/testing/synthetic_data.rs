//! Synthetic still frames
//!
//! Produces images shaped like real device output so handlers and sinks can be
//! exercised without hardware.

use crate::platform::RawImage;
use crate::types::{ImageFormat, Size};
use std::collections::BTreeMap;

// Roughly 33 ms apart, like a 30 fps sensor.
const FRAME_INTERVAL_NS: u64 = 33_333_333;

/// Create a synthetic still image for `frame_number`.
///
/// Uncompressed formats get a full gradient buffer of the right length;
/// JPEG gets a minimal SOI/EOI framed payload.
pub fn synthetic_still_image(frame_number: u64, size: Size, format: ImageFormat) -> RawImage {
    let base = (frame_number % 256) as u8;
    let data = match format.bytes_per_pixel() {
        Some(bpp) => {
            let len = (size.area() as f64 * bpp as f64) as usize;
            (0..len)
                .map(|i| base.wrapping_add((i % 251) as u8))
                .collect()
        }
        None => {
            let mut data = vec![0xFF, 0xD8];
            data.extend((0..64u8).map(|i| base.wrapping_add(i)));
            data.extend([0xFF, 0xD9]);
            data
        }
    };

    RawImage {
        frame_number,
        size,
        format,
        sensor_timestamp_ns: frame_number * FRAME_INTERVAL_NS,
        metadata: BTreeMap::new(),
        data,
    }
}
