mod v4l_capture;

pub use v4l_capture::WebcamCapture;

use anyhow::Result;
use backdrop::Frame;

/// Trait for camera capture sources
pub trait CaptureSource {
    /// Capture a single frame, stamped with a monotonic timestamp
    fn capture_frame(&mut self) -> Result<Frame>;

    /// Get the resolution of captured frames
    fn resolution(&self) -> (u32, u32);
}
