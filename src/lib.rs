//! Real-time background replacement for video frames
//!
//! A [`processor::FrameProcessor`] takes each frame from the transport, asks a
//! [`segmentation::MaskProvider`] for a foreground mask, and blends the frame
//! over the current image in a [`background::BackgroundStore`]. Backgrounds
//! can be swapped from any thread while frames are being processed.

pub mod background;
pub mod compositor;
pub mod frame;
pub mod processor;
pub mod segmentation;

pub use background::{BackgroundImage, BackgroundStore};
pub use compositor::{CompositeError, Compositor, ScaleFilter};
pub use frame::{Frame, Mask, PixelFormat, Rotation};
pub use processor::{FrameOutcome, FrameProcessor, PassThroughReason};
