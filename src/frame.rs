//! Frame and mask buffers shared by the compositor and the transport.

use image::{GrayImage, ImageBuffer, Luma, RgbaImage};
use thiserror::Error;

/// Single-channel coverage buffer, 0.0 = background, 1.0 = foreground
pub type CoverageBuffer = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Channel order of a 32-bit packed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    #[default]
    Rgba8,
    Bgra8,
}

impl PixelFormat {
    /// Reorder an RGBA pixel into this format's channel order
    pub fn reorder_from_rgba(self, px: [u8; 4]) -> [u8; 4] {
        match self {
            PixelFormat::Rgba8 => px,
            PixelFormat::Bgra8 => [px[2], px[1], px[0], px[3]],
        }
    }

    /// Reorder a pixel in this format into RGBA
    pub fn reorder_to_rgba(self, px: [u8; 4]) -> [u8; 4] {
        // The swap is its own inverse
        self.reorder_from_rgba(px)
    }
}

/// Rotation the consumer should apply when displaying the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("buffer holds {actual} bytes, {width}x{height} packed 32-bit needs {expected}")]
    BufferSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// A video frame as delivered by the transport
///
/// Pixels are 32-bit packed; `format` says whether the bytes are RGBA or BGRA.
/// The buffer itself is always stored as an `RgbaImage` container regardless
/// of channel order.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    image: RgbaImage,
    format: PixelFormat,
    rotation: Rotation,
    timestamp_ns: i64,
}

impl Frame {
    pub fn new(image: RgbaImage, format: PixelFormat, rotation: Rotation, timestamp_ns: i64) -> Self {
        Self {
            image,
            format,
            rotation,
            timestamp_ns,
        }
    }

    /// Wrap a raw packed buffer coming from the transport
    pub fn from_raw(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
        rotation: Rotation,
        timestamp_ns: i64,
    ) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * 4;
        let actual = data.len();
        let image = RgbaImage::from_raw(width, height, data).ok_or(FrameError::BufferSize {
            width,
            height,
            expected,
            actual,
        })?;
        Ok(Self::new(image, format, rotation, timestamp_ns))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn timestamp_ns(&self) -> i64 {
        self.timestamp_ns
    }

    /// Packed pixel buffer in `format` channel order
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Pixel at (x, y) converted to RGBA order
    pub fn rgba_at(&self, x: u32, y: u32) -> [u8; 4] {
        self.format.reorder_to_rgba(self.image.get_pixel(x, y).0)
    }
}

/// Segmentation mask for one frame, possibly at a lower resolution than the frame
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    coverage: CoverageBuffer,
}

impl Mask {
    pub fn new(coverage: CoverageBuffer) -> Self {
        Self { coverage }
    }

    /// Build a mask from row-major coverage values
    ///
    /// Returns `None` if `values` does not hold exactly `width * height` entries.
    pub fn from_values(width: u32, height: u32, values: Vec<f32>) -> Option<Self> {
        CoverageBuffer::from_raw(width, height, values).map(Self::new)
    }

    /// Build a mask from an 8-bit one-component image (255 = foreground)
    pub fn from_luma8(gray: &GrayImage) -> Self {
        let coverage = CoverageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
            Luma([gray.get_pixel(x, y)[0] as f32 / 255.0])
        });
        Self { coverage }
    }

    pub fn uniform(width: u32, height: u32, value: f32) -> Self {
        Self {
            coverage: CoverageBuffer::from_pixel(width, height, Luma([value])),
        }
    }

    pub fn width(&self) -> u32 {
        self.coverage.width()
    }

    pub fn height(&self) -> u32 {
        self.coverage.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.coverage.dimensions()
    }

    /// Coverage at (x, y), clamped to [0, 1]
    pub fn coverage_at(&self, x: u32, y: u32) -> f32 {
        self.coverage.get_pixel(x, y)[0].clamp(0.0, 1.0)
    }

    pub fn coverage(&self) -> &CoverageBuffer {
        &self.coverage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_rejects_short_buffer() {
        let err = Frame::from_raw(4, 4, PixelFormat::Rgba8, vec![0; 10], Rotation::Deg0, 0)
            .unwrap_err();
        assert_eq!(
            err,
            FrameError::BufferSize {
                width: 4,
                height: 4,
                expected: 64,
                actual: 10
            }
        );
    }

    #[test]
    fn bgra_pixels_read_back_as_rgba() {
        let frame = Frame::from_raw(
            1,
            1,
            PixelFormat::Bgra8,
            vec![10, 20, 30, 255],
            Rotation::Deg90,
            42,
        )
        .unwrap();
        assert_eq!(frame.rgba_at(0, 0), [30, 20, 10, 255]);
        assert_eq!(frame.rotation().degrees(), 90);
        assert_eq!(frame.timestamp_ns(), 42);
    }

    #[test]
    fn luma8_mask_maps_to_unit_range() {
        let gray = GrayImage::from_fn(2, 1, |x, _| Luma([if x == 0 { 0 } else { 255 }]));
        let mask = Mask::from_luma8(&gray);
        assert_eq!(mask.coverage_at(0, 0), 0.0);
        assert_eq!(mask.coverage_at(1, 0), 1.0);
    }

    #[test]
    fn from_values_checks_length() {
        assert!(Mask::from_values(2, 2, vec![0.0; 3]).is_none());
        assert!(Mask::from_values(2, 2, vec![0.0; 4]).is_some());
    }
}
