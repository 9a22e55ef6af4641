use crate::frame::Frame;
use image::imageops;
use ndarray::Array4;

/// Converts frames into model input tensors
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    pub fn target_size(&self) -> (u32, u32) {
        (self.target_width, self.target_height)
    }

    /// Preprocess a frame into a normalized NCHW RGB tensor
    ///
    /// Steps:
    /// 1. Resize to target dimensions
    /// 2. Reorder channels to RGB and normalize to [0, 1]
    /// 3. Transpose from HWC to NCHW format
    ///
    /// Returns: Array4<f32> with shape [1, 3, height, width]
    pub fn preprocess(&self, frame: &Frame) -> Array4<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let resized;
        let image = if frame.dimensions() != (self.target_width, self.target_height) {
            resized = imageops::resize(
                frame.image(),
                self.target_width,
                self.target_height,
                imageops::FilterType::Triangle,
            );
            &resized
        } else {
            frame.image()
        };

        let format = frame.format();
        let mut tensor = Array4::<f32>::zeros((
            1,
            3,
            self.target_height as usize,
            self.target_width as usize,
        ));

        for (x, y, pixel) in image.enumerate_pixels() {
            let rgba = format.reorder_to_rgba(pixel.0);
            let (x, y) = (x as usize, y as usize);
            for channel in 0..3 {
                tensor[[0, channel, y, x]] = rgba[channel] as f32 / 255.0;
            }
        }

        tensor
    }
}
