//! Mask-driven blending of a frame over a replacement background
//!
//! Mask and background are stretched independently along each axis to the
//! frame's extent. Aspect ratio is not preserved: a 16:9 background on a 4:3
//! frame is squeezed, never cropped or letterboxed.

use crate::background::BackgroundImage;
use crate::frame::{Frame, Mask};
use image::{imageops, RgbaImage};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompositeError {
    #[error("no background image is set")]
    NoBackground,

    #[error("render failed: {0}")]
    RenderFailure(String),
}

/// Resampling used when bringing mask and background to frame-space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ScaleFilter {
    Nearest,
    #[default]
    Bilinear,
    Lanczos3,
}

impl From<ScaleFilter> for imageops::FilterType {
    fn from(filter: ScaleFilter) -> Self {
        match filter {
            ScaleFilter::Nearest => imageops::FilterType::Nearest,
            ScaleFilter::Bilinear => imageops::FilterType::Triangle,
            ScaleFilter::Lanczos3 => imageops::FilterType::Lanczos3,
        }
    }
}

/// Stateless compositor; holds only its resampling choice
#[derive(Debug, Clone, Copy, Default)]
pub struct Compositor {
    filter: ScaleFilter,
}

impl Compositor {
    pub fn new(filter: ScaleFilter) -> Self {
        Self { filter }
    }

    /// Blend `frame` over `background` using `mask` as the foreground alpha
    ///
    /// Always allocates a new frame carrying the input's format, rotation
    /// and timestamp. None of the inputs are modified.
    pub fn composite(
        &self,
        frame: &Frame,
        mask: &Mask,
        background: Option<&BackgroundImage>,
    ) -> Result<Frame, CompositeError> {
        let background = background.ok_or(CompositeError::NoBackground)?;
        let (width, height) = frame.dimensions();
        check_extent("frame", width, height)?;
        check_extent("mask", mask.width(), mask.height())?;

        let backdrop = self.prepare_background(background, width, height)?;
        self.composite_over(frame, mask, &backdrop)
    }

    /// Stretch `background` to a `width`x`height` frame, rejecting empty extents
    ///
    /// The result can be reused with [`Compositor::composite_over`] for every
    /// frame of that size until the background changes.
    pub fn prepare_background(
        &self,
        background: &BackgroundImage,
        width: u32,
        height: u32,
    ) -> Result<RgbaImage, CompositeError> {
        check_extent("frame", width, height)?;
        let (bg_width, bg_height) = background.dimensions();
        check_extent("background", bg_width, bg_height)?;

        tracing::debug!(
            "Scaling background {}x{} to {}x{}",
            bg_width,
            bg_height,
            width,
            height
        );
        Ok(self.scale_background(background, width, height))
    }

    /// Blend `frame` over a background already stretched to the frame's extent
    pub fn composite_over(
        &self,
        frame: &Frame,
        mask: &Mask,
        backdrop: &RgbaImage,
    ) -> Result<Frame, CompositeError> {
        let _span = tracing::debug_span!("composite").entered();

        let (width, height) = frame.dimensions();
        check_extent("frame", width, height)?;
        check_extent("mask", mask.width(), mask.height())?;
        if backdrop.dimensions() != (width, height) {
            return Err(CompositeError::RenderFailure(format!(
                "background is {}x{}, frame is {}x{}",
                backdrop.width(),
                backdrop.height(),
                width,
                height
            )));
        }

        let scaled_mask = self.scale_mask(mask, width, height);
        tracing::trace!(
            "Scaled mask {}x{} to {}x{}",
            mask.width(),
            mask.height(),
            width,
            height
        );

        let format = frame.format();
        let source = frame.image().as_raw();
        let coverage = scaled_mask.coverage().as_raw();

        let mut blended = Vec::new();
        blended
            .try_reserve_exact(source.len())
            .map_err(|e| CompositeError::RenderFailure(format!("output allocation: {}", e)))?;

        for ((src, bg), &alpha) in source
            .chunks_exact(4)
            .zip(backdrop.as_raw().chunks_exact(4))
            .zip(coverage.iter())
        {
            let bg = format.reorder_from_rgba([bg[0], bg[1], bg[2], bg[3]]);
            let alpha = alpha.clamp(0.0, 1.0);
            for channel in 0..4 {
                blended.push(blend(src[channel], bg[channel], alpha));
            }
        }

        let image = RgbaImage::from_raw(width, height, blended).ok_or_else(|| {
            CompositeError::RenderFailure("blended buffer does not match frame extent".to_string())
        })?;

        Ok(Frame::new(image, format, frame.rotation(), frame.timestamp_ns()))
    }

    /// Stretch `mask` to `width`x`height` with independent per-axis factors
    pub fn scale_mask(&self, mask: &Mask, width: u32, height: u32) -> Mask {
        if mask.dimensions() == (width, height) {
            return mask.clone();
        }
        Mask::new(imageops::resize(
            mask.coverage(),
            width,
            height,
            self.filter.into(),
        ))
    }

    /// Stretch the background to `width`x`height`, ignoring its aspect ratio
    pub fn scale_background(&self, background: &BackgroundImage, width: u32, height: u32) -> RgbaImage {
        if background.dimensions() == (width, height) {
            return background.image().clone();
        }
        imageops::resize(background.image(), width, height, self.filter.into())
    }
}

fn check_extent(what: &str, width: u32, height: u32) -> Result<(), CompositeError> {
    if width == 0 || height == 0 {
        return Err(CompositeError::RenderFailure(format!(
            "{} has empty extent {}x{}",
            what, width, height
        )));
    }
    Ok(())
}

/// Linear blend, `alpha` = 1 keeps the foreground
fn blend(foreground: u8, background: u8, alpha: f32) -> u8 {
    let value = foreground as f32 * alpha + background as f32 * (1.0 - alpha);
    value.round().clamp(0.0, 255.0) as u8
}
