//! Per-frame orchestration: segment, composite, emit

use crate::background::{BackgroundImage, BackgroundStore};
use crate::compositor::{CompositeError, Compositor};
use crate::frame::Frame;
use crate::segmentation::{MaskOutcome, MaskProvider};
use image::RgbaImage;
use std::sync::Arc;

/// Why a frame was emitted unmodified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassThroughReason {
    SegmentationUnavailable,
    NoBackgroundSet,
}

/// Terminal result of processing one frame
#[derive(Debug, PartialEq)]
pub enum FrameOutcome<'a> {
    /// Freshly composited output frame
    Composited(Frame),
    /// The input frame, to be emitted unchanged
    PassThrough(&'a Frame, PassThroughReason),
    /// Nothing to emit for this frame
    Dropped(CompositeError),
}

impl FrameOutcome<'_> {
    /// The frame to hand back to the transport, if any
    pub fn frame(&self) -> Option<&Frame> {
        match self {
            FrameOutcome::Composited(frame) => Some(frame),
            FrameOutcome::PassThrough(frame, _) => Some(frame),
            FrameOutcome::Dropped(_) => None,
        }
    }
}

/// Running totals per outcome
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    pub composited: u64,
    pub no_mask: u64,
    pub no_background: u64,
    pub dropped: u64,
}

impl FrameStats {
    pub fn total(&self) -> u64 {
        self.composited + self.no_mask + self.no_background + self.dropped
    }
}

/// Background already stretched to the current frame size
///
/// Keyed on the installed `Arc` and the frame extent. Holding the `Arc`
/// keeps the pointer comparison valid after the store swaps it out.
#[derive(Default)]
struct ScaledBackground {
    entry: Option<(Arc<BackgroundImage>, RgbaImage)>,
    rescales: u64,
}

impl ScaledBackground {
    fn get(
        &mut self,
        compositor: &Compositor,
        background: &Arc<BackgroundImage>,
        (width, height): (u32, u32),
    ) -> Result<&RgbaImage, CompositeError> {
        let fresh = matches!(
            &self.entry,
            Some((source, scaled)) if Arc::ptr_eq(source, background) && scaled.dimensions() == (width, height)
        );
        if !fresh {
            // Drop the stale copy before allocating the new one
            self.entry = None;
            let scaled = compositor.prepare_background(background, width, height)?;
            self.rescales += 1;
            self.entry = Some((Arc::clone(background), scaled));
        }

        match &self.entry {
            Some((_, scaled)) => Ok(scaled),
            None => Err(CompositeError::RenderFailure("scaled background missing".to_string())),
        }
    }
}

/// Replaces the background of each incoming frame
///
/// The only thing shared with other threads is the background store. The
/// stretched background is kept between frames and rebuilt when the store
/// installs a new image or the frame size changes.
pub struct FrameProcessor<M> {
    provider: M,
    store: Arc<BackgroundStore>,
    compositor: Compositor,
    scaled: ScaledBackground,
    stats: FrameStats,
}

impl<M: MaskProvider> FrameProcessor<M> {
    pub fn new(provider: M, store: Arc<BackgroundStore>, compositor: Compositor) -> Self {
        Self {
            provider,
            store,
            compositor,
            scaled: ScaledBackground::default(),
            stats: FrameStats::default(),
        }
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Run one frame through segmentation and compositing
    ///
    /// Never retries: a frame that cannot be composited is either passed
    /// through or dropped so the next frame is not delayed.
    pub fn process<'a>(&mut self, frame: &'a Frame) -> FrameOutcome<'a> {
        let _span = tracing::debug_span!("process_frame", ts = frame.timestamp_ns()).entered();

        let mask = match self.provider.segment(frame) {
            MaskOutcome::Available(mask) => mask,
            MaskOutcome::Unavailable => {
                tracing::trace!("No mask, passing frame through");
                self.stats.no_mask += 1;
                return FrameOutcome::PassThrough(frame, PassThroughReason::SegmentationUnavailable);
            }
        };

        // Held for the whole frame so a concurrent swap cannot mix two backgrounds
        let result = match self.store.background() {
            Some(background) => self
                .scaled
                .get(&self.compositor, &background, frame.dimensions())
                .and_then(|backdrop| self.compositor.composite_over(frame, &mask, backdrop)),
            None => Err(CompositeError::NoBackground),
        };

        match result {
            Ok(output) => {
                self.stats.composited += 1;
                FrameOutcome::Composited(output)
            }
            Err(CompositeError::NoBackground) => {
                tracing::trace!("No background set, passing frame through");
                self.stats.no_background += 1;
                FrameOutcome::PassThrough(frame, PassThroughReason::NoBackgroundSet)
            }
            Err(e) => {
                tracing::warn!("Dropping frame at {}ns: {}", frame.timestamp_ns(), e);
                self.stats.dropped += 1;
                FrameOutcome::Dropped(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::BackgroundImage;
    use crate::frame::{Mask, PixelFormat, Rotation};
    use crate::segmentation::NoSegmentation;
    use image::{Rgba, RgbaImage};

    /// Returns a clone of a fixed mask for every frame
    struct FixedMask(Mask);

    impl MaskProvider for FixedMask {
        fn segment(&mut self, _frame: &Frame) -> MaskOutcome {
            MaskOutcome::Available(self.0.clone())
        }
    }

    fn frame(width: u32, height: u32) -> Frame {
        Frame::new(
            RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255])),
            PixelFormat::Bgra8,
            Rotation::Deg90,
            987_654_321,
        )
    }

    fn store_with_background() -> Arc<BackgroundStore> {
        let store = Arc::new(BackgroundStore::default());
        store.set_background(BackgroundImage::new(
            "green",
            RgbaImage::from_pixel(32, 18, Rgba([0, 255, 0, 255])),
        ));
        store
    }

    #[test]
    fn unavailable_mask_passes_frame_through() {
        let mut processor = FrameProcessor::new(
            NoSegmentation,
            store_with_background(),
            Compositor::default(),
        );
        let input = frame(8, 8);

        let outcome = processor.process(&input);
        assert_eq!(
            outcome,
            FrameOutcome::PassThrough(&input, PassThroughReason::SegmentationUnavailable)
        );
        assert_eq!(processor.stats().no_mask, 1);
    }

    #[test]
    fn missing_background_passes_frame_through_unchanged() {
        let mut processor = FrameProcessor::new(
            FixedMask(Mask::uniform(2, 2, 0.0)),
            Arc::new(BackgroundStore::default()),
            Compositor::default(),
        );
        let input = frame(8, 8);

        let outcome = processor.process(&input);
        let emitted = outcome.frame().unwrap();
        assert!(std::ptr::eq(emitted, &input));
        assert_eq!(emitted.timestamp_ns(), 987_654_321);
        assert_eq!(emitted.rotation(), Rotation::Deg90);
        assert_eq!(processor.stats().no_background, 1);
    }

    #[test]
    fn render_failure_drops_frame() {
        let mut processor = FrameProcessor::new(
            FixedMask(Mask::uniform(0, 0, 1.0)),
            store_with_background(),
            Compositor::default(),
        );
        let input = frame(8, 8);

        let outcome = processor.process(&input);
        assert!(matches!(outcome, FrameOutcome::Dropped(CompositeError::RenderFailure(_))));
        assert!(outcome.frame().is_none());
        assert_eq!(processor.stats().dropped, 1);
    }

    #[test]
    fn background_mask_emits_composited_frame() {
        let mut processor = FrameProcessor::new(
            FixedMask(Mask::uniform(4, 4, 0.0)),
            store_with_background(),
            Compositor::default(),
        );
        let input = frame(16, 9);

        match processor.process(&input) {
            FrameOutcome::Composited(output) => {
                assert_eq!(output.dimensions(), (16, 9));
                assert_eq!(output.rgba_at(5, 5), [0, 255, 0, 255]);
                assert_eq!(output.timestamp_ns(), input.timestamp_ns());
                assert_eq!(output.rotation(), input.rotation());
            }
            other => panic!("expected composited frame, got {:?}", other),
        }
        assert_eq!(processor.stats().total(), 1);
    }

    fn composited(outcome: FrameOutcome<'_>) -> Frame {
        match outcome {
            FrameOutcome::Composited(output) => output,
            other => panic!("expected composited frame, got {:?}", other),
        }
    }

    #[test]
    fn scaled_background_is_reused_across_frames() {
        let mut processor = FrameProcessor::new(
            FixedMask(Mask::uniform(4, 4, 0.0)),
            store_with_background(),
            Compositor::default(),
        );
        let input = frame(16, 9);

        for _ in 0..5 {
            let output = composited(processor.process(&input));
            assert_eq!(output.rgba_at(15, 8), [0, 255, 0, 255]);
        }
        assert_eq!(processor.scaled.rescales, 1);
    }

    #[test]
    fn background_swap_refreshes_scaled_background() {
        let store = store_with_background();
        let mut processor = FrameProcessor::new(
            FixedMask(Mask::uniform(4, 4, 0.0)),
            Arc::clone(&store),
            Compositor::default(),
        );
        let input = frame(16, 9);

        assert_eq!(composited(processor.process(&input)).rgba_at(3, 3), [0, 255, 0, 255]);

        // Same pixel size as before, so only the image identity changed
        store.set_background(BackgroundImage::new(
            "blue",
            RgbaImage::from_pixel(32, 18, Rgba([0, 0, 255, 255])),
        ));
        assert_eq!(composited(processor.process(&input)).rgba_at(3, 3), [0, 0, 255, 255]);
        assert_eq!(processor.scaled.rescales, 2);
    }

    #[test]
    fn frame_size_change_refreshes_scaled_background() {
        let mut processor = FrameProcessor::new(
            FixedMask(Mask::uniform(4, 4, 0.0)),
            store_with_background(),
            Compositor::default(),
        );

        let small = composited(processor.process(&frame(16, 9)));
        let large = composited(processor.process(&frame(64, 36)));
        let small_again = composited(processor.process(&frame(16, 9)));

        assert_eq!(small.dimensions(), (16, 9));
        assert_eq!(large.dimensions(), (64, 36));
        assert_eq!(large.rgba_at(63, 35), [0, 255, 0, 255]);
        assert_eq!(small_again, small);
        assert_eq!(processor.scaled.rescales, 3);
    }

    #[test]
    fn empty_background_drops_frame_and_is_not_cached() {
        let store = Arc::new(BackgroundStore::default());
        store.set_background(BackgroundImage::new("empty", RgbaImage::new(0, 0)));
        let mut processor = FrameProcessor::new(
            FixedMask(Mask::uniform(2, 2, 0.0)),
            store,
            Compositor::default(),
        );

        let input = frame(8, 8);
        let outcome = processor.process(&input);
        assert!(matches!(outcome, FrameOutcome::Dropped(CompositeError::RenderFailure(_))));
        assert!(processor.scaled.entry.is_none());
        assert_eq!(processor.scaled.rescales, 0);
    }
}
