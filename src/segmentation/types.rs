use crate::frame::{Frame, Mask};

/// What a mask provider produced for one frame
#[derive(Debug, Clone, PartialEq)]
pub enum MaskOutcome {
    /// Foreground coverage, at whatever resolution the provider works in
    Available(Mask),
    /// No mask for this frame (unsupported, model failure, ...)
    Unavailable,
}

/// Trait for segmentation backends
/// Allows swapping between different backends (RVM, MODNet, MediaPipe, etc.)
pub trait MaskProvider {
    /// Produce a foreground mask for `frame`
    ///
    /// Providers never fabricate a mask: if they cannot segment this frame
    /// they return `Unavailable` and the frame is passed through.
    fn segment(&mut self, frame: &Frame) -> MaskOutcome;

    /// Reset internal state (for models with recurrent components)
    ///
    /// Call this when switching cameras or starting a new session.
    fn reset_state(&mut self) {}

    /// Resolution the provider segments at, if fixed
    fn input_size(&self) -> Option<(u32, u32)> {
        None
    }
}

impl<P: MaskProvider + ?Sized> MaskProvider for Box<P> {
    fn segment(&mut self, frame: &Frame) -> MaskOutcome {
        (**self).segment(frame)
    }

    fn reset_state(&mut self) {
        (**self).reset_state()
    }

    fn input_size(&self) -> Option<(u32, u32)> {
        (**self).input_size()
    }
}

/// Provider used when no model is loaded; every frame passes through
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSegmentation;

impl MaskProvider for NoSegmentation {
    fn segment(&mut self, _frame: &Frame) -> MaskOutcome {
        MaskOutcome::Unavailable
    }
}
