use super::preprocess::Preprocessor;
use super::types::{MaskOutcome, MaskProvider};
use crate::frame::{Frame, Mask};
use anyhow::{Context, Result};
use ndarray::{Array1, Array4, Ix4};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{DynValue, TensorRef};
use std::path::Path;

/// Recurrent state names, input then output
const RECURRENT: [(&str, &str); 4] = [("r1i", "r1o"), ("r2i", "r2o"), ("r3i", "r3o"), ("r4i", "r4o")];

/// RobustVideoMatting segmentation model
///
/// The network carries four recurrent tensors between frames; they are fed
/// back on every call and dropped on failure or `reset_state`. The alpha
/// output is returned at model resolution; the compositor stretches it.
pub struct RobustVideoMatting {
    session: Session,
    preprocessor: Preprocessor,
    recurrent: Option<[Array4<f32>; 4]>,

    // Fraction of the input resolution the model's backbone runs at
    downsample_ratio: f32,
}

impl RobustVideoMatting {
    /// Load an RVM ONNX export
    ///
    /// `input_size` is the square edge frames are resized to before
    /// inference (512 is a good quality/performance balance).
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading RVM model from {}", path.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        tracing::info!("RVM model loaded, input {}x{}", input_size, input_size);

        Ok(Self {
            session,
            preprocessor: Preprocessor::new(input_size, input_size),
            recurrent: None,
            downsample_ratio: 0.25,
        })
    }

    fn infer(&mut self, frame: &Frame) -> Result<Mask> {
        let src = self.preprocessor.preprocess(frame);
        let ratio = Array1::from_elem(1, self.downsample_ratio);
        // RVM accepts 1x1x1x1 zeros as the initial state and broadcasts them
        let state = self
            .recurrent
            .take()
            .unwrap_or_else(|| std::array::from_fn(|_| Array4::zeros((1, 1, 1, 1))));

        let _infer_span = tracing::debug_span!("inference").entered();
        let outputs = self
            .session
            .run(ort::inputs![
                "src" => TensorRef::from_array_view(src.view())?,
                RECURRENT[0].0 => TensorRef::from_array_view(state[0].view())?,
                RECURRENT[1].0 => TensorRef::from_array_view(state[1].view())?,
                RECURRENT[2].0 => TensorRef::from_array_view(state[2].view())?,
                RECURRENT[3].0 => TensorRef::from_array_view(state[3].view())?,
                "downsample_ratio" => TensorRef::from_array_view(ratio.view())?
            ])
            .context("Failed to run inference")?;
        drop(_infer_span);

        // Alpha matte, shape [1, 1, H, W]
        let pha = outputs["pha"]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix4>()
            .context("Unexpected alpha output rank")?;
        let (_, _, height, width) = pha.dim();
        let values: Vec<f32> = pha.iter().copied().collect();

        self.recurrent = Some([
            extract_state(&outputs[RECURRENT[0].1], RECURRENT[0].1)?,
            extract_state(&outputs[RECURRENT[1].1], RECURRENT[1].1)?,
            extract_state(&outputs[RECURRENT[2].1], RECURRENT[2].1)?,
            extract_state(&outputs[RECURRENT[3].1], RECURRENT[3].1)?,
        ]);

        Mask::from_values(width as u32, height as u32, values)
            .context("Alpha output does not match its own shape")
    }
}

fn extract_state(value: &DynValue, name: &str) -> Result<Array4<f32>> {
    value
        .try_extract_array::<f32>()?
        .to_owned()
        .into_dimensionality::<Ix4>()
        .with_context(|| format!("Unexpected rank for recurrent output {}", name))
}

impl MaskProvider for RobustVideoMatting {
    fn segment(&mut self, frame: &Frame) -> MaskOutcome {
        let _span = tracing::debug_span!("rvm_segment").entered();

        match self.infer(frame) {
            Ok(mask) => MaskOutcome::Available(mask),
            Err(e) => {
                tracing::warn!("Segmentation failed, passing frame through: {:#}", e);
                self.recurrent = None;
                MaskOutcome::Unavailable
            }
        }
    }

    fn reset_state(&mut self) {
        tracing::info!("Resetting RVM recurrent state");
        self.recurrent = None;
    }

    fn input_size(&self) -> Option<(u32, u32)> {
        Some(self.preprocessor.target_size())
    }
}
