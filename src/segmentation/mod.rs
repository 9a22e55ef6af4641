mod preprocess;
mod rvm;
pub mod types;

pub use preprocess::Preprocessor;
pub use rvm::RobustVideoMatting;
pub use types::{MaskOutcome, MaskProvider, NoSegmentation};

use anyhow::Result;

/// Create the default segmentation model (RVM)
pub fn create_default_model(model_path: &str, input_size: u32) -> Result<Box<dyn MaskProvider>> {
    let model = RobustVideoMatting::new(model_path, input_size)?;
    Ok(Box::new(model))
}
