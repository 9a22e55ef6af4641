use image::RgbaImage;
use std::path::PathBuf;
use thiserror::Error;

/// A decoded replacement background, independent of any frame's resolution
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundImage {
    source: String,
    image: RgbaImage,
}

impl BackgroundImage {
    pub fn new(source: impl Into<String>, image: RgbaImage) -> Self {
        Self {
            source: source.into(),
            image,
        }
    }

    /// Locator the image was fetched from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Pixels, always in RGBA order
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Why a background change did not produce a new image
///
/// The previously installed background stays current in every case.
#[derive(Debug, Error)]
pub enum BackgroundError {
    #[error("invalid background locator '{locator}': {reason}")]
    InvalidLocator { locator: String, reason: String },

    #[error("unsupported background scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("failed to read background {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to download background {url}: {reason}")]
    Http { url: String, reason: String },

    #[error("background {url} is larger than {limit} bytes")]
    TooLarge { url: String, limit: u64 },

    #[error("failed to decode background image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("failed to start background worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("background worker panicked")]
    WorkerPanicked,
}

/// Fetch-and-decode boundary for replacement backgrounds
///
/// Implementations block; the store always calls them off the frame path.
pub trait BackgroundFetcher: Send + Sync + 'static {
    fn fetch(&self, source: &str) -> Result<BackgroundImage, BackgroundError>;
}
