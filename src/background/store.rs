use super::fetch::UriFetcher;
use super::types::{BackgroundError, BackgroundFetcher, BackgroundImage};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

/// Result of a background change that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// The fetched image is now the current background
    Installed,
    /// A newer request or direct set arrived first; the image was discarded
    Superseded,
}

/// Holds the current replacement background
///
/// The slot holds an `Arc`, so a swap replaces a pointer and readers keep
/// whatever image they already cloned for the frame in flight. Change
/// requests are numbered; only the most recently issued one may install its
/// result (last-requested-wins).
pub struct BackgroundStore {
    current: RwLock<Option<Arc<BackgroundImage>>>,
    latest_request: AtomicU64,
    fetcher: Arc<dyn BackgroundFetcher>,
}

impl Default for BackgroundStore {
    fn default() -> Self {
        Self::new(UriFetcher::default())
    }
}

impl BackgroundStore {
    pub fn new<F: BackgroundFetcher>(fetcher: F) -> Self {
        Self {
            current: RwLock::new(None),
            latest_request: AtomicU64::new(0),
            fetcher: Arc::new(fetcher),
        }
    }

    /// Current background, or `None` if nothing was ever installed
    pub fn background(&self) -> Option<Arc<BackgroundImage>> {
        self.current.read().clone()
    }

    /// Install `image` immediately, superseding any pending change request
    pub fn set_background(&self, image: BackgroundImage) {
        let previous = {
            let mut current = self.current.write();
            self.latest_request.fetch_add(1, Ordering::SeqCst);
            current.replace(Arc::new(image))
        };
        // Release the old image outside the lock
        drop(previous);
    }

    /// Id of the most recently issued change (request or direct set)
    pub fn latest_request_id(&self) -> u64 {
        self.latest_request.load(Ordering::SeqCst)
    }

    /// Start fetching `source` on a worker thread
    ///
    /// Returns immediately. The returned handle reports whether the image was
    /// installed, superseded by a newer request, or failed to load. A failure
    /// leaves the current background in place.
    pub fn request_background_change(
        self: &Arc<Self>,
        source: impl Into<String>,
    ) -> Result<BackgroundRequest, BackgroundError> {
        let source = source.into();
        let id = self.latest_request.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!("Background change #{} requested: {}", id, source);

        let store = Arc::clone(self);
        let handle = thread::Builder::new()
            .name(format!("backdrop-fetch-{}", id))
            .spawn(move || store.run_request(id, &source))
            .map_err(BackgroundError::Spawn)?;

        Ok(BackgroundRequest { id, handle })
    }

    fn run_request(&self, id: u64, source: &str) -> Result<ChangeOutcome, BackgroundError> {
        if self.is_superseded(id) {
            tracing::debug!("Background change #{} superseded before fetch", id);
            return Ok(ChangeOutcome::Superseded);
        }

        let image = self.fetcher.fetch(source).map_err(|e| {
            tracing::warn!("Background change #{} failed, keeping current background: {}", id, e);
            e
        })?;

        Ok(self.install_if_latest(id, image))
    }

    fn is_superseded(&self, id: u64) -> bool {
        self.latest_request.load(Ordering::SeqCst) != id
    }

    fn install_if_latest(&self, id: u64, image: BackgroundImage) -> ChangeOutcome {
        let (width, height) = image.dimensions();
        let previous = {
            let mut current = self.current.write();
            // Checked under the write lock so a newer install cannot interleave
            if self.is_superseded(id) {
                tracing::debug!("Background change #{} superseded, discarding result", id);
                return ChangeOutcome::Superseded;
            }
            current.replace(Arc::new(image))
        };
        drop(previous);

        tracing::info!("Background change #{} installed ({}x{})", id, width, height);
        ChangeOutcome::Installed
    }
}

/// Handle to an in-flight background change
#[derive(Debug)]
pub struct BackgroundRequest {
    id: u64,
    handle: thread::JoinHandle<Result<ChangeOutcome, BackgroundError>>,
}

impl BackgroundRequest {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Block until the fetch finishes and report how it ended
    pub fn wait(self) -> Result<ChangeOutcome, BackgroundError> {
        self.handle
            .join()
            .unwrap_or_else(|_| Err(BackgroundError::WorkerPanicked))
    }
}
