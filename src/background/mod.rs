mod fetch;
mod store;
pub mod types;

pub use fetch::UriFetcher;
pub use store::{BackgroundRequest, BackgroundStore, ChangeOutcome};
pub use types::{BackgroundError, BackgroundFetcher, BackgroundImage};
