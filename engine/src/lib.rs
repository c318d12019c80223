pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod feature_cache;
pub mod generation;
pub mod highlight;
pub mod isochrone;
pub mod nearby;
pub mod retry;
pub mod search;
pub mod viewport;

#[cfg(test)]
mod test_support;

pub use backend::{Backend, GeocodeRequest, HttpBackend};
pub use config::{EngineConfig, UserLocale};
pub use engine::{EnrichOutcome, MapEngine, SearchResolution, SelectionOutcome, ViewUpdate};
pub use error::EngineError;
pub use events::EngineEvent;
pub use highlight::SortMode;
pub use viewport::{FetchDecision, FetchOutcome, MapView};
