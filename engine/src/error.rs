use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{endpoint} returned status {status}")]
    Status { endpoint: &'static str, status: u16 },

    #[error("backend error: {0}")]
    Backend(String),

    /// Both search providers failed for the same query.
    #[error("search unavailable: internal ({internal}), external ({external})")]
    SearchUnavailable { internal: String, external: String },
}
