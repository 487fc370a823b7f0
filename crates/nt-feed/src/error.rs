// error.rs - Error types for document feeds.

use thiserror::Error;

/// Errors that can occur while fetching the document feed.
///
/// A failed fetch never clears what the poller already has; the previous
/// snapshot stays in place until a fetch succeeds.
#[derive(Debug, Error)]
pub enum FeedError {
    /// A file I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: String,
        source: std::io::Error,
    },

    /// The feed payload is not valid JSON in a supported shape.
    #[error("malformed feed: {0}")]
    Parse(#[from] serde_json::Error),

    /// The HTTP request failed (connect, timeout, body).
    #[error("feed request to {url} failed: {source}")]
    Http { url: String, source: reqwest::Error },

    /// The extraction service answered with a non-success status.
    #[error("feed request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}
