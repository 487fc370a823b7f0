// source.rs - DocumentFeed: where the list of available documents comes from.
//
// The feed is an external collaborator that is only ever read. Each fetch
// returns the complete current list; there is no incremental protocol.

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::entry::{parse_feed, DocumentFeedEntry};
use crate::error::FeedError;

/// Supplies the current list of extracted documents.
#[async_trait]
pub trait DocumentFeed: Send + Sync {
    /// Fetch the full current list.
    async fn fetch(&self) -> Result<Vec<DocumentFeedEntry>, FeedError>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Reads a JSON array from a file the extractor keeps up to date.
pub struct JsonFileFeed {
    path: PathBuf,
}

impl JsonFileFeed {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl DocumentFeed for JsonFileFeed {
    async fn fetch(&self) -> Result<Vec<DocumentFeedEntry>, FeedError> {
        let json = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| FeedError::IoError {
                path: self.path.display().to_string(),
                source,
            })?;
        parse_feed(&json)
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

/// GETs the feed from the extraction service.
pub struct HttpFeed {
    url: String,
    client: reqwest::Client,
}

impl HttpFeed {
    /// Build a feed reader whose requests give up after `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FeedError> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| FeedError::Http {
                url: url.clone(),
                source,
            })?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl DocumentFeed for HttpFeed {
    async fn fetch(&self) -> Result<Vec<DocumentFeedEntry>, FeedError> {
        let http_err = |source| FeedError::Http {
            url: self.url.clone(),
            source,
        };
        let response = self.client.get(&self.url).send().await.map_err(http_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }
        let body = response.text().await.map_err(http_err)?;
        parse_feed(&body)
    }

    fn describe(&self) -> String {
        format!("url {}", self.url)
    }
}

/// In-memory feed whose contents can be swapped at any time.
#[derive(Default)]
pub struct StaticFeed {
    entries: RwLock<Vec<DocumentFeedEntry>>,
}

impl StaticFeed {
    pub fn new(entries: Vec<DocumentFeedEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Replace the whole list.
    pub fn replace(&self, entries: Vec<DocumentFeedEntry>) {
        *self.entries.write().unwrap_or_else(PoisonError::into_inner) = entries;
    }

    /// Add one entry.
    pub fn push(&self, entry: DocumentFeedEntry) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}

#[async_trait]
impl DocumentFeed for StaticFeed {
    async fn fetch(&self) -> Result<Vec<DocumentFeedEntry>, FeedError> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn describe(&self) -> String {
        "static".to_string()
    }
}
