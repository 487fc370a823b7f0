//! # nt-feed
//!
//! Document feed reading and readiness reconciliation.
//!
//! The extraction service publishes the list of documents it has read. This
//! crate fetches that list, keeps a fresh copy in the background and decides
//! which Pending cases are document-ready.
//!
//! ## Key components
//!
//! - [`DocumentFeed`]: where entries come from ([`JsonFileFeed`], [`HttpFeed`], [`StaticFeed`])
//! - [`parse_feed`]: accepts flat records and raw extractor output
//! - [`ReadinessSet`]: result of matching Pending cases against a feed
//! - [`FeedPoller`]: cancellable background refresh with a `watch` snapshot

pub mod entry;
pub mod error;
pub mod matcher;
pub mod poller;
pub mod source;

pub use entry::{parse_feed, DocumentFeedEntry, RADICADO_FIELD};
pub use error::FeedError;
pub use matcher::{feed_radicados, is_document_ready, ReadinessSet};
pub use poller::{FeedPoller, FeedSnapshot};
pub use source::{DocumentFeed, HttpFeed, JsonFileFeed, StaticFeed};
