//! Client-side buffering for document indexing.
//!
//! [`BufferedSender`] sits between an application and an
//! [`IndexDocuments`] backend (usually a [`fathom_client::Client`]). It
//! deduplicates queued actions by document key so only the latest write per
//! key is sent, ships them in bounded batches, retries failed actions on a
//! per-action budget, and reports lifecycle events to an optional
//! [`IndexingObserver`]. Batches go out when the queue reaches the batch
//! size, when the auto-flush timer fires, and on [`BufferedSender::flush`]
//! or [`BufferedSender::close`].
//!
//! ```no_run
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//!
//! use fathom_client::{Client, Document};
//! use index_buffer::{BufferedSender, BufferedSenderConfig};
//! use serde_json::json;
//!
//! let client = Client::new("https://search.example.com", "hotels", "secret-key")?;
//! let sender = BufferedSender::new(
//!     Arc::new(client),
//!     "hotelId",
//!     BufferedSenderConfig::default(),
//!     None,
//! );
//!
//! let mut doc = Document::new();
//! doc.insert("hotelId".into(), json!("1"));
//! doc.insert("rating".into(), json!(4));
//! sender.upload_documents(vec![doc]).await?;
//!
//! // Actions accumulate in the background; close drains whatever is left.
//! sender.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod hooks;
pub mod mock;
pub mod queue;
pub mod sender;

/// Errors surfaced by [`BufferedSender`] operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("flush timed out with {pending} actions still pending")]
    FlushTimeout { pending: usize },

    #[error("sender is closed")]
    Closed,

    #[error("document is missing a string value for key field '{field}'")]
    MissingKey { field: String },

    #[error(transparent)]
    Index(#[from] IndexError),
}

pub use crate::core::{IndexDocuments, IndexError};
pub use crate::hooks::IndexingObserver;
pub use crate::queue::{ActionQueue, QueuedAction};
pub use crate::sender::{BufferedSender, BufferedSenderConfig};

pub use fathom_client::{Document, IndexAction, IndexActionKind, IndexingResult};
