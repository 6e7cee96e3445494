//! The seam between the buffered sender and whatever sends batches over the
//! network.

use async_trait::async_trait;
use http::StatusCode;

use fathom_client::{Client, IndexAction, IndexingResult};
use trace::ctx::SpanContext;

/// Whole-batch failure of one send attempt.
///
/// Per-document failures are not errors; they come back as non-succeeded
/// [`IndexingResult`]s.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The batch never produced per-document results. Resending the same
    /// actions later may succeed.
    #[error("batch could not be delivered: {source}")]
    Transport {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The service rejected the batch as a whole, e.g. a malformed envelope
    /// or an oversized single document.
    #[error("batch rejected with {status}: {message}")]
    Rejected { status: StatusCode, message: String },
}

/// Sends one batch of actions and reports per-document outcomes.
///
/// The buffered sender treats this as an opaque network operation: batching,
/// dedup and retry happen above this trait, serialization and transport
/// below it.
#[async_trait]
pub trait IndexDocuments: std::fmt::Debug + Send + Sync + 'static {
    /// One result per action, in submission order.
    async fn index_documents(
        &self,
        actions: Vec<IndexAction>,
        span_ctx: Option<SpanContext>,
    ) -> Result<Vec<IndexingResult>, IndexError>;
}

#[async_trait]
impl IndexDocuments for Client {
    async fn index_documents(
        &self,
        actions: Vec<IndexAction>,
        span_ctx: Option<SpanContext>,
    ) -> Result<Vec<IndexingResult>, IndexError> {
        Client::index_documents(self, &actions, span_ctx.as_ref())
            .await
            .map_err(|error| match error {
                fathom_client::Error::Http { status, message } => {
                    IndexError::Rejected { status, message }
                }
                error @ fathom_client::Error::TooLarge { .. } => IndexError::Rejected {
                    status: StatusCode::PAYLOAD_TOO_LARGE,
                    message: error.to_string(),
                },
                other => IndexError::Transport {
                    source: Box::new(other),
                },
            })
    }
}
