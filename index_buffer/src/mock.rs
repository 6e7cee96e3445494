//! Mock [`IndexDocuments`] for tests.
//!
//! Outcomes are scripted up front and handed out in order; when the script
//! runs dry every action in the batch succeeds, so happy-path tests don't
//! have to spell out results. Every call is recorded for later inspection.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use fathom_client::{IndexAction, IndexingResult};
use trace::ctx::SpanContext;

use crate::core::{IndexDocuments, IndexError};

/// One batch as seen by the mock.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub actions: Vec<IndexAction>,
    pub span_ctx: Option<SpanContext>,
}

#[derive(Debug, Default)]
struct State {
    script: VecDeque<Result<Vec<IndexingResult>, IndexError>>,
    calls: Vec<RecordedCall>,
}

/// Scripted in-memory [`IndexDocuments`] implementation.
///
/// Shared state lives behind an `Arc` so clones observe the same script,
/// letting a test keep a handle while the sender owns another.
#[derive(Debug, Clone)]
pub struct MockIndexer {
    key_field: Arc<str>,
    state: Arc<Mutex<State>>,
}

impl MockIndexer {
    /// `key_field` is used to fabricate default success results.
    pub fn new(key_field: impl Into<Arc<str>>) -> Self {
        Self {
            key_field: key_field.into(),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Appends per-document results to the script.
    pub fn push_results(&self, results: Vec<IndexingResult>) {
        self.state.lock().script.push_back(Ok(results));
    }

    /// Appends a whole-batch failure to the script.
    pub fn push_error(&self, error: IndexError) {
        self.state.lock().script.push_back(Err(error));
    }

    /// All batches received so far, in arrival order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    /// The document keys of each batch received so far.
    pub fn batch_keys(&self) -> Vec<Vec<String>> {
        self.state
            .lock()
            .calls
            .iter()
            .map(|call| {
                call.actions
                    .iter()
                    .map(|action| action.key(&self.key_field).unwrap_or("?").to_owned())
                    .collect()
            })
            .collect()
    }
}

#[async_trait]
impl IndexDocuments for MockIndexer {
    async fn index_documents(
        &self,
        actions: Vec<IndexAction>,
        span_ctx: Option<SpanContext>,
    ) -> Result<Vec<IndexingResult>, IndexError> {
        let scripted = {
            let mut state = self.state.lock();
            state.calls.push(RecordedCall {
                actions: actions.clone(),
                span_ctx,
            });
            state.script.pop_front()
        };

        match scripted {
            Some(outcome) => outcome,
            None => Ok(actions
                .iter()
                .map(|action| {
                    IndexingResult::success(action.key(&self.key_field).unwrap_or(""), 200)
                })
                .collect()),
        }
    }
}
