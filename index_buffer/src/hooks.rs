use fathom_client::{IndexAction, IndexingResult};

/// Callbacks fired as actions move through a [`BufferedSender`].
///
/// Every method defaults to a no-op, so implementations only override what
/// they care about. Callbacks run inline on the enqueue and flush paths and
/// must not block.
///
/// [`BufferedSender`]: crate::BufferedSender
pub trait IndexingObserver: std::fmt::Debug + Send + Sync {
    /// An action was accepted into the queue.
    fn on_new(&self, _action: &IndexAction) {}

    /// The action is part of a batch whose send attempt is starting. Fires
    /// once per attempt, so a retried action sees it more than once.
    fn on_progress(&self, _action: &IndexAction) {}

    /// The action was dropped after exhausting its retry budget. `result`
    /// is the final per-document result, or `None` when the last attempt
    /// failed as a whole batch.
    fn on_error(&self, _action: &IndexAction, _result: Option<&IndexingResult>) {}

    /// The action left the queue for a non-error reason: it succeeded, or a
    /// newer action for the same key replaced it.
    fn on_remove(&self, _action: &IndexAction) {}
}
