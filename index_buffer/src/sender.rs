//! Buffered, batching front end over an [`IndexDocuments`] implementation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use observability_deps::tracing::{debug, warn};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use fathom_client::{Document, IndexAction, IndexingResult};

use crate::{
    Error,
    core::{IndexDocuments, IndexError},
    hooks::IndexingObserver,
    queue::{ActionQueue, QueuedAction},
};

/// Configuration for [`BufferedSender`].
#[derive(Debug, Clone, Copy)]
pub struct BufferedSenderConfig {
    /// Maximum number of actions per batch. Reaching this many pending
    /// actions also triggers a synchronous flush from the enqueueing call.
    pub batch_action_count: usize,

    /// Whether the background flush timer runs.
    pub auto_flush: bool,

    /// Tick interval of the background flush timer.
    pub auto_flush_interval: Duration,

    /// How many times one action may be re-sent after a failed attempt
    /// before it is dropped and reported via
    /// [`IndexingObserver::on_error`].
    pub max_retries_per_action: u32,

    /// Upper bound on batches in flight across all concurrent flush
    /// callers, the timer included.
    pub max_concurrent_batches: usize,
}

impl Default for BufferedSenderConfig {
    fn default() -> Self {
        Self {
            batch_action_count: 512,
            auto_flush: true,
            auto_flush_interval: Duration::from_secs(60),
            max_retries_per_action: 3,
            max_concurrent_batches: 4,
        }
    }
}

/// Accumulates indexing actions and ships them to the service in batches.
///
/// Documents enqueued through the verb methods are deduplicated by key (last
/// write wins) and sent in batches of at most
/// [`batch_action_count`](BufferedSenderConfig::batch_action_count) when the
/// queue reaches that size, when the auto-flush timer fires, on an explicit
/// [`flush`](Self::flush), or on [`close`](Self::close). Failed actions are
/// retried with a per-action budget; an action only ever leaves the queue by
/// succeeding, being superseded by a newer action for its key, or exhausting
/// its budget, in which case the configured [`IndexingObserver`] hears about
/// it.
///
/// Enqueueing never touches the network unless it trips the batch-size
/// threshold, in which case the flush happens synchronously on the calling
/// task.
#[derive(Debug)]
pub struct BufferedSender {
    inner: Arc<Inner>,
    /// Present while the auto-flush task is running.
    timer: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug)]
struct Inner {
    queue: ActionQueue,
    indexer: Arc<dyn IndexDocuments>,
    key_field: String,
    config: BufferedSenderConfig,
    observer: Option<Arc<dyn IndexingObserver>>,
    /// Bounds batches in flight across every flush driver.
    in_flight: Semaphore,
    /// Signals the auto-flush task to stop.
    shutdown: CancellationToken,
    closed: AtomicBool,
}

impl BufferedSender {
    /// `key_field` names the document field that uniquely identifies an
    /// entity; it is how actions are deduplicated and how results are
    /// matched back to them.
    pub fn new(
        indexer: Arc<dyn IndexDocuments>,
        key_field: impl Into<String>,
        config: BufferedSenderConfig,
        observer: Option<Arc<dyn IndexingObserver>>,
    ) -> Self {
        let inner = Arc::new(Inner {
            queue: ActionQueue::new(),
            indexer,
            key_field: key_field.into(),
            config,
            observer,
            in_flight: Semaphore::new(config.max_concurrent_batches.max(1)),
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
        });

        let timer = config
            .auto_flush
            .then(|| tokio::spawn(auto_flush_loop(Arc::clone(&inner))));

        Self {
            inner,
            timer: Mutex::new(timer),
        }
    }

    /// Queues documents for upload, replacing any existing document with the
    /// same key.
    pub async fn upload_documents(&self, documents: Vec<Document>) -> Result<(), Error> {
        self.enqueue_documents(documents, IndexAction::upload).await
    }

    /// Queues merges into existing documents.
    pub async fn merge_documents(&self, documents: Vec<Document>) -> Result<(), Error> {
        self.enqueue_documents(documents, IndexAction::merge).await
    }

    /// Queues merges that fall back to upload for unknown keys.
    pub async fn merge_or_upload_documents(&self, documents: Vec<Document>) -> Result<(), Error> {
        self.enqueue_documents(documents, IndexAction::merge_or_upload)
            .await
    }

    /// Queues deletions of the documents with the given keys.
    pub async fn delete_documents(&self, documents: Vec<Document>) -> Result<(), Error> {
        self.enqueue_documents(documents, IndexAction::delete).await
    }

    async fn enqueue_documents(
        &self,
        documents: Vec<Document>,
        to_action: fn(Document) -> IndexAction,
    ) -> Result<(), Error> {
        self.inner.enqueue_all(documents, to_action)?;

        if self.inner.queue.len() >= self.inner.config.batch_action_count {
            self.inner.flush(None).await?;
        }
        Ok(())
    }

    /// Drains the queue, sending batches until it is empty or `timeout`
    /// elapses.
    ///
    /// On timeout the in-flight batch is requeued at the front and
    /// [`Error::FlushTimeout`] is returned; no action is lost. A zero
    /// timeout on a non-empty queue therefore fails immediately without
    /// sending anything. Flushing an empty queue is a no-op for any timeout.
    ///
    /// Per-document failures are retried internally and never surface here;
    /// a whole-batch failure propagates after its members have been requeued
    /// or, once their retry budget is spent, dropped.
    pub async fn flush(&self, timeout: Option<Duration>) -> Result<(), Error> {
        self.inner.flush(timeout).await
    }

    /// Number of actions currently queued.
    pub fn pending_actions(&self) -> usize {
        self.inner.queue.len()
    }

    /// Stops the auto-flush timer and drains the queue.
    ///
    /// Subsequent enqueues fail with [`Error::Closed`]. Idempotent: later
    /// calls return `Ok` without doing anything. The timer is stopped even
    /// if the final flush fails.
    pub async fn close(&self) -> Result<(), Error> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.stop_timer().await;
        self.inner.flush(None).await
    }

    async fn stop_timer(&self) {
        self.inner.shutdown.cancel();

        let timer = self.timer.lock().take();
        if let Some(timer) = timer {
            // The task finishes its current tick and exits; a join error
            // here means it panicked.
            if let Err(error) = timer.await {
                warn!(%error, "auto-flush task did not shut down cleanly");
            }
        }
    }
}

impl Drop for BufferedSender {
    fn drop(&mut self) {
        // Cancel rather than abort: an in-flight periodic flush finishes its
        // batch, then the task exits on its next loop turn.
        self.inner.shutdown.cancel();
        drop(self.timer.get_mut().take());

        if !self.inner.closed.load(Ordering::SeqCst) {
            let pending = self.inner.queue.len();
            if pending > 0 {
                warn!(
                    pending,
                    "buffered sender dropped without close, abandoning queued actions"
                );
            }
        }
    }
}

impl Inner {
    fn notify(&self, f: impl FnOnce(&dyn IndexingObserver)) {
        if let Some(observer) = &self.observer {
            f(observer.as_ref());
        }
    }

    /// Validates every document's key, then enqueues them all. A key error
    /// leaves the queue untouched.
    fn enqueue_all(
        &self,
        documents: Vec<Document>,
        to_action: fn(Document) -> IndexAction,
    ) -> Result<(), Error> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed);
        }

        let mut pending = Vec::with_capacity(documents.len());
        for document in documents {
            let action = to_action(document);
            let Some(key) = action.key(&self.key_field).map(str::to_owned) else {
                return Err(Error::MissingKey {
                    field: self.key_field.clone(),
                });
            };
            pending.push((key, action));
        }

        for (key, action) in pending {
            self.notify(|observer| observer.on_new(&action));
            if let Some(replaced) = self.queue.enqueue(key, action) {
                self.notify(|observer| observer.on_remove(&replaced));
            }
        }
        Ok(())
    }

    async fn flush(&self, timeout: Option<Duration>) -> Result<(), Error> {
        let deadline = timeout.map(|timeout| tokio::time::Instant::now() + timeout);

        while !self.queue.is_empty() {
            if deadline.is_some_and(|deadline| tokio::time::Instant::now() >= deadline) {
                return Err(Error::FlushTimeout {
                    pending: self.queue.len(),
                });
            }

            let batch = self.queue.dequeue_batch(self.config.batch_action_count);
            if batch.is_empty() {
                // Another flush driver got there first
                break;
            }
            self.send_batch(batch, deadline).await?;
        }

        Ok(())
    }

    /// Sends one batch, racing the exchange against `deadline`, and settles
    /// every member's fate: removed, requeued, or dropped.
    async fn send_batch(
        &self,
        entries: Vec<(String, QueuedAction)>,
        deadline: Option<tokio::time::Instant>,
    ) -> Result<(), Error> {
        let actions: Vec<IndexAction> = entries
            .iter()
            .map(|(_, queued)| queued.action.clone())
            .collect();
        for action in &actions {
            self.notify(|observer| observer.on_progress(action));
        }
        debug!(actions = actions.len(), "sending batch");

        let exchange = async {
            let _permit = self
                .in_flight
                .acquire()
                .await
                .expect("semaphore is never closed");
            self.indexer.index_documents(actions, None).await
        };

        let outcome = match deadline {
            Some(deadline) => tokio::select! {
                outcome = exchange => Some(outcome),
                _ = tokio::time::sleep_until(deadline) => None,
            },
            None => Some(exchange.await),
        };

        match outcome {
            None => {
                // Deadline expired mid-exchange; the batch goes back to the
                // head so nothing is lost
                self.requeue(entries);
                Err(Error::FlushTimeout {
                    pending: self.queue.len(),
                })
            }
            Some(Ok(results)) => {
                self.settle_results(entries, results);
                Ok(())
            }
            Some(Err(error)) => {
                self.settle_batch_failure(entries, &error);
                Err(error.into())
            }
        }
    }

    /// Applies per-document results: success removes the action, failure
    /// costs one attempt.
    fn settle_results(&self, entries: Vec<(String, QueuedAction)>, results: Vec<IndexingResult>) {
        let by_key: std::collections::HashMap<&str, &IndexingResult> = results
            .iter()
            .map(|result| (result.key.as_str(), result))
            .collect();

        let mut requeue = Vec::new();
        for (position, (key, mut queued)) in entries.into_iter().enumerate() {
            // Results are matched by key; a result without a recognizable
            // key falls back to its position in the parallel array. An
            // action the service did not report on at all is treated as a
            // failed attempt so it is retried rather than lost.
            let result = by_key
                .get(key.as_str())
                .copied()
                .or_else(|| results.get(position));

            match result {
                Some(result) if result.succeeded => {
                    self.notify(|observer| observer.on_remove(&queued.action));
                }
                failure => {
                    queued.failed_attempts += 1;
                    if queued.failed_attempts > self.config.max_retries_per_action {
                        self.drop_action(&queued.action, failure);
                    } else {
                        requeue.push((key, queued));
                    }
                }
            }
        }

        if !requeue.is_empty() {
            self.requeue(requeue);
        }
    }

    /// A whole-batch failure costs every member one attempt, same budget as
    /// a per-document failure.
    fn settle_batch_failure(&self, entries: Vec<(String, QueuedAction)>, error: &IndexError) {
        warn!(%error, actions = entries.len(), "batch send failed");

        let mut requeue = Vec::new();
        for (key, mut queued) in entries {
            queued.failed_attempts += 1;
            if queued.failed_attempts > self.config.max_retries_per_action {
                self.drop_action(&queued.action, None);
            } else {
                requeue.push((key, queued));
            }
        }

        if !requeue.is_empty() {
            self.requeue(requeue);
        }
    }

    fn requeue(&self, entries: Vec<(String, QueuedAction)>) {
        for stale in self.queue.requeue_front(entries) {
            self.notify(|observer| observer.on_remove(&stale));
        }
    }

    fn drop_action(&self, action: &IndexAction, result: Option<&IndexingResult>) {
        warn!(
            key = action.key(&self.key_field).unwrap_or(""),
            status = result.map(|result| result.status_code),
            "dropping action after exhausting its retry budget",
        );
        self.notify(|observer| observer.on_error(action, result));
    }
}

async fn auto_flush_loop(inner: Arc<Inner>) {
    let mut interval = tokio::time::interval(inner.config.auto_flush_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick of a fresh interval completes immediately
    interval.tick().await;

    loop {
        tokio::select! {
            _ = inner.shutdown.cancelled() => return,
            _ = interval.tick() => {}
        }

        if let Err(error) = inner.flush(None).await {
            warn!(%error, "periodic flush failed");
        }
    }
}
