//! Client for the fathom document-indexing API.
//!
//! [`Client`] wraps an [`http_pipeline::Pipeline`] configured with the
//! service's standard policies (constant headers, retry with backoff,
//! distributed tracing) and exposes the batch document endpoint:
//! [`Client::index_documents`] plus one convenience wrapper per action kind.
//!
//! Per-document failures are reported as [`IndexingResult`]s, not errors;
//! [`Error`] is reserved for whole-batch problems such as a rejected payload
//! or an unreachable service.
//!
//! ```no_run
//! # #[tokio::main]
//! # async fn main() -> Result<(), fathom_client::Error> {
//! use fathom_client::{Client, Document};
//! use serde_json::json;
//!
//! let client = Client::new("https://search.example.com", "hotels", "secret-key")?;
//!
//! let mut doc = Document::new();
//! doc.insert("hotelId".into(), json!("1"));
//! doc.insert("name".into(), json!("Grand Fathom"));
//!
//! let results = client.upload_documents(vec![doc], None).await?;
//! assert!(results.iter().all(|result| result.succeeded));
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use futures::{FutureExt, future::BoxFuture};
use http::{
    Method, StatusCode,
    header::{self, HeaderName, HeaderValue},
};
use observability_deps::tracing::debug;
use secrecy::{ExposeSecret, Secret};
use url::Url;

use http_pipeline::{
    Pipeline, Request, Transport,
    policies::{HeadersPolicy, RetryConfig, RetryPolicy, TracingPolicy},
};
use trace::{TraceCollector, ctx::SpanContext};

pub mod action;

pub use action::{Document, IndexAction, IndexActionKind, IndexingResult};
use action::{BatchRequest, BatchResponse};

/// Header carrying the index API key.
pub const API_KEY_HEADER: &str = "api-key";

const USER_AGENT: &str = concat!("fathom-client/", env!("CARGO_PKG_VERSION"));

/// Primary error type for the [`Client`]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid endpoint URL: {0}")]
    InvalidEndpoint(#[source] url::ParseError),

    #[error("'{name}' is not a valid header value")]
    InvalidHeaderValue { name: &'static str },

    #[error(transparent)]
    Pipeline(#[from] http_pipeline::Error),

    #[error("server responded with {status}: {message}")]
    Http { status: StatusCode, message: String },

    #[error("a batch of {count} cannot be split further to fit the payload limit")]
    TooLarge { count: usize },

    #[error("invalid JSON: {0}")]
    Json(#[source] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// True when the failure happened below the HTTP layer, meaning the
    /// batch may never have reached the service at all. Status failures
    /// ([`Error::Http`], [`Error::TooLarge`]) are not transport errors.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Pipeline(_))
    }
}

/// Client for one index of a fathom deployment.
///
/// Cheap to clone; clones share the pipeline and therefore the connection
/// pool.
#[derive(Debug, Clone)]
pub struct Client {
    docs_url: Url,
    pipeline: Pipeline,
    trace_collector: Option<Arc<dyn TraceCollector>>,
}

impl Client {
    /// Connects to `endpoint` (e.g. `https://search.example.com`) and the
    /// given index, authenticating with `api_key`.
    pub fn new(
        endpoint: impl Into<String>,
        index: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self> {
        Self::builder(endpoint, index).with_api_key(api_key).build()
    }

    /// A [`ClientBuilder`] for non-default pipeline configuration.
    pub fn builder(endpoint: impl Into<String>, index: impl Into<String>) -> ClientBuilder {
        ClientBuilder {
            endpoint: endpoint.into(),
            index: index.into(),
            api_key: None,
            user_agent: USER_AGENT.to_owned(),
            retry_config: RetryConfig::default(),
            transport: None,
            trace_collector: None,
        }
    }

    /// Sends a batch of actions to the index and returns one
    /// [`IndexingResult`] per action, in submission order.
    ///
    /// Statuses 200 and 207 both parse the result array; 207 means some
    /// documents failed and their results say why. A 413 splits the batch in
    /// half and retries both halves, recursing until the parts fit; results
    /// are concatenated back into submission order. Any other error status
    /// becomes [`Error::Http`] after the pipeline's retry budget is spent.
    ///
    /// An empty batch returns `Ok(vec![])` without a network exchange.
    pub async fn index_documents(
        &self,
        actions: &[IndexAction],
        span_ctx: Option<&SpanContext>,
    ) -> Result<Vec<IndexingResult>> {
        if actions.is_empty() {
            return Ok(Vec::new());
        }

        // With a configured collector, untraced calls get a fresh root so
        // batch splits still share one trace
        let root_ctx = match (span_ctx, &self.trace_collector) {
            (None, Some(collector)) => Some(SpanContext::new(Arc::clone(collector))),
            _ => None,
        };
        let ctx = span_ctx.or(root_ctx.as_ref());

        self.send_batch(actions, ctx).await
    }

    /// Uploads documents, replacing existing ones with the same key.
    pub async fn upload_documents(
        &self,
        documents: Vec<Document>,
        span_ctx: Option<&SpanContext>,
    ) -> Result<Vec<IndexingResult>> {
        let actions: Vec<_> = documents.into_iter().map(IndexAction::upload).collect();
        self.index_documents(&actions, span_ctx).await
    }

    /// Merges fields into existing documents; unknown keys fail per-document.
    pub async fn merge_documents(
        &self,
        documents: Vec<Document>,
        span_ctx: Option<&SpanContext>,
    ) -> Result<Vec<IndexingResult>> {
        let actions: Vec<_> = documents.into_iter().map(IndexAction::merge).collect();
        self.index_documents(&actions, span_ctx).await
    }

    /// Merges into existing documents, uploading those whose key is new.
    pub async fn merge_or_upload_documents(
        &self,
        documents: Vec<Document>,
        span_ctx: Option<&SpanContext>,
    ) -> Result<Vec<IndexingResult>> {
        let actions: Vec<_> = documents
            .into_iter()
            .map(IndexAction::merge_or_upload)
            .collect();
        self.index_documents(&actions, span_ctx).await
    }

    /// Deletes the documents with the given keys; other fields are ignored.
    pub async fn delete_documents(
        &self,
        documents: Vec<Document>,
        span_ctx: Option<&SpanContext>,
    ) -> Result<Vec<IndexingResult>> {
        let actions: Vec<_> = documents.into_iter().map(IndexAction::delete).collect();
        self.index_documents(&actions, span_ctx).await
    }

    fn send_batch<'a>(
        &'a self,
        actions: &'a [IndexAction],
        span_ctx: Option<&'a SpanContext>,
    ) -> BoxFuture<'a, Result<Vec<IndexingResult>>> {
        async move {
            let body = serde_json::to_vec(&BatchRequest { actions }).map_err(Error::Json)?;
            let mut request = Request::new(Method::POST, self.docs_url.clone())
                .with_header(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                )
                .with_body(body)
                .with_span_ctx(span_ctx.cloned());

            let response = self.pipeline.run(&mut request).await?;
            let status = response.status;

            if status == StatusCode::OK || status == StatusCode::MULTI_STATUS {
                let body = response
                    .bytes()
                    .await
                    .map_err(|source| Error::Pipeline(source.into()))?;
                let parsed: BatchResponse =
                    serde_json::from_slice(&body).map_err(Error::Json)?;
                Ok(parsed.results)
            } else if status == StatusCode::PAYLOAD_TOO_LARGE {
                if actions.len() <= 1 {
                    return Err(Error::TooLarge {
                        count: actions.len(),
                    });
                }

                let mid = actions.len() / 2;
                debug!(
                    total = actions.len(),
                    "batch exceeds payload limit, splitting in half"
                );

                let mut results = self.send_batch(&actions[..mid], span_ctx).await?;
                results.extend(self.send_batch(&actions[mid..], span_ctx).await?);
                Ok(results)
            } else {
                // Best effort error text; an unreadable body leaves it empty
                let body = response.bytes().await.unwrap_or_default();
                Err(Error::Http {
                    status,
                    message: String::from_utf8_lossy(&body).trim().to_owned(),
                })
            }
        }
        .boxed()
    }
}

/// Builder for [`Client`].
#[derive(Debug)]
pub struct ClientBuilder {
    endpoint: String,
    index: String,
    api_key: Option<Secret<String>>,
    user_agent: String,
    retry_config: RetryConfig,
    transport: Option<Arc<dyn Transport>>,
    trace_collector: Option<Arc<dyn TraceCollector>>,
}

impl ClientBuilder {
    /// Authenticate requests with the given index API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(Secret::new(api_key.into()));
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    /// Replaces the default [`ReqwestTransport`], e.g. with a mock.
    ///
    /// [`ReqwestTransport`]: http_pipeline::ReqwestTransport
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Export a span per request attempt (and roots for untraced calls) to
    /// the given collector.
    pub fn with_trace_collector(mut self, collector: Arc<dyn TraceCollector>) -> Self {
        self.trace_collector = Some(collector);
        self
    }

    pub fn build(self) -> Result<Client> {
        let mut endpoint = Url::parse(&self.endpoint).map_err(Error::InvalidEndpoint)?;
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }
        let docs_url = endpoint
            .join(&format!("indexes/{}/docs/index", self.index))
            .map_err(Error::InvalidEndpoint)?;

        let mut headers = HeadersPolicy::default().with_header(
            header::USER_AGENT,
            HeaderValue::from_str(&self.user_agent)
                .map_err(|_| Error::InvalidHeaderValue { name: "user-agent" })?,
        );
        if let Some(api_key) = &self.api_key {
            let mut value = HeaderValue::from_str(api_key.expose_secret())
                .map_err(|_| Error::InvalidHeaderValue {
                    name: API_KEY_HEADER,
                })?;
            value.set_sensitive(true);
            headers = headers.with_header(HeaderName::from_static(API_KEY_HEADER), value);
        }

        // Tracing sits inside retry so every attempt gets its own span
        let mut pipeline = Pipeline::builder()
            .with_interceptor(headers)
            .with_policy(Arc::new(RetryPolicy::new(self.retry_config)))
            .with_policy(Arc::new(TracingPolicy::new()));
        if let Some(transport) = self.transport {
            pipeline = pipeline.with_transport(transport);
        }

        Ok(Client {
            docs_url,
            pipeline: pipeline.build(),
            trace_collector: self.trace_collector,
        })
    }
}
