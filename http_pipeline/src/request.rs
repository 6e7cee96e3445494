use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method, header::HeaderName, header::HeaderValue};
use trace::ctx::SpanContext;
use url::Url;

/// A replayable request body.
///
/// Bodies are kept in memory so that the retry policy can resend the request
/// without consulting the caller.
#[derive(Debug, Clone, Default)]
pub enum Body {
    #[default]
    Empty,
    Bytes(Bytes),
}

impl Body {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Empty => &[],
            Self::Bytes(bytes) => bytes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes.into())
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(s.as_bytes()))
    }
}

/// Per-request knobs carried alongside the request through the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct RequestOptions {
    /// Overrides the transport's timeout for this request.
    pub timeout: Option<Duration>,

    /// Requests that are not idempotent are never resent by the retry
    /// policy, regardless of how the failure is classified.
    pub idempotent: bool,

    /// When false the transport hands back the response body as a stream
    /// instead of buffering it.
    pub read_body: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            idempotent: true,
            read_body: true,
        }
    }
}

/// A description of an HTTP request to run through a [`Pipeline`].
///
/// The caller owns the request until it is handed to [`Pipeline::run`];
/// policies and the transport may add headers on the way down but must not
/// change the method, URL or body.
///
/// [`Pipeline`]: crate::Pipeline
/// [`Pipeline::run`]: crate::Pipeline::run
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Body,
    pub options: RequestOptions,

    /// Parent tracing context, if the caller wants this request traced.
    pub span_ctx: Option<SpanContext>,
}

impl Request {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Body::Empty,
            options: RequestOptions::default(),
            span_ctx: None,
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_span_ctx(mut self, span_ctx: Option<SpanContext>) -> Self {
        self.span_ctx = span_ctx;
        self
    }
}
