use std::borrow::Cow;
use std::num::{NonZeroU64, NonZeroU128, ParseIntError};
use std::str::FromStr;
use std::sync::Arc;

use http::{HeaderMap, HeaderValue};
use snafu::{ResultExt, Snafu};

use crate::{
    TraceCollector,
    span::{Span, SpanStatus},
};

/// Headers used to propagate the trace across service boundaries.
///
/// A single-header format would be more compact but per-value headers keep
/// the server-side parse trivial and the values greppable in proxy logs.
pub const TRACE_ID_HEADER: &str = "x-fathom-trace-id";
pub const SPAN_ID_HEADER: &str = "x-fathom-span-id";
pub const PARENT_SPAN_ID_HEADER: &str = "x-fathom-parent-span-id";
pub const SAMPLED_HEADER: &str = "x-fathom-sampled";

/// Error decoding a [`SpanContext`] from its header representation
#[derive(Debug, Snafu)]
pub enum ContextError {
    #[snafu(display("required header '{header}' not found"))]
    Missing { header: &'static str },

    #[snafu(display("header '{header}' has non-UTF8 content: {source}"))]
    InvalidUtf8 {
        header: &'static str,
        source: http::header::ToStrError,
    },

    #[snafu(display("error decoding header '{header}': {source}"))]
    Decode {
        header: &'static str,
        source: DecodeError,
    },
}

/// Error decoding a single id value
#[derive(Debug, Snafu)]
pub enum DecodeError {
    #[snafu(display("value is not valid hex: {source}"))]
    InvalidHex { source: ParseIntError },

    #[snafu(display("value cannot be 0"))]
    Zero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId(pub NonZeroU128);

impl TraceId {
    pub fn random() -> Self {
        Self(rand::random())
    }

    pub fn get(self) -> u128 {
        self.0.get()
    }
}

impl FromStr for TraceId {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = u128::from_str_radix(s, 16).context(InvalidHexSnafu)?;
        Ok(Self(NonZeroU128::new(value).ok_or(DecodeError::Zero)?))
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId(pub NonZeroU64);

impl SpanId {
    pub fn random() -> Self {
        Self(rand::random())
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl FromStr for SpanId {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = u64::from_str_radix(s, 16).context(InvalidHexSnafu)?;
        Ok(Self(NonZeroU64::new(value).ok_or(DecodeError::Zero)?))
    }
}

impl std::fmt::Display for SpanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// The immutable context of a [`Span`]
///
/// Contains all the information necessary to create a child span and to
/// propagate the trace to another process.
#[derive(Debug, Clone)]
pub struct SpanContext {
    pub trace_id: TraceId,

    pub parent_span_id: Option<SpanId>,

    pub span_id: SpanId,

    pub collector: Option<Arc<dyn TraceCollector>>,
}

impl SpanContext {
    /// Create a new root context with random ids that exports to `collector`.
    pub fn new(collector: Arc<dyn TraceCollector>) -> Self {
        Self {
            trace_id: TraceId::random(),
            parent_span_id: None,
            span_id: SpanId::random(),
            collector: Some(collector),
        }
    }

    /// Creates a new child of the span described by this context.
    pub fn child(&self, name: impl Into<Cow<'static, str>>) -> Span {
        Span {
            name: name.into(),
            ctx: Self {
                trace_id: self.trace_id,
                parent_span_id: Some(self.span_id),
                span_id: SpanId::random(),
                collector: self.collector.clone(),
            },
            start: None,
            end: None,
            status: SpanStatus::Unknown,
            metadata: Default::default(),
            events: Default::default(),
        }
    }

    /// Serializes this context onto `headers` so the receiving service can
    /// join the trace. The inverse of [`Self::from_headers`].
    pub fn inject_headers(&self, headers: &mut HeaderMap) {
        headers.insert(TRACE_ID_HEADER, hex_value(self.trace_id.to_string()));
        headers.insert(SPAN_ID_HEADER, hex_value(self.span_id.to_string()));
        if let Some(parent) = self.parent_span_id {
            headers.insert(PARENT_SPAN_ID_HEADER, hex_value(parent.to_string()));
        }
        headers.insert(SAMPLED_HEADER, HeaderValue::from_static("1"));
    }

    /// Create a `SpanContext` for the trace described in the headers, if any.
    ///
    /// - Returns `Ok(None)` if there is no sampled trace to continue
    /// - Returns `Err` if the headers are present but malformed
    pub fn from_headers(
        collector: &Arc<dyn TraceCollector>,
        headers: &HeaderMap,
    ) -> Result<Option<Self>, ContextError> {
        let sampled = decoded_header(headers, SAMPLED_HEADER)?
            .map(|value| value == "1" || value == "true")
            .unwrap_or(false);

        if !sampled {
            return Ok(None);
        }

        Ok(Some(Self {
            trace_id: required_header(headers, TRACE_ID_HEADER)?,
            parent_span_id: parsed_header(headers, PARENT_SPAN_ID_HEADER)?,
            span_id: required_header(headers, SPAN_ID_HEADER)?,
            collector: Some(Arc::clone(collector)),
        }))
    }
}

/// Lowercase hex never needs escaping so this cannot actually fail.
fn hex_value(s: String) -> HeaderValue {
    HeaderValue::from_str(&s).expect("hex string is a valid header value")
}

/// Decodes a given header from the provided HeaderMap to a string
///
/// - Returns Ok(None) if the header doesn't exist
/// - Returns Err if the header fails to decode to a string
/// - Returns Ok(Some(_)) otherwise
fn decoded_header<'a>(
    headers: &'a HeaderMap,
    header: &'static str,
) -> Result<Option<&'a str>, ContextError> {
    headers
        .get(header)
        .map(|value| value.to_str().context(InvalidUtf8Snafu { header }))
        .transpose()
}

/// Decodes and parses a given header from the provided HeaderMap
///
/// - Returns Ok(None) if the header doesn't exist
/// - Returns Err if the header fails to decode to a string or fails to parse
/// - Returns Ok(Some(_)) otherwise
fn parsed_header<T: FromStr<Err = DecodeError>>(
    headers: &HeaderMap,
    header: &'static str,
) -> Result<Option<T>, ContextError> {
    decoded_header(headers, header)?
        .map(FromStr::from_str)
        .transpose()
        .context(DecodeSnafu { header })
}

/// Decodes and parses a given required header from the provided HeaderMap
///
/// - Returns Err if the header fails to decode to a string, fails to parse, or doesn't exist
/// - Returns Ok(T) otherwise
fn required_header<T: FromStr<Err = DecodeError>>(
    headers: &HeaderMap,
    header: &'static str,
) -> Result<T, ContextError> {
    parsed_header(headers, header)?.ok_or(ContextError::Missing { header })
}
