use std::borrow::Cow;
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::ctx::SpanContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanStatus {
    Unknown,
    Ok,
    Err,
}

/// A `Span` is a representation of an interval of time spent performing some
/// operation, e.g. a single HTTP request or one flush of a buffer.
///
/// A `Span` has a name, metadata, a start and end time and a unique ID.
/// Together with the parent relationships in its [`SpanContext`] it forms a
/// trace.
#[derive(Debug, Clone)]
pub struct Span {
    pub name: Cow<'static, str>,

    pub ctx: SpanContext,

    pub start: Option<DateTime<Utc>>,

    pub end: Option<DateTime<Utc>>,

    pub status: SpanStatus,

    pub metadata: HashMap<Cow<'static, str>, MetaValue>,

    pub events: Vec<SpanEvent>,
}

impl Span {
    /// Record an event on this `Span`
    pub fn event(&mut self, msg: impl Into<Cow<'static, str>>) {
        self.events.push(SpanEvent {
            time: Utc::now(),
            msg: msg.into(),
        })
    }

    /// Record an error on this `Span`
    pub fn error(&mut self, msg: impl Into<Cow<'static, str>>) {
        self.event(msg);
        self.status = SpanStatus::Err;
    }

    /// Record a metadata value on this `Span`
    pub fn set_metadata(&mut self, key: impl Into<Cow<'static, str>>, value: impl Into<MetaValue>) {
        self.metadata.insert(key.into(), value.into());
    }

    /// Exports this `Span` to its registered collector if any
    pub fn export(mut self) {
        if let Some(collector) = self.ctx.collector.take() {
            collector.export(self)
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpanEvent {
    pub time: DateTime<Utc>,

    pub msg: Cow<'static, str>,
}

/// Values that can be stored in a Span's metadata and events
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    String(Cow<'static, str>),
    Float(f64),
    Int(i64),
}

impl From<&'static str> for MetaValue {
    fn from(v: &'static str) -> Self {
        Self::String(Cow::Borrowed(v))
    }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        Self::String(Cow::Owned(v))
    }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

/// Guard that ends and exports an optional [`Span`] exactly once.
///
/// Records the start time on construction and the end time on drop, then
/// exports the span. All operations are no-ops when constructed with `None`,
/// so callers do not need to special-case "tracing disabled".
#[derive(Debug, Default)]
pub struct SpanRecorder {
    /// Option so the span can be taken out of it on drop
    span: Option<Span>,
}

impl SpanRecorder {
    pub fn new(mut span: Option<Span>) -> Self {
        if let Some(span) = &mut span {
            span.start = Some(Utc::now());
        }
        Self { span }
    }

    /// Record an event on the wrapped span, if any.
    pub fn event(&mut self, msg: impl Into<Cow<'static, str>>) {
        if let Some(span) = &mut self.span {
            span.event(msg);
        }
    }

    /// Record success on the wrapped span, if any.
    pub fn ok(&mut self, msg: impl Into<Cow<'static, str>>) {
        if let Some(span) = &mut self.span {
            span.event(msg);
            span.status = SpanStatus::Ok;
        }
    }

    /// Record an error on the wrapped span, if any.
    pub fn error(&mut self, msg: impl Into<Cow<'static, str>>) {
        if let Some(span) = &mut self.span {
            span.error(msg);
        }
    }

    /// Record a metadata value on the wrapped span, if any.
    pub fn set_metadata(&mut self, key: impl Into<Cow<'static, str>>, value: impl Into<MetaValue>) {
        if let Some(span) = &mut self.span {
            span.set_metadata(key, value);
        }
    }

    /// Start a recorder for a child of the wrapped span, if any.
    pub fn child(&self, name: impl Into<Cow<'static, str>>) -> Self {
        Self::new(self.span.as_ref().map(|span| span.ctx.child(name)))
    }

    /// Borrow the wrapped span, if any.
    pub fn span(&self) -> Option<&Span> {
        self.span.as_ref()
    }
}

impl Drop for SpanRecorder {
    fn drop(&mut self) {
        if let Some(mut span) = self.span.take() {
            let now = Utc::now();

            // SystemTime is not monotonic so must also check min
            span.start = Some(match span.start {
                Some(a) => a.min(now),
                None => now,
            });

            span.end = Some(match span.end {
                Some(a) => a.max(now),
                None => now,
            });

            span.export()
        }
    }
}
