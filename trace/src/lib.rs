//! Distributed tracing support for the client SDK.
//!
//! Spans are created from a [`SpanContext`] carried on outgoing requests,
//! propagated to the service via correlation headers, and exported to a
//! [`TraceCollector`] when they complete. There is no process-wide registry:
//! whoever wants traces constructs a context with a collector and hands it
//! to the code it wants traced.

use std::{any::Any, collections::VecDeque, sync::Arc};

use observability_deps::tracing::info;
use parking_lot::Mutex;

use crate::span::Span;

pub mod ctx;
pub mod span;

/// A `TraceCollector` is a sink for completed [`Span`]s.
pub trait TraceCollector: std::fmt::Debug + Send + Sync {
    /// Exports the specified `Span` for collection by the sink.
    fn export(&self, span: Span);

    /// Cast collector to [`Any`], useful for downcasting.
    fn as_any(&self) -> &dyn Any;
}

/// A trace collector that emits completed spans to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTraceCollector {}

impl LogTraceCollector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TraceCollector for LogTraceCollector {
    fn export(&self, span: Span) {
        info!(?span, "completed span");
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A trace collector that keeps the last `capacity` spans in memory,
/// primarily for inspection in tests.
#[derive(Debug)]
pub struct RingBufferTraceCollector {
    capacity: usize,
    buffer: Mutex<VecDeque<Span>>,
}

impl RingBufferTraceCollector {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Returns a snapshot of the collected spans, oldest first.
    pub fn spans(&self) -> Vec<Span> {
        self.buffer.lock().iter().cloned().collect()
    }
}

impl TraceCollector for RingBufferTraceCollector {
    fn export(&self, span: Span) {
        let mut buffer = self.buffer.lock();
        if buffer.len() == self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(span);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<T> TraceCollector for Arc<T>
where
    T: TraceCollector,
{
    fn export(&self, span: Span) {
        (**self).export(span)
    }

    fn as_any(&self) -> &dyn Any {
        (**self).as_any()
    }
}
