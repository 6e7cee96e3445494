use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use trace::span::SpanRecorder;

use crate::{
    Error,
    policy::{Next, Policy},
    request::Request,
    response::Response,
};

/// Wraps each traced request in a child span and propagates the trace to the
/// service via correlation headers.
///
/// Requests without a [`SpanContext`] pass through untouched. For traced
/// requests the span is started before the headers are injected and is ended
/// exactly once on the way back up, success or error, by the recorder guard.
///
/// [`SpanContext`]: trace::ctx::SpanContext
#[derive(Debug, Default)]
pub struct TracingPolicy {
    /// Number of spans started but not yet ended. Not used for control flow;
    /// exposed so tests can verify that no span leaks past a call.
    open_spans: AtomicUsize,
}

impl TracingPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spans currently in flight through this policy.
    pub fn open_spans(&self) -> usize {
        self.open_spans.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Policy for TracingPolicy {
    async fn send(&self, request: &mut Request, next: Next<'_>) -> Result<Response, Error> {
        let span = request.span_ctx.as_ref().map(|ctx| {
            let mut span = ctx.child("http request");
            span.set_metadata("http.method", request.method.to_string());
            span.set_metadata("http.url", request.url.to_string());
            span
        });

        if let Some(span) = &span {
            span.ctx.inject_headers(&mut request.headers);
            self.open_spans.fetch_add(1, Ordering::SeqCst);
        }

        let traced = span.is_some();
        let mut recorder = SpanRecorder::new(span);

        let result = next.run(request).await;

        match &result {
            Ok(response) => {
                recorder.set_metadata("http.status_code", i64::from(response.status.as_u16()));
                if response.status.is_client_error() || response.status.is_server_error() {
                    recorder.error("error status");
                } else {
                    recorder.ok("request complete");
                }
            }
            Err(error) => recorder.error(error.to_string()),
        }

        // Ends + exports the span
        drop(recorder);
        if traced {
            self.open_spans.fetch_sub(1, Ordering::SeqCst);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use http::{Method, StatusCode};
    use pretty_assertions::assert_eq;
    use trace::span::{MetaValue, SpanStatus};
    use trace::{RingBufferTraceCollector, ctx::SpanContext};
    use url::Url;

    use super::*;
    use crate::{
        mock::{MockResponse, MockTransport},
        pipeline::Pipeline,
        transport::TransportError,
    };

    fn traced_request(collector: &Arc<RingBufferTraceCollector>) -> Request {
        let ctx = SpanContext::new(Arc::clone(collector) as _);
        Request::new(Method::GET, Url::parse("http://example.test/docs").unwrap())
            .with_span_ctx(Some(ctx))
    }

    fn build(transport: &MockTransport, policy: Arc<TracingPolicy>) -> Pipeline {
        Pipeline::builder()
            .with_policy(policy)
            .with_transport(Arc::new(transport.clone()))
            .build()
    }

    #[tokio::test]
    async fn test_span_recorded_and_headers_injected() {
        let collector = Arc::new(RingBufferTraceCollector::new(8));
        let policy = Arc::new(TracingPolicy::new());
        let transport = MockTransport::new();
        transport.push_response(MockResponse::new(StatusCode::OK));

        let pipeline = build(&transport, Arc::clone(&policy));
        let mut request = traced_request(&collector);
        let root_trace_id = request.span_ctx.as_ref().unwrap().trace_id;

        pipeline.run(&mut request).await.unwrap();

        let spans = collector.spans();
        assert_eq!(spans.len(), 1);

        let span = &spans[0];
        assert_eq!(span.name, "http request");
        assert_eq!(span.ctx.trace_id, root_trace_id);
        assert_eq!(span.status, SpanStatus::Ok);
        assert_eq!(
            span.metadata.get("http.status_code"),
            Some(&MetaValue::Int(200))
        );
        assert!(span.start.is_some());
        assert!(span.end.is_some());

        // The transport saw the correlation headers of the child span
        let seen = transport.requests().remove(0);
        let propagated = seen
            .headers
            .get(trace::ctx::TRACE_ID_HEADER)
            .expect("trace id header")
            .to_str()
            .unwrap()
            .to_owned();
        assert_eq!(propagated, root_trace_id.to_string());
        assert!(seen.headers.contains_key(trace::ctx::SPAN_ID_HEADER));

        assert_eq!(policy.open_spans(), 0);
    }

    #[tokio::test]
    async fn test_error_status_marks_span() {
        let collector = Arc::new(RingBufferTraceCollector::new(8));
        let policy = Arc::new(TracingPolicy::new());
        let transport = MockTransport::new();
        transport.push_response(MockResponse::new(StatusCode::SERVICE_UNAVAILABLE));

        let pipeline = build(&transport, Arc::clone(&policy));
        pipeline.run(&mut traced_request(&collector)).await.unwrap();

        let spans = collector.spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].status, SpanStatus::Err);
        assert_eq!(policy.open_spans(), 0);
    }

    #[tokio::test]
    async fn test_transport_error_still_ends_span() {
        let collector = Arc::new(RingBufferTraceCollector::new(8));
        let policy = Arc::new(TracingPolicy::new());
        let transport = MockTransport::new();
        transport.push_error(TransportError::Timeout);

        let pipeline = build(&transport, Arc::clone(&policy));
        pipeline
            .run(&mut traced_request(&collector))
            .await
            .unwrap_err();

        let spans = collector.spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].status, SpanStatus::Err);
        assert!(spans[0].end.is_some());
        assert_eq!(policy.open_spans(), 0);
    }

    #[tokio::test]
    async fn test_untraced_request_passes_through() {
        let policy = Arc::new(TracingPolicy::new());
        let transport = MockTransport::new();
        transport.push_response(MockResponse::new(StatusCode::OK));

        let pipeline = build(&transport, Arc::clone(&policy));
        let mut request =
            Request::new(Method::GET, Url::parse("http://example.test/docs").unwrap());
        pipeline.run(&mut request).await.unwrap();

        let seen = transport.requests().remove(0);
        assert!(!seen.headers.contains_key(trace::ctx::TRACE_ID_HEADER));
        assert_eq!(policy.open_spans(), 0);
    }
}
