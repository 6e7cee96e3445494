//! Mock [`Transport`] for tests.
//!
//! Responses are scripted up front and handed out in order; every request
//! that reaches the transport is recorded for later inspection. Shared state
//! lives behind an `Arc` so clones observe the same script, letting a test
//! keep a handle while the pipeline owns another.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode, header::HeaderName, header::HeaderValue};
use parking_lot::Mutex;

use crate::{
    request::Request,
    response::{Response, ResponseBody},
    transport::{Transport, TransportError},
};

/// Template for a scripted response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl MockResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

#[derive(Debug, Default)]
struct State {
    script: VecDeque<Result<MockResponse, TransportError>>,
    requests: Vec<Request>,
}

/// Scripted in-memory [`Transport`].
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a response to the script.
    pub fn push_response(&self, response: MockResponse) {
        self.state.lock().script.push_back(Ok(response));
    }

    /// Appends a transport failure to the script.
    pub fn push_error(&self, error: TransportError) {
        self.state.lock().script.push_back(Err(error));
    }

    /// All requests seen so far, in arrival order.
    pub fn requests(&self) -> Vec<Request> {
        self.state.lock().requests.clone()
    }

    /// Number of scripted entries not yet consumed.
    pub fn remaining(&self) -> usize {
        self.state.lock().script.len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        let scripted = {
            let mut state = self.state.lock();
            state.requests.push(request);
            state
                .script
                .pop_front()
                .expect("mock transport script exhausted")
        };

        scripted.map(|template| {
            Response::new(
                template.status,
                template.headers,
                ResponseBody::Buffered(template.body),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use http::Method;
    use pretty_assertions::assert_eq;
    use url::Url;

    use super::*;

    #[tokio::test]
    async fn test_script_order_and_recording() {
        let transport = MockTransport::new();
        transport.push_response(MockResponse::new(StatusCode::OK).with_body("first"));
        transport.push_error(TransportError::Timeout);

        let request = Request::new(Method::GET, Url::parse("http://example.test/a").unwrap());
        let response = transport.send(request.clone()).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.bytes().await.unwrap(), "first");

        let err = transport.send(request).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout));

        assert_eq!(transport.requests().len(), 2);
        assert_eq!(transport.remaining(), 0);
    }
}
