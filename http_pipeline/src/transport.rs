use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use snafu::Snafu;

use crate::{
    request::{Body, Request},
    response::{Response, ResponseBody},
};

/// Type-erased error source carried by [`TransportError`] variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error raised by a [`Transport`] when the exchange could not be completed
/// at all.
///
/// Responses with error statuses are not transport errors. Every transport
/// error is considered retryable.
#[derive(Debug, Snafu)]
pub enum TransportError {
    #[snafu(display("error connecting to {url}: {source}"))]
    Connect { url: String, source: BoxError },

    #[snafu(display("request timed out"))]
    Timeout,

    #[snafu(display("error sending request: {source}"))]
    Request { source: BoxError },

    #[snafu(display("error reading response body: {source}"))]
    Body { source: BoxError },
}

/// The terminal element of a pipeline: actually performs the exchange.
///
/// Implementations own their connection pooling. A transport returns
/// `Ok(Response)` for any completed HTTP exchange regardless of status code
/// and reserves `Err` for failures where no response was obtained.
#[async_trait]
pub trait Transport: std::fmt::Debug + Send + Sync + 'static {
    async fn send(&self, request: Request) -> Result<Response, TransportError>;
}

/// [`Transport`] implementation on top of [`reqwest::Client`].
///
/// Cloning shares the connection pool, so one transport can back any number
/// of pipelines.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a preconfigured [`reqwest::Client`], e.g. one with proxy or TLS
    /// settings applied.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());

        if let Body::Bytes(bytes) = request.body {
            builder = builder.body(bytes);
        }

        if let Some(timeout) = request.options.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|source| classify_reqwest_error(&request.url, source))?;

        let status = response.status();
        let headers = response.headers().clone();

        let body = if request.options.read_body {
            let bytes = response
                .bytes()
                .await
                .map_err(|source| TransportError::Body {
                    source: Box::new(source),
                })?;
            ResponseBody::Buffered(bytes)
        } else {
            let stream = response
                .bytes_stream()
                .map_err(|source| TransportError::Body {
                    source: Box::new(source),
                })
                .boxed();
            ResponseBody::Streaming(stream)
        };

        Ok(Response::new(status, headers, body))
    }
}

fn classify_reqwest_error(url: &url::Url, source: reqwest::Error) -> TransportError {
    if source.is_timeout() {
        TransportError::Timeout
    } else if source.is_connect() {
        TransportError::Connect {
            url: url.to_string(),
            source: Box::new(source),
        }
    } else {
        TransportError::Request {
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use http::{Method, StatusCode};
    use pretty_assertions::assert_eq;
    use url::Url;

    use super::*;
    use crate::request::RequestOptions;

    fn url(base: &str, path: &str) -> Url {
        Url::parse(&format!("{base}{path}")).unwrap()
    }

    #[tokio::test]
    async fn test_send_buffers_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/hello")
            .with_status(200)
            .with_body("world")
            .create_async()
            .await;

        let transport = ReqwestTransport::new();
        let request = Request::new(Method::GET, url(&server.url(), "/hello"));

        let response = transport.send(request).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.bytes().await.unwrap(), "world");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_a_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/boom")
            .with_status(503)
            .create_async()
            .await;

        let transport = ReqwestTransport::new();
        let request = Request::new(Method::GET, url(&server.url(), "/boom"));

        let response = transport.send(request).await.unwrap();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_streaming_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/stream")
            .with_status(200)
            .with_body("chunked payload")
            .create_async()
            .await;

        let transport = ReqwestTransport::new();
        let request = Request::new(Method::GET, url(&server.url(), "/stream")).with_options(
            RequestOptions {
                read_body: false,
                ..Default::default()
            },
        );

        let response = transport.send(request).await.unwrap();
        assert!(matches!(response.body, ResponseBody::Streaming(_)));
        assert_eq!(response.bytes().await.unwrap(), "chunked payload");
    }

    #[tokio::test]
    async fn test_connection_refused() {
        // Nothing listens on port 1
        let transport = ReqwestTransport::new();
        let request = Request::new(Method::GET, Url::parse("http://127.0.0.1:1/").unwrap());

        let err = transport.send(request).await.unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let transport = ReqwestTransport::new();
        // RFC 5737 TEST-NET address, guaranteed to blackhole the SYN
        let request = Request::new(Method::GET, Url::parse("http://192.0.2.1/").unwrap())
            .with_options(RequestOptions {
                timeout: Some(Duration::from_millis(50)),
                ..Default::default()
            });

        let err = transport.send(request).await.unwrap_err();
        assert!(
            matches!(err, TransportError::Timeout | TransportError::Connect { .. }),
            "{err}"
        );
    }
}
