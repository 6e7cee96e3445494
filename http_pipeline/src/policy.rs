use std::sync::Arc;

use async_trait::async_trait;

use crate::{Error, request::Request, response::Response, transport::Transport};

/// A pipeline element with full control over the downstream chain.
///
/// Policies run in list order on the way down and, by virtue of the nested
/// calls unwinding, in exact reverse order on the way up. A policy may call
/// [`Next::run`] any number of times (retry), or not at all (short-circuit).
#[async_trait]
pub trait Policy: std::fmt::Debug + Send + Sync + 'static {
    async fn send(&self, request: &mut Request, next: Next<'_>) -> Result<Response, Error>;
}

/// Cursor over the remaining policies and the terminal transport.
///
/// `Copy`, so an error-handling policy can re-run the remainder of the chain
/// for every attempt.
#[derive(Debug, Clone, Copy)]
pub struct Next<'a> {
    pub(crate) policies: &'a [Arc<dyn Policy>],
    pub(crate) transport: &'a dyn Transport,
}

impl Next<'_> {
    /// Runs the rest of the pipeline on `request`.
    pub async fn run(self, request: &mut Request) -> Result<Response, Error> {
        match self.policies.split_first() {
            Some((policy, rest)) => {
                let next = Next {
                    policies: rest,
                    transport: self.transport,
                };
                policy.send(request, next).await
            }
            // The transport gets its own copy so the original stays
            // replayable for retrying policies further up.
            None => Ok(self.transport.send(request.clone()).await?),
        }
    }
}

/// A pipeline element that only inspects or annotates what flows past.
///
/// Interceptors cannot alter control flow; they see the request on the way
/// down and the response (or error) on the way up. Compose them into a
/// pipeline via [`InterceptorPolicy`].
pub trait Interceptor: std::fmt::Debug + Send + Sync + 'static {
    fn on_request(&self, _request: &mut Request) {}

    fn on_response(&self, _request: &Request, _response: &Response) {}

    fn on_error(&self, _request: &Request, _error: &Error) {}
}

/// Adapter that runs an [`Interceptor`] as a [`Policy`].
#[derive(Debug)]
pub struct InterceptorPolicy<I> {
    interceptor: I,
}

impl<I> InterceptorPolicy<I> {
    pub fn new(interceptor: I) -> Self {
        Self { interceptor }
    }
}

#[async_trait]
impl<I: Interceptor> Policy for InterceptorPolicy<I> {
    async fn send(&self, request: &mut Request, next: Next<'_>) -> Result<Response, Error> {
        self.interceptor.on_request(request);
        match next.run(request).await {
            Ok(response) => {
                self.interceptor.on_response(request, &response);
                Ok(response)
            }
            Err(error) => {
                self.interceptor.on_error(request, &error);
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use http::Method;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use url::Url;

    use super::*;
    use crate::{
        mock::{MockResponse, MockTransport},
        pipeline::Pipeline,
        transport::TransportError,
    };

    /// Interceptor that appends its hook invocations to a shared log.
    #[derive(Debug)]
    struct Recording {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Interceptor for Recording {
        fn on_request(&self, _request: &mut Request) {
            self.log.lock().push(format!("{}:request", self.name));
        }

        fn on_response(&self, _request: &Request, _response: &Response) {
            self.log.lock().push(format!("{}:response", self.name));
        }

        fn on_error(&self, _request: &Request, _error: &Error) {
            self.log.lock().push(format!("{}:error", self.name));
        }
    }

    fn request() -> Request {
        Request::new(Method::GET, Url::parse("http://example.test/docs").unwrap())
    }

    #[tokio::test]
    async fn test_policies_run_in_order_and_unwind_in_reverse() {
        let log: Arc<Mutex<Vec<String>>> = Default::default();
        let transport = MockTransport::new();
        transport.push_response(MockResponse::new(http::StatusCode::OK));

        let pipeline = Pipeline::builder()
            .with_interceptor(Recording {
                name: "outer",
                log: Arc::clone(&log),
            })
            .with_interceptor(Recording {
                name: "inner",
                log: Arc::clone(&log),
            })
            .with_transport(Arc::new(transport))
            .build();

        pipeline.run(&mut request()).await.unwrap();

        assert_eq!(
            *log.lock(),
            vec![
                "outer:request",
                "inner:request",
                "inner:response",
                "outer:response",
            ]
        );
    }

    #[tokio::test]
    async fn test_error_hooks_run_in_reverse_order() {
        let log: Arc<Mutex<Vec<String>>> = Default::default();
        let transport = MockTransport::new();
        transport.push_error(TransportError::Timeout);

        let pipeline = Pipeline::builder()
            .with_interceptor(Recording {
                name: "outer",
                log: Arc::clone(&log),
            })
            .with_interceptor(Recording {
                name: "inner",
                log: Arc::clone(&log),
            })
            .with_transport(Arc::new(transport))
            .build();

        pipeline.run(&mut request()).await.unwrap_err();

        assert_eq!(
            *log.lock(),
            vec![
                "outer:request",
                "inner:request",
                "inner:error",
                "outer:error",
            ]
        );
    }
}
