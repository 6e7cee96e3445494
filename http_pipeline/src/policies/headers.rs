use http::{HeaderMap, header::HeaderName, header::HeaderValue};

use crate::{policy::Interceptor, request::Request};

/// Applies a fixed set of headers (credentials, user agent, API version) to
/// every request.
///
/// A header the caller already set on the request wins over the configured
/// one.
#[derive(Debug, Clone, Default)]
pub struct HeadersPolicy {
    headers: HeaderMap,
}

impl HeadersPolicy {
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

impl Interceptor for HeadersPolicy {
    fn on_request(&self, request: &mut Request) {
        for (name, value) in &self.headers {
            if !request.headers.contains_key(name) {
                request.headers.insert(name, value.clone());
            }
        }
    }
}
