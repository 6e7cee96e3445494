//! Composable HTTP pipeline: a configured list of policies around a
//! pluggable transport.
//!
//! A [`Pipeline`] owns an ordered list of [`Policy`] objects and one
//! terminal [`Transport`]. [`Pipeline::run`] walks the policies in order on
//! the way down and in reverse on the way up; policies such as
//! [`policies::RetryPolicy`] may re-run the remainder of the chain. The
//! transport reports error statuses as ordinary responses, so interpreting
//! an HTTP 503 is a policy or caller decision, not an exception.
//!
//! ```no_run
//! use std::sync::Arc;
//! use http::Method;
//! use http_pipeline::{Pipeline, Request, policies::RetryPolicy};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = Pipeline::builder()
//!     .with_policy(Arc::new(RetryPolicy::default()))
//!     .build();
//!
//! let url = url::Url::parse("https://search.example.com/indexes/docs")?;
//! let mut request = Request::new(Method::GET, url);
//! let response = pipeline.run(&mut request).await?;
//! println!("{}", response.status);
//! # Ok(())
//! # }
//! ```

use snafu::Snafu;

pub mod mock;
pub mod pipeline;
pub mod policies;
pub mod policy;
pub mod request;
pub mod response;
pub mod transport;

// Re-exported so retry schedules can be configured without a direct
// dependency on the backoff crate.
pub use backoff::BackoffConfig;

pub use pipeline::{Pipeline, PipelineBuilder};
pub use policy::{Interceptor, InterceptorPolicy, Next, Policy};
pub use request::{Body, Request, RequestOptions};
pub use response::{Response, ResponseBody};
pub use transport::{BoxError, ReqwestTransport, Transport, TransportError};

/// Error surfaced by [`Pipeline::run`].
///
/// Responses with error statuses are not errors here; see [`Response`].
#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("transport error: {source}"), context(false))]
    Transport { source: TransportError },
}

impl Error {
    /// Whether a resend of the same request could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
        }
    }
}
