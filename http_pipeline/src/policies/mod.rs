//! Built-in policies.

mod headers;
mod retry;
mod tracing;

pub use headers::HeadersPolicy;
pub use retry::{RetryConfig, RetryPolicy};
pub use tracing::TracingPolicy;
