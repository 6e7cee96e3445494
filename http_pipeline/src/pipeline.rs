use std::sync::Arc;

use crate::{
    Error,
    policy::{Interceptor, InterceptorPolicy, Next, Policy},
    request::Request,
    response::Response,
    transport::{ReqwestTransport, Transport},
};

/// An ordered sequence of policies terminated by a transport.
///
/// Built once, immutable afterwards, and safe to share across any number of
/// concurrent calls; per-request state lives on the call stack, not in the
/// pipeline.
#[derive(Debug, Clone)]
pub struct Pipeline {
    policies: Vec<Arc<dyn Policy>>,
    transport: Arc<dyn Transport>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Runs `request` through every policy in order and the transport last.
    ///
    /// An empty policy list hands the request to the transport untouched.
    pub async fn run(&self, request: &mut Request) -> Result<Response, Error> {
        let next = Next {
            policies: &self.policies,
            transport: self.transport.as_ref(),
        };
        next.run(request).await
    }

    /// The configured policies, outermost first.
    pub fn policies(&self) -> &[Arc<dyn Policy>] {
        &self.policies
    }
}

/// Builder for [`Pipeline`].
///
/// Policies run in the order they are added: the first one added sees the
/// request first and the response last.
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    policies: Vec<Arc<dyn Policy>>,
    transport: Option<Arc<dyn Transport>>,
}

impl PipelineBuilder {
    pub fn with_policy(mut self, policy: Arc<dyn Policy>) -> Self {
        self.policies.push(policy);
        self
    }

    /// Adds an inspect-only [`Interceptor`] at this position in the chain.
    pub fn with_interceptor(self, interceptor: impl Interceptor) -> Self {
        self.with_policy(Arc::new(InterceptorPolicy::new(interceptor)))
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Builds the pipeline, defaulting to a [`ReqwestTransport`] when no
    /// transport was supplied.
    pub fn build(self) -> Pipeline {
        Pipeline {
            policies: self.policies,
            transport: self
                .transport
                .unwrap_or_else(|| Arc::new(ReqwestTransport::new())),
        }
    }
}
