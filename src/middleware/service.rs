//! `tower::Service` adapter over a chain.

use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use tower::Service;

use crate::error::{Error, Result};
use crate::message::{Request, Response};
use crate::middleware::Chain;

/// Exposes a shared [`Chain`] as a `tower::Service`, so it can sit under
/// tower layers or be driven with `ServiceExt`.
#[derive(Debug, Clone)]
pub struct ChainService {
    chain: Arc<Chain>,
}

impl ChainService {
    pub fn new(chain: Arc<Chain>) -> Self {
        Self { chain }
    }

    pub fn chain(&self) -> &Arc<Chain> {
        &self.chain
    }
}

impl Service<Request> for ChainService {
    type Response = Response;
    type Error = Error;
    type Future = BoxFuture<'static, Result<Response>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        // Admission control belongs to the chain's own middlewares.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let chain = self.chain.clone();
        Box::pin(async move { chain.call_async(request).await })
    }
}
