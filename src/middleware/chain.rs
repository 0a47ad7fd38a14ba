//! Ordered middleware chain with a terminal transport.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::error::Result;
use crate::message::{Request, Response};
use crate::middleware::{AsyncNext, Middleware, Next};
use crate::transport::Transport;

/// A sorted list of middlewares in front of a transport.
///
/// Built once and shared (usually behind an `Arc`) by every caller; a
/// `Chain` holds no per-request state.
pub struct Chain {
    middlewares: Vec<Arc<dyn Middleware>>,
    transport: Arc<dyn Transport>,
}

impl Chain {
    pub fn builder(transport: impl Transport) -> ChainBuilder {
        ChainBuilder::new(Arc::new(transport))
    }

    pub fn builder_shared(transport: Arc<dyn Transport>) -> ChainBuilder {
        ChainBuilder::new(transport)
    }

    /// Run a request through the chain, blocking the calling thread.
    pub fn call(&self, request: Request) -> Result<Response> {
        Next::new(&self.middlewares, self.transport.as_ref()).run(request)
    }

    /// Run a request through the chain without blocking.
    ///
    /// Request-phase processing happens before this method returns; the
    /// returned future resolves with the response.
    pub fn call_async(&self, request: Request) -> BoxFuture<'_, Result<Response>> {
        AsyncNext::new(&self.middlewares, self.transport.as_ref()).run(request)
    }

    /// Middleware names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.middlewares.iter().map(|m| m.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("middlewares", &self.names())
            .finish_non_exhaustive()
    }
}

/// Collects middlewares for a [`Chain`].
pub struct ChainBuilder {
    middlewares: Vec<Arc<dyn Middleware>>,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for ChainBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.middlewares.iter().map(|m| m.name()).collect();
        f.debug_struct("ChainBuilder")
            .field("middlewares", &names)
            .finish_non_exhaustive()
    }
}

impl ChainBuilder {
    fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            middlewares: Vec::new(),
            transport,
        }
    }

    /// Add a middleware to the chain.
    #[must_use]
    pub fn with(mut self, middleware: impl Middleware) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    /// Add a shared middleware to the chain.
    #[must_use]
    pub fn with_shared(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Sort by order (stable: equal orders keep insertion order) and build.
    pub fn build(mut self) -> Chain {
        self.middlewares.sort_by_key(|m| m.order());
        tracing::debug!(
            middlewares = ?self.middlewares.iter().map(|m| m.name()).collect::<Vec<_>>(),
            "Middleware chain built"
        );
        Chain {
            middlewares: self.middlewares,
            transport: self.transport,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, TransportError, TransportErrorKind};
    use crate::message::Context;
    use crate::middleware::Interceptor;
    use crate::middleware::Intercept;
    use crate::transport;
    use axum::http::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        name: String,
        order: i32,
        log: Log,
    }

    impl Interceptor for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        fn order(&self) -> i32 {
            self.order
        }

        fn intercept_request(&self, _request: &mut Request) -> Result<()> {
            self.log.lock().unwrap().push(format!("pre:{}", self.name));
            Ok(())
        }

        fn intercept_response(&self, _ctx: &Context, response: Response) -> Result<Response> {
            self.log.lock().unwrap().push(format!("post:{}", self.name));
            Ok(response)
        }

        fn on_error(&self, _ctx: &Context, error: Error) -> Result<Response> {
            self.log.lock().unwrap().push(format!("err:{}", self.name));
            Err(error)
        }
    }

    fn recorder(name: &str, order: i32, log: &Log) -> Intercept<Recorder> {
        Intercept(Recorder {
            name: name.to_string(),
            order,
            log: log.clone(),
        })
    }

    fn counting_ok(calls: &Arc<AtomicUsize>) -> impl Transport {
        let calls = calls.clone();
        transport::from_fn(move |_req| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Response::ok())
        })
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[test]
    fn test_orders_request_and_response_phases() {
        let log = Log::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = Chain::builder(counting_ok(&calls))
            .with(recorder("m500", 500, &log))
            .with(recorder("m100", 100, &log))
            .with(recorder("m900", 900, &log))
            .build();

        assert_eq!(chain.names(), vec!["m100", "m500", "m900"]);
        chain.call(Request::get("/")).unwrap();

        assert_eq!(
            entries(&log),
            vec!["pre:m100", "pre:m500", "pre:m900", "post:m900", "post:m500", "post:m100"]
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_equal_orders_keep_insertion_order() {
        let log = Log::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = Chain::builder(counting_ok(&calls))
            .with(recorder("first", 300, &log))
            .with(recorder("early", 100, &log))
            .with(recorder("second", 300, &log))
            .build();

        assert_eq!(chain.names(), vec!["early", "first", "second"]);
    }

    struct ShortCircuit;

    impl Middleware for ShortCircuit {
        fn name(&self) -> &str {
            "cache"
        }

        fn order(&self) -> i32 {
            400
        }

        fn handle(&self, _request: Request, _next: Next<'_>) -> Result<Response> {
            Ok(Response::new(StatusCode::NOT_MODIFIED))
        }

        fn handle_async<'a>(
            &'a self,
            _request: Request,
            _next: AsyncNext<'a>,
        ) -> BoxFuture<'a, Result<Response>> {
            Box::pin(async { Ok(Response::new(StatusCode::NOT_MODIFIED)) })
        }
    }

    #[test]
    fn test_short_circuit_skips_downstream() {
        let log = Log::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = Chain::builder(counting_ok(&calls))
            .with(recorder("outer", 100, &log))
            .with(ShortCircuit)
            .with(recorder("inner", 900, &log))
            .build();

        let response = chain.call(Request::get("/")).unwrap();

        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(entries(&log), vec!["pre:outer", "post:outer"]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_transport_error_unwinds_through_error_hooks() {
        let log = Log::default();
        let chain = Chain::builder(transport::from_fn(|_req| {
            Err(Error::Transport(TransportError::new(
                TransportErrorKind::ConnectionRefused,
                "nobody home",
            )))
        }))
        .with(recorder("a", 1, &log))
        .with(recorder("b", 2, &log))
        .build();

        let err = chain.call(Request::get("/")).unwrap_err();

        assert_eq!(err.transport_kind(), Some(TransportErrorKind::ConnectionRefused));
        assert_eq!(entries(&log), vec!["pre:a", "pre:b", "err:b", "err:a"]);
    }

    #[tokio::test]
    async fn test_async_runs_request_phase_eagerly() {
        let log = Log::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = Chain::builder(counting_ok(&calls))
            .with(recorder("m500", 500, &log))
            .with(recorder("m100", 100, &log))
            .with(recorder("m900", 900, &log))
            .build();

        let pending = chain.call_async(Request::get("/"));
        assert_eq!(entries(&log), vec!["pre:m100", "pre:m500", "pre:m900"]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        pending.await.unwrap();
        assert_eq!(
            entries(&log),
            vec!["pre:m100", "pre:m500", "pre:m900", "post:m900", "post:m500", "post:m100"]
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_async_calls_keep_their_own_order() {
        let log = Log::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = Arc::new(
            Chain::builder(counting_ok(&calls))
                .with(recorder("a", 1, &log))
                .build(),
        );

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let chain = chain.clone();
            tasks.push(tokio::spawn(async move {
                chain.call_async(Request::get("/")).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 16);
        let log = entries(&log);
        assert_eq!(log.iter().filter(|e| e.as_str() == "pre:a").count(), 16);
        assert_eq!(log.iter().filter(|e| e.as_str() == "post:a").count(), 16);
    }
}
