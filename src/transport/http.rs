//! HTTP transport built on the hyper-util legacy client.
//!
//! # Responsibilities
//! - Resolve request targets against an optional base URL
//! - Forward method, headers and body; honor `Request::timeout`
//! - Buffer the response body and record call timing
//! - Map client failures onto `TransportErrorKind`

use std::error::Error as StdError;
use std::io;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::Uri;
use futures_util::future::BoxFuture;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use url::Url;

use crate::error::{Error, Result, TransportError, TransportErrorKind};
use crate::message::{Request, Response, Timing};
use crate::transport::{block_on, Transport};

/// Default cap on buffered response bodies.
const DEFAULT_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

type HttpClient = Client<HttpConnector, Body>;

/// Plain-HTTP terminal transport.
#[derive(Clone)]
pub struct HttpTransport {
    base: Option<Url>,
    client: HttpClient,
    max_body_bytes: usize,
}

impl HttpTransport {
    /// Transport for requests whose targets are absolute URLs.
    pub fn new() -> Self {
        Self {
            base: None,
            client: build_client(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Transport resolving relative targets against `base`.
    pub fn with_base_url(base: &str) -> Result<Self> {
        let base = Url::parse(base)
            .map_err(|e| Error::InvalidRequest(format!("invalid base url {base}: {e}")))?;
        Ok(Self {
            base: Some(base),
            ..Self::new()
        })
    }

    #[must_use]
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    fn resolve(&self, target: &str) -> Result<Uri> {
        let url = match (&self.base, Url::parse(target)) {
            (_, Ok(absolute)) => absolute,
            (Some(base), Err(url::ParseError::RelativeUrlWithoutBase)) => base
                .join(target)
                .map_err(|e| Error::InvalidRequest(format!("invalid target {target}: {e}")))?,
            (_, Err(e)) => {
                return Err(Error::InvalidRequest(format!("invalid target {target}: {e}")))
            }
        };
        url.as_str()
            .parse::<Uri>()
            .map_err(|e| Error::InvalidRequest(format!("invalid uri {url}: {e}")))
    }

    async fn execute(&self, client: &HttpClient, request: Request) -> Result<Response> {
        let uri = self.resolve(request.target())?;
        let timeout = request.timeout();

        let mut outgoing = axum::http::Request::new(Body::from(request.body().clone()));
        *outgoing.method_mut() = request.method().clone();
        *outgoing.uri_mut() = uri;
        *outgoing.headers_mut() = request.headers().clone();

        let start = Instant::now();
        let exchange = async {
            let response = client.request(outgoing).await.map_err(map_client_error)?;
            let (parts, body) = response.into_parts();
            let bytes = axum::body::to_bytes(Body::new(body), self.max_body_bytes)
                .await
                .map_err(|e| {
                    TransportError::new(
                        TransportErrorKind::Protocol,
                        "failed to read response body",
                    )
                    .with_source(e)
                })?;
            Ok::<_, TransportError>((parts, bytes))
        };

        let (parts, bytes) = match timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| Error::Timeout(limit))??,
            None => exchange.await?,
        };

        Ok(Response::new(parts.status)
            .with_headers(parts.headers)
            .with_body(bytes)
            .with_timing(Timing {
                elapsed: start.elapsed(),
            }))
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base", &self.base.as_ref().map(Url::as_str))
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: Request) -> Result<Response> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return block_on(self.execute(&self.client, request));
        }
        // Pooled connections belong to the runtime that opened them, so a
        // private runtime gets a private client.
        let client = build_client();
        block_on(async { self.execute(&client, request).await })
    }

    fn send_async(&self, request: Request) -> BoxFuture<'_, Result<Response>> {
        Box::pin(self.execute(&self.client, request))
    }
}

fn build_client() -> HttpClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(Duration::from_secs(5)));
    Client::builder(TokioExecutor::new()).build(connector)
}

fn map_client_error(err: hyper_util::client::legacy::Error) -> TransportError {
    TransportError::new(classify(&err), err.to_string()).with_source(err)
}

/// The innermost recognisable cause decides the kind.
fn classify(err: &hyper_util::client::legacy::Error) -> TransportErrorKind {
    if let Some(io_err) = find_cause::<io::Error>(err) {
        return io_err.kind().into();
    }
    if let Some(hyper_err) = find_cause::<hyper::Error>(err) {
        if hyper_err.is_incomplete_message() || hyper_err.is_closed() {
            return TransportErrorKind::ConnectionReset;
        }
        if hyper_err.is_timeout() {
            return TransportErrorKind::TimedOut;
        }
        return TransportErrorKind::Protocol;
    }
    if err.is_connect() {
        TransportErrorKind::ConnectionRefused
    } else {
        TransportErrorKind::Other
    }
}

fn find_cause<'a, T: StdError + 'static>(err: &'a (dyn StdError + 'static)) -> Option<&'a T> {
    let mut link = err.source();
    while let Some(cause) = link {
        if let Some(found) = cause.downcast_ref::<T>() {
            return Some(found);
        }
        link = cause.source();
    }
    None
}
