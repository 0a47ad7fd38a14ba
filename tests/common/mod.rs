//! Shared utilities for integration and load testing.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use resilient_client::resilience::{Backoff, ManualClock, RetryMiddleware, RetryPolicy};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Start a programmable mock backend on an ephemeral port.
///
/// `f` is called once per request and returns the status and body to send.
#[allow(dead_code)]
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        read_request_head(&mut socket).await;
                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            429 => "429 Too Many Requests",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };
                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
    addr
}

/// Backend that answers `statuses[n]` to the n-th request (the last status
/// repeats) and counts requests.
#[allow(dead_code)]
pub async fn start_scripted_backend(statuses: Vec<u16>) -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let statuses = Arc::new(statuses);
    let addr = start_programmable_backend(move || {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        let statuses = statuses.clone();
        async move {
            let status = statuses
                .get(n)
                .or_else(|| statuses.last())
                .copied()
                .unwrap_or(200);
            (status, format!("response {n}"))
        }
    })
    .await;
    (addr, hits)
}

/// An address nothing listens on.
#[allow(dead_code)]
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Retry middleware with short fixed delays on a manual clock.
#[allow(dead_code)]
pub fn fast_retry(max_attempts: u32) -> (RetryMiddleware, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let policy = RetryPolicy::builder()
        .max_attempts(max_attempts)
        .backoff(Backoff::fixed(Duration::from_millis(50)))
        .build()
        .unwrap();
    (RetryMiddleware::new(policy).with_clock(clock.clone()), clock)
}

async fn read_request_head(socket: &mut TcpStream) {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    return;
                }
            }
        }
    }
}
