//! End-to-end tests against a server bound to an ephemeral port.

use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;

use ratekeeper::http::{ClientIpSpan, HandlerError, RateLimitMiddleware, Router};
use ratekeeper::identity::IdentityResolver;
use ratekeeper::ratelimit::{ClientRateLimiter, LimiterConfig};
use ratekeeper::server::HttpServer;

async fn hello(_request: Request) -> Result<Response, HandlerError> {
    Ok("hello".into_response())
}

async fn missing(_request: Request) -> Result<Response, HandlerError> {
    Err(HandlerError::not_found("not found"))
}

async fn broken(_request: Request) -> Result<Response, HandlerError> {
    let err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "/etc/shadow");
    Err(err.into())
}

/// Send a bare HTTP/1.1 request and return the status code and body.
async fn get(addr: SocketAddr, path: &str, headers: &[(&str, &str)]) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let mut request = format!("GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n", path);
    for (name, value) in headers {
        request.push_str(&format!("{}: {}\r\n", name, value));
    }
    request.push_str("\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let raw = String::from_utf8(raw).unwrap();

    let status = raw
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap();
    let body = raw
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    (status, body)
}

struct TestServer {
    addr: SocketAddr,
    limiter: Arc<ClientRateLimiter>,
    stop: oneshot::Sender<()>,
    handle: tokio::task::JoinHandle<ratekeeper::error::Result<()>>,
}

async fn start() -> TestServer {
    let limiter = Arc::new(ClientRateLimiter::start(LimiterConfig::new(Duration::from_secs(60))).unwrap());
    let resolver = IdentityResolver::default();

    let router = Router::new()
        .add("/missing", missing)
        .add("/broken", broken)
        .use_middleware(ClientIpSpan::new(resolver.clone()))
        .use_middleware(RateLimitMiddleware::new(limiter.clone(), resolver))
        .add("/hello", hello);

    let server = HttpServer::bind("127.0.0.1:0".parse().unwrap(), router)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();

    let (stop, stopped) = oneshot::channel();
    let handle = tokio::spawn(server.serve_with_shutdown(async {
        let _ = stopped.await;
    }));

    TestServer {
        addr,
        limiter,
        stop,
        handle,
    }
}

impl TestServer {
    async fn stop(self) {
        let _ = self.stop.send(());
        self.handle.await.unwrap().unwrap();
        self.limiter.shutdown().await;
    }
}

#[tokio::test]
async fn test_peer_address_is_rate_limited() {
    let server = start().await;

    let (first, body) = get(server.addr, "/hello", &[]).await;
    assert_eq!(first, 200);
    assert_eq!(body, "hello");

    let (second, body) = get(server.addr, "/hello", &[]).await;
    assert_eq!(second, 429);
    assert!(body.is_empty());

    assert!(server.limiter.registry().contains("127.0.0.1"));
    server.stop().await;
}

#[tokio::test]
async fn test_forwarded_clients_have_separate_limits() {
    let server = start().await;

    let (a, _) = get(server.addr, "/hello", &[("X-Real-IP", "203.0.113.5")]).await;
    let (b, _) = get(
        server.addr,
        "/hello",
        &[("X-Forwarded-For", "not-an-ip, 198.51.100.9")],
    )
    .await;
    let (a_again, _) = get(server.addr, "/hello", &[("x-real-ip", "203.0.113.5")]).await;

    assert_eq!(a, 200);
    assert_eq!(b, 200);
    assert_eq!(a_again, 429);

    let registry = server.limiter.registry();
    assert!(registry.contains("203.0.113.5"));
    assert!(registry.contains("198.51.100.9"));
    assert!(!registry.contains("127.0.0.1"));
    server.stop().await;
}

#[tokio::test]
async fn test_recognized_failure_reaches_client() {
    let server = start().await;

    let (status, body) = get(server.addr, "/missing", &[]).await;
    assert_eq!(status, 404);
    assert_eq!(body, "message: not found");

    server.stop().await;
}

#[tokio::test]
async fn test_internal_failure_is_not_leaked() {
    let server = start().await;

    let (status, body) = get(server.addr, "/broken", &[]).await;
    assert_eq!(status, 500);
    assert!(body.is_empty());

    server.stop().await;
}
