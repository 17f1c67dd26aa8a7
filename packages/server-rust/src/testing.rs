//! Shared fixtures for unit tests: scripted discovery sources and loopback
//! backends.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use balance_core::Node;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::error::DiscoveryError;
use crate::traits::DiscoverySource;

enum Reply {
    Body(Bytes),
    Status(u16),
}

/// Discovery source answering with whatever the test last scripted.
pub(crate) struct MockSource {
    reply: Mutex<Reply>,
    fetches: AtomicUsize,
    last_filter: Mutex<Option<String>>,
}

impl MockSource {
    pub(crate) fn with_nodes(nodes: &[Node]) -> Arc<Self> {
        let source = Arc::new(Self {
            reply: Mutex::new(Reply::Status(500)),
            fetches: AtomicUsize::new(0),
            last_filter: Mutex::new(None),
        });
        source.set_nodes(nodes);
        source
    }

    pub(crate) fn set_nodes(&self, nodes: &[Node]) {
        let body = serde_json::to_vec(nodes).unwrap();
        *self.reply.lock() = Reply::Body(Bytes::from(body));
    }

    pub(crate) fn set_body(&self, body: &'static str) {
        *self.reply.lock() = Reply::Body(Bytes::from_static(body.as_bytes()));
    }

    pub(crate) fn fail_with_status(&self, status: u16) {
        *self.reply.lock() = Reply::Status(status);
    }

    pub(crate) fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub(crate) fn last_filter(&self) -> Option<String> {
        self.last_filter.lock().clone()
    }

    /// Polls until at least `count` fetches happened or `timeout` elapsed.
    pub(crate) async fn wait_for_fetches(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.fetch_count() < count {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        true
    }
}

#[async_trait]
impl DiscoverySource for MockSource {
    async fn fetch(&self, type_filter: &str) -> Result<Bytes, DiscoveryError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        *self.last_filter.lock() = Some(type_filter.to_string());
        match &*self.reply.lock() {
            Reply::Body(body) => Ok(body.clone()),
            Reply::Status(status) => Err(DiscoveryError::Status(*status)),
        }
    }
}

/// Serves `router` on `127.0.0.1` and returns the bound port.
pub(crate) async fn spawn_backend(router: Router) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    port
}

/// Accepts connections on `127.0.0.1` and never answers. Returns the port
/// and a counter of accepted connections.
pub(crate) async fn spawn_silent_backend() -> (u16, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            held.push(socket);
        }
    });
    (port, accepted)
}

/// Signals from a [`spawn_raw_backend`] connection.
pub(crate) struct RawBackend {
    pub(crate) port: u16,
    /// Fires once the request head has been read and `reply` written.
    pub(crate) answered: oneshot::Receiver<()>,
    /// Time from `answered` until the proxy closed the connection.
    pub(crate) closed: oneshot::Receiver<Duration>,
}

/// Accepts one connection on `127.0.0.1`, reads the request head, writes
/// `reply` verbatim, then reads until the peer closes.
pub(crate) async fn spawn_raw_backend(reply: &'static [u8]) -> RawBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (answered_tx, answered) = oneshot::channel();
    let (closed_tx, closed) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        let mut head = Vec::new();
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            head.extend_from_slice(&buf[..n]);
        }

        socket.write_all(reply).await.unwrap();
        let answered_at = tokio::time::Instant::now();
        let _ = answered_tx.send(());

        while let Ok(n) = socket.read(&mut buf).await {
            if n == 0 {
                break;
            }
        }
        let _ = closed_tx.send(answered_at.elapsed());
    });

    RawBackend {
        port,
        answered,
        closed,
    }
}

/// A loopback port nothing is listening on.
pub(crate) async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}
