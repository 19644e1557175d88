//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Notify};
use tokio::time::Instant;
use tracing::Span;

use ssh_dispatch::backend::{
    BackendContext, BackendError, BackendHandler, BackendName, BackendRegistry, ChannelId, SessionError,
    SessionHandler, SessionRequest,
};
use ssh_dispatch::config::remote::{ConfigClient, ConnectionConfigRequest, RemoteConfigError};
use ssh_dispatch::config::{AppConfig, SecurityConfig};
use ssh_dispatch::security::{PolicyError, SecurityOverlay};

/// Everything the stub backends observed, shared across connections.
#[derive(Default)]
pub struct Recorder {
    pub constructed: Mutex<Vec<(BackendName, String)>>,
    pub handshakes: Mutex<Vec<String>>,
    pub requests: Mutex<Vec<SessionRequest>>,
    pub disconnects: AtomicUsize,
    pub shutdowns: Mutex<Vec<Instant>>,
    shutdown_entered: Notify,
    shutdown_gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl Recorder {
    pub fn constructed(&self) -> Vec<(BackendName, String)> {
        self.constructed.lock().unwrap().clone()
    }

    pub fn handshakes(&self) -> Vec<String> {
        self.handshakes.lock().unwrap().clone()
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> Vec<Instant> {
        self.shutdowns.lock().unwrap().clone()
    }

    /// Make the next `on_shutdown` block until the returned sender fires.
    pub fn gate_shutdown(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.shutdown_gate.lock().unwrap() = Some(rx);
        tx
    }

    /// Wait until a backend is inside `on_shutdown`.
    pub async fn shutdown_entered(&self) {
        self.shutdown_entered.notified().await;
    }
}

pub struct StubBackend {
    recorder: Arc<Recorder>,
    ctx: BackendContext,
}

#[async_trait]
impl BackendHandler for StubBackend {
    async fn on_handshake_success(&self, username: &str) -> Result<Box<dyn SessionHandler>, BackendError> {
        self.recorder.handshakes.lock().unwrap().push(username.to_string());
        Ok(Box::new(StubSession {
            recorder: Arc::clone(&self.recorder),
            ctx: self.ctx.clone(),
        }))
    }

    async fn on_disconnect(&self) {
        self.recorder.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_shutdown(&self, deadline: Instant) {
        self.recorder.shutdowns.lock().unwrap().push(deadline);
        let gate = self.recorder.shutdown_gate.lock().unwrap().take();
        self.recorder.shutdown_entered.notify_one();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
    }
}

/// Accepts every request and counts it like a real backend would.
pub struct StubSession {
    recorder: Arc<Recorder>,
    ctx: BackendContext,
}

#[async_trait]
impl SessionHandler for StubSession {
    async fn on_request(&self, _channel: ChannelId, request: SessionRequest) -> Result<(), SessionError> {
        self.ctx.requests.increment(1);
        self.recorder.requests.lock().unwrap().push(request);
        Ok(())
    }

    async fn on_channel_close(&self, _channel: ChannelId) {}
}

/// Registry with a recording stub behind every backend name.
pub fn stub_registry(recorder: &Arc<Recorder>) -> BackendRegistry {
    BackendName::ALL.iter().fold(BackendRegistry::new(), |registry, &name| {
        let recorder = Arc::clone(recorder);
        registry.register(
            name,
            move |ctx: BackendContext, _settings: &ssh_dispatch::config::BackendSettings| -> Result<Arc<dyn BackendHandler>, BackendError> {
                recorder
                    .constructed
                    .lock()
                    .unwrap()
                    .push((name, ctx.connection_id.to_string()));
                Ok(Arc::new(StubBackend {
                    recorder: Arc::clone(&recorder),
                    ctx,
                }))
            },
        )
    })
}

pub fn config_with_backend(backend: &str) -> AppConfig {
    AppConfig {
        backend: backend.to_string(),
        ..AppConfig::default()
    }
}

pub fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([192, 0, 2, 10], port))
}

/// Returns fixed overrides and records every lookup.
#[derive(Default)]
pub struct StaticConfigClient {
    pub overrides: Option<Value>,
    pub seen: Mutex<Vec<ConnectionConfigRequest>>,
}

impl StaticConfigClient {
    pub fn new(overrides: Option<Value>) -> Self {
        Self {
            overrides,
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ConfigClient for StaticConfigClient {
    async fn load_connection(&self, request: &ConnectionConfigRequest) -> Result<Option<Value>, RemoteConfigError> {
        self.seen.lock().unwrap().push(request.clone());
        Ok(self.overrides.clone())
    }
}

/// Never answers.
pub struct HangingConfigClient;

#[async_trait]
impl ConfigClient for HangingConfigClient {
    async fn load_connection(&self, _request: &ConnectionConfigRequest) -> Result<Option<Value>, RemoteConfigError> {
        std::future::pending().await
    }
}

/// Blocks inside the lookup until released, so a test can interleave other
/// callbacks with an in-flight handshake.
pub struct GatedConfigClient {
    entered: Notify,
    release: Mutex<Option<oneshot::Receiver<()>>>,
}

impl GatedConfigClient {
    pub fn new() -> (Arc<Self>, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        let client = Arc::new(Self {
            entered: Notify::new(),
            release: Mutex::new(Some(rx)),
        });
        (client, tx)
    }

    /// Wait until a lookup is in flight.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }
}

#[async_trait]
impl ConfigClient for GatedConfigClient {
    async fn load_connection(&self, _request: &ConnectionConfigRequest) -> Result<Option<Value>, RemoteConfigError> {
        let release = self.release.lock().unwrap().take();
        self.entered.notify_one();
        if let Some(release) = release {
            let _ = release.await;
        }
        Ok(None)
    }
}

/// Overlay that rejects every configuration.
pub struct RejectingOverlay;

impl SecurityOverlay for RejectingOverlay {
    fn wrap(
        &self,
        _config: &SecurityConfig,
        _backend: Arc<dyn BackendHandler>,
        _span: &Span,
    ) -> Result<Arc<dyn BackendHandler>, PolicyError> {
        Err(PolicyError::Invalid("overlay unavailable".into()))
    }
}

/// Start a programmable HTTP server on an ephemeral port.
///
/// The handler receives the request body and returns the status and body to
/// send back.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
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
                        let body = read_request_body(&mut socket).await;
                        let (status, body) = f(body).await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

async fn read_request_body(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return String::new(),
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    };

    let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
    let content_length = headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }

    String::from_utf8_lossy(&buf[header_end..]).into_owned()
}
