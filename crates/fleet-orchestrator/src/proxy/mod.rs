//! The public request surface: one port terminating all external
//! connections.
//!
//! The proxy recognizes worker-addressed paths (`/w{index}/...`) and relays
//! both ordinary HTTP requests and WebSocket upgrade handshakes to the
//! owning worker byte-for-byte. It performs no buffering of body or message
//! content beyond what is needed to relay it - it is a pass-through, not a
//! parser, and has no opinion on payload formats. The few endpoints it
//! serves directly (`/api/env`, `/api/public_lobbies`, the application
//! shell fallback) never touch worker state, only orchestrator-owned
//! caches.

pub mod handshake;
mod http;
mod ws;

use std::net::SocketAddr;
use std::net::TcpListener as StdTcpListener;
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::config::OrchestratorConfig;
use crate::error::FleetError;
use crate::lobby::LobbyRegistry;
use crate::routing;

/// The public HTTP + WebSocket entry point.
pub struct RequestProxy {
    config: Arc<OrchestratorConfig>,
    registry: Arc<LobbyRegistry>,
    listener: TcpListener,
    shutdown: broadcast::Sender<()>,
}

impl RequestProxy {
    /// Binds the public listener.
    pub fn bind(
        config: Arc<OrchestratorConfig>,
        registry: Arc<LobbyRegistry>,
        shutdown: broadcast::Sender<()>,
    ) -> Result<Self, FleetError> {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| FleetError::Network(format!("Socket creation failed: {e}")))?;
        socket.set_reuse_address(true).ok();
        socket
            .bind(&config.bind_address.into())
            .map_err(|e| FleetError::Network(format!("Bind failed: {e}")))?;
        socket
            .listen(1024)
            .map_err(|e| FleetError::Network(format!("Listen failed: {e}")))?;

        let std_listener: StdTcpListener = socket.into();
        std_listener.set_nonblocking(true).ok();
        let listener = TcpListener::from_std(std_listener)
            .map_err(|e| FleetError::Network(format!("Tokio listener creation failed: {e}")))?;

        Ok(Self {
            config,
            registry,
            listener,
            shutdown,
        })
    }

    /// The address the proxy actually bound (useful when configured with
    /// port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, FleetError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until shutdown, spawning one relay task per
    /// connection so in-flight relays never block new clients.
    pub async fn serve(self) -> Result<(), FleetError> {
        let mut shutdown_rx = self.shutdown.subscribe();
        info!("Proxy listening on {}", self.local_addr()?);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let config = self.config.clone();
                        let registry = self.registry.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, addr, config, registry).await;
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {e}");
                    }
                },
                _ = shutdown_rx.recv() => {
                    info!("Proxy shutting down");
                    return Ok(());
                }
            }
        }
    }
}

/// Reads one request head and dispatches it: worker relay, direct endpoint,
/// or fallback shell.
async fn handle_connection(
    mut stream: TcpStream,
    addr: SocketAddr,
    config: Arc<OrchestratorConfig>,
    registry: Arc<LobbyRegistry>,
) {
    let (head, leftover) = match http::read_request_head(&mut stream).await {
        Ok(Some(parsed)) => parsed,
        // EOF before a complete head, or an unparseable head: nothing to
        // answer.
        _ => return,
    };
    debug!("{addr}: {} {}", head.method, head.target);

    match routing::parse_worker_path(head.path()) {
        Some((index, _rest)) if index < config.num_workers => {
            if head.is_websocket_upgrade() {
                ws::relay_upgrade(stream, head, leftover, index, &config).await;
            } else {
                http::relay(stream, head, leftover, index, &config).await;
            }
        }
        Some((index, _rest)) => {
            // Worker-shaped path outside the pool: same surface as an
            // unreachable worker.
            if head.is_websocket_upgrade() {
                return;
            }
            http::write_gateway_failure(&mut stream, &format!("no worker {index}")).await;
        }
        None if head.is_websocket_upgrade() => {
            // No protocol has been agreed on a non-worker upgrade path;
            // close without an HTTP response.
        }
        None => http::serve_direct(stream, head, &config, &registry).await,
    }
}
