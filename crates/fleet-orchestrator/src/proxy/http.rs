//! Plain HTTP handling: request-head reading, the byte-level worker relay,
//! and the endpoints the orchestrator answers itself.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::config::OrchestratorConfig;
use crate::lobby::LobbyRegistry;
use crate::routing;

/// Upper bound on a request/response head; anything larger is treated as
/// malformed.
const MAX_HEAD_BYTES: usize = 16 * 1024;

/// A parsed request head. `raw` keeps the original bytes (terminator
/// included) so the relay can forward the head verbatim apart from the
/// `Host` rewrite.
pub(crate) struct RequestHead {
    pub raw: Vec<u8>,
    pub method: String,
    pub target: String,
}

impl RequestHead {
    fn parse(raw: Vec<u8>) -> Option<Self> {
        let text = std::str::from_utf8(&raw).ok()?;
        let request_line = text.split("\r\n").next()?;
        let mut parts = request_line.split(' ');
        let method = parts.next()?.to_string();
        let target = parts.next()?.to_string();
        parts.next()?;
        Some(Self {
            raw,
            method,
            target,
        })
    }

    /// The request path without the query string.
    pub fn path(&self) -> &str {
        self.target
            .split_once('?')
            .map(|(path, _)| path)
            .unwrap_or(&self.target)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<String> {
        header_in(&self.raw, name)
    }

    /// Whether this request asks for a WebSocket upgrade.
    pub fn is_websocket_upgrade(&self) -> bool {
        let upgrade_header = self
            .header("upgrade")
            .map(|v| v.eq_ignore_ascii_case("websocket"))
            .unwrap_or(false);
        let connection_header = self
            .header("connection")
            .map(|v| v.to_ascii_lowercase().contains("upgrade"))
            .unwrap_or(false);
        upgrade_header && connection_header
    }

    /// The head bytes with the `Host` header replaced, everything else
    /// forwarded verbatim.
    pub fn with_host(&self, host: &str) -> Vec<u8> {
        let body = &self.raw[..self.raw.len().saturating_sub(4)];
        let text = String::from_utf8_lossy(body);
        let mut out = String::with_capacity(self.raw.len() + host.len());
        for (i, line) in text.split("\r\n").enumerate() {
            if i > 0 && line.len() >= 5 && line[..5].eq_ignore_ascii_case("host:") {
                out.push_str("Host: ");
                out.push_str(host);
            } else {
                out.push_str(line);
            }
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
        out.into_bytes()
    }
}

/// Reads bytes until the `\r\n\r\n` head terminator.
///
/// Returns the head (terminator included) and any bytes read past it, which
/// the caller must forward before splicing. `None` on EOF before a complete
/// head or when the head exceeds [`MAX_HEAD_BYTES`].
pub(crate) async fn read_head_bytes(
    stream: &mut TcpStream,
) -> io::Result<Option<(Vec<u8>, Vec<u8>)>> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = find_head_end(&buf) {
            let leftover = buf.split_off(end);
            return Ok(Some((buf, leftover)));
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Ok(None);
        }
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

/// Reads and parses one request head from a downstream client.
pub(crate) async fn read_request_head(
    stream: &mut TcpStream,
) -> io::Result<Option<(RequestHead, Vec<u8>)>> {
    match read_head_bytes(stream).await? {
        Some((raw, leftover)) => Ok(RequestHead::parse(raw).map(|head| (head, leftover))),
        None => Ok(None),
    }
}

/// Case-insensitive header lookup in a raw head.
pub(crate) fn header_in(raw_head: &[u8], name: &str) -> Option<String> {
    let text = std::str::from_utf8(raw_head).ok()?;
    for line in text.split("\r\n").skip(1) {
        if let Some((header, value)) = line.split_once(':') {
            if header.trim().eq_ignore_ascii_case(name) {
                return Some(value.trim().to_string());
            }
        }
    }
    None
}

/// Status code from a raw response head (`HTTP/1.1 101 ...`).
pub(crate) fn response_status(raw_head: &[u8]) -> Option<u16> {
    let text = std::str::from_utf8(raw_head).ok()?;
    let status_line = text.split("\r\n").next()?;
    status_line.split(' ').nth(1)?.parse().ok()
}

/// Relays one plain HTTP exchange to worker `index`.
///
/// The request head goes upstream with only `Host` rewritten; everything
/// after it, in both directions, is spliced raw until either side closes.
/// The upstream's status, headers, and body therefore reach the caller
/// byte-identical.
pub(crate) async fn relay(
    mut downstream: TcpStream,
    head: RequestHead,
    leftover: Vec<u8>,
    index: usize,
    config: &OrchestratorConfig,
) {
    let port = routing::worker_port(config.worker_base_port, index);
    let mut upstream = match TcpStream::connect(("127.0.0.1", port)).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Worker {index} unreachable on port {port}: {e}");
            // No response has been sent yet, so the gateway failure is safe.
            write_gateway_failure(&mut downstream, &format!("worker {index} unreachable")).await;
            return;
        }
    };

    let host = format!("127.0.0.1:{port}");
    if upstream.write_all(&head.with_host(&host)).await.is_err() {
        write_gateway_failure(&mut downstream, &format!("worker {index} unreachable")).await;
        return;
    }
    if !leftover.is_empty() && upstream.write_all(&leftover).await.is_err() {
        write_gateway_failure(&mut downstream, &format!("worker {index} unreachable")).await;
        return;
    }

    // From here the response may be in flight; on error just tear down,
    // never answer twice.
    match tokio::io::copy_bidirectional(&mut downstream, &mut upstream).await {
        Ok((to_upstream, to_downstream)) => debug!(
            "Relay to worker {index} done: {to_upstream}B up, {to_downstream}B down"
        ),
        Err(e) => debug!("Relay to worker {index} ended: {e}"),
    }
}

/// Endpoints the orchestrator serves without touching a worker.
pub(crate) async fn serve_direct(
    mut stream: TcpStream,
    head: RequestHead,
    config: &Arc<OrchestratorConfig>,
    registry: &Arc<LobbyRegistry>,
) {
    match (head.method.as_str(), head.path()) {
        ("GET", "/api/env") => match &config.game_env {
            Some(env) => {
                let body = serde_json::json!({ "game_env": env }).to_string();
                write_response(&mut stream, "200 OK", "application/json", body.as_bytes()).await;
            }
            None => {
                let body = serde_json::json!({ "error": "game_env not configured" }).to_string();
                write_response(
                    &mut stream,
                    "500 Internal Server Error",
                    "application/json",
                    body.as_bytes(),
                )
                .await;
            }
        },
        ("GET", "/api/public_lobbies") => {
            // Always the last complete aggregation cycle, never a partial
            // one.
            let listing = registry.listing().await;
            write_response(&mut stream, "200 OK", "application/json", listing.as_bytes()).await;
        }
        ("GET", _) => {
            write_response(&mut stream, "200 OK", "text/html", SHELL_PAGE.as_bytes()).await;
        }
        _ => {
            write_response(&mut stream, "404 Not Found", "text/plain", b"not found").await;
        }
    }
}

/// Minimal application shell served on unmatched GET paths. Real asset
/// serving lives outside the orchestrator.
const SHELL_PAGE: &str = "<!DOCTYPE html><html><head><title>fleet</title></head><body><div id=\"app\"></div></body></html>";

/// Writes one complete HTTP/1.1 response and closes the exchange.
pub(crate) async fn write_response(
    stream: &mut TcpStream,
    status: &str,
    content_type: &str,
    body: &[u8],
) {
    let head = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    if stream.write_all(head.as_bytes()).await.is_ok() {
        let _ = stream.write_all(body).await;
    }
    let _ = stream.shutdown().await;
}

/// Gateway-failure response with a short diagnostic payload.
pub(crate) async fn write_gateway_failure(stream: &mut TcpStream, detail: &str) {
    let body = format!("bad gateway: {detail}");
    write_response(stream, "502 Bad Gateway", "text/plain", body.as_bytes()).await;
}
