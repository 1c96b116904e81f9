//! WebSocket upgrade relay.
//!
//! The proxy replays the client's upgrade request against the owning worker
//! on a parallel connection. Once the worker answers 101, the downstream
//! 101 is hand-written (see [`super::handshake`]) and the two raw sockets
//! are spliced together until either side closes or errors. No frame is
//! ever parsed - byte fidelity in both directions is the whole contract.

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::config::OrchestratorConfig;
use crate::routing;

use super::handshake;
use super::http::{self, RequestHead};

/// Relays a WebSocket upgrade to worker `index` and splices the sockets.
pub(crate) async fn relay_upgrade(
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
            warn!("Worker {index} unreachable for upgrade on port {port}: {e}");
            // Still plain HTTP at this point, so a gateway failure is
            // well-formed.
            http::write_gateway_failure(&mut downstream, &format!("worker {index} unreachable"))
                .await;
            return;
        }
    };

    let host = format!("127.0.0.1:{port}");
    if upstream.write_all(&head.with_host(&host)).await.is_err() {
        http::write_gateway_failure(&mut downstream, &format!("worker {index} unreachable")).await;
        return;
    }
    if !leftover.is_empty() && upstream.write_all(&leftover).await.is_err() {
        http::write_gateway_failure(&mut downstream, &format!("worker {index} unreachable")).await;
        return;
    }

    let (response_head, response_leftover) = match http::read_head_bytes(&mut upstream).await {
        Ok(Some(parsed)) => parsed,
        _ => {
            http::write_gateway_failure(&mut downstream, &format!("worker {index} unreachable"))
                .await;
            return;
        }
    };

    if http::response_status(&response_head) != Some(101) {
        // The worker declined the upgrade; hand its response through
        // verbatim and close.
        let _ = downstream.write_all(&response_head).await;
        let _ = downstream.write_all(&response_leftover).await;
        let _ = downstream.shutdown().await;
        return;
    }

    // Replicate the worker's accept key; derive it from the client key only
    // if the worker omitted the header.
    let accept = http::header_in(&response_head, "sec-websocket-accept").or_else(|| {
        head.header("sec-websocket-key")
            .map(|key| handshake::accept_key(&key))
    });
    let Some(accept) = accept else {
        debug!("Worker {index} sent 101 without an accept key and the client sent no key");
        return;
    };

    if downstream
        .write_all(handshake::switching_protocols(&accept).as_bytes())
        .await
        .is_err()
    {
        return;
    }
    if !response_leftover.is_empty()
        && downstream.write_all(&response_leftover).await.is_err()
    {
        return;
    }

    match tokio::io::copy_bidirectional(&mut downstream, &mut upstream).await {
        Ok((to_upstream, to_downstream)) => debug!(
            "WebSocket relay to worker {index} closed: {to_upstream}B up, {to_downstream}B down"
        ),
        Err(e) => debug!("WebSocket relay to worker {index} ended: {e}"),
    }
}
