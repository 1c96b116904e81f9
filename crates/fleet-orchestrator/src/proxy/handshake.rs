//! WebSocket 101 response framing.
//!
//! The downstream half of the upgrade relay is written by hand: the proxy
//! never speaks the WebSocket protocol itself, it only needs to produce the
//! exact switching-protocols head that lets the client and the worker agree
//! on one. Kept isolated here so the byte layout is pinned by a unit test.

use tokio_tungstenite::tungstenite::handshake::derive_accept_key;

/// Computes the `Sec-WebSocket-Accept` value for a client's
/// `Sec-WebSocket-Key`.
pub fn accept_key(client_key: &str) -> String {
    derive_accept_key(client_key.as_bytes())
}

/// Builds the complete downstream 101 response head.
pub fn switching_protocols(accept: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {accept}\r\n\r\n"
    )
}
