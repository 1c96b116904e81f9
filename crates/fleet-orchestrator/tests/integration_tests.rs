//! Integration tests exercising the orchestrator against stub workers.
//!
//! Stub workers come in two flavors: shell one-liners launched by the real
//! supervisor (they speak the stdout control channel but serve no HTTP),
//! and in-process TCP listeners standing in for the workers' HTTP surface.
//! Each test uses its own port range so tests can run concurrently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};
use tokio::time::timeout;

use fleet_orchestrator::aggregator::LobbyAggregator;
use fleet_orchestrator::config::OrchestratorConfig;
use fleet_orchestrator::lobby::{epoch_ms, LobbyRegistry};
use fleet_orchestrator::playlist::RotatingPlaylist;
use fleet_orchestrator::proxy::handshake;
use fleet_orchestrator::routing;
use fleet_orchestrator::scheduler::LobbyScheduler;
use fleet_orchestrator::supervisor::{ControlMessage, WorkerPool};
use fleet_orchestrator::{AdminToken, FleetOrchestrator};

// ============================================================================
// Test support
// ============================================================================

/// Shell one-liner that signals ready over the control channel and then
/// stays alive.
const READY_AND_SLEEP: &str =
    r#"echo "{\"type\":\"ready\",\"index\":$FLEET_WORKER_INDEX}"; sleep 30"#;

/// Shell one-liner that signals ready and immediately exits (a crashing
/// worker).
const READY_AND_EXIT: &str = r#"echo "{\"type\":\"ready\",\"index\":$FLEET_WORKER_INDEX}""#;

fn test_config(num_workers: usize, base_port: u16) -> OrchestratorConfig {
    OrchestratorConfig {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        num_workers,
        worker_base_port: base_port,
        worker_command: "/bin/sh".to_string(),
        worker_args: vec!["-c".to_string(), READY_AND_SLEEP.to_string()],
        poll_interval: Duration::from_millis(50),
        status_timeout: Duration::from_secs(1),
        game_env: Some("test".to_string()),
        ..Default::default()
    }
}

/// Finds a game identifier that routes to the wanted worker index.
fn id_routed_to(index: usize, pool_size: usize, salt: &str) -> String {
    for i in 0..10_000 {
        let candidate = format!("{salt}-{i}");
        if routing::worker_index(&candidate, pool_size) == index {
            return candidate;
        }
    }
    panic!("no identifier routed to worker {index}");
}

/// In-process stand-in for a worker's HTTP surface.
///
/// Serves `GET /api/game/{id}` from a status map and records
/// `POST /api/create_game/{id}` calls, inserting a joinable status for the
/// created lobby the way a real worker would.
struct StubWorker {
    statuses: Arc<Mutex<HashMap<String, serde_json::Value>>>,
    create_calls: Arc<AtomicUsize>,
    created_ids: Arc<Mutex<Vec<String>>>,
    create_response_status: u16,
    expected_auth: Option<(String, String)>,
}

impl StubWorker {
    fn new() -> Self {
        Self {
            statuses: Arc::new(Mutex::new(HashMap::new())),
            create_calls: Arc::new(AtomicUsize::new(0)),
            created_ids: Arc::new(Mutex::new(Vec::new())),
            create_response_status: 200,
            expected_auth: None,
        }
    }

    fn with_auth(mut self, header: &str, token: &str) -> Self {
        self.expected_auth = Some((header.to_string(), token.to_string()));
        self
    }

    fn rejecting_creates(mut self) -> Self {
        self.create_response_status = 500;
        self
    }

    async fn set_status(&self, game_id: &str, status: serde_json::Value) {
        self.statuses
            .lock()
            .await
            .insert(game_id.to_string(), status);
    }

    async fn spawn(&self, port: u16) {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .unwrap_or_else(|e| panic!("stub worker bind on {port} failed: {e}"));
        let statuses = self.statuses.clone();
        let create_calls = self.create_calls.clone();
        let created_ids = self.created_ids.clone();
        let create_response_status = self.create_response_status;
        let expected_auth = self.expected_auth.clone();

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let statuses = statuses.clone();
                let create_calls = create_calls.clone();
                let created_ids = created_ids.clone();
                let expected_auth = expected_auth.clone();
                tokio::spawn(async move {
                    let Some(request) = read_http_request(&mut stream).await else {
                        return;
                    };
                    if let Some((header, token)) = &expected_auth {
                        if request.headers.get(&header.to_lowercase()) != Some(token) {
                            write_http_response(&mut stream, 401, "{}").await;
                            return;
                        }
                    }

                    if let Some(id) = request.path.strip_prefix("/api/game/") {
                        match statuses.lock().await.get(id) {
                            Some(status) => {
                                write_http_response(&mut stream, 200, &status.to_string()).await
                            }
                            None => write_http_response(&mut stream, 404, "{}").await,
                        }
                    } else if let Some(id) = request.path.strip_prefix("/api/create_game/") {
                        create_calls.fetch_add(1, Ordering::SeqCst);
                        created_ids.lock().await.push(id.to_string());
                        if create_response_status == 200 {
                            let config: serde_json::Value =
                                serde_json::from_slice(&request.body).unwrap_or_default();
                            statuses.lock().await.insert(
                                id.to_string(),
                                serde_json::json!({
                                    "gameID": id,
                                    "clients": [],
                                    "gameConfig": config,
                                    "msUntilStart": epoch_ms() + 60_000,
                                }),
                            );
                            write_http_response(&mut stream, 200, "{}").await;
                        } else {
                            write_http_response(&mut stream, create_response_status, "{}").await;
                        }
                    } else {
                        write_http_response(&mut stream, 404, "{}").await;
                    }
                });
            }
        });
    }
}

struct HttpRequest {
    path: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

/// Minimal HTTP/1.1 request reader for the stubs.
async fn read_http_request(stream: &mut TcpStream) -> Option<HttpRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next()?;
    let path = request_line.split(' ').nth(1)?.to_string();
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_lowercase(), value.trim().to_string());
        }
    }

    let content_length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = buf[head_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(HttpRequest {
        path,
        headers,
        body,
    })
}

async fn write_http_response(stream: &mut TcpStream, status: u16, body: &str) {
    let reason = match status {
        200 => "OK",
        401 => "Unauthorized",
        404 => "Not Found",
        _ => "Error",
    };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

/// Plain HTTP GET against the proxy, reading until the peer closes.
async fn raw_get(addr: std::net::SocketAddr, path: &str, extra_headers: &str) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.expect("proxy connect");
    let request = format!("GET {path} HTTP/1.1\r\nHost: public.test\r\n{extra_headers}\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    response
}

fn aggregator_for(
    config: &Arc<OrchestratorConfig>,
    token: &AdminToken,
    registry: &Arc<LobbyRegistry>,
) -> LobbyAggregator {
    LobbyAggregator::new(
        config.clone(),
        token.clone(),
        registry.clone(),
        reqwest::Client::new(),
    )
}

// ============================================================================
// Worker pool supervision
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_pool_ready_fires_after_all_workers() {
    let config = Arc::new(test_config(3, 46010));
    let (shutdown, _) = broadcast::channel(1);
    let pool = WorkerPool::new(config, AdminToken::mint(), shutdown.clone());

    pool.start().expect("pool should launch");
    timeout(Duration::from_secs(5), pool.wait_ready())
        .await
        .expect("pool-ready should fire once all 3 workers signal");
    assert_eq!(pool.ready_count(), 3);

    let _ = shutdown.send(());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_crash_restart_preserves_identity() {
    let mut config = test_config(1, 46030);
    config.worker_args = vec!["-c".to_string(), READY_AND_EXIT.to_string()];
    let config = Arc::new(config);
    let (shutdown, _) = broadcast::channel(1);
    let pool = WorkerPool::new(config, AdminToken::mint(), shutdown.clone());
    let mut control = pool.subscribe_control();

    pool.start().expect("pool should launch");

    // The worker exits immediately after signaling; the supervisor must
    // relaunch it under the same index, producing further ready signals.
    let mut ready_signals = 0;
    while ready_signals < 3 {
        let message = timeout(Duration::from_secs(10), control.recv())
            .await
            .expect("restarted worker should keep signaling ready")
            .expect("control channel should stay open");
        let ControlMessage::Ready { index } = message;
        assert_eq!(index, 0, "restart must preserve the worker index");
        ready_signals += 1;
    }

    let _ = shutdown.send(());
}

// ============================================================================
// Aggregation
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_aggregation_isolates_failures() {
    let config = Arc::new(test_config(2, 46050));
    let token = AdminToken::mint();
    let registry = Arc::new(LobbyRegistry::new());

    // Worker 0 answers; worker 1's port has no listener at all.
    let stub = StubWorker::new().with_auth(&config.admin_header, token.expose());
    let good_id = id_routed_to(0, 2, "good");
    let doomed_id = id_routed_to(1, 2, "doomed");
    stub.set_status(
        &good_id,
        serde_json::json!({
            "gameID": good_id,
            "clients": [{}, {}],
            "gameConfig": { "maxPlayers": 8 },
            "msUntilStart": epoch_ms() + 60_000,
        }),
    )
    .await;
    stub.spawn(config.worker_base_port).await;

    registry.track(good_id.clone());
    registry.track(doomed_id.clone());

    let aggregator = aggregator_for(&config, &token, &registry);
    let remaining = aggregator.aggregate().await;

    assert_eq!(remaining, 1);
    assert!(registry.is_tracked(&good_id));
    assert!(!registry.is_tracked(&doomed_id));

    let listing: serde_json::Value =
        serde_json::from_str(&registry.listing().await).expect("listing should be valid JSON");
    let lobbies = listing["lobbies"].as_array().unwrap();
    assert_eq!(lobbies.len(), 1);
    assert_eq!(lobbies[0]["gameID"], good_id.as_str());
    assert_eq!(lobbies[0]["numClients"], 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_aggregation_removal_rules() {
    let config = Arc::new(test_config(1, 46070));
    let token = AdminToken::mint();
    let registry = Arc::new(LobbyRegistry::new());
    let stub = StubWorker::new();

    let now = epoch_ms();
    let starting = id_routed_to(0, 1, "starting");
    let full = id_routed_to(0, 1, "full");
    let healthy = id_routed_to(0, 1, "healthy");

    stub.set_status(
        &starting,
        serde_json::json!({ "gameID": starting, "clients": [], "msUntilStart": now + 100 }),
    )
    .await;
    stub.set_status(
        &full,
        serde_json::json!({
            "gameID": full,
            "clients": [{}, {}],
            "gameConfig": { "maxPlayers": 2 },
            "msUntilStart": now + 60_000,
        }),
    )
    .await;
    stub.set_status(
        &healthy,
        serde_json::json!({
            "gameID": healthy,
            "clients": [{}],
            "gameConfig": { "maxPlayers": 8 },
            "msUntilStart": now + 60_000,
        }),
    )
    .await;
    stub.spawn(config.worker_base_port).await;

    for id in [&starting, &full, &healthy] {
        registry.track(id.clone());
    }

    let aggregator = aggregator_for(&config, &token, &registry);
    let remaining = aggregator.aggregate().await;

    assert_eq!(remaining, 1);
    assert!(registry.is_tracked(&healthy));
    assert!(!registry.is_tracked(&starting));
    assert!(!registry.is_tracked(&full));

    let listing: serde_json::Value = serde_json::from_str(&registry.listing().await).unwrap();
    let lobbies = listing["lobbies"].as_array().unwrap();
    assert_eq!(lobbies.len(), 1);
    assert_eq!(lobbies[0]["gameID"], healthy.as_str());
    assert_eq!(lobbies[0]["numClients"], 1);
    assert!(lobbies[0]["msUntilStart"].as_i64().unwrap() > 250);
}

// ============================================================================
// Scheduling
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_scheduler_creates_exactly_one_lobby_on_zero() {
    let config = Arc::new(test_config(1, 46090));
    let token = AdminToken::mint();
    let registry = Arc::new(LobbyRegistry::new());
    let stub = StubWorker::new().with_auth(&config.admin_header, token.expose());
    stub.spawn(config.worker_base_port).await;

    let scheduler = LobbyScheduler::new(
        config.clone(),
        token.clone(),
        registry.clone(),
        Arc::new(RotatingPlaylist::default()),
        reqwest::Client::new(),
    );

    scheduler
        .maybe_schedule(0)
        .await
        .expect("create call should be accepted");
    assert_eq!(stub.create_calls.load(Ordering::SeqCst), 1);
    assert_eq!(registry.count(), 1);

    // A nonzero tracked count issues no create call.
    scheduler.maybe_schedule(1).await.unwrap();
    assert_eq!(stub.create_calls.load(Ordering::SeqCst), 1);

    // The created lobby landed on its routed worker with the playlist
    // config.
    let created = stub.created_ids.lock().await;
    assert_eq!(created.len(), 1);
    assert_eq!(routing::worker_index(&created[0], 1), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_create_leaves_id_for_self_healing() {
    let config = Arc::new(test_config(1, 46110));
    let token = AdminToken::mint();
    let registry = Arc::new(LobbyRegistry::new());
    let stub = StubWorker::new().rejecting_creates();
    stub.spawn(config.worker_base_port).await;

    let scheduler = LobbyScheduler::new(
        config.clone(),
        token.clone(),
        registry.clone(),
        Arc::new(RotatingPlaylist::default()),
        reqwest::Client::new(),
    );

    let result = scheduler.maybe_schedule(0).await;
    assert!(result.is_err(), "rejected create must surface as an error");
    // Optimistic registration: the orphaned ID stays tracked...
    assert_eq!(registry.count(), 1);

    // ...until the next aggregation cycle prunes it through the failure
    // path (the stub 404s unknown lobbies).
    let aggregator = aggregator_for(&config, &token, &registry);
    let remaining = aggregator.aggregate().await;
    assert_eq!(remaining, 0);
    assert_eq!(registry.count(), 0);
}

// ============================================================================
// Proxy
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_proxy_passthrough_fidelity() {
    let config = Arc::new(test_config(3, 46130));
    let registry = Arc::new(LobbyRegistry::new());
    let (shutdown, _) = broadcast::channel(1);

    // Raw upstream for worker 2 recording the exact request bytes.
    let upstream_port = routing::worker_port(config.worker_base_port, 2);
    let recorded: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
    let upstream_response: &[u8] =
        b"HTTP/1.1 201 Created\r\nX-Upstream: yes\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello";
    {
        let recorded = recorded.clone();
        let listener = TcpListener::bind(("127.0.0.1", upstream_port)).await.unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            while buf.windows(4).all(|w| w != b"\r\n\r\n") {
                let n = stream.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
            }
            recorded.lock().await.extend_from_slice(&buf);
            stream.write_all(upstream_response).await.unwrap();
            stream.shutdown().await.unwrap();
        });
    }

    let proxy =
        fleet_orchestrator::proxy::RequestProxy::bind(config.clone(), registry, shutdown.clone())
            .expect("proxy bind");
    let addr = proxy.local_addr().unwrap();
    tokio::spawn(proxy.serve());

    let response = raw_get(addr, "/w2/api/x?y=1", "X-Custom: abc\r\n").await;
    assert_eq!(
        response, upstream_response,
        "upstream status/headers/body must come back byte-identical"
    );

    let request = recorded.lock().await.clone();
    let request = String::from_utf8(request).unwrap();
    assert!(request.starts_with("GET /w2/api/x?y=1 HTTP/1.1\r\n"));
    assert!(request.contains("\r\nX-Custom: abc\r\n"));
    assert!(request.contains(&format!("\r\nHost: 127.0.0.1:{upstream_port}\r\n")));

    let _ = shutdown.send(());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_proxy_gateway_failure_on_dead_worker() {
    let config = Arc::new(test_config(1, 46150));
    let registry = Arc::new(LobbyRegistry::new());
    let (shutdown, _) = broadcast::channel(1);

    let proxy =
        fleet_orchestrator::proxy::RequestProxy::bind(config.clone(), registry, shutdown.clone())
            .unwrap();
    let addr = proxy.local_addr().unwrap();
    tokio::spawn(proxy.serve());

    let response = raw_get(addr, "/w0/api/x", "").await;
    let response = String::from_utf8_lossy(&response);
    assert!(response.starts_with("HTTP/1.1 502 Bad Gateway\r\n"));
    assert!(response.contains("bad gateway"));

    let _ = shutdown.send(());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_proxy_direct_endpoints() {
    let config = Arc::new(test_config(1, 46170));
    let registry = Arc::new(LobbyRegistry::new());
    let (shutdown, _) = broadcast::channel(1);

    registry
        .publish(&[fleet_orchestrator::lobby::LobbySnapshot {
            game_id: "L1".to_string(),
            num_clients: 0,
            game_config: None,
            ms_until_start: 42_000,
        }])
        .await;

    let proxy = fleet_orchestrator::proxy::RequestProxy::bind(
        config.clone(),
        registry.clone(),
        shutdown.clone(),
    )
    .unwrap();
    let addr = proxy.local_addr().unwrap();
    tokio::spawn(proxy.serve());

    let env = String::from_utf8_lossy(&raw_get(addr, "/api/env", "").await).to_string();
    assert!(env.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(env.contains(r#"{"game_env":"test"}"#));

    let lobbies = String::from_utf8_lossy(&raw_get(addr, "/api/public_lobbies", "").await).to_string();
    assert!(lobbies.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(lobbies.contains(r#""gameID":"L1""#));

    let shell = String::from_utf8_lossy(&raw_get(addr, "/anything/else", "").await).to_string();
    assert!(shell.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(shell.contains("<!DOCTYPE html>"));

    let _ = shutdown.send(());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_env_endpoint_500_when_unset() {
    let mut config = test_config(1, 46190);
    config.game_env = None;
    let config = Arc::new(config);
    let registry = Arc::new(LobbyRegistry::new());
    let (shutdown, _) = broadcast::channel(1);

    let proxy =
        fleet_orchestrator::proxy::RequestProxy::bind(config, registry, shutdown.clone()).unwrap();
    let addr = proxy.local_addr().unwrap();
    tokio::spawn(proxy.serve());

    let response = String::from_utf8_lossy(&raw_get(addr, "/api/env", "").await).to_string();
    assert!(response.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));

    let _ = shutdown.send(());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_websocket_relay_bidirectional() {
    let config = Arc::new(test_config(1, 46210));
    let registry = Arc::new(LobbyRegistry::new());
    let (shutdown, _) = broadcast::channel(1);

    // Upstream worker: accept the upgrade, then echo every byte.
    let upstream_port = routing::worker_port(config.worker_base_port, 0);
    {
        let listener = TcpListener::bind(("127.0.0.1", upstream_port)).await.unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            while buf.windows(4).all(|w| w != b"\r\n\r\n") {
                let n = stream.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
            }
            let head = String::from_utf8_lossy(&buf);
            let key = head
                .lines()
                .find_map(|l| l.strip_prefix("Sec-WebSocket-Key: "))
                .expect("upgrade request should carry the client key")
                .trim()
                .to_string();
            let accept = handshake::accept_key(&key);
            stream
                .write_all(handshake::switching_protocols(&accept).as_bytes())
                .await
                .unwrap();
            // Raw echo: whatever frames the client sends come straight
            // back.
            loop {
                let n = stream.read(&mut chunk).await.unwrap_or(0);
                if n == 0 {
                    return;
                }
                if stream.write_all(&chunk[..n]).await.is_err() {
                    return;
                }
            }
        });
    }

    let proxy =
        fleet_orchestrator::proxy::RequestProxy::bind(config.clone(), registry, shutdown.clone())
            .unwrap();
    let addr = proxy.local_addr().unwrap();
    tokio::spawn(proxy.serve());

    let mut client = TcpStream::connect(addr).await.unwrap();
    let client_key = "dGhlIHNhbXBsZSBub25jZQ==";
    let upgrade = format!(
        "GET /w0/game/sock HTTP/1.1\r\nHost: public.test\r\nConnection: Upgrade\r\nUpgrade: websocket\r\nSec-WebSocket-Version: 13\r\nSec-WebSocket-Key: {client_key}\r\n\r\n"
    );
    client.write_all(upgrade.as_bytes()).await.unwrap();

    // Read the hand-written 101 head.
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        client.read_exact(&mut byte).await.unwrap();
        head.push(byte[0]);
    }
    let head = String::from_utf8(head).unwrap();
    assert!(head.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
    assert!(head.contains(&format!(
        "Sec-WebSocket-Accept: {}",
        handshake::accept_key(client_key)
    )));

    // Arbitrary byte frames survive the splice in both directions, in
    // order.
    let frames: &[u8] = &[0x82, 0x05, 0xde, 0xad, 0xbe, 0xef, 0x00, 0x81, 0x01, 0x41];
    client.write_all(frames).await.unwrap();
    let mut echoed = vec![0u8; frames.len()];
    timeout(Duration::from_secs(5), client.read_exact(&mut echoed))
        .await
        .expect("echo should arrive")
        .unwrap();
    assert_eq!(echoed, frames);

    let _ = shutdown.send(());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_upgrade_on_non_worker_path_is_dropped() {
    let config = Arc::new(test_config(1, 46230));
    let registry = Arc::new(LobbyRegistry::new());
    let (shutdown, _) = broadcast::channel(1);

    let proxy =
        fleet_orchestrator::proxy::RequestProxy::bind(config, registry, shutdown.clone()).unwrap();
    let addr = proxy.local_addr().unwrap();
    tokio::spawn(proxy.serve());

    let mut client = TcpStream::connect(addr).await.unwrap();
    let upgrade = "GET /api/env HTTP/1.1\r\nHost: x\r\nConnection: Upgrade\r\nUpgrade: websocket\r\nSec-WebSocket-Key: abc\r\n\r\n";
    client.write_all(upgrade.as_bytes()).await.unwrap();

    // No HTTP response: the socket just closes.
    let mut buf = Vec::new();
    let n = timeout(Duration::from_secs(5), client.read_to_end(&mut buf))
        .await
        .expect("socket should close promptly")
        .unwrap();
    assert_eq!(n, 0);

    let _ = shutdown.send(());
}

// ============================================================================
// End to end
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_end_to_end_scenario() {
    let config = test_config(3, 46250);

    // The workers' HTTP surfaces are in-process stubs; the supervised
    // processes only speak the control channel.
    let mut stubs = Vec::new();
    for index in 0..3 {
        let stub = StubWorker::new();
        stub.spawn(routing::worker_port(config.worker_base_port, index))
            .await;
        stubs.push(stub);
    }

    let orchestrator = FleetOrchestrator::new(config);
    orchestrator.pool().start().expect("pool should launch");
    orchestrator.spawn_matchmaking();
    let proxy = orchestrator.bind_proxy().expect("proxy bind");
    let addr = proxy.local_addr().unwrap();
    tokio::spawn(proxy.serve());

    timeout(Duration::from_secs(5), orchestrator.pool().wait_ready())
        .await
        .expect("all 3 workers should report ready");

    // The matchmaking loop notices the empty cluster, schedules one lobby,
    // and the next cycle publishes it.
    let listing = timeout(Duration::from_secs(5), async {
        loop {
            let response = raw_get(addr, "/api/public_lobbies", "").await;
            let response = String::from_utf8_lossy(&response);
            let body = response.split("\r\n\r\n").nth(1).unwrap_or("");
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
                if json["lobbies"].as_array().is_some_and(|l| !l.is_empty()) {
                    break json;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("a public lobby should appear in the listing");

    let lobby = &listing["lobbies"][0];
    assert_eq!(lobby["numClients"], 0);
    let game_id = lobby["gameID"].as_str().unwrap().to_string();

    // The create call landed on the worker the routing function names.
    let owner = routing::worker_index(&game_id, 3);
    let created = stubs[owner].created_ids.lock().await;
    assert!(
        created.contains(&game_id),
        "lobby {game_id} should have been created on worker {owner}"
    );

    orchestrator.shutdown();
}
