//! [`CockpitServer`] – HTTP + WebSocket server for the Cockpit UI (§6, §10.7).
//!
//! Listens on `0.0.0.0:8080` (configurable via [`CockpitServer::with_port`]).
//!
//! * `GET /` (or anything else not recognised below) → 200 OK with the
//!   embedded Cockpit HTML.
//! * `POST /chat`, `POST /command` → inject the request body's `text` as the
//!   session utterance and run one Kernel+ReAct pass.
//! * `POST /stop`, `POST /pause`, `POST /resume` → inject the corresponding
//!   keyword utterance and run one pass.
//! * `POST /obstacles` → add an obstacle to the shared world and broadcast.
//! * `POST /obstacles/clear` → clear the world's obstacle list and broadcast.
//! * WebSocket upgrades → bidirectional bridge: downstream, every
//!   post-stage [`SnapshotEvent`] for the session; upstream, utterance and
//!   obstacle messages handled the same way as the HTTP endpoints above.

use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use cortex_middleware::{EventBus, SnapshotEvent};
use cortex_runtime::Orchestrator;
use cortex_skills::SimWorld;
use cortex_types::{BrainState, CoreError};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use uuid::Uuid;

/// Default TCP port for the Cockpit HTTP/WebSocket server.
pub const DEFAULT_PORT: u16 = 8080;

/// The bundled Cockpit single-page application (HTML + CSS + JS).
const COCKPIT_HTML: &str = include_str!("cockpit.html");

/// Largest header block accepted before giving up on a request.
const MAX_HEADER_BYTES: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// CockpitServer
// ---------------------------------------------------------------------------

/// HTTP + WebSocket server bridging a single robot session to any number of
/// connected browser tabs.
///
/// Unlike the Kernel/ReAct core, which drives one snapshot per `run_pass`
/// call with single-writer discipline, the cockpit fronts several
/// connections at once; the live session lives behind a `tokio::sync::Mutex`
/// here so concurrent HTTP requests serialize onto it the same way the CLI's
/// own REPL loop does sequentially.
pub struct CockpitServer {
    orchestrator: Arc<Orchestrator>,
    world: Arc<SimWorld>,
    session: Arc<Mutex<Option<BrainState>>>,
    port: u16,
}

impl CockpitServer {
    /// Create a server backed by `orchestrator` and `world` on the
    /// [`DEFAULT_PORT`]. `world` is the same handle given to the
    /// orchestrator's `WorldSource`, so obstacles added here are visible to
    /// the very next Kernel pass.
    pub fn new(orchestrator: Arc<Orchestrator>, world: Arc<SimWorld>) -> Self {
        Self { orchestrator, world, session: Arc::new(Mutex::new(None)), port: DEFAULT_PORT }
    }

    /// Override the listening port (builder-style).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Return the configured port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Start the server. Runs until the listener errors or the process
    /// exits; intended to be spawned as its own task alongside a CLI REPL or
    /// the background simulation loop.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Serialization`] if the TCP listener cannot bind.
    pub async fn run(self) -> Result<(), CoreError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| CoreError::Serialization(format!("[cortex-cockpit] bind error on {addr}: {e}")))?;

        tracing::info!(port = self.port, "cortex-cockpit listening");

        let orchestrator = self.orchestrator;
        let world = self.world;
        let session = self.session;

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let orchestrator = Arc::clone(&orchestrator);
                    let world = Arc::clone(&world);
                    let session = Arc::clone(&session);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, orchestrator, world, session).await {
                            tracing::warn!(%peer, error = %e, "cortex-cockpit client error");
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "cortex-cockpit accept error");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Session handling
// ---------------------------------------------------------------------------

/// Return the live session, creating one (and seeding the skill registry)
/// on first use.
async fn ensure_session(orchestrator: &Orchestrator, session: &Mutex<Option<BrainState>>) -> BrainState {
    let mut guard = session.lock().await;
    if guard.is_none() {
        *guard = Some(orchestrator.new_session().await);
    }
    guard.as_ref().expect("just initialized").clone()
}

/// Inject `utterance` into the live session and run one Kernel+ReAct pass,
/// storing and returning the resulting snapshot. `run_pass` itself
/// broadcasts a [`SnapshotEvent`] per completed stage via the orchestrator's
/// bus, so callers need not broadcast again.
async fn run_utterance(
    orchestrator: &Orchestrator,
    session: &Mutex<Option<BrainState>>,
    utterance: &str,
) -> BrainState {
    let mut state = ensure_session(orchestrator, session).await;
    state.hci.utterance = utterance.to_string();
    let cancel = AtomicBool::new(false);
    let next = orchestrator.run_pass(state, &cancel).await;
    *session.lock().await = Some(next.clone());
    next
}

fn pass_result_json(state: &BrainState) -> Value {
    json!({
        "session_id": state.session_id,
        "mode": format!("{:?}", state.tasks.mode),
        "trace": state.trace.lines.iter().rev().take(5).rev().collect::<Vec<_>>(),
        "decision": state.react.decision,
        "to_speak": state.react.proposed_ops.as_ref().map(|o| o.to_speak.clone()).unwrap_or_default(),
    })
}

// ---------------------------------------------------------------------------
// Per-connection handler
// ---------------------------------------------------------------------------

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    orchestrator: Arc<Orchestrator>,
    world: Arc<SimWorld>,
    session: Arc<Mutex<Option<BrainState>>>,
) -> Result<(), CoreError> {
    // Peek at the request so tungstenite's own handshaker, which reads the
    // stream from scratch, still sees the full HTTP request on WS upgrades.
    let mut buf = [0u8; 1024];
    let n = stream
        .peek(&mut buf)
        .await
        .map_err(|e| CoreError::Serialization(format!("peek error from {peer}: {e}")))?;

    let header_preview = String::from_utf8_lossy(&buf[..n]);
    let is_ws_upgrade = header_preview
        .lines()
        .any(|line| line.to_lowercase().starts_with("upgrade:") && line.to_lowercase().contains("websocket"));

    if is_ws_upgrade {
        handle_ws(stream, peer, orchestrator, world, session).await
    } else {
        let (method, path, body) = read_http_request(&mut stream).await?;
        let (status, content_type, payload) =
            route_http(&method, &path, &body, orchestrator.as_ref(), world.as_ref(), session.as_ref()).await;
        write_http_response(&mut stream, status, content_type, &payload).await
    }
}

// ---------------------------------------------------------------------------
// Plain HTTP: minimal request/response plumbing
// ---------------------------------------------------------------------------

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Read one HTTP request off `stream`: request line, headers up to the
/// blank line, and the body (sized by `Content-Length`). No chunked
/// transfer encoding, no keep-alive — one request per connection, matching
/// the teacher's `serve_html`'s `Connection: close` contract.
async fn read_http_request(stream: &mut TcpStream) -> Result<(String, String, Vec<u8>), CoreError> {
    let mut raw = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| CoreError::Serialization(format!("HTTP read error: {e}")))?;
        if n == 0 {
            return Err(CoreError::Serialization("connection closed before headers completed".to_string()));
        }
        raw.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_subslice(&raw, b"\r\n\r\n") {
            break pos + 4;
        }
        if raw.len() > MAX_HEADER_BYTES {
            return Err(CoreError::Serialization("request header too large".to_string()));
        }
    };

    let header_text = String::from_utf8_lossy(&raw[..header_end]).to_string();
    let mut lines = header_text.lines();
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("GET").to_string();
    let path = parts.next().unwrap_or("/").to_string();

    let content_length = lines
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length").then(|| value.trim().parse::<usize>().ok())?
        })
        .unwrap_or(0);

    let mut body = raw[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| CoreError::Serialization(format!("HTTP body read error: {e}")))?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Ok((method, path, body))
}

async fn write_http_response(
    stream: &mut TcpStream,
    status: &str,
    content_type: &str,
    body: &str,
) -> Result<(), CoreError> {
    let response = format!(
        "HTTP/1.1 {status}\r\n\
         Content-Type: {content_type}\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len(),
    );
    stream
        .write_all(response.as_bytes())
        .await
        .map_err(|e| CoreError::Serialization(format!("HTTP write error: {e}")))
}

/// Route one parsed HTTP request to a handler, returning `(status line,
/// content type, body)`.
async fn route_http(
    method: &str,
    path: &str,
    body: &[u8],
    orchestrator: &Orchestrator,
    world: &SimWorld,
    session: &Mutex<Option<BrainState>>,
) -> (&'static str, &'static str, String) {
    match (method, path) {
        ("POST", "/chat") | ("POST", "/command") => {
            let text = body_text(body, "text").unwrap_or_default();
            let state = run_utterance(orchestrator, session, &text).await;
            ("200 OK", "application/json", pass_result_json(&state).to_string())
        }
        ("POST", "/stop") => {
            let state = run_utterance(orchestrator, session, "stop").await;
            ("200 OK", "application/json", pass_result_json(&state).to_string())
        }
        ("POST", "/pause") => {
            let state = run_utterance(orchestrator, session, "pause").await;
            ("200 OK", "application/json", pass_result_json(&state).to_string())
        }
        ("POST", "/resume") => {
            let state = run_utterance(orchestrator, session, "resume").await;
            ("200 OK", "application/json", pass_result_json(&state).to_string())
        }
        ("POST", "/obstacles") => match serde_json::from_slice::<Value>(body) {
            Ok(json) => {
                let x = json.get("x").and_then(Value::as_f64).unwrap_or(0.0);
                let y = json.get("y").and_then(Value::as_f64).unwrap_or(0.0);
                let w = json.get("w").and_then(Value::as_f64).unwrap_or(0.5);
                let h = json.get("h").and_then(Value::as_f64).unwrap_or(0.5);
                world.add_obstacle(x, y, w, h).await;
                broadcast_world_change(orchestrator, session, "obstacle_added").await;
                ("200 OK", "application/json", json!({"ok": true}).to_string())
            }
            Err(e) => ("400 Bad Request", "application/json", json!({"error": e.to_string()}).to_string()),
        },
        ("POST", "/obstacles/clear") => {
            world.clear_obstacles().await;
            broadcast_world_change(orchestrator, session, "obstacles_cleared").await;
            ("200 OK", "application/json", json!({"ok": true}).to_string())
        }
        ("GET", "/") | ("GET", "/index.html") => ("200 OK", "text/html; charset=utf-8", COCKPIT_HTML.to_string()),
        _ => ("404 Not Found", "text/plain", "not found".to_string()),
    }
}

fn body_text(body: &[u8], field: &str) -> Option<String> {
    serde_json::from_slice::<Value>(body)
        .ok()?
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Broadcast the current session snapshot tagged with `reason` — used for
/// world mutations that don't go through a Kernel/ReAct pass but still need
/// to reach connected browsers.
async fn broadcast_world_change(orchestrator: &Orchestrator, session: &Mutex<Option<BrainState>>, reason: &str) {
    let state = ensure_session(orchestrator, session).await;
    orchestrator.bus().publish(SnapshotEvent::new(reason, state));
}

// ---------------------------------------------------------------------------
// WebSocket: bidirectional EventBus bridge
// ---------------------------------------------------------------------------

async fn handle_ws(
    stream: TcpStream,
    peer: SocketAddr,
    orchestrator: Arc<Orchestrator>,
    world: Arc<SimWorld>,
    session: Arc<Mutex<Option<BrainState>>>,
) -> Result<(), CoreError> {
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| CoreError::Serialization(format!("[cortex-cockpit] WS handshake from {peer}: {e}")))?;

    let session_id = ensure_session(&orchestrator, &session).await.session_id;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let mut bus_rx = orchestrator.bus().subscribe_session(session_id);

    loop {
        tokio::select! {
            event = bus_rx.recv() => {
                let Some(event) = event else { break };
                match serde_json::to_string(&event) {
                    Ok(json) => {
                        if ws_tx.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "cortex-cockpit serialization error"),
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_upstream_message(text.as_str(), &orchestrator, &world, &session).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Upstream WebSocket message parser
// ---------------------------------------------------------------------------

/// Parse an incoming WebSocket text message from the Cockpit browser.
///
/// Recognised `type`s:
///
/// | `type` | Effect |
/// |---|---|
/// | `utterance` | Inject `text` and run one pass |
/// | `obstacle` | Add an obstacle at `x,y,w,h` and broadcast |
/// | `obstacle_clear` | Clear the obstacle list and broadcast |
///
/// Unrecognised or malformed messages are silently ignored.
async fn handle_upstream_message(
    text: &str,
    orchestrator: &Orchestrator,
    world: &SimWorld,
    session: &Mutex<Option<BrainState>>,
) {
    let Ok(json) = serde_json::from_str::<Value>(text) else { return };
    let msg_type = json.get("type").and_then(Value::as_str).unwrap_or("");

    match msg_type {
        "utterance" => {
            if let Some(text) = json.get("text").and_then(Value::as_str) {
                run_utterance(orchestrator, session, text).await;
            }
        }
        "obstacle" => {
            let x = json.get("x").and_then(Value::as_f64).unwrap_or(0.0);
            let y = json.get("y").and_then(Value::as_f64).unwrap_or(0.0);
            let w = json.get("w").and_then(Value::as_f64).unwrap_or(0.5);
            let h = json.get("h").and_then(Value::as_f64).unwrap_or(0.5);
            world.add_obstacle(x, y, w, h).await;
            broadcast_world_change(orchestrator, session, "obstacle_added").await;
        }
        "obstacle_clear" => {
            world.clear_obstacles().await;
            broadcast_world_change(orchestrator, session, "obstacles_cleared").await;
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
