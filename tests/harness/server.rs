//! Fake particle-simulation server for integration testing.
//!
//! Speaks the real wire contract over axum WebSockets: `getSnapshot` gets a
//! `snapshot`, `createParticle` adds a particle after a configurable delay,
//! anything it does not understand gets an `error`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use wsprobe::Config;

const SPECIES: [&str; 3] = ["proton", "neutron", "electron"];

/// Behavior knobs for [`SimServer`].
#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    /// Delay before a created particle shows up in snapshots.
    pub creation_delay: Duration,
    /// Read requests but never answer.
    pub silent: bool,
    /// Push an unsolicited snapshot at this interval.
    pub broadcast_every: Option<Duration>,
    /// Close the connection after this many requests.
    pub close_after: Option<usize>,
}

struct SimState {
    options: ServerOptions,
    particles: Mutex<Vec<Value>>,
    received: Mutex<Vec<String>>,
}

impl SimState {
    async fn snapshot(&self) -> Value {
        let particles = self.particles.lock().await.clone();
        json!({
            "type": "snapshot",
            "payload": {
                "particles": particles,
                "simulationTime": 0.016 * particles.len() as f64,
                "metrics": {
                    "totalEnergy": 938.272 * particles.len() as f64,
                    "particleCount": particles.len(),
                },
            },
        })
    }
}

/// A running fake server bound to a random local port.
pub struct SimServer {
    addr: SocketAddr,
    state: Arc<SimState>,
    handle: JoinHandle<()>,
}

impl SimServer {
    pub async fn spawn() -> Self {
        Self::spawn_with(ServerOptions::default()).await
    }

    pub async fn spawn_with(options: ServerOptions) -> Self {
        let state = Arc::new(SimState {
            options,
            particles: Mutex::new(Vec::new()),
            received: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/ws", get(ws_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Harness config pointed at this server with short waits.
    pub fn config(&self) -> Config {
        Config::default()
            .with_endpoint(self.url())
            .with_receive_timeout(Duration::from_millis(500))
            .with_settle(Duration::from_millis(50))
    }

    pub async fn particle_count(&self) -> usize {
        self.state.particles.lock().await.len()
    }

    /// Envelope types received so far, across all connections.
    pub async fn received(&self) -> Vec<String> {
        self.state.received.lock().await.clone()
    }

    pub fn shutdown(self) {
        self.handle.abort();
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<SimState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<SimState>) {
    let mut ticker = state.options.broadcast_every.map(tokio::time::interval);
    let mut handled = 0usize;

    loop {
        let incoming = match ticker.as_mut() {
            Some(ticker) => tokio::select! {
                msg = socket.recv() => msg,
                _ = ticker.tick() => {
                    let snapshot = state.snapshot().await;
                    if send_json(&mut socket, &snapshot).await.is_err() {
                        return;
                    }
                    continue;
                }
            },
            None => socket.recv().await,
        };

        let text = match incoming {
            Some(Ok(Message::Text(text))) => text.to_string(),
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
            Some(Ok(_)) => continue,
        };

        let Some(reply) = handle_request(&state, &text).await else {
            continue;
        };
        if send_json(&mut socket, &reply).await.is_err() {
            return;
        }

        handled += 1;
        if state.options.close_after == Some(handled) {
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    }
}

async fn handle_request(state: &Arc<SimState>, text: &str) -> Option<Value> {
    let request: Value = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(_) => return Some(error("Invalid JSON")),
    };
    let kind = request["type"].as_str().unwrap_or_default().to_string();
    state.received.lock().await.push(kind.clone());

    if state.options.silent {
        return None;
    }

    match kind.as_str() {
        "getSnapshot" => Some(state.snapshot().await),
        "createParticle" => {
            let payload = &request["payload"];
            let species = payload["type"].as_str().unwrap_or_default();
            if !SPECIES.contains(&species) {
                return Some(error(&format!("Unknown particle type: {}", species)));
            }

            let particle = json!({
                "type": species,
                "position": payload["position"].clone(),
                "velocity": {"x": 0.0, "y": 0.0, "z": 0.0},
            });
            let delay = state.options.creation_delay;
            if delay.is_zero() {
                state.particles.lock().await.push(particle);
            } else {
                let state = state.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    state.particles.lock().await.push(particle);
                });
            }
            Some(json!({"type": "particleCreated", "payload": {"type": species}}))
        }
        other => Some(error(&format!("Unknown message type: {}", other))),
    }
}

fn error(message: &str) -> Value {
    json!({"type": "error", "payload": {"message": message}})
}

async fn send_json(socket: &mut WebSocket, value: &Value) -> Result<(), axum::Error> {
    socket.send(Message::Text(value.to_string().into())).await
}
