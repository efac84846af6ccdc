//! WebSocket relay of round events
//!
//! Each client gets its own broadcast receiver; a lagging client skips the
//! events it missed rather than slowing the engine down.

use super::handlers::AppState;
use super::models::RoundResponse;
use crate::events::{BroadcastHub, RoundEvent};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Which event kinds a client wants
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WsSubscription {
    #[serde(default = "default_true")]
    pub balls: bool,
    #[serde(default = "default_true")]
    pub heartbeats: bool,
}

fn default_true() -> bool {
    true
}

impl Default for WsSubscription {
    fn default() -> Self {
        Self {
            balls: true,
            heartbeats: true,
        }
    }
}

impl WsSubscription {
    /// Phase changes and round results always go out.
    pub fn wants(&self, event: &RoundEvent) -> bool {
        match event {
            RoundEvent::BallRevealed { .. } => self.balls,
            RoundEvent::Heartbeat { .. } => self.heartbeats,
            RoundEvent::RoundPhaseChanged { .. } | RoundEvent::RoundFinished { .. } => true,
        }
    }
}

pub struct WebSocketManager {
    hub: BroadcastHub,
    client_count: AtomicU64,
}

impl WebSocketManager {
    pub fn new(hub: BroadcastHub) -> Self {
        Self {
            hub,
            client_count: AtomicU64::new(0),
        }
    }

    pub fn client_count(&self) -> u64 {
        self.client_count.load(Ordering::SeqCst)
    }

    pub fn handle_upgrade(
        self: Arc<Self>,
        ws: WebSocketUpgrade,
        subscription: WsSubscription,
        welcome: Option<RoundEvent>,
    ) -> Response {
        ws.on_upgrade(move |socket| async move { self.handle_connection(socket, subscription, welcome).await })
    }

    async fn handle_connection(&self, socket: WebSocket, subscription: WsSubscription, welcome: Option<RoundEvent>) {
        let client_id = generate_client_id();
        let clients = self.client_count.fetch_add(1, Ordering::SeqCst) + 1;
        info!(client_id = %client_id, clients, "WebSocket client connected");

        let (mut sender, mut receiver) = socket.split();
        let mut rx = self.hub.subscribe();

        if let Some(event) = welcome {
            if let Ok(text) = serde_json::to_string(&event) {
                if sender.send(Message::Text(text)).await.is_err() {
                    self.disconnect(&client_id);
                    return;
                }
            }
        }

        let recv_id = client_id.clone();
        let mut receive_task = tokio::spawn(async move {
            while let Some(msg) = receiver.next().await {
                match msg {
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(client_id = %recv_id, error = %e, "WebSocket receive error");
                        break;
                    }
                }
            }
        });

        let send_id = client_id.clone();
        let mut send_task = tokio::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(client_id = %send_id, skipped, "WebSocket client lagging");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                if !subscription.wants(&event) {
                    continue;
                }
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "Failed to serialize round event");
                        continue;
                    }
                };
                if sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        });

        tokio::select! {
            _ = &mut receive_task => send_task.abort(),
            _ = &mut send_task => receive_task.abort(),
        }
        self.disconnect(&client_id);
    }

    fn disconnect(&self, client_id: &str) {
        let remaining = self.client_count.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        info!(client_id, remaining, "WebSocket client disconnected");
    }
}

/// GET /ws?balls=true&heartbeats=true
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(subscription): Query<WsSubscription>,
    State(state): State<Arc<AppState>>,
) -> Response {
    // Greet with the current phase so late joiners can render immediately
    let welcome = match state.store.load_round().await {
        Ok(Some(round)) => {
            let view = RoundResponse::from_round(&round, state.clock.now_ms());
            Some(RoundEvent::RoundPhaseChanged {
                round_id: view.round_id,
                status: view.status,
                time_remaining_ms: view.time_remaining_ms,
            })
        }
        _ => None,
    };
    state.websocket.clone().handle_upgrade(ws, subscription, welcome)
}

fn generate_client_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("ws_{}", COUNTER.fetch_add(1, Ordering::SeqCst))
}
