//! Dashboard and debug WebSocket connections.

use std::net::SocketAddr;

use {
    axum::extract::ws::{Message, WebSocket},
    futures::{SinkExt, stream::StreamExt},
    serde::Deserialize,
    tokio::sync::mpsc,
    tracing::{debug, info, warn},
};

use {
    chatrelay_bus::{Event, EventBus, SubscriptionId, Topic},
    chatrelay_protocol::bridge::debug_text,
};

/// A dashboard's bus subscription. Unsubscribes when dropped, including when
/// the upgrade never completes.
pub struct DashboardFeed {
    bus: EventBus,
    id: SubscriptionId,
    events: mpsc::UnboundedReceiver<Event>,
}

impl DashboardFeed {
    /// Subscribe before the upgrade response is sent, so every event
    /// published after the client's handshake completes reaches it.
    pub fn subscribe(bus: &EventBus) -> chatrelay_bus::Result<Self> {
        let (id, events) = bus.subscribe_channel(Topic::All)?;
        Ok(Self {
            bus: bus.clone(),
            id,
            events,
        })
    }
}

impl Drop for DashboardFeed {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
    }
}

/// Push status and chat events to one dashboard until it disconnects.
///
/// Each connection is its own bus subscription, so a dashboard sees events in
/// publish order. Inbound frames other than Close are ignored.
pub async fn handle_dashboard(socket: WebSocket, mut feed: DashboardFeed, remote_addr: SocketAddr) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, remote = %remote_addr, "dashboard: connected");

    let (mut ws_tx, mut ws_rx) = socket.split();
    loop {
        tokio::select! {
            event = feed.events.recv() => {
                let Some(event) = event else { break };
                if !matches!(event, Event::Status(_) | Event::Chat(_)) {
                    continue;
                }
                let frame = match serde_json::to_string(&event) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(conn_id = %conn_id, error = %e, "dashboard: failed to encode event");
                        continue;
                    },
                };
                if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                    debug!(conn_id = %conn_id, "dashboard: write failed");
                    break;
                }
            },
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {},
                Some(Err(e)) => {
                    debug!(conn_id = %conn_id, error = %e, "dashboard: read error");
                    break;
                },
            },
        }
    }

    drop(feed);
    info!(conn_id = %conn_id, "dashboard: disconnected");
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum DebugFrame {
    Debug {
        #[serde(default)]
        message: serde_json::Value,
    },
}

/// Log `{"type":"debug","message":...}` frames from a developer client.
pub async fn handle_debug(mut socket: WebSocket, remote_addr: SocketAddr) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, remote = %remote_addr, "debug: connected");

    while let Some(msg) = socket.next().await {
        let text = match msg {
            Ok(Message::Text(t)) => t.to_string(),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(conn_id = %conn_id, error = %e, "debug: read error");
                break;
            },
        };
        match serde_json::from_str::<DebugFrame>(&text) {
            Ok(DebugFrame::Debug { message }) => {
                info!(conn_id = %conn_id, message = %debug_text(&message), "debug message");
            },
            Err(e) => {
                let preview: String = text.chars().take(120).collect();
                warn!(conn_id = %conn_id, error = %e, frame = %preview, "debug: invalid frame");
            },
        }
    }
    info!(conn_id = %conn_id, "debug: disconnected");
}
