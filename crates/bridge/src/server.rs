use std::{net::SocketAddr, time::Duration};

use {
    axum::{
        Router,
        extract::{
            ConnectInfo, State, WebSocketUpgrade,
            ws::{Message, WebSocket},
        },
        response::IntoResponse,
        routing::get,
    },
    futures::{SinkExt, stream::StreamExt},
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use {
    chatrelay_channels::StatusReporter,
    chatrelay_protocol::{
        ChatEvent, Platform,
        bridge::{
            FrameError, InboundFrame, MAX_MESSAGE_BYTES, OutboundFrame, debug_text, parse_inbound,
        },
    },
};

use crate::hub::HubHandle;

/// How long a closing connection gets to flush its writer.
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub(crate) struct BridgeState {
    pub hub: HubHandle,
    pub reporter: StatusReporter,
    pub default_channel: String,
    pub cancel: CancellationToken,
}

pub(crate) fn build_bridge_app(state: BridgeState) -> Router {
    Router::new()
        .route("/", get(ws_upgrade_handler))
        .route("/ws", get(ws_upgrade_handler))
        .with_state(state)
}

async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<BridgeState>,
) -> impl IntoResponse {
    ws.max_message_size(MAX_MESSAGE_BYTES)
        .on_upgrade(move |socket| handle_connection(socket, state, addr))
}

/// One extension peer: register with the hub, read frames until the peer
/// leaves or the adapter stops, then unregister.
async fn handle_connection(socket: WebSocket, state: BridgeState, remote_addr: SocketAddr) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, remote = %remote_addr, "bridge: new connection");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (client_tx, mut client_rx) = mpsc::unbounded_channel::<String>();

    let write_conn_id = conn_id.clone();
    let mut write_handle = tokio::spawn(async move {
        while let Some(msg) = client_rx.recv().await {
            if ws_tx.send(Message::Text(msg.into())).await.is_err() {
                debug!(conn_id = %write_conn_id, "bridge: write loop closed");
                return;
            }
        }
        let _ = ws_tx.send(Message::Close(None)).await;
    });

    if !state.hub.register(&conn_id, client_tx.clone()) {
        warn!(conn_id = %conn_id, "bridge: hub stopped, refusing connection");
        drop(client_tx);
        write_handle.abort();
        return;
    }

    loop {
        let msg = tokio::select! {
            biased;
            () = state.cancel.cancelled() => break,
            msg = ws_rx.next() => msg,
        };
        let text = match msg {
            Some(Ok(Message::Text(t))) => t.to_string(),
            Some(Ok(Message::Binary(b))) => {
                warn!(conn_id = %conn_id, size = b.len(), "bridge: ignoring binary frame");
                continue;
            },
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                debug!(conn_id = %conn_id, error = %e, "bridge: read error");
                break;
            },
        };
        handle_frame(&state, &conn_id, &text, &client_tx);
    }

    state.hub.unregister(&conn_id);
    drop(client_tx);
    if tokio::time::timeout(WRITER_FLUSH_TIMEOUT, &mut write_handle)
        .await
        .is_err()
    {
        write_handle.abort();
    }
    info!(conn_id = %conn_id, "bridge: connection closed");
}

fn handle_frame(
    state: &BridgeState,
    conn_id: &str,
    text: &str,
    client_tx: &mpsc::UnboundedSender<String>,
) {
    let frame = match parse_inbound(text) {
        Ok(frame) => frame,
        Err(e) => {
            log_invalid(conn_id, text, &e);
            return;
        },
    };

    match frame {
        InboundFrame::ChatMessage { channel, data } => {
            let channel = channel
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| state.default_channel.clone());
            for chat in data.into_vec() {
                state.reporter.chat(ChatEvent::new(
                    Platform::Bridge,
                    channel.as_str(),
                    chat.username,
                    chat.message,
                ));
            }
        },
        InboundFrame::QueryStatus => {
            let _ = client_tx.send(OutboundFrame::Pong.to_json());
        },
        InboundFrame::Debug { message } => {
            debug!(conn_id, message = %debug_text(&message), "bridge: peer debug");
        },
    }
}

fn log_invalid(conn_id: &str, text: &str, error: &FrameError) {
    let preview: String = text.chars().take(120).collect();
    warn!(conn_id, error = %error, frame = %preview, "bridge: invalid frame");
}
