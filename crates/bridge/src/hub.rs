//! Connection hub.
//!
//! One task owns the set of connected peers. Connections register and
//! unregister through [`HubHandle`]; chat events from the bus and
//! [`send`](crate::BridgeAdapter) calls are fanned out to every peer. A peer
//! whose outbound channel is gone is pruned on the next broadcast.

use std::collections::HashMap;

use {
    chatrelay_bus::{Event, Topic},
    chatrelay_channels::StatusReporter,
    chatrelay_protocol::{
        ChatEvent, Platform,
        bridge::{BridgeChat, OutboundFrame},
    },
    tokio::{sync::mpsc, task::JoinHandle},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

enum HubCommand {
    Register {
        conn_id: String,
        tx: mpsc::UnboundedSender<String>,
    },
    Unregister(String),
    Broadcast(String),
}

/// Cloneable handle to the hub task.
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<HubCommand>,
}

impl std::fmt::Debug for HubCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Register { conn_id, .. } => write!(f, "Register({conn_id})"),
            Self::Unregister(conn_id) => write!(f, "Unregister({conn_id})"),
            Self::Broadcast(frame) => write!(f, "Broadcast({} bytes)", frame.len()),
        }
    }
}

impl HubHandle {
    /// Add a peer. Frames for it are pushed into `tx`.
    pub fn register(&self, conn_id: &str, tx: mpsc::UnboundedSender<String>) -> bool {
        self.tx
            .send(HubCommand::Register {
                conn_id: conn_id.to_string(),
                tx,
            })
            .is_ok()
    }

    pub fn unregister(&self, conn_id: &str) {
        if self
            .tx
            .send(HubCommand::Unregister(conn_id.to_string()))
            .is_err()
        {
            debug!(conn_id, "bridge: hub already stopped");
        }
    }

    /// Queue `frame` for every connected peer. Returns `false` when the hub
    /// has stopped.
    pub fn broadcast(&self, frame: &OutboundFrame) -> bool {
        self.tx.send(HubCommand::Broadcast(frame.to_json())).is_ok()
    }
}

/// Spawn the hub.
///
/// `listening` is the status message reported whenever no peer is attached.
/// The hub stops when `cancel` fires; dropping every [`HubHandle`] also
/// stops it.
pub fn spawn(
    reporter: StatusReporter,
    listening: String,
    forward: Vec<Platform>,
    cancel: CancellationToken,
) -> (HubHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let hub = Hub {
        reporter,
        listening,
        forward,
        peers: HashMap::new(),
    };
    let task = tokio::spawn(hub.run(rx, cancel));
    (HubHandle { tx }, task)
}

struct Hub {
    reporter: StatusReporter,
    listening: String,
    forward: Vec<Platform>,
    peers: HashMap<String, mpsc::UnboundedSender<String>>,
}

impl Hub {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<HubCommand>, cancel: CancellationToken) {
        let bus = self.reporter.bus().clone();
        let (subscription, mut chat_rx) = match bus.subscribe_channel(Topic::Chat) {
            Ok((id, rx)) => (Some(id), rx),
            Err(e) => {
                warn!(error = %e, "bridge: cannot subscribe to chat events, forwarding disabled");
                (None, mpsc::unbounded_channel().1)
            },
        };

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.apply(cmd),
                    None => break,
                },
                Some(event) = chat_rx.recv() => {
                    if let Event::Chat(chat) = event {
                        self.forward(chat);
                    }
                },
            }
        }

        if let Some(id) = subscription {
            bus.unsubscribe(id);
        }
        debug!(peers = self.peers.len(), "bridge: hub stopped");
        self.peers.clear();
    }

    fn apply(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Register { conn_id, tx } => {
                self.peers.insert(conn_id.clone(), tx);
                info!(%conn_id, peers = self.peers.len(), "bridge: peer attached");
                if self.peers.len() == 1 {
                    self.reporter.connected();
                }
            },
            HubCommand::Unregister(conn_id) => {
                if self.peers.remove(&conn_id).is_some() {
                    info!(%conn_id, peers = self.peers.len(), "bridge: peer detached");
                    if self.peers.is_empty() {
                        self.reporter.waiting(self.listening.clone());
                    }
                }
            },
            HubCommand::Broadcast(frame) => self.broadcast(&frame),
        }
    }

    fn forward(&mut self, chat: ChatEvent) {
        if chat.platform == Platform::Bridge || !self.forward.contains(&chat.platform) {
            return;
        }
        let frame = OutboundFrame::ChatMessage {
            platform: Some(chat.platform.to_string()),
            channel: Some(chat.channel),
            data: BridgeChat {
                username: chat.user,
                message: chat.text,
            },
        };
        self.broadcast(&frame.to_json());
    }

    fn broadcast(&mut self, frame: &str) {
        if self.peers.is_empty() {
            return;
        }
        self.peers.retain(|conn_id, tx| {
            let alive = tx.send(frame.to_string()).is_ok();
            if !alive {
                warn!(%conn_id, "bridge: dropping unreachable peer");
            }
            alive
        });
        if self.peers.is_empty() {
            self.reporter.waiting(self.listening.clone());
        }
    }
}
