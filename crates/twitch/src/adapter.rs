use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    futures::{SinkExt, StreamExt},
    tokio::{
        sync::{mpsc, watch},
        time::Instant,
    },
    tokio_tungstenite::{connect_async, tungstenite::Message},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use {
    chatrelay_channels::{
        AdapterContext, Backoff, Error, PlatformAdapter, Result, StatusReporter, run_until_stopped,
    },
    chatrelay_protocol::{ChatEvent, Platform},
};

use crate::{config::TwitchConfig, irc::IrcMessage};

/// Twitch chat over IRC-on-WebSocket.
pub struct TwitchAdapter {
    config: TwitchConfig,
    reporter: StatusReporter,
    backoff: Backoff,
    cancel: CancellationToken,
    /// Present while a session is connected.
    outbound: watch::Sender<Option<mpsc::UnboundedSender<String>>>,
}

impl TwitchAdapter {
    pub fn new(config: TwitchConfig, reporter: StatusReporter, backoff: Backoff) -> Self {
        Self {
            config,
            reporter,
            backoff,
            cancel: CancellationToken::new(),
            outbound: watch::Sender::new(None),
        }
    }

    pub fn from_context(ctx: &AdapterContext) -> Result<Self> {
        let config = ctx.settings.platform_config(Platform::Twitch)?;
        Ok(Self::new(
            config,
            ctx.reporter(Platform::Twitch),
            ctx.backoff(),
        ))
    }

    /// Factory entry point for the adapter registry.
    pub fn build(ctx: &AdapterContext) -> Result<Arc<dyn PlatformAdapter>> {
        Ok(Arc::new(Self::from_context(ctx)?))
    }

    async fn session(&self) -> Result<()> {
        let url = self.config.url.as_str();
        debug!(%url, "connecting to twitch chat");
        let connected = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Ok(()),
            r = connect_async(url) => r,
        };
        let (ws_stream, _response) =
            connected.map_err(|e| Error::external(format!("connect {url}"), e))?;
        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        for line in self.config.handshake_lines() {
            ws_tx
                .send(Message::Text(line.into()))
                .await
                .map_err(|e| Error::external("handshake", e))?;
        }

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        self.outbound.send_replace(Some(out_tx));

        // Twitch pings roughly every five minutes; silence past the idle
        // window means the socket is half-open.
        let idle = Duration::from_millis(self.config.idle_timeout_ms);
        let mut deadline = Instant::now() + idle;
        let result = loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break Ok(());
                },
                () = tokio::time::sleep_until(deadline) => {
                    break Err(Error::connection(format!(
                        "no data from server for {}ms",
                        idle.as_millis()
                    )));
                },
                msg = ws_rx.next() => {
                    deadline = Instant::now() + idle;
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let replies = match self.handle_payload(&text) {
                                Ok(replies) => replies,
                                Err(e) => break Err(e),
                            };
                            let mut write_error = None;
                            for reply in replies {
                                if let Err(e) = ws_tx.send(Message::Text(reply.into())).await {
                                    write_error = Some(e);
                                    break;
                                }
                            }
                            if let Some(e) = write_error {
                                break Err(Error::external("write", e));
                            }
                        },
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = ws_tx.send(Message::Pong(data)).await {
                                break Err(Error::external("pong", e));
                            }
                        },
                        Some(Ok(Message::Close(_))) | None => break Ok(()),
                        Some(Ok(_)) => {},
                        Some(Err(e)) => break Err(Error::external("read", e)),
                    }
                },
                Some(text) = out_rx.recv() => {
                    if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                        break Err(Error::external("write", e));
                    }
                },
            }
        };

        self.outbound.send_replace(None);
        result
    }

    /// Handle one WebSocket text payload (one or more IRC lines). Returns the
    /// lines to write back.
    fn handle_payload(&self, payload: &str) -> Result<Vec<String>> {
        let mut replies = Vec::new();
        for line in payload.split("\r\n").filter(|l| !l.is_empty()) {
            let Some(msg) = IrcMessage::parse(line) else {
                warn!(line, "unparseable irc line");
                continue;
            };
            match msg.command.as_str() {
                "PING" => {
                    replies.push(format!("PONG :{}", msg.trailing().unwrap_or("tmi.twitch.tv")));
                },
                "001" => {
                    info!(nick = %self.config.nick, "twitch chat connected");
                    self.reporter.connected();
                },
                "PRIVMSG" => {
                    if let Some(event) = chat_event(&msg) {
                        self.reporter.chat(event);
                    }
                },
                "RECONNECT" => return Err(Error::connection("server requested reconnect")),
                "NOTICE" => {
                    let text = msg.trailing().unwrap_or_default();
                    if text.contains("Login authentication failed")
                        || text.contains("Improperly formatted auth")
                    {
                        return Err(Error::protocol(text));
                    }
                    debug!(notice = text, "twitch notice");
                },
                _ => {},
            }
        }
        Ok(replies)
    }
}

/// Translate a PRIVMSG into a chat event.
fn chat_event(msg: &IrcMessage) -> Option<ChatEvent> {
    let channel = msg.param(0)?.trim_start_matches('#');
    let user = msg.tag("display-name").or_else(|| msg.nick())?;
    let text = if msg.params.len() > 1 {
        msg.trailing().unwrap_or_default()
    } else {
        ""
    };
    let mut event = ChatEvent::new(Platform::Twitch, channel, user, text);
    if let Some(ts) = msg
        .tag("tmi-sent-ts")
        .and_then(|t| t.parse::<i64>().ok())
        .and_then(DateTime::<Utc>::from_timestamp_millis)
    {
        event = event.at(ts);
    }
    Some(event)
}

#[async_trait]
impl PlatformAdapter for TwitchAdapter {
    fn platform(&self) -> Platform {
        Platform::Twitch
    }

    fn check_config(&self) -> Result<()> {
        let missing = self.config.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::missing_config(Platform::Twitch, missing))
        }
    }

    async fn run(&self) {
        run_until_stopped(
            &self.reporter,
            self.backoff,
            &self.cancel,
            self.check_config(),
            || self.session(),
        )
        .await;
    }

    async fn send(&self, text: &str) {
        let Some(channel) = self.config.channel_names().into_iter().next() else {
            warn!("twitch send dropped, no channel configured");
            return;
        };
        let line = format!("PRIVMSG #{channel} :{}", text.replace(['\r', '\n'], " "));
        let outbound = self.outbound.borrow().clone();
        match outbound {
            Some(tx) if tx.send(line).is_ok() => {},
            _ => warn!("twitch send dropped, not connected"),
        }
    }

    fn stop(&self) {
        self.cancel.cancel();
    }
}
