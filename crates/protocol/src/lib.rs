//! Canonical event types shared by every chatrelay crate.
//!
//! Adapters translate native platform payloads into [`ChatEvent`]s and report
//! their connection state as [`StatusEvent`]s. Operators drive the service
//! lifecycle with [`ControlCommand`]s. All of them travel through the event
//! bus wrapped in the [`Event`] sum type; subscribers select what they want
//! with a [`Topic`].
//!
//! The [`bridge`] module holds the JSON frames spoken with the browser
//! extension peer.

pub mod bridge;

use std::{fmt, str::FromStr};

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

// ── Platforms ────────────────────────────────────────────────────────────────

/// External chat source. Each platform is also a controllable service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitch,
    Youtube,
    Bridge,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Twitch, Platform::Youtube, Platform::Bridge];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Twitch => "twitch",
            Self::Youtube => "youtube",
            Self::Bridge => "bridge",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known platform or command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown service: {0}")]
    UnknownService(String),
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("unknown status: {0}")]
    UnknownStatus(String),
}

impl FromStr for Platform {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "twitch" => Ok(Self::Twitch),
            "youtube" => Ok(Self::Youtube),
            "bridge" => Ok(Self::Bridge),
            other => Err(ParseError::UnknownService(other.to_string())),
        }
    }
}

// ── Chat ─────────────────────────────────────────────────────────────────────

/// A chat message received from (or relayed to) a platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
    pub platform: Platform,
    pub channel: String,
    pub user: String,
    /// May be empty, never absent.
    #[serde(default)]
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatEvent {
    /// Build a chat event stamped with the current time.
    pub fn new(
        platform: Platform,
        channel: impl Into<String>,
        user: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            channel: channel.into(),
            user: user.into(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

// ── Status ───────────────────────────────────────────────────────────────────

/// Connection state reported by an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Required configuration is missing; the adapter will not retry.
    Disabled,
    /// Ready and waiting for a remote peer.
    Waiting,
    Connecting,
    Connected,
    /// Transient failure; the adapter retries after its backoff.
    Error,
    Stopped,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Waiting => "waiting",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disabled" => Ok(Self::Disabled),
            "waiting" => Ok(Self::Waiting),
            "connecting" => Ok(Self::Connecting),
            "connected" => Ok(Self::Connected),
            "error" => Ok(Self::Error),
            "stopped" => Ok(Self::Stopped),
            other => Err(ParseError::UnknownStatus(other.to_string())),
        }
    }
}

/// Emitted by an adapter whenever its connection state changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub platform: Platform,
    pub status: ConnectionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusEvent {
    pub fn new(platform: Platform, status: ConnectionStatus) -> Self {
        Self {
            platform,
            status,
            message: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

// ── Control ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Start,
    Stop,
    Restart,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "restart" => Ok(Self::Restart),
            other => Err(ParseError::UnknownCommand(other.to_string())),
        }
    }
}

/// Operator request to change a service's lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlCommand {
    pub service: Platform,
    pub command: Command,
}

impl ControlCommand {
    pub fn new(service: Platform, command: Command) -> Self {
        Self { service, command }
    }

    pub fn start(service: Platform) -> Self {
        Self::new(service, Command::Start)
    }

    pub fn stop(service: Platform) -> Self {
        Self::new(service, Command::Stop)
    }

    pub fn restart(service: Platform) -> Self {
        Self::new(service, Command::Restart)
    }
}

/// Operator request to forward text to a platform through its adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub service: Platform,
    pub text: String,
}

/// Published by a service's supervised task when `run()` returned on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskExited {
    pub service: Platform,
    pub generation: u64,
    pub panicked: bool,
}

// ── Bus envelope ─────────────────────────────────────────────────────────────

/// Everything that flows through the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum Event {
    Chat(ChatEvent),
    Status(StatusEvent),
    Control(ControlCommand),
    Outbound(OutboundMessage),
    TaskExited(TaskExited),
}

impl Event {
    /// The single concrete topic this event is published under.
    pub fn topic(&self) -> Topic {
        match self {
            Self::Chat(_) => Topic::Chat,
            Self::Status(_) => Topic::Status,
            Self::Control(_) => Topic::Control,
            Self::Outbound(_) => Topic::Outbound,
            Self::TaskExited(_) => Topic::Lifecycle,
        }
    }

    pub fn platform(&self) -> Platform {
        match self {
            Self::Chat(e) => e.platform,
            Self::Status(e) => e.platform,
            Self::Control(c) => c.service,
            Self::Outbound(o) => o.service,
            Self::TaskExited(t) => t.service,
        }
    }
}

impl From<ChatEvent> for Event {
    fn from(e: ChatEvent) -> Self {
        Self::Chat(e)
    }
}

impl From<StatusEvent> for Event {
    fn from(e: StatusEvent) -> Self {
        Self::Status(e)
    }
}

impl From<ControlCommand> for Event {
    fn from(c: ControlCommand) -> Self {
        Self::Control(c)
    }
}

impl From<OutboundMessage> for Event {
    fn from(o: OutboundMessage) -> Self {
        Self::Outbound(o)
    }
}

impl From<TaskExited> for Event {
    fn from(t: TaskExited) -> Self {
        Self::TaskExited(t)
    }
}

/// Subscription key.
///
/// Matching rule: [`Topic::All`] matches every event; any other topic matches
/// only events whose [`Event::topic`] is equal to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    All,
    Chat,
    Status,
    Control,
    Outbound,
    Lifecycle,
}

impl Topic {
    pub fn matches(&self, event: &Event) -> bool {
        *self == Self::All || *self == event.topic()
    }
}
