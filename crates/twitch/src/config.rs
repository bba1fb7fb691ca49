use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

pub const DEFAULT_URL: &str = "wss://irc-ws.chat.twitch.tv:443";
/// Six minutes: one missed server PING plus slack.
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 360_000;

/// `[twitch]` settings section.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TwitchConfig {
    /// Login name of the bot account.
    pub nick: String,

    /// Chat OAuth token, with or without the `oauth:` prefix.
    #[serde(serialize_with = "serialize_secret")]
    pub oauth_token: Secret<String>,

    /// Channels to join, with or without the leading `#`.
    pub channels: Vec<String>,

    /// IRC-over-WebSocket endpoint.
    pub url: String,

    /// Reconnect when nothing arrives from the server for this long.
    pub idle_timeout_ms: u64,
}

impl std::fmt::Debug for TwitchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwitchConfig")
            .field("nick", &self.nick)
            .field("oauth_token", &"[REDACTED]")
            .field("channels", &self.channels)
            .field("url", &self.url)
            .field("idle_timeout_ms", &self.idle_timeout_ms)
            .finish()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

impl Default for TwitchConfig {
    fn default() -> Self {
        Self {
            nick: String::new(),
            oauth_token: Secret::new(String::new()),
            channels: Vec::new(),
            url: DEFAULT_URL.into(),
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
        }
    }
}

impl TwitchConfig {
    /// Names of the required settings that are empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.nick.trim().is_empty() {
            missing.push("nick");
        }
        if self.token().is_empty() {
            missing.push("oauth_token");
        }
        if self.channel_names().is_empty() {
            missing.push("channels");
        }
        missing
    }

    /// Token without the `oauth:` prefix.
    pub fn token(&self) -> &str {
        let raw = self.oauth_token.expose_secret().trim();
        raw.strip_prefix("oauth:").unwrap_or(raw)
    }

    /// Lowercased channel names without `#`, blanks dropped.
    pub fn channel_names(&self) -> Vec<String> {
        self.channels
            .iter()
            .map(|c| c.trim().trim_start_matches('#').to_ascii_lowercase())
            .filter(|c| !c.is_empty())
            .collect()
    }

    /// Lines sent right after the socket opens.
    pub(crate) fn handshake_lines(&self) -> Vec<String> {
        let mut lines = vec![
            "CAP REQ :twitch.tv/tags twitch.tv/commands".to_string(),
            format!("PASS oauth:{}", self.token()),
            format!("NICK {}", self.nick.trim().to_ascii_lowercase()),
        ];
        lines.extend(self.channel_names().into_iter().map(|c| format!("JOIN #{c}")));
        lines
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_incomplete() {
        let cfg = TwitchConfig::default();
        assert_eq!(cfg.url, DEFAULT_URL);
        assert_eq!(cfg.idle_timeout_ms, DEFAULT_IDLE_TIMEOUT_MS);
        assert_eq!(cfg.missing_fields(), vec!["nick", "oauth_token", "channels"]);
    }

    #[test]
    fn deserialize_and_normalize() {
        let cfg: TwitchConfig = serde_json::from_value(serde_json::json!({
            "nick": "RelayBot",
            "oauth_token": "oauth:abc123",
            "channels": ["#Streamer", " other ", ""],
        }))
        .unwrap();
        assert!(cfg.missing_fields().is_empty());
        assert_eq!(cfg.token(), "abc123");
        assert_eq!(cfg.channel_names(), vec!["streamer", "other"]);
        assert_eq!(cfg.handshake_lines(), vec![
            "CAP REQ :twitch.tv/tags twitch.tv/commands",
            "PASS oauth:abc123",
            "NICK relaybot",
            "JOIN #streamer",
            "JOIN #other",
        ]);
    }

    #[test]
    fn debug_redacts_token() {
        let cfg = TwitchConfig {
            oauth_token: Secret::new("super-secret".into()),
            ..Default::default()
        };
        let debug = format!("{cfg:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
