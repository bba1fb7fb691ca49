use {
    chatrelay_protocol::Platform,
    serde::{Deserialize, Serialize},
};

/// `[bridge]` settings section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub host: String,
    /// 0 binds an ephemeral port; the actual address is reported in the
    /// `waiting` status message.
    pub port: u16,
    /// Channel name for inbound chat frames that do not carry one.
    pub default_channel: String,
    /// Username on messages sent through [`send`](crate::BridgeAdapter).
    pub outbound_username: String,
    /// Platforms whose chat events are relayed to connected peers. `bridge`
    /// itself is always skipped.
    pub forward_platforms: Vec<Platform>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8766,
            default_channel: "extension".into(),
            outbound_username: "relay".into(),
            forward_platforms: vec![Platform::Twitch, Platform::Youtube],
        }
    }
}

impl BridgeConfig {
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.host.trim().is_empty() {
            missing.push("host");
        }
        missing
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host.trim(), self.port)
    }

    pub fn forwards(&self, platform: Platform) -> bool {
        platform != Platform::Bridge && self.forward_platforms.contains(&platform)
    }
}
