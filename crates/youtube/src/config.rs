use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// `[youtube]` settings section.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct YoutubeConfig {
    #[serde(serialize_with = "serialize_secret")]
    pub api_key: Secret<String>,

    /// Live chat id of the broadcast (`liveStreamingDetails.activeLiveChatId`).
    pub live_chat_id: String,

    pub api_base: String,

    /// Floor for the server-suggested polling interval.
    pub min_poll_interval_ms: u64,

    /// Upper bound for one poll request, body included.
    pub request_timeout_ms: u64,
}

impl std::fmt::Debug for YoutubeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YoutubeConfig")
            .field("api_key", &"[REDACTED]")
            .field("live_chat_id", &self.live_chat_id)
            .field("api_base", &self.api_base)
            .field("min_poll_interval_ms", &self.min_poll_interval_ms)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

impl Default for YoutubeConfig {
    fn default() -> Self {
        Self {
            api_key: Secret::new(String::new()),
            live_chat_id: String::new(),
            api_base: DEFAULT_API_BASE.into(),
            min_poll_interval_ms: 2_000,
            request_timeout_ms: 10_000,
        }
    }
}

impl YoutubeConfig {
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.api_key.expose_secret().trim().is_empty() {
            missing.push("api_key");
        }
        if self.live_chat_id.trim().is_empty() {
            missing.push("live_chat_id");
        }
        missing
    }
}
