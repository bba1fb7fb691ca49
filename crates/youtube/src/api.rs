//! `liveChat/messages` client.

use std::time::Duration;

use {
    chrono::{DateTime, Utc},
    reqwest::Client,
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    tracing::debug,
};

use {
    chatrelay_channels::{Error, Result},
    chatrelay_protocol::{ChatEvent, Platform},
};

use crate::config::YoutubeConfig;

// ── Response shape ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveChatPage {
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub polling_interval_millis: u64,
    /// Set once the broadcast has ended.
    pub offline_at: Option<String>,
    #[serde(default)]
    pub items: Vec<LiveChatMessage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveChatMessage {
    #[serde(default)]
    pub id: String,
    pub snippet: Snippet,
    pub author_details: Option<AuthorDetails>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    #[serde(rename = "type")]
    pub kind: String,
    pub published_at: Option<DateTime<Utc>>,
    pub display_message: Option<String>,
    pub text_message_details: Option<TextMessageDetails>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMessageDetails {
    pub message_text: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorDetails {
    pub display_name: String,
}

impl LiveChatMessage {
    /// Only plain text messages become chat events; super chats, deletions
    /// and membership notices are skipped.
    pub fn to_chat_event(&self, live_chat_id: &str) -> Option<ChatEvent> {
        if self.snippet.kind != "textMessageEvent" {
            return None;
        }
        let user = self
            .author_details
            .as_ref()
            .map(|a| a.display_name.as_str())
            .filter(|n| !n.is_empty())
            .unwrap_or("unknown");
        let text = self
            .snippet
            .text_message_details
            .as_ref()
            .map(|d| d.message_text.as_str())
            .or(self.snippet.display_message.as_deref())
            .unwrap_or_default();
        let event = ChatEvent::new(Platform::Youtube, live_chat_id, user, text);
        Some(match self.snippet.published_at {
            Some(ts) => event.at(ts),
            None => event,
        })
    }
}

// ── Client ───────────────────────────────────────────────────────────────────

pub struct LiveChatClient {
    http: Client,
    base: String,
    api_key: Secret<String>,
    live_chat_id: String,
}

impl LiveChatClient {
    pub fn new(config: &YoutubeConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|source| Error::external("failed to build http client", source))?;
        Ok(Self {
            http,
            base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            live_chat_id: config.live_chat_id.clone(),
        })
    }

    pub fn live_chat_id(&self) -> &str {
        &self.live_chat_id
    }

    /// Fetch one page of messages, continuing from `page_token` if given.
    ///
    /// The API key travels in the query string, so transport errors are
    /// stripped of their URL before they reach status events or logs.
    pub async fn fetch_page(&self, page_token: Option<&str>) -> Result<LiveChatPage> {
        let url = format!("{}/liveChat/messages", self.base);
        let mut query: Vec<(&str, &str)> = Vec::with_capacity(4);
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }
        query.push(("liveChatId", self.live_chat_id.as_str()));
        query.push(("part", "snippet,authorDetails"));
        query.push(("key", self.api_key.expose_secret().as_str()));

        debug!(%url, ?page_token, "polling live chat");
        let resp = self
            .http
            .get(&url)
            .query(&query)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|source| {
                Error::external("failed to poll live chat", source.without_url())
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::connection(format!(
                "live chat API returned HTTP {status}: {body}"
            )));
        }

        resp.json()
            .await
            .map_err(|source| {
                Error::external("failed to parse live chat page", source.without_url())
            })
    }
}
