use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    tokio::sync::watch,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use {
    chatrelay_channels::{
        AdapterContext, Backoff, Error, PlatformAdapter, Result, StatusReporter, run_until_stopped,
    },
    chatrelay_protocol::Platform,
};

use crate::{api::LiveChatClient, config::YoutubeConfig};

/// YouTube live chat via API polling.
pub struct YoutubeAdapter {
    config: YoutubeConfig,
    client: LiveChatClient,
    reporter: StatusReporter,
    backoff: Backoff,
    cancel: CancellationToken,
    /// Continuation token. Survives retries so a reconnect resumes where the
    /// last successful poll left off; `None` means the next page is backlog.
    page_token: watch::Sender<Option<String>>,
}

impl YoutubeAdapter {
    pub fn new(config: YoutubeConfig, reporter: StatusReporter, backoff: Backoff) -> Result<Self> {
        Ok(Self {
            client: LiveChatClient::new(&config)?,
            config,
            reporter,
            backoff,
            cancel: CancellationToken::new(),
            page_token: watch::Sender::new(None),
        })
    }

    pub fn from_context(ctx: &AdapterContext) -> Result<Self> {
        let config = ctx.settings.platform_config(Platform::Youtube)?;
        Self::new(config, ctx.reporter(Platform::Youtube), ctx.backoff())
    }

    /// Factory entry point for the adapter registry.
    pub fn build(ctx: &AdapterContext) -> Result<Arc<dyn PlatformAdapter>> {
        Ok(Arc::new(Self::from_context(ctx)?))
    }

    async fn session(&self) -> Result<()> {
        let floor = Duration::from_millis(self.config.min_poll_interval_ms);
        let mut connected = false;

        loop {
            let token = self.page_token.borrow().clone();
            let page = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Ok(()),
                r = self.client.fetch_page(token.as_deref()) => r?,
            };

            if !connected {
                connected = true;
                info!(live_chat_id = %self.client.live_chat_id(), "youtube live chat connected");
                self.reporter.connected();
            }

            if token.is_none() {
                debug!(skipped = page.items.len(), "skipping live chat backlog");
            } else {
                for event in page
                    .items
                    .iter()
                    .filter_map(|m| m.to_chat_event(self.client.live_chat_id()))
                {
                    self.reporter.chat(event);
                }
            }

            if let Some(next) = page.next_page_token {
                self.page_token.send_replace(Some(next));
            }
            if page.offline_at.is_some() {
                return Err(Error::connection("live chat has ended"));
            }

            let wait = Duration::from_millis(page.polling_interval_millis).max(floor);
            if !Backoff::fixed(wait).sleep_or_cancel(&self.cancel).await {
                return Ok(());
            }
        }
    }
}

#[async_trait]
impl PlatformAdapter for YoutubeAdapter {
    fn platform(&self) -> Platform {
        Platform::Youtube
    }

    fn check_config(&self) -> Result<()> {
        let missing = self.config.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::missing_config(Platform::Youtube, missing))
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
        warn!(
            len = text.len(),
            "youtube send dropped, api key access is read-only"
        );
    }

    fn stop(&self) {
        self.cancel.cancel();
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        chatrelay_bus::{Event, EventBus, Topic},
        chatrelay_protocol::ConnectionStatus,
        mockito::Matcher,
        secrecy::Secret,
        tokio::sync::mpsc,
    };

    fn message(id: &str, author: &str, text: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "snippet": {
                "type": "textMessageEvent",
                "publishedAt": "2024-05-01T12:00:00Z",
                "displayMessage": text,
            },
            "authorDetails": { "displayName": author }
        })
    }

    fn config(base: String) -> YoutubeConfig {
        YoutubeConfig {
            api_key: Secret::new("k".into()),
            live_chat_id: "chat1".into(),
            api_base: base,
            min_poll_interval_ms: 10,
            ..Default::default()
        }
    }

    fn adapter_with(config: YoutubeConfig, bus: EventBus) -> Arc<YoutubeAdapter> {
        Arc::new(
            YoutubeAdapter::new(
                config,
                StatusReporter::new(Platform::Youtube, bus),
                Backoff::fixed(Duration::from_millis(20)),
            )
            .unwrap(),
        )
    }

    fn adapter(base: String, bus: EventBus) -> Arc<YoutubeAdapter> {
        adapter_with(config(base), bus)
    }

    async fn first_error(rx: &mut mpsc::UnboundedReceiver<Event>) -> String {
        loop {
            if let Event::Status(s) = next_event(rx).await
                && s.status == ConnectionStatus::Error
            {
                return s.message.unwrap_or_default();
            }
        }
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("bus closed")
    }

    #[tokio::test]
    async fn skips_backlog_then_relays_new_messages() {
        let mut server = mockito::Server::new_async().await;
        let _backlog = server
            .mock("GET", "/liveChat/messages")
            .match_query(Matcher::Regex("^liveChatId=chat1".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({
                    "nextPageToken": "p2",
                    "pollingIntervalMillis": 0,
                    "items": [message("old", "Old", "old message")]
                })
                .to_string(),
            )
            .create_async()
            .await;
        let _fresh = server
            .mock("GET", "/liveChat/messages")
            .match_query(Matcher::UrlEncoded("pageToken".into(), "p2".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                serde_json::json!({
                    "nextPageToken": "p3",
                    "pollingIntervalMillis": 60000,
                    "items": [message("new", "Ana", "new message")]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let (bus, _dispatcher) = EventBus::spawn();
        let (_, mut rx) = bus.subscribe_channel(Topic::All).unwrap();
        let adapter = adapter(server.url(), bus);
        let runner = tokio::spawn({
            let adapter = Arc::clone(&adapter);
            async move { adapter.run().await }
        });

        let mut statuses = Vec::new();
        let chat = loop {
            match next_event(&mut rx).await {
                Event::Status(s) => statuses.push(s.status),
                Event::Chat(c) => break c,
                _ => {},
            }
        };
        assert_eq!(statuses, vec![
            ConnectionStatus::Connecting,
            ConnectionStatus::Connected
        ]);
        assert_eq!(chat.user, "Ana");
        assert_eq!(chat.text, "new message");
        assert_eq!(chat.platform, Platform::Youtube);

        adapter.stop();
        tokio::time::timeout(Duration::from_secs(5), runner)
            .await
            .unwrap()
            .unwrap();
        loop {
            match next_event(&mut rx).await {
                Event::Status(s) if s.status == ConnectionStatus::Stopped => break,
                Event::Chat(c) => panic!("unexpected chat {c:?}"),
                _ => {},
            }
        }
    }

    #[tokio::test]
    async fn http_failure_reports_error_and_retries() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/liveChat/messages")
            .match_query(Matcher::Any)
            .with_status(500)
            .expect_at_least(2)
            .create_async()
            .await;

        let (bus, _dispatcher) = EventBus::spawn();
        let (_, mut rx) = bus.subscribe_channel(Topic::Status).unwrap();
        let adapter = adapter(server.url(), bus);
        let runner = tokio::spawn({
            let adapter = Arc::clone(&adapter);
            async move { adapter.run().await }
        });

        let mut errors = 0;
        while errors < 2 {
            if let Event::Status(s) = next_event(&mut rx).await
                && s.status == ConnectionStatus::Error
            {
                assert!(s.message.unwrap_or_default().contains("500"));
                errors += 1;
            }
        }

        adapter.stop();
        runner.await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_config_is_reported() {
        let (bus, _dispatcher) = EventBus::spawn();
        let adapter = YoutubeAdapter::new(
            YoutubeConfig::default(),
            StatusReporter::new(Platform::Youtube, bus),
            Backoff::default(),
        )
        .unwrap();
        let err = adapter.check_config().unwrap_err();
        assert!(err.to_string().contains("api_key, live_chat_id"));
        adapter.send("ignored").await;
    }

    #[tokio::test]
    async fn error_status_does_not_expose_api_key() {
        let (bus, _dispatcher) = EventBus::spawn();
        let (_, mut rx) = bus.subscribe_channel(Topic::Status).unwrap();
        let adapter = adapter_with(
            YoutubeConfig {
                api_key: Secret::new("SUPERSECRETKEY".into()),
                ..config("http://127.0.0.1:1".into())
            },
            bus,
        );
        let runner = tokio::spawn({
            let adapter = Arc::clone(&adapter);
            async move { adapter.run().await }
        });

        let message = first_error(&mut rx).await;
        assert!(message.starts_with("failed to poll live chat"), "{message}");
        assert!(!message.contains("SUPERSECRETKEY"), "{message}");

        adapter.stop();
        runner.await.unwrap();
    }

    #[tokio::test]
    async fn stalled_poll_reports_error_instead_of_hanging() {
        use std::io::Write as _;

        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/liveChat/messages")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_chunked_body(|w| {
                std::thread::sleep(Duration::from_millis(1_000));
                w.write_all(b"{}")
            })
            .create_async()
            .await;

        let (bus, _dispatcher) = EventBus::spawn();
        let (_, mut rx) = bus.subscribe_channel(Topic::Status).unwrap();
        let adapter = adapter_with(
            YoutubeConfig {
                request_timeout_ms: 100,
                ..config(server.url())
            },
            bus,
        );
        let runner = tokio::spawn({
            let adapter = Arc::clone(&adapter);
            async move { adapter.run().await }
        });

        let message = first_error(&mut rx).await;
        // Headers arrive, the body stalls: the timeout fires while reading it.
        assert!(
            message.starts_with("failed to parse live chat page")
                || message.starts_with("failed to poll live chat"),
            "{message}"
        );

        adapter.stop();
        runner.await.unwrap();
    }
}
