use std::{net::SocketAddr, sync::Arc};

use {
    async_trait::async_trait,
    tokio::{net::TcpListener, sync::watch},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use {
    chatrelay_channels::{
        AdapterContext, Backoff, Error, PlatformAdapter, Result, StatusReporter, run_until_stopped,
    },
    chatrelay_protocol::{
        Platform,
        bridge::{BridgeChat, OutboundFrame},
    },
};

use crate::{
    config::BridgeConfig,
    hub::{self, HubHandle},
    server::{BridgeState, build_bridge_app},
};

/// Server side of the browser-extension bridge.
pub struct BridgeAdapter {
    config: BridgeConfig,
    reporter: StatusReporter,
    backoff: Backoff,
    cancel: CancellationToken,
    /// Present while the listener is up.
    hub: watch::Sender<Option<HubHandle>>,
}

impl BridgeAdapter {
    pub fn new(config: BridgeConfig, reporter: StatusReporter, backoff: Backoff) -> Self {
        Self {
            config,
            reporter,
            backoff,
            cancel: CancellationToken::new(),
            hub: watch::Sender::new(None),
        }
    }

    pub fn from_context(ctx: &AdapterContext) -> Result<Self> {
        let config = ctx.settings.platform_config(Platform::Bridge)?;
        Ok(Self::new(
            config,
            ctx.reporter(Platform::Bridge),
            ctx.backoff(),
        ))
    }

    /// Factory entry point for the adapter registry.
    pub fn build(ctx: &AdapterContext) -> Result<Arc<dyn PlatformAdapter>> {
        Ok(Arc::new(Self::from_context(ctx)?))
    }

    /// Bind, serve until stopped, tear down.
    async fn session(&self) -> Result<()> {
        let bind = self.config.bind_addr();
        let listener = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Ok(()),
            r = TcpListener::bind(&bind) => r?,
        };
        let addr = listener.local_addr()?;
        let listening = format!("listening on {addr}");
        info!(%addr, "bridge: listening");

        let session_cancel = self.cancel.child_token();
        let (hub, hub_task) = hub::spawn(
            self.reporter.clone(),
            listening.clone(),
            self.config.forward_platforms.clone(),
            session_cancel.clone(),
        );
        self.hub.send_replace(Some(hub.clone()));
        self.reporter.waiting(listening);

        let app = build_bridge_app(BridgeState {
            hub,
            reporter: self.reporter.clone(),
            default_channel: self.config.default_channel.clone(),
            cancel: session_cancel.clone(),
        });
        let served = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(session_cancel.clone().cancelled_owned())
        .await;

        session_cancel.cancel();
        self.hub.send_replace(None);
        if let Err(e) = hub_task.await {
            warn!(error = %e, "bridge: hub task failed");
        }
        debug!(%addr, "bridge: listener closed");

        served.map_err(Error::from)
    }
}

#[async_trait]
impl PlatformAdapter for BridgeAdapter {
    fn platform(&self) -> Platform {
        Platform::Bridge
    }

    fn check_config(&self) -> Result<()> {
        let missing = self.config.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::missing_config(Platform::Bridge, missing))
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
        let frame = OutboundFrame::ChatMessage {
            platform: None,
            channel: None,
            data: BridgeChat {
                username: self.config.outbound_username.clone(),
                message: text.to_string(),
            },
        };
        let hub = self.hub.borrow().clone();
        match hub {
            Some(hub) if hub.broadcast(&frame) => {},
            _ => warn!("bridge send dropped, listener not running"),
        }
    }

    fn stop(&self) {
        self.cancel.cancel();
    }
}
