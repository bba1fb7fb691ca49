//! `chatrelay serve`: run the orchestrator and the gateway until a signal.

use std::path::{Path, PathBuf};

use {
    anyhow::Context,
    chatrelay_bridge::BridgeAdapter,
    chatrelay_channels::AdapterRegistry,
    chatrelay_config::{Settings, Severity, validate},
    chatrelay_gateway::{AppState, Orchestrator, SettingsStore, start_gateway},
    chatrelay_protocol::Platform,
    chatrelay_twitch::TwitchAdapter,
    chatrelay_youtube::YoutubeAdapter,
    tokio_util::sync::CancellationToken,
    tracing::{error, info, warn},
};

/// Command-line overrides applied on top of the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub bind: Option<String>,
    pub port: Option<u16>,
}

impl Overrides {
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(bind) = &self.bind {
            settings.server.bind.clone_from(bind);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
    }
}

/// Every adapter this binary knows how to run.
pub fn registry() -> AdapterRegistry {
    AdapterRegistry::new()
        .with(Platform::Twitch, TwitchAdapter::build)
        .with(Platform::Youtube, YoutubeAdapter::build)
        .with(Platform::Bridge, BridgeAdapter::build)
}

/// Load settings from `explicit` or the standard locations.
///
/// An explicit path must load; a discovered file that fails to parse falls
/// back to defaults with a warning.
pub fn load_settings(explicit: Option<&Path>) -> anyhow::Result<(Settings, Option<PathBuf>)> {
    let (settings, path) = match explicit {
        Some(path) => {
            let settings = chatrelay_config::load_config(path)
                .with_context(|| format!("loading {}", path.display()))?;
            (settings, Some(path.to_path_buf()))
        },
        None => chatrelay_config::discover_and_load(),
    };
    if let Some(path) = &path {
        log_diagnostics(path);
    }
    Ok((settings, path))
}

fn log_diagnostics(path: &Path) {
    let result = validate::validate_file(path);
    for d in &result.diagnostics {
        match d.severity {
            Severity::Error => {
                error!(path = %d.path, category = d.category, "config: {}", d.message);
            },
            Severity::Warning => {
                warn!(path = %d.path, category = d.category, "config: {}", d.message);
            },
            Severity::Info => info!(path = %d.path, category = d.category, "config: {}", d.message),
        }
    }
}

pub async fn run(config: Option<PathBuf>, overrides: Overrides) -> anyhow::Result<()> {
    let (mut settings, source) = load_settings(config.as_deref())?;
    overrides.apply(&mut settings);
    match &source {
        Some(path) => info!(path = %path.display(), "config loaded"),
        None => info!("no config file found, using defaults"),
    }

    let bind = settings.server.bind.clone();
    let port = settings.server.port;
    let runtime = settings.runtime.clone();
    let orchestrator = Orchestrator::spawn(settings, registry())?;

    let shutdown = CancellationToken::new();
    let mut server = tokio::spawn({
        let state = AppState::from_orchestrator(&orchestrator);
        let shutdown = shutdown.clone();
        async move { start_gateway(&bind, port, state, shutdown).await }
    });
    orchestrator.autostart()?;

    let server_result = tokio::select! {
        joined = &mut server => Some(joined),
        r = wait_for_shutdown(orchestrator.settings(), source.as_deref(), &overrides) => {
            r?;
            None
        },
    };

    info!("shutting down");
    orchestrator.stop_all(runtime.shutdown_grace()).await;
    shutdown.cancel();
    let server_result = match server_result {
        Some(joined) => joined,
        None => server.await,
    };
    orchestrator.shutdown().await?;

    server_result.context("gateway task failed")?
}

#[cfg(unix)]
async fn wait_for_shutdown(
    store: &SettingsStore,
    source: Option<&Path>,
    overrides: &Overrides,
) -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate())?;
    let mut hup = signal(SignalKind::hangup())?;
    loop {
        tokio::select! {
            r = tokio::signal::ctrl_c() => {
                r?;
                info!("received ctrl-c");
                return Ok(());
            },
            _ = term.recv() => {
                info!("received SIGTERM");
                return Ok(());
            },
            _ = hup.recv() => reload(store, source, overrides),
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(
    _store: &SettingsStore,
    _source: Option<&Path>,
    _overrides: &Overrides,
) -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("received ctrl-c");
    Ok(())
}

/// Re-read the config file and hand it to the settings store.
pub fn reload(store: &SettingsStore, source: Option<&Path>, overrides: &Overrides) {
    let Some(path) = source else {
        warn!("reload requested but no config file is in use");
        return;
    };
    let mut settings = match chatrelay_config::load_config(path) {
        Ok(settings) => settings,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "reload failed, keeping current settings");
            return;
        },
    };
    log_diagnostics(path);
    overrides.apply(&mut settings);
    match store.apply(settings) {
        Ok(restarted) => info!(path = %path.display(), restarted = ?restarted, "config reloaded"),
        Err(e) => warn!(error = %e, "config reloaded but restarts were not published"),
    }
}
