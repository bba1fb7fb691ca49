use std::sync::Arc;

use {
    chatrelay_bus::{EventBus, Result},
    chatrelay_config::Settings,
    chatrelay_protocol::{ControlCommand, Platform},
    tokio::sync::watch,
    tracing::{debug, info},
};

use crate::snapshot::ServiceSnapshot;

/// Holds the current settings snapshot.
///
/// The controller reads it whenever it starts a service, so replacing the
/// snapshot takes effect on the next start. [`apply`](Self::apply) restarts
/// active services whose section changed.
#[derive(Clone)]
pub struct SettingsStore {
    tx: Arc<watch::Sender<Arc<Settings>>>,
    bus: EventBus,
    services: watch::Receiver<ServiceSnapshot>,
}

impl SettingsStore {
    pub fn new(
        tx: watch::Sender<Arc<Settings>>,
        bus: EventBus,
        services: watch::Receiver<ServiceSnapshot>,
    ) -> Self {
        Self {
            tx: Arc::new(tx),
            bus,
            services,
        }
    }

    pub fn current(&self) -> Arc<Settings> {
        Arc::clone(&self.tx.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Settings>> {
        self.tx.subscribe()
    }

    /// Replace the settings and restart every starting or running service
    /// whose effective settings changed. Returns the services a restart was
    /// published for.
    pub fn apply(&self, new: Settings) -> Result<Vec<Platform>> {
        let changed = self.current().changed_platforms(&new);
        self.tx.send_replace(Arc::new(new));
        if changed.is_empty() {
            debug!("settings applied, no service affected");
            return Ok(Vec::new());
        }

        let snapshot = self.services.borrow().clone();
        let mut restarted = Vec::new();
        for service in changed {
            if snapshot.is_active(service) {
                self.bus.publish(ControlCommand::restart(service))?;
                restarted.push(service);
            } else {
                debug!(service = %service, "settings changed for inactive service");
            }
        }
        info!(restarted = ?restarted, "settings applied");
        Ok(restarted)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::snapshot::{ServiceInfo, ServiceState},
        chatrelay_bus::{Event, Topic},
        chatrelay_protocol::Command,
        serde_json::json,
    };

    #[tokio::test]
    async fn restarts_only_active_changed_services() {
        let (bus, dispatcher) = EventBus::spawn();
        let (_, mut rx) = bus.subscribe_channel(Topic::Control).unwrap();

        let mut snapshot = ServiceSnapshot::stopped(Platform::ALL);
        for p in [Platform::Twitch, Platform::Bridge] {
            snapshot.services.insert(p, ServiceInfo {
                state: ServiceState::Running,
                generation: Some(1),
                started_at: None,
            });
        }
        let (_snap_tx, snap_rx) = watch::channel(snapshot);
        let (tx, settings_rx) = watch::channel(Arc::new(Settings::default()));
        let store = SettingsStore::new(tx, bus.clone(), snap_rx);

        let mut new = Settings::default();
        new.bridge = json!({ "port": 9000 });
        new.youtube = json!({ "live_chat_id": "x" });
        let restarted = store.apply(new.clone()).unwrap();

        assert_eq!(restarted, vec![Platform::Bridge]);
        assert_eq!(*settings_rx.borrow().as_ref(), new);
        dispatcher.shutdown(std::time::Duration::from_secs(1)).await.unwrap();

        let Some(Event::Control(cmd)) = rx.recv().await else {
            panic!("expected a control command");
        };
        assert_eq!(cmd.service, Platform::Bridge);
        assert_eq!(cmd.command, Command::Restart);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn unchanged_settings_publish_nothing() {
        let (bus, _dispatcher) = EventBus::spawn();
        let (_snap_tx, snap_rx) = watch::channel(ServiceSnapshot::stopped(Platform::ALL));
        let (tx, _rx) = watch::channel(Arc::new(Settings::default()));
        let store = SettingsStore::new(tx, bus, snap_rx);
        assert!(store.apply(Settings::default()).unwrap().is_empty());
    }
}
