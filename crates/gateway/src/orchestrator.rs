use std::{sync::Arc, time::Duration};

use {
    chatrelay_bus::{Dispatcher, EventBus, SubscriptionId, Topic},
    chatrelay_channels::AdapterRegistry,
    chatrelay_config::Settings,
    chatrelay_protocol::{ControlCommand, Platform},
    tokio::sync::watch,
    tracing::{debug, info, warn},
};

use crate::{
    controller::ServiceController,
    settings::SettingsStore,
    snapshot::ServiceSnapshot,
};

/// Owns the event bus, the controller subscription and the settings store.
pub struct Orchestrator {
    bus: EventBus,
    dispatcher: Dispatcher,
    controller: SubscriptionId,
    settings: SettingsStore,
    services: watch::Receiver<ServiceSnapshot>,
}

impl Orchestrator {
    /// Spawn the bus and subscribe a controller for every registered adapter.
    /// Nothing is started yet; see [`autostart`](Self::autostart).
    pub fn spawn(settings: Settings, registry: AdapterRegistry) -> anyhow::Result<Self> {
        let (bus, dispatcher) = EventBus::spawn();
        let (settings_tx, settings_rx) = watch::channel(Arc::new(settings));
        let (controller, services) =
            ServiceController::new(Arc::new(registry), bus.clone(), settings_rx);
        let controller = bus.subscribe(Topic::All, controller)?;
        let settings = SettingsStore::new(settings_tx, bus.clone(), services.clone());
        Ok(Self {
            bus,
            dispatcher,
            controller,
            settings,
            services,
        })
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn services(&self) -> watch::Receiver<ServiceSnapshot> {
        self.services.clone()
    }

    /// Enqueue a control command for the controller.
    pub fn control(&self, cmd: ControlCommand) -> chatrelay_bus::Result<()> {
        self.bus.publish(cmd)
    }

    /// Publish `start` for every registered service listed in
    /// `runtime.autostart`.
    pub fn autostart(&self) -> chatrelay_bus::Result<Vec<Platform>> {
        let registered = self.services.borrow().clone();
        let mut started = Vec::new();
        for service in self.settings.current().runtime.autostart.iter().copied() {
            if !registered.services.contains_key(&service) {
                warn!(service = %service, "autostart skipped, no adapter registered");
                continue;
            }
            if started.contains(&service) {
                continue;
            }
            self.control(ControlCommand::start(service))?;
            started.push(service);
        }
        info!(services = ?started, "autostart requested");
        Ok(started)
    }

    /// Publish `stop` for every service and wait up to `grace` for all of
    /// them to report stopped.
    pub async fn stop_all(&self, grace: Duration) -> bool {
        let services: Vec<Platform> = self.services.borrow().services.keys().copied().collect();
        for service in services {
            if let Err(e) = self.control(ControlCommand::stop(service)) {
                warn!(service = %service, error = %e, "stop not published");
            }
        }
        let mut rx = self.services.clone();
        let stopped = tokio::time::timeout(grace, async move {
            rx.wait_for(ServiceSnapshot::all_stopped).await.is_ok()
        })
        .await;
        match stopped {
            Ok(done) => done,
            Err(_) => {
                warn!(
                    grace_ms = grace.as_millis() as u64,
                    "services still active after shutdown grace"
                );
                false
            },
        }
    }

    /// Stop every service, then drain and stop the bus.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let runtime = self.settings.current().runtime.clone();
        // Stops run one after another inside the controller, each bounded by
        // the stop timeout.
        let services = self.services.borrow().services.len() as u32;
        let grace = runtime.shutdown_grace() + runtime.stop_timeout() * services;
        if self.stop_all(grace).await {
            self.bus.unsubscribe(self.controller);
        }
        debug!(pending = self.bus.pending(), "draining event bus");
        self.dispatcher.shutdown(runtime.drain_timeout()).await?;
        info!("orchestrator stopped");
        Ok(())
    }
}
