//! Service lifecycle controller.
//!
//! The controller is a bus subscriber. Control commands, outbound messages
//! and task exit notices are all handled inside its single subscription, so
//! the dispatch worker serializes every lifecycle transition and the handle
//! table needs no lock. Observers read the table through a `watch` snapshot.
//!
//! Each start builds a fresh adapter from the registry using the settings
//! current at that moment and runs it in a supervised task tagged with a new
//! generation number. Exit notices for older generations are ignored.

use std::{
    any::Any,
    collections::HashMap,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use {
    async_trait::async_trait,
    chatrelay_bus::{Event, EventBus, EventHandler},
    chatrelay_channels::{AdapterContext, AdapterRegistry, Error as ChannelError, PlatformAdapter},
    chatrelay_config::Settings,
    chatrelay_protocol::{
        Command, ConnectionStatus, ControlCommand, OutboundMessage, Platform, StatusEvent,
        TaskExited,
    },
    chrono::{DateTime, Utc},
    futures::FutureExt,
    tokio::{sync::watch, task::JoinHandle},
    tracing::{debug, error, info, warn},
};

use crate::snapshot::{ServiceInfo, ServiceSnapshot, ServiceState};

/// Status message published when a service is refused for lack of settings.
pub const MISSING_CONFIGURATION: &str = "missing configuration";

#[derive(Default)]
struct ServiceHandle {
    state: ServiceState,
    /// 0 until the first start.
    generation: u64,
    started_at: Option<DateTime<Utc>>,
    adapter: Option<Arc<dyn PlatformAdapter>>,
    task: Option<JoinHandle<()>>,
}

impl ServiceHandle {
    fn clear(&mut self) {
        self.state = ServiceState::Stopped;
        self.started_at = None;
        self.adapter = None;
        self.task = None;
    }
}

pub struct ServiceController {
    registry: Arc<AdapterRegistry>,
    bus: EventBus,
    settings: watch::Receiver<Arc<Settings>>,
    handles: HashMap<Platform, ServiceHandle>,
    next_generation: u64,
    snapshot: watch::Sender<ServiceSnapshot>,
}

impl ServiceController {
    /// Create a controller for every platform in `registry`.
    ///
    /// Subscribe the returned controller to the bus on `Topic::All`; the
    /// receiver tracks its handle table.
    pub fn new(
        registry: Arc<AdapterRegistry>,
        bus: EventBus,
        settings: watch::Receiver<Arc<Settings>>,
    ) -> (Self, watch::Receiver<ServiceSnapshot>) {
        let platforms = registry.platforms();
        let (snapshot, snapshot_rx) = watch::channel(ServiceSnapshot::stopped(platforms.clone()));
        let handles = platforms
            .into_iter()
            .map(|p| (p, ServiceHandle::default()))
            .collect();
        let controller = Self {
            registry,
            bus,
            settings,
            handles,
            next_generation: 0,
            snapshot,
        };
        (controller, snapshot_rx)
    }

    fn current_settings(&self) -> Arc<Settings> {
        Arc::clone(&self.settings.borrow())
    }

    async fn apply(&mut self, cmd: ControlCommand) {
        debug!(service = %cmd.service, command = %cmd.command, "control command");
        match cmd.command {
            Command::Start => self.start(cmd.service),
            Command::Stop => {
                self.stop(cmd.service).await;
            },
            Command::Restart => self.restart(cmd.service).await,
        }
    }

    fn start(&mut self, service: Platform) {
        let Some(handle) = self.handles.get(&service) else {
            warn!(service = %service, "start ignored, no adapter registered");
            return;
        };
        if handle.state != ServiceState::Stopped {
            warn!(service = %service, state = ?handle.state, "start ignored, service already active");
            return;
        }

        self.set_state(service, ServiceState::Starting);
        let ctx = AdapterContext::new(self.bus.clone(), self.current_settings());
        // Factories run user code inline; a panic here must not leave the
        // handle stuck in STARTING.
        let registry = &self.registry;
        let built = panic::catch_unwind(AssertUnwindSafe(
            || -> Result<Arc<dyn PlatformAdapter>, ChannelError> {
                let adapter = registry.build(service, &ctx)?;
                adapter.check_config()?;
                Ok(adapter)
            },
        ));
        let adapter = match built {
            Ok(Ok(adapter)) => adapter,
            Ok(Err(e)) => {
                self.refuse(service, &e);
                return;
            },
            Err(payload) => {
                error!(
                    service = %service,
                    panic = %panic_message(payload.as_ref()),
                    "adapter factory panicked"
                );
                self.publish_status(
                    StatusEvent::new(service, ConnectionStatus::Error)
                        .with_message("adapter factory panicked"),
                );
                self.set_state(service, ServiceState::Stopped);
                return;
            },
        };

        self.next_generation += 1;
        let generation = self.next_generation;
        let task = tokio::spawn(supervise(
            Arc::clone(&adapter),
            self.bus.clone(),
            service,
            generation,
        ));
        if let Some(handle) = self.handles.get_mut(&service) {
            handle.state = ServiceState::Running;
            handle.generation = generation;
            handle.started_at = Some(Utc::now());
            handle.adapter = Some(adapter);
            handle.task = Some(task);
        }
        info!(service = %service, generation, "service started");
        self.publish_snapshot();
    }

    /// Leave `service` stopped after a failed start and tell the dashboard why.
    fn refuse(&mut self, service: Platform, error: &ChannelError) {
        let status = match error {
            ChannelError::MissingConfig { .. } => {
                info!(service = %service, %error, "service not started");
                StatusEvent::new(service, ConnectionStatus::Disabled).with_message(MISSING_CONFIGURATION)
            },
            e if e.is_config() => {
                warn!(service = %service, error = %e, "service not started");
                StatusEvent::new(service, ConnectionStatus::Disabled).with_message(e.to_string())
            },
            e => {
                error!(service = %service, error = %e, "failed to build adapter");
                StatusEvent::new(service, ConnectionStatus::Error).with_message(e.to_string())
            },
        };
        self.publish_status(status);
        self.set_state(service, ServiceState::Stopped);
    }

    /// Stop `service` and wait for its task. Returns `false` when the task
    /// had to be aborted.
    async fn stop(&mut self, service: Platform) -> bool {
        let stop_timeout = self.current_settings().runtime.stop_timeout();
        let Some(handle) = self.handles.get_mut(&service) else {
            debug!(service = %service, "stop ignored, no adapter registered");
            return true;
        };
        let (Some(adapter), Some(mut task)) = (handle.adapter.take(), handle.task.take()) else {
            debug!(service = %service, "stop ignored, service not running");
            return true;
        };
        let generation = handle.generation;
        handle.state = ServiceState::Stopping;
        self.publish_snapshot();

        info!(service = %service, generation, "stopping service");
        adapter.stop();
        let clean = match tokio::time::timeout(stop_timeout, &mut task).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!(service = %service, generation, error = %e, "service task failed");
                true
            },
            Err(_) => {
                task.abort();
                error!(
                    service = %service,
                    generation,
                    timeout_ms = stop_timeout.as_millis() as u64,
                    "service did not stop in time, task aborted"
                );
                self.publish_status(
                    StatusEvent::new(service, ConnectionStatus::Stopped)
                        .with_message("forced stop after timeout"),
                );
                false
            },
        };

        if let Some(handle) = self.handles.get_mut(&service) {
            handle.clear();
        }
        self.publish_snapshot();
        clean
    }

    async fn restart(&mut self, service: Platform) {
        let pause = self.current_settings().runtime.restart_pause();
        if !self.stop(service).await {
            warn!(service = %service, "restart continuing after forced stop");
        }
        tokio::time::sleep(pause).await;
        self.start(service);
    }

    fn task_exited(&mut self, exit: TaskExited) {
        let Some(handle) = self.handles.get_mut(&exit.service) else {
            return;
        };
        if handle.generation != exit.generation || !handle.state.is_active() {
            debug!(
                service = %exit.service,
                generation = exit.generation,
                current = handle.generation,
                "stale task exit ignored"
            );
            return;
        }
        handle.clear();

        if exit.panicked {
            self.publish_status(
                StatusEvent::new(exit.service, ConnectionStatus::Error)
                    .with_message("adapter task panicked"),
            );
        } else {
            info!(service = %exit.service, generation = exit.generation, "service task exited");
        }
        self.publish_snapshot();
    }

    async fn send(&self, msg: OutboundMessage) {
        let adapter = self
            .handles
            .get(&msg.service)
            .filter(|h| h.state == ServiceState::Running)
            .and_then(|h| h.adapter.clone());
        match adapter {
            Some(adapter) => adapter.send(&msg.text).await,
            None => warn!(service = %msg.service, "outbound message dropped, service not running"),
        }
    }

    fn set_state(&mut self, service: Platform, state: ServiceState) {
        if let Some(handle) = self.handles.get_mut(&service) {
            handle.state = state;
        }
        self.publish_snapshot();
    }

    fn publish_snapshot(&self) {
        let services = self
            .handles
            .iter()
            .map(|(platform, handle)| {
                (*platform, ServiceInfo {
                    state: handle.state,
                    generation: (handle.generation > 0).then_some(handle.generation),
                    started_at: handle.started_at,
                })
            })
            .collect();
        self.snapshot.send_replace(ServiceSnapshot { services });
    }

    fn publish_status(&self, status: StatusEvent) {
        if let Err(e) = self.bus.publish(status) {
            debug!(error = %e, "status not published");
        }
    }
}

#[async_trait]
impl EventHandler for ServiceController {
    async fn handle(&mut self, event: &Event) -> anyhow::Result<()> {
        match event {
            Event::Control(cmd) => self.apply(*cmd).await,
            Event::Outbound(msg) => self.send(msg.clone()).await,
            Event::TaskExited(exit) => self.task_exited(*exit),
            Event::Chat(_) | Event::Status(_) => {},
        }
        Ok(())
    }
}

/// Run one adapter generation and report its exit on the bus.
async fn supervise(
    adapter: Arc<dyn PlatformAdapter>,
    bus: EventBus,
    service: Platform,
    generation: u64,
) {
    let panicked = match AssertUnwindSafe(adapter.run()).catch_unwind().await {
        Ok(()) => false,
        Err(panic) => {
            error!(
                service = %service,
                generation,
                panic = %panic_message(panic.as_ref()),
                "adapter task panicked"
            );
            true
        },
    };
    let exit = TaskExited {
        service,
        generation,
        panicked,
    };
    if bus.publish(exit).is_err() {
        debug!(service = %service, generation, "task exit not published, bus closed");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
