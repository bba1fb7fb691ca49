//! Scripted adapters and helpers shared by the gateway integration tests.
#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    chatrelay_bus::{Event, Topic},
    chatrelay_channels::{
        AdapterContext, AdapterRegistry, Error, PlatformAdapter, Result, StatusReporter,
    },
    chatrelay_config::Settings,
    chatrelay_gateway::{Orchestrator, ServiceInfo, ServiceState},
    chatrelay_protocol::{ChatEvent, ConnectionStatus, Platform, StatusEvent},
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// What a scripted adapter does once `run` is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    /// Connect, then wait for `stop`.
    Cooperative,
    /// Connect, then ignore `stop`.
    Stubborn,
    /// Return right away.
    ExitImmediately,
    Panic,
    /// Fail `check_config`.
    Unconfigured,
    /// The factory panics on its first build, then behaves like `Cooperative`.
    PanicOnFirstBuild,
}

/// Observations shared by every adapter built from one factory.
#[derive(Default)]
pub struct Observations {
    pub live: AtomicUsize,
    pub max_live: AtomicUsize,
    pub runs: AtomicUsize,
    pub sent: Mutex<Vec<String>>,
    /// Platform section seen by each build, in order.
    pub sections: Mutex<Vec<serde_json::Value>>,
}

impl Observations {
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

struct LiveGuard(Arc<Observations>);

impl LiveGuard {
    fn enter(observed: &Arc<Observations>) -> Self {
        let live = observed.live.fetch_add(1, Ordering::SeqCst) + 1;
        observed.max_live.fetch_max(live, Ordering::SeqCst);
        observed.runs.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(observed))
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.live.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct ScriptedAdapter {
    platform: Platform,
    script: Script,
    observed: Arc<Observations>,
    reporter: StatusReporter,
    cancel: CancellationToken,
}

#[async_trait]
impl PlatformAdapter for ScriptedAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn check_config(&self) -> Result<()> {
        match self.script {
            Script::Unconfigured => Err(Error::missing_config(self.platform, vec!["token"])),
            _ => Ok(()),
        }
    }

    async fn run(&self) {
        let _guard = LiveGuard::enter(&self.observed);
        self.reporter.connecting();
        match self.script {
            Script::Cooperative | Script::PanicOnFirstBuild => {
                self.reporter.connected();
                self.cancel.cancelled().await;
            },
            Script::Stubborn => {
                self.reporter.connected();
                std::future::pending::<()>().await;
            },
            Script::ExitImmediately | Script::Unconfigured => {},
            Script::Panic => panic!("scripted adapter failure"),
        }
        self.reporter.stopped();
    }

    async fn send(&self, text: &str) {
        self.observed.sent.lock().unwrap().push(text.to_string());
    }

    fn stop(&self) {
        self.cancel.cancel();
    }
}

/// Register a scripted adapter for `platform` and return its observed.
pub fn register(registry: &mut AdapterRegistry, platform: Platform, script: Script) -> Arc<Observations> {
    let observed = Arc::new(Observations::default());
    let shared = Arc::clone(&observed);
    registry.register(
        platform,
        move |ctx: &AdapterContext| -> Result<Arc<dyn PlatformAdapter>> {
            let builds = {
                let mut sections = shared.sections.lock().unwrap();
                sections.push(ctx.settings.section(platform).clone());
                sections.len()
            };
            if script == Script::PanicOnFirstBuild && builds == 1 {
                panic!("scripted factory failure");
            }
            Ok(Arc::new(ScriptedAdapter {
                platform,
                script,
                observed: Arc::clone(&shared),
                reporter: ctx.reporter(platform),
                cancel: CancellationToken::new(),
            }))
        },
    );
    observed
}

/// Settings with timings short enough for tests and nothing autostarted.
pub fn fast_settings() -> Settings {
    let mut settings = Settings::default();
    settings.runtime.retry_delay_ms = 20;
    settings.runtime.stop_timeout_ms = 200;
    settings.runtime.restart_pause_ms = 10;
    settings.runtime.drain_timeout_ms = 1_000;
    settings.runtime.shutdown_grace_ms = 100;
    settings.runtime.autostart = Vec::new();
    settings
}

/// An orchestrator plus a channel tapping every bus event.
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub events: mpsc::UnboundedReceiver<Event>,
}

impl Harness {
    pub fn new(settings: Settings, registry: AdapterRegistry) -> Self {
        let orchestrator = Orchestrator::spawn(settings, registry).unwrap();
        let (_, events) = orchestrator.bus().subscribe_channel(Topic::All).unwrap();
        Self {
            orchestrator,
            events,
        }
    }

    /// Wait until every event published so far has been handled, and
    /// return what the tap saw meanwhile.
    ///
    /// The controller subscribed first, so it has handled everything before a
    /// marker by the time the marker reaches this tap. A second marker picks
    /// up events published while those commands were being handled.
    pub async fn flush(&mut self) -> Vec<Event> {
        let mut seen = Vec::new();
        for _ in 0..2 {
            let marker = uuid::Uuid::new_v4().to_string();
            self.orchestrator
                .bus()
                .publish(ChatEvent::new(Platform::Bridge, "flush", "test", marker.clone()))
                .unwrap();
            loop {
                match self.next_event().await {
                    Event::Chat(c) if c.channel == "flush" && c.text == marker => break,
                    event => seen.push(event),
                }
            }
        }
        seen
    }

    pub async fn next_event(&mut self) -> Event {
        tokio::time::timeout(TIMEOUT, self.events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("bus closed")
    }

    pub async fn wait_status(&mut self, service: Platform, want: ConnectionStatus) -> StatusEvent {
        loop {
            if let Event::Status(s) = self.next_event().await
                && s.platform == service
                && s.status == want
            {
                return s;
            }
        }
    }

    pub async fn wait_for(&self, service: Platform, pred: impl Fn(&ServiceInfo) -> bool) {
        let mut rx = self.orchestrator.services();
        tokio::time::timeout(TIMEOUT, async move {
            rx.wait_for(|snap| snap.services.get(&service).is_some_and(&pred))
                .await
                .is_ok()
        })
        .await
        .expect("timed out waiting for service state");
    }

    pub async fn wait_state(&self, service: Platform, state: ServiceState) {
        self.wait_for(service, |info| info.state == state).await;
    }

    pub fn info(&self, service: Platform) -> ServiceInfo {
        self.orchestrator
            .services()
            .borrow()
            .services
            .get(&service)
            .cloned()
            .unwrap_or_default()
    }
}

/// Statuses reported for `service`, in order.
pub fn statuses(events: &[Event], service: Platform) -> Vec<ConnectionStatus> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Status(s) if s.platform == service => Some(s.status),
            _ => None,
        })
        .collect()
}

pub async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(TIMEOUT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached");
}
