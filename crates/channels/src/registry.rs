use std::{collections::HashMap, sync::Arc, time::Duration};

use {
    chatrelay_bus::EventBus,
    chatrelay_config::Settings,
    chatrelay_protocol::Platform,
};

use crate::{
    adapter::PlatformAdapter,
    error::{Error, Result},
    reporter::StatusReporter,
    retry::Backoff,
};

/// Everything a factory needs to build a fresh adapter.
#[derive(Debug, Clone)]
pub struct AdapterContext {
    pub bus: EventBus,
    /// Settings snapshot current at the time of the start command.
    pub settings: Arc<Settings>,
}

impl AdapterContext {
    pub fn new(bus: EventBus, settings: Arc<Settings>) -> Self {
        Self { bus, settings }
    }

    pub fn reporter(&self, platform: Platform) -> StatusReporter {
        StatusReporter::new(platform, self.bus.clone())
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::fixed(Duration::from_millis(self.settings.runtime.retry_delay_ms))
    }
}

/// Builds a new adapter instance for one service start.
pub trait AdapterFactory: Send + Sync {
    fn build(&self, ctx: &AdapterContext) -> Result<Arc<dyn PlatformAdapter>>;
}

impl<F> AdapterFactory for F
where
    F: Fn(&AdapterContext) -> Result<Arc<dyn PlatformAdapter>> + Send + Sync,
{
    fn build(&self, ctx: &AdapterContext) -> Result<Arc<dyn PlatformAdapter>> {
        self(ctx)
    }
}

/// Maps each service to the factory that builds its adapter.
#[derive(Default)]
pub struct AdapterRegistry {
    factories: HashMap<Platform, Box<dyn AdapterFactory>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, platform: Platform, factory: impl AdapterFactory + 'static) {
        self.factories.insert(platform, Box::new(factory));
    }

    #[must_use]
    pub fn with(mut self, platform: Platform, factory: impl AdapterFactory + 'static) -> Self {
        self.register(platform, factory);
        self
    }

    pub fn build(&self, platform: Platform, ctx: &AdapterContext) -> Result<Arc<dyn PlatformAdapter>> {
        self.factories
            .get(&platform)
            .ok_or(Error::NotRegistered(platform))?
            .build(ctx)
    }

    pub fn contains(&self, platform: Platform) -> bool {
        self.factories.contains_key(&platform)
    }

    /// Registered services in canonical order.
    pub fn platforms(&self) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|p| self.factories.contains_key(p))
            .collect()
    }
}
