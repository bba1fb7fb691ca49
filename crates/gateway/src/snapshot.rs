//! Read-only view of the controller's handle table.

use std::collections::BTreeMap;

use {
    chatrelay_protocol::Platform,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

/// Lifecycle state of one service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl ServiceState {
    /// `true` while a task exists or is being created.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub state: ServiceState,
    /// Generation of the current (or last) task, `None` if never started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

/// Published on a `watch` channel after every handle table change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    pub services: BTreeMap<Platform, ServiceInfo>,
}

impl ServiceSnapshot {
    /// Snapshot with every platform in `services` stopped.
    pub fn stopped(services: impl IntoIterator<Item = Platform>) -> Self {
        Self {
            services: services
                .into_iter()
                .map(|p| (p, ServiceInfo::default()))
                .collect(),
        }
    }

    pub fn state(&self, service: Platform) -> ServiceState {
        self.services
            .get(&service)
            .map(|info| info.state)
            .unwrap_or_default()
    }

    pub fn is_active(&self, service: Platform) -> bool {
        self.state(service).is_active()
    }

    pub fn all_stopped(&self) -> bool {
        self.services
            .values()
            .all(|info| info.state == ServiceState::Stopped)
    }
}
