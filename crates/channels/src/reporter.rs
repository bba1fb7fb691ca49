use {
    chatrelay_bus::EventBus,
    chatrelay_protocol::{ChatEvent, ConnectionStatus, Platform, StatusEvent},
    tracing::{debug, trace},
};

/// Publishes an adapter's status changes and chat events on the bus.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    platform: Platform,
    bus: EventBus,
}

impl StatusReporter {
    pub fn new(platform: Platform, bus: EventBus) -> Self {
        Self { platform, bus }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn status(&self, status: ConnectionStatus, message: Option<String>) {
        debug!(service = %self.platform, %status, message = message.as_deref().unwrap_or(""), "status");
        let mut event = StatusEvent::new(self.platform, status);
        event.message = message;
        if self.bus.publish(event).is_err() {
            trace!(service = %self.platform, "status dropped, bus closed");
        }
    }

    pub fn connecting(&self) {
        self.status(ConnectionStatus::Connecting, None);
    }

    pub fn connected(&self) {
        self.status(ConnectionStatus::Connected, None);
    }

    pub fn waiting(&self, message: impl Into<String>) {
        self.status(ConnectionStatus::Waiting, Some(message.into()));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.status(ConnectionStatus::Error, Some(message.into()));
    }

    pub fn disabled(&self, message: impl Into<String>) {
        self.status(ConnectionStatus::Disabled, Some(message.into()));
    }

    pub fn stopped(&self) {
        self.status(ConnectionStatus::Stopped, None);
    }

    pub fn chat(&self, event: ChatEvent) {
        if self.bus.publish(event).is_err() {
            trace!(service = %self.platform, "chat event dropped, bus closed");
        }
    }
}
