//! Settings snapshot shape.
//!
//! `server` and `runtime` are owned by the core. The per-platform sections
//! (`[twitch]`, `[youtube]`, `[bridge]`) are carried as raw JSON and decoded
//! by the adapter that owns them, so adding a platform never touches this
//! crate.

use std::time::Duration;

use {
    chatrelay_protocol::Platform,
    serde::{Deserialize, Serialize, de::DeserializeOwned},
};

use crate::error::{Error, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub runtime: RuntimeConfig,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub twitch: serde_json::Value,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub youtube: serde_json::Value,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub bridge: serde_json::Value,
}

impl Settings {
    /// Raw section for `platform` (`Null` when absent).
    pub fn section(&self, platform: Platform) -> &serde_json::Value {
        match platform {
            Platform::Twitch => &self.twitch,
            Platform::Youtube => &self.youtube,
            Platform::Bridge => &self.bridge,
        }
    }

    pub fn section_mut(&mut self, platform: Platform) -> &mut serde_json::Value {
        match platform {
            Platform::Twitch => &mut self.twitch,
            Platform::Youtube => &mut self.youtube,
            Platform::Bridge => &mut self.bridge,
        }
    }

    /// Decode a platform section into its typed shape.
    ///
    /// An absent section yields `T::default()`, so adapters can report
    /// missing credentials instead of failing to parse.
    pub fn platform_config<T>(&self, platform: Platform) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        let raw = self.section(platform);
        if raw.is_null() {
            return Ok(T::default());
        }
        serde_json::from_value(raw.clone()).map_err(|source| Error::Section {
            section: platform.to_string(),
            source,
        })
    }

    /// Platforms whose effective settings differ between `self` and `new`.
    ///
    /// Runtime timing changes affect every adapter because the retry delay is
    /// baked in when an adapter starts.
    pub fn changed_platforms(&self, new: &Settings) -> Vec<Platform> {
        if self.runtime.retry_delay_ms != new.runtime.retry_delay_ms {
            return Platform::ALL.to_vec();
        }
        Platform::ALL
            .into_iter()
            .filter(|p| self.section(*p) != new.section(*p))
            .collect()
    }
}

/// HTTP/WebSocket server for the dashboard and control surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "127.0.0.1".
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8765,
        }
    }
}

/// Lifecycle timing and startup behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Fixed delay before an adapter retries a failed connection.
    pub retry_delay_ms: u64,
    /// How long `stop` waits for an adapter task before aborting it.
    pub stop_timeout_ms: u64,
    /// Pause between the stop and start halves of a restart.
    pub restart_pause_ms: u64,
    /// Upper bound for draining the event bus on shutdown.
    pub drain_timeout_ms: u64,
    /// Wait after issuing shutdown stop commands before draining.
    pub shutdown_grace_ms: u64,
    /// Services started when the process boots.
    pub autostart: Vec<Platform>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: 5_000,
            stop_timeout_ms: 5_000,
            restart_pause_ms: 500,
            drain_timeout_ms: 2_000,
            shutdown_grace_ms: 1_000,
            autostart: Platform::ALL.to_vec(),
        }
    }
}

impl RuntimeConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn restart_pause(&self) -> Duration {
        Duration::from_millis(self.restart_pause_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct Probe {
        host: String,
        port: u16,
    }

    #[test]
    fn defaults() {
        let s = Settings::default();
        assert_eq!(s.server.port, 8765);
        assert_eq!(s.runtime.retry_delay(), Duration::from_secs(5));
        assert_eq!(s.runtime.autostart, Platform::ALL.to_vec());
        assert!(s.twitch.is_null());
    }

    #[test]
    fn absent_section_decodes_to_default() {
        let s = Settings::default();
        let probe: Probe = s.platform_config(Platform::Bridge).unwrap();
        assert_eq!(probe, Probe::default());
    }

    #[test]
    fn bad_section_reports_platform() {
        let s = Settings {
            bridge: json!({ "port": "not a number" }),
            ..Default::default()
        };
        let err = s.platform_config::<Probe>(Platform::Bridge).unwrap_err();
        assert!(err.to_string().starts_with("invalid [bridge] section"));
    }

    #[test]
    fn changed_platforms_diffs_sections() {
        let old = Settings {
            twitch: json!({ "nick": "a" }),
            bridge: json!({ "port": 1 }),
            ..Default::default()
        };
        let mut new = old.clone();
        assert!(old.changed_platforms(&new).is_empty());

        new.bridge = json!({ "port": 2 });
        new.server.port = 9999;
        assert_eq!(old.changed_platforms(&new), vec![Platform::Bridge]);

        new.runtime.retry_delay_ms = 1;
        assert_eq!(old.changed_platforms(&new), Platform::ALL.to_vec());
    }
}
