use std::error::Error as StdError;

use chatrelay_protocol::Platform;

/// Crate-wide result type for adapter operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed adapter errors shared across platforms.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Required settings are absent; the adapter reports `disabled` and
    /// does not retry.
    #[error("{platform}: missing configuration: {}", fields.join(", "))]
    MissingConfig {
        platform: Platform,
        fields: Vec<&'static str>,
    },

    /// The platform section exists but could not be decoded.
    #[error(transparent)]
    InvalidConfig(#[from] chatrelay_config::Error),

    /// Connecting to or staying connected with the remote end failed.
    #[error("connection failed: {message}")]
    Connection { message: String },

    /// The remote end sent something we could not make sense of.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// Wrapped source error from a client library (HTTP, WebSocket).
    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The adapter's outbound path is gone (not connected, or stopped).
    #[error("adapter channel closed")]
    Closed,

    /// No factory was registered for the platform.
    #[error("no adapter registered for {0}")]
    NotRegistered(Platform),
}

impl Error {
    #[must_use]
    pub fn missing_config(platform: Platform, fields: Vec<&'static str>) -> Self {
        Self::MissingConfig { platform, fields }
    }

    #[must_use]
    pub fn connection(message: impl std::fmt::Display) -> Self {
        Self::Connection {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn protocol(message: impl std::fmt::Display) -> Self {
        Self::Protocol {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Configuration problems are permanent until the operator fixes them.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::MissingConfig { .. } | Self::InvalidConfig(_))
    }
}
