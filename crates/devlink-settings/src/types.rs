//! Settings type definitions.
//!
//! Field names are camelCase on disk. Every section implements [`Default`]
//! and is marked `#[serde(default)]`, so a partial JSON file only needs the
//! keys it overrides.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings for a devlink client.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Where and how to reach the server.
    pub connection: ConnectionSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl ClientSettings {
    /// Reject values the client cannot start with.
    pub fn validate(&self) -> Result<()> {
        self.connection.validate()
    }
}

/// Server location and channel parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// Server root, e.g. `https://hub.local:10443`.
    pub base_url: String,
    /// Path prefix of the client endpoint on the server.
    pub endpoint_path: String,
    /// Segment under the endpoint where the WebSocket channel is mounted.
    pub channel_path: String,
    /// Capacity of the outbound frame queue.
    pub outbound_queue_capacity: usize,
    /// Timeout for the initial state snapshot fetch, in milliseconds.
    pub snapshot_timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:10080".to_string(),
            endpoint_path: "/endpoint/@scrypted/ui".to_string(),
            channel_path: "ws".to_string(),
            outbound_queue_capacity: 256,
            snapshot_timeout_ms: 30_000,
        }
    }
}

impl ConnectionSettings {
    /// Defaults pointed at `base_url`.
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Reject values the client cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(SettingsError::InvalidValue("connection.baseUrl is empty".into()));
        }
        if self.outbound_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "connection.outboundQueueCapacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (`trace`, `debug`, `info`, `warn`, `error`) or an `EnvFilter` directive.
    pub level: String,
    /// Emit JSON lines instead of the compact format.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}
