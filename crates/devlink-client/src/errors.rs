//! Client error types.

use thiserror::Error;

/// Errors surfaced by the devlink client.
///
/// Listener panics and responses for unknown correlation ids are not errors:
/// the first is logged at the dispatch site, the second is dropped.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The configured server URL could not be turned into endpoint URLs.
    #[error("invalid server url {url}: {reason}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The duplex channel could not be opened.
    #[error("failed to open channel at {url}: {source}")]
    Connect {
        /// Channel URL.
        url: String,
        /// Underlying WebSocket error.
        #[source]
        source: Box<tokio_tungstenite::tungstenite::Error>,
    },

    /// The initial state snapshot could not be fetched or decoded.
    #[error("failed to fetch state snapshot from {url}: {source}")]
    Snapshot {
        /// Snapshot URL.
        url: String,
        /// Underlying HTTP error.
        #[source]
        source: reqwest::Error,
    },

    /// The peer settled a request with an error.
    #[error("remote call failed: {message}")]
    Remote {
        /// Error message reported by the peer.
        message: String,
    },

    /// The operation is not carried by the wire protocol.
    #[error("{operation} is not implemented")]
    Unimplemented {
        /// Operation name.
        operation: &'static str,
    },

    /// The device does not advertise an interface granting this method.
    #[error("device {device_id} does not expose method {method}")]
    MethodNotAvailable {
        /// Target device.
        device_id: String,
        /// Requested method.
        method: String,
    },

    /// A settled result did not have the expected shape.
    #[error("invalid result for {method}: {reason}")]
    InvalidResult {
        /// Method whose result was rejected.
        method: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// The channel is closed; nothing more can be sent.
    #[error("channel closed")]
    ChannelClosed,

    /// The outbound queue is full.
    #[error("outbound queue full")]
    QueueFull,

    /// The channel ended before the pending request was settled.
    #[error("disconnected before a response arrived")]
    Disconnected,

    /// A frame could not be serialized.
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ClientError {
    pub(crate) fn unimplemented(operation: &'static str) -> Self {
        Self::Unimplemented { operation }
    }

    /// Whether the error was reported by the peer rather than raised locally.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
