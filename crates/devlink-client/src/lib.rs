//! # devlink-client
//!
//! Client runtime for a remote device server.
//!
//! [`connect`] opens a WebSocket channel, seeds a local [`StateStore`] from
//! the server's state snapshot and then keeps it current from inbound `sync`
//! frames. Devices are reached through [`DeviceHandle`]s whose methods are
//! gated by the interfaces each device advertises.
//!
//! ```text
//! Client ── SystemRegistry ─┐
//!        └─ MediaBridge ────┼── ClientSession ── StateStore
//!                           │                 ├─ PendingResultBroker
//! DeviceHandle ─────────────┘                 ├─ ListenerRegistry
//!                                             └─ outbound queue ── channel driver ── WebSocket
//! ```

#![deny(unsafe_code)]

pub mod broker;
mod channel;
pub mod connect;
pub mod device;
pub mod errors;
pub mod listeners;
pub mod media;
pub mod registry;
pub mod session;
pub mod state;

pub use broker::{PendingResult, PendingResultBroker};
pub use connect::{Client, Endpoints, connect, connect_with};
pub use device::{DeviceHandle, DeviceMethod, Invocation, LocalHelper, Member, VideoStreamRequest};
pub use errors::{ClientError, Result};
pub use listeners::{EventListener, ListenerRegistration, ListenerRegistry};
pub use media::MediaBridge;
pub use registry::SystemRegistry;
pub use session::ClientSession;
pub use state::{DeviceRecord, PropertyState, StateStore, SystemState};
