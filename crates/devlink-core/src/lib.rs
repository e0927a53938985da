//! # devlink-core
//!
//! Shared vocabulary for the devlink client runtime.
//!
//! - **Interface catalog**: [`schema`] lists every capability a device can
//!   advertise and the methods/properties it contributes
//! - **Branded IDs**: [`CorrelationId`] and [`ListenerId`] newtypes
//! - **Wire types**: [`wire`] holds the JSON frames exchanged with the server
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` subscriber

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;
pub mod schema;
pub mod wire;

pub use ids::{CorrelationId, ListenerId};
pub use schema::InterfaceDescriptor;
pub use wire::{EventDetails, InboundMessage, OutboundMessage, ResultFrame, SyncFrame, is_truthy};
