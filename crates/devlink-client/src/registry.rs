//! Device lookup and system-level queries.

use std::sync::Arc;

use serde_json::Value;

use devlink_core::OutboundMessage;
use devlink_core::wire::{EventDetails, SystemMethod};

use crate::device::DeviceHandle;
use crate::errors::{ClientError, Result};
use crate::listeners::ListenerRegistration;
use crate::session::ClientSession;
use crate::state::{DeviceRecord, StateStore};

/// Resolves device handles and runs system queries for one session.
#[derive(Clone, Debug)]
pub struct SystemRegistry {
    session: Arc<ClientSession>,
}

impl SystemRegistry {
    /// Create a registry over `session`.
    pub fn new(session: Arc<ClientSession>) -> Self {
        Self { session }
    }

    /// Handle for a mirrored device; `None` when no record exists.
    pub fn get_device_by_id(&self, id: &str) -> Option<DeviceHandle> {
        self.session
            .state()
            .contains(id)
            .then(|| DeviceHandle::new(id.to_string(), Arc::clone(&self.session)))
    }

    /// Not carried by the wire protocol.
    pub fn get_device_by_name(&self, _name: &str) -> Result<Option<DeviceHandle>> {
        Err(ClientError::unimplemented("getDeviceByName"))
    }

    /// Copy of one device's record.
    pub fn get_device_state(&self, id: &str) -> Option<DeviceRecord> {
        self.session.state().device(id)
    }

    /// The live state table. Reads through it always see the latest frames.
    pub fn get_system_state(&self) -> Arc<StateStore> {
        Arc::clone(self.session.state())
    }

    /// Ids of all mirrored devices, sorted.
    pub fn device_ids(&self) -> Vec<String> {
        self.session.state().device_ids()
    }

    /// Listen to every sync event on every device.
    pub fn listen<F>(&self, listener: F) -> ListenerRegistration
    where
        F: Fn(Option<DeviceHandle>, &EventDetails, &Value) + Send + Sync + 'static,
    {
        self.session.listeners().register(listener)
    }

    /// Packages installed on the server.
    pub async fn get_installed_packages(&self) -> Result<Value> {
        self.session
            .request(|result_id| OutboundMessage::System {
                result_id,
                method: SystemMethod::GetInstalledPackages,
            })
            .await
    }
}
