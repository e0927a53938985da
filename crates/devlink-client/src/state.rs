//! Mirrored device state.
//!
//! [`StateStore`] is the single source of truth for everything the client
//! knows about the server's devices: device id → property name →
//! [`PropertyState`]. It is seeded from the HTTP snapshot and then advanced
//! one [`SyncFrame`] at a time by the session's inbound path.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use devlink_core::schema::INTERFACES_PROPERTY;
use devlink_core::wire::{EventDetails, SyncFrame};

/// Cached state of one property of one device.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyState {
    /// Current value.
    #[serde(default)]
    pub value: Value,
    /// When the value last actually changed (epoch ms).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_time: Option<u64>,
    /// When the property was last reported, changed or not (epoch ms).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_time: Option<u64>,
    /// Interface that last reported the property.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_interface: Option<String>,
}

impl PropertyState {
    /// Apply one reported event.
    ///
    /// `stateTime` moves to the event time only when the value differs from
    /// the stored one (or the property was never seen); a repeated value keeps
    /// it pinned. Everything else is overwritten unconditionally.
    fn record(&mut self, details: &EventDetails, data: Value, is_new: bool) {
        let changed = is_new || self.value != data;
        self.state_time = if changed {
            details.event_time
        } else {
            self.state_time.or(self.last_event_time)
        };
        self.last_event_time = details.event_time;
        self.source_interface.clone_from(&details.event_interface);
        self.value = data;
    }
}

/// Property name → cached state, for one device.
pub type DeviceRecord = HashMap<String, PropertyState>;

/// Device id → record; the shape of the HTTP snapshot.
pub type SystemState = HashMap<String, DeviceRecord>;

/// Live mirror of the server's device state.
#[derive(Debug, Default)]
pub struct StateStore {
    devices: RwLock<SystemState>,
}

impl StateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded from a snapshot.
    pub fn from_snapshot(snapshot: SystemState) -> Self {
        Self {
            devices: RwLock::new(snapshot),
        }
    }

    /// Apply a sync frame and return the property's new state.
    ///
    /// Frames without a property name are ignored and return `None`.
    pub fn apply(&self, frame: &SyncFrame) -> Option<PropertyState> {
        let property = frame.event_details.property.as_deref()?;
        let mut devices = self.devices.write();
        let record = devices.entry(frame.id.clone()).or_default();
        let is_new = !record.contains_key(property);
        let state = record.entry(property.to_owned()).or_default();
        state.record(&frame.event_details, frame.event_data.clone(), is_new);
        Some(state.clone())
    }

    /// Whether a record exists for the device.
    pub fn contains(&self, device_id: &str) -> bool {
        self.devices.read().contains_key(device_id)
    }

    /// Copy of one device's record.
    pub fn device(&self, device_id: &str) -> Option<DeviceRecord> {
        self.devices.read().get(device_id).cloned()
    }

    /// Copy of one property's state.
    pub fn property(&self, device_id: &str, property: &str) -> Option<PropertyState> {
        self.devices
            .read()
            .get(device_id)
            .and_then(|record| record.get(property))
            .cloned()
    }

    /// Current value of one property.
    pub fn value(&self, device_id: &str, property: &str) -> Option<Value> {
        self.devices
            .read()
            .get(device_id)
            .and_then(|record| record.get(property))
            .map(|state| state.value.clone())
    }

    /// The device's advertised interfaces; `None` when the device or the
    /// property is missing or not an array.
    pub fn interfaces(&self, device_id: &str) -> Option<Vec<String>> {
        let devices = self.devices.read();
        let value = &devices.get(device_id)?.get(INTERFACES_PROPERTY)?.value;
        let list = value.as_array()?;
        Some(
            list.iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect(),
        )
    }

    /// Remove a device's record.
    pub fn remove(&self, device_id: &str) -> Option<DeviceRecord> {
        self.devices.write().remove(device_id)
    }

    /// Ids of all mirrored devices, sorted.
    pub fn device_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.devices.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of mirrored devices.
    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    /// Whether no device is mirrored.
    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }

    /// Copy of the whole table.
    pub fn snapshot(&self) -> SystemState {
        self.devices.read().clone()
    }
}
