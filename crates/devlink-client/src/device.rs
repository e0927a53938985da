//! Capability-gated device handles.
//!
//! A [`DeviceHandle`] is nothing but a device id and a reference to the
//! session. Every read goes to the session's [`StateStore`], and every method
//! call is checked against the interfaces the device currently advertises.
//!
//! [`StateStore`]: crate::state::StateStore

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use devlink_core::schema::{self, IDENTITY_PROPERTY, VIDEO_STREAM_METHOD};
use devlink_core::wire::EventDetails;
use devlink_core::OutboundMessage;

use crate::errors::{ClientError, Result};
use crate::listeners::ListenerRegistration;
use crate::session::ClientSession;
use crate::state::{DeviceRecord, PropertyState};

/// Handle to one mirrored device.
#[derive(Clone)]
pub struct DeviceHandle {
    id: String,
    session: Arc<ClientSession>,
}

/// What a name resolves to on a device.
#[derive(Debug)]
pub enum Member {
    /// A cached property or identity field.
    Value(Value),
    /// A method the device's interfaces grant.
    Method(DeviceMethod),
    /// A helper implemented locally.
    Helper(LocalHelper),
    /// Nothing by that name.
    Undefined,
}

/// Helpers every device exposes regardless of its interfaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocalHelper {
    /// Register a per-device listener.
    Listen,
    /// Rename the device.
    SetName,
    /// Move the device to another room.
    SetRoom,
    /// Change the device type.
    SetType,
}

impl LocalHelper {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "listen" => Some(Self::Listen),
            "setName" => Some(Self::SetName),
            "setRoom" => Some(Self::SetRoom),
            "setType" => Some(Self::SetType),
            _ => None,
        }
    }
}

/// Outcome of a method invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Invocation {
    /// The method frame was queued; no reply is expected.
    Sent,
    /// Nothing was sent; hand this descriptor to a video consumer instead.
    VideoStream(VideoStreamRequest),
}

/// Descriptor returned in place of a `getVideoStream` call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VideoStreamRequest {
    /// Device id.
    pub id: String,
    /// Method name.
    pub method: String,
}

/// A method resolved against a device's interfaces.
#[derive(Clone)]
pub struct DeviceMethod {
    device_id: String,
    name: String,
    session: Arc<ClientSession>,
}

impl DeviceMethod {
    /// Method name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the method with positional arguments.
    pub fn call(&self, args: Vec<Value>) -> Result<Invocation> {
        if self.name == VIDEO_STREAM_METHOD {
            return Ok(Invocation::VideoStream(VideoStreamRequest {
                id: self.device_id.clone(),
                method: self.name.clone(),
            }));
        }
        self.session.send(&OutboundMessage::Method {
            id: self.device_id.clone(),
            method: self.name.clone(),
            arg_array: args,
        })?;
        Ok(Invocation::Sent)
    }
}

impl fmt::Debug for DeviceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceMethod")
            .field("device_id", &self.device_id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl DeviceHandle {
    pub(crate) fn new(id: String, session: Arc<ClientSession>) -> Self {
        Self { id, session }
    }

    /// Device id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the store still holds a record for this device.
    pub fn exists(&self) -> bool {
        self.session.state().contains(&self.id)
    }

    /// Copy of the device's full record.
    pub fn record(&self) -> Option<DeviceRecord> {
        self.session.state().device(&self.id)
    }

    /// Cached state of one property.
    pub fn state(&self, property: &str) -> Option<PropertyState> {
        self.session.state().property(&self.id, property)
    }

    /// Cached value of one property.
    pub fn property(&self, property: &str) -> Option<Value> {
        self.session.state().value(&self.id, property)
    }

    fn string_property(&self, property: &str) -> Option<String> {
        self.property(property)
            .and_then(|v| v.as_str().map(str::to_owned))
    }

    /// Advertised interfaces; empty when unknown.
    pub fn interfaces(&self) -> Vec<String> {
        self.session
            .state()
            .interfaces(&self.id)
            .unwrap_or_default()
    }

    /// Display name.
    pub fn name(&self) -> Option<String> {
        self.string_property("name")
    }

    /// Room the device is assigned to.
    pub fn room(&self) -> Option<String> {
        self.string_property("room")
    }

    /// Device type, e.g. `Light` or `Camera`.
    pub fn device_type(&self) -> Option<String> {
        self.string_property("type")
    }

    /// Component that provides the device.
    pub fn component(&self) -> Option<String> {
        self.string_property("component")
    }

    /// Free-form metadata.
    pub fn metadata(&self) -> Option<Value> {
        self.property("metadata")
    }

    /// Every method the device's interfaces currently grant, for enumeration.
    pub fn methods(&self) -> BTreeSet<&'static str> {
        let interfaces = self.interfaces();
        schema::methods_for(interfaces.iter().map(String::as_str))
    }

    /// Resolve `name` to a callable method, if granted.
    pub fn method(&self, name: &str) -> Option<DeviceMethod> {
        let interfaces = self.interfaces();
        if !schema::grants_method(interfaces.iter().map(String::as_str), name) {
            return None;
        }
        Some(DeviceMethod {
            device_id: self.id.clone(),
            name: name.to_string(),
            session: Arc::clone(&self.session),
        })
    }

    /// Invoke a granted method.
    pub fn invoke(&self, name: &str, args: Vec<Value>) -> Result<Invocation> {
        let method = self
            .method(name)
            .ok_or_else(|| ClientError::MethodNotAvailable {
                device_id: self.id.clone(),
                method: name.to_string(),
            })?;
        method.call(args)
    }

    /// Resolve a member name.
    ///
    /// Order: no record → undefined; identity fields; schema properties;
    /// schema methods (gated by interfaces); local helpers.
    pub fn resolve(&self, name: &str) -> Member {
        if !self.exists() {
            return Member::Undefined;
        }
        if schema::is_reserved(name) {
            if name == IDENTITY_PROPERTY {
                return Member::Value(Value::String(self.id.clone()));
            }
            return self.property(name).map_or(Member::Undefined, Member::Value);
        }
        if schema::is_property(name) {
            return self.property(name).map_or(Member::Undefined, Member::Value);
        }
        if schema::is_method(name) {
            return self.method(name).map_or(Member::Undefined, Member::Method);
        }
        LocalHelper::from_name(name).map_or(Member::Undefined, Member::Helper)
    }

    /// Listen to every event about this device.
    pub fn listen<F>(&self, listener: F) -> ListenerRegistration
    where
        F: Fn(Option<DeviceHandle>, &EventDetails, &Value) + Send + Sync + 'static,
    {
        let id = self.id.clone();
        self.session
            .listeners()
            .register(move |device, details, data| {
                if device.as_ref().is_some_and(|d| d.id == id) {
                    listener(device, details, data);
                }
            })
    }

    /// Listen to events about this device reported through one interface.
    pub fn listen_to<F>(&self, interface: &str, listener: F) -> ListenerRegistration
    where
        F: Fn(Option<DeviceHandle>, &EventDetails, &Value) + Send + Sync + 'static,
    {
        let interface = interface.to_string();
        self.listen(move |device, details, data| {
            if details.event_interface.as_deref() == Some(interface.as_str()) {
                listener(device, details, data);
            }
        })
    }

    /// Not carried by the wire protocol.
    pub fn set_name(&self, _name: &str) -> Result<()> {
        Err(ClientError::unimplemented("setName"))
    }

    /// Not carried by the wire protocol.
    pub fn set_room(&self, _room: &str) -> Result<()> {
        Err(ClientError::unimplemented("setRoom"))
    }

    /// Not carried by the wire protocol.
    pub fn set_type(&self, _device_type: &str) -> Result<()> {
        Err(ClientError::unimplemented("setType"))
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateStore;
    use assert_matches::assert_matches;
    use parking_lot::Mutex;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn sync(id: &str, property: &str, interface: &str, data: &Value) -> String {
        json!({
            "type": "sync",
            "id": id,
            "eventDetails": {"property": property, "eventTime": 1, "eventInterface": interface},
            "eventData": data,
        })
        .to_string()
    }

    fn switch_device() -> (DeviceHandle, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(8);
        let session = ClientSession::new(Arc::new(StateStore::new()), tx);
        session.ingest(&sync("light1", "interfaces", "Device", &json!(["Switch", "Online"])));
        session.ingest(&sync("light1", "name", "Device", &json!("Porch")));
        session.ingest(&sync("light1", "on", "Switch", &json!(false)));
        (DeviceHandle::new("light1".into(), session), rx)
    }

    #[test]
    fn switch_grants_turn_on_but_not_set_brightness() {
        let (device, _rx) = switch_device();
        assert_matches!(device.resolve("turnOn"), Member::Method(m) => assert_eq!(m.name(), "turnOn"));
        assert_matches!(device.resolve("setBrightness"), Member::Undefined);
        assert!(device.methods().contains("turnOff"));
        assert!(!device.methods().contains("setBrightness"));
    }

    #[test]
    fn every_enumerated_method_resolves() {
        let (device, _rx) = switch_device();
        for name in device.methods() {
            assert_matches!(device.method(name), Some(m) => assert_eq!(m.name(), name));
        }
        assert!(device.method("getVideoStream").is_none());
    }

    #[tokio::test]
    async fn invoke_sends_method_frame() {
        let (device, mut rx) = switch_device();
        assert_eq!(device.invoke("turnOn", vec![]).unwrap(), Invocation::Sent);

        let frame: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(
            frame,
            json!({"type": "method", "id": "light1", "method": "turnOn", "argArray": []})
        );
    }

    #[test]
    fn invoking_ungranted_method_fails() {
        let (device, _rx) = switch_device();
        assert_matches!(
            device.invoke("setBrightness", vec![json!(50)]),
            Err(ClientError::MethodNotAvailable { method, .. }) => assert_eq!(method, "setBrightness")
        );
    }

    #[test]
    fn video_stream_returns_descriptor_without_sending() {
        let (tx, mut rx) = mpsc::channel(8);
        let session = ClientSession::new(Arc::new(StateStore::new()), tx);
        session.ingest(&sync("cam1", "interfaces", "Device", &json!(["VideoCamera"])));
        let device = DeviceHandle::new("cam1".into(), session);

        let outcome = device.invoke(VIDEO_STREAM_METHOD, vec![]).unwrap();
        assert_eq!(
            outcome,
            Invocation::VideoStream(VideoStreamRequest {
                id: "cam1".into(),
                method: "getVideoStream".into(),
            })
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn resolution_order() {
        let (device, _rx) = switch_device();
        assert_matches!(device.resolve("id"), Member::Value(v) => assert_eq!(v, json!("light1")));
        assert_matches!(device.resolve("name"), Member::Value(v) => assert_eq!(v, json!("Porch")));
        assert_matches!(device.resolve("room"), Member::Undefined);
        assert_matches!(device.resolve("on"), Member::Value(v) => assert_eq!(v, json!(false)));
        assert_matches!(device.resolve("brightness"), Member::Undefined);
        assert_matches!(device.resolve("listen"), Member::Helper(LocalHelper::Listen));
        assert_matches!(device.resolve("setRoom"), Member::Helper(LocalHelper::SetRoom));
        assert_matches!(device.resolve("frobnicate"), Member::Undefined);
    }

    #[test]
    fn unknown_device_resolves_nothing() {
        let (tx, _rx) = mpsc::channel(8);
        let session = ClientSession::new(Arc::new(StateStore::new()), tx);
        let device = DeviceHandle::new("ghost".into(), session);
        assert!(!device.exists());
        assert_matches!(device.resolve("id"), Member::Undefined);
        assert_matches!(device.resolve("listen"), Member::Undefined);
        assert!(device.interfaces().is_empty());
    }

    #[test]
    fn typed_accessors() {
        let (device, _rx) = switch_device();
        assert_eq!(device.name().as_deref(), Some("Porch"));
        assert_eq!(device.interfaces(), vec!["Switch".to_string(), "Online".to_string()]);
        assert!(device.device_type().is_none());
        assert!(device.metadata().is_none());
        assert_eq!(device.state("on").unwrap().source_interface.as_deref(), Some("Switch"));
    }

    #[test]
    fn unimplemented_setters_fail() {
        let (device, _rx) = switch_device();
        assert_matches!(device.set_name("x"), Err(ClientError::Unimplemented { operation: "setName" }));
        assert_matches!(device.set_room("x"), Err(ClientError::Unimplemented { operation: "setRoom" }));
        assert_matches!(device.set_type("x"), Err(ClientError::Unimplemented { operation: "setType" }));
    }

    #[test]
    fn per_device_and_per_interface_listeners_filter() {
        let (tx, _rx) = mpsc::channel(8);
        let session = ClientSession::new(Arc::new(StateStore::new()), tx);
        session.ingest(&sync("a", "on", "Switch", &json!(true)));
        let device = DeviceHandle::new("a".into(), Arc::clone(&session));

        let all = Arc::new(Mutex::new(Vec::new()));
        let switch_only = Arc::new(Mutex::new(Vec::new()));
        let all_sink = Arc::clone(&all);
        let switch_sink = Arc::clone(&switch_only);
        let _r1 = device.listen(move |_, d, _| all_sink.lock().push(d.property.clone()));
        let _r2 = device.listen_to("Switch", move |_, d, _| switch_sink.lock().push(d.property.clone()));

        session.ingest(&sync("a", "on", "Switch", &json!(false)));
        session.ingest(&sync("a", "online", "Online", &json!(true)));
        session.ingest(&sync("b", "on", "Switch", &json!(true)));

        assert_eq!(*all.lock(), vec![Some("on".to_string()), Some("online".to_string())]);
        assert_eq!(*switch_only.lock(), vec![Some("on".to_string())]);
    }
}
