//! Static interface catalog.
//!
//! A device advertises the interfaces it implements through its `interfaces`
//! property. Each interface contributes a fixed set of method and property
//! names. The catalog is compiled in and never mutated; the global method and
//! property sets are derived from it once on first use.

use std::collections::{BTreeSet, HashSet};
use std::sync::OnceLock;

/// Property whose falsy value signals that the device was removed.
pub const IDENTITY_PROPERTY: &str = "id";

/// Property holding the list of interfaces a device advertises.
pub const INTERFACES_PROPERTY: &str = "interfaces";

/// Identity fields resolved straight from cached state, before any schema lookup.
pub const RESERVED_FIELDS: [&str; 7] = [
    "id",
    "interfaces",
    "room",
    "name",
    "type",
    "component",
    "metadata",
];

/// The one method answered locally with a stream descriptor instead of a wire call.
pub const VIDEO_STREAM_METHOD: &str = "getVideoStream";

/// A capability: its name plus the methods and properties it contributes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    /// Interface name as advertised in a device's `interfaces` list.
    pub name: &'static str,
    /// Methods callable on devices implementing this interface.
    pub methods: &'static [&'static str],
    /// Properties mirrored for devices implementing this interface.
    pub properties: &'static [&'static str],
}

impl InterfaceDescriptor {
    /// Whether this interface declares `method`.
    pub fn declares_method(&self, method: &str) -> bool {
        self.methods.contains(&method)
    }
}

macro_rules! interface {
    ($name:literal, methods: [$($m:literal),* $(,)?], properties: [$($p:literal),* $(,)?]) => {
        InterfaceDescriptor {
            name: $name,
            methods: &[$($m),*],
            properties: &[$($p),*],
        }
    };
}

static INTERFACES: &[InterfaceDescriptor] = &[
    interface!("Device", methods: [], properties: [
        "id", "info", "interfaces", "name", "room", "type", "component", "metadata", "providerId",
    ]),
    interface!("Switch", methods: ["turnOn", "turnOff"], properties: ["on"]),
    interface!("Brightness", methods: ["setBrightness"], properties: ["brightness"]),
    interface!("ColorSettingTemperature", methods: [
        "getTemperatureMaxK", "getTemperatureMinK", "setColorTemperature",
    ], properties: ["colorTemperature"]),
    interface!("ColorSettingRgb", methods: ["setRgb"], properties: ["rgb"]),
    interface!("ColorSettingHsv", methods: ["setHsv"], properties: ["hsv"]),
    interface!("Notifier", methods: ["sendNotification"], properties: []),
    interface!("StartStop", methods: ["start", "stop"], properties: ["running"]),
    interface!("Pause", methods: ["pause", "resume"], properties: ["paused"]),
    interface!("Dock", methods: ["dock"], properties: ["docked"]),
    interface!("TemperatureSetting", methods: [
        "setThermostatMode",
        "setThermostatSetpoint",
        "setThermostatSetpointHigh",
        "setThermostatSetpointLow",
    ], properties: [
        "thermostatAvailableModes",
        "thermostatMode",
        "thermostatSetpoint",
        "thermostatSetpointHigh",
        "thermostatSetpointLow",
    ]),
    interface!("Thermometer", methods: [], properties: ["temperature", "temperatureUnit"]),
    interface!("HumiditySensor", methods: [], properties: ["humidity"]),
    interface!("Camera", methods: ["takePicture"], properties: []),
    interface!("VideoCamera", methods: ["getVideoStream", "getVideoStreamOptions"], properties: []),
    interface!("Intercom", methods: ["startIntercom", "stopIntercom"], properties: []),
    interface!("Lock", methods: ["lock", "unlock"], properties: ["lockState"]),
    interface!("PasswordStore", methods: ["addPassword", "getPasswords", "removePassword"], properties: []),
    interface!("Scene", methods: ["activate", "deactivate", "isReversible"], properties: []),
    interface!("Entry", methods: ["openEntry", "closeEntry"], properties: []),
    interface!("EntrySensor", methods: [], properties: ["entryOpen"]),
    interface!("Refresh", methods: ["getRefreshFrequency", "refresh"], properties: []),
    interface!("MediaPlayer", methods: ["load", "getMediaStatus", "seek"], properties: []),
    interface!("Program", methods: ["run"], properties: []),
    interface!("Settings", methods: ["getSettings", "putSetting"], properties: []),
    interface!("BinarySensor", methods: [], properties: ["binaryState"]),
    interface!("OccupancySensor", methods: [], properties: ["occupied"]),
    interface!("FloodSensor", methods: [], properties: ["flooded"]),
    interface!("MotionSensor", methods: [], properties: ["motionDetected"]),
    interface!("AudioSensor", methods: [], properties: ["audioDetected"]),
    interface!("Battery", methods: [], properties: ["batteryLevel"]),
    interface!("Online", methods: [], properties: ["online"]),
    interface!("PositionSensor", methods: [], properties: ["position"]),
];

/// Every interface in the catalog.
pub fn descriptors() -> &'static [InterfaceDescriptor] {
    INTERFACES
}

/// Look up one interface by name.
pub fn descriptor(name: &str) -> Option<&'static InterfaceDescriptor> {
    INTERFACES.iter().find(|d| d.name == name)
}

fn all_methods() -> &'static HashSet<&'static str> {
    static METHODS: OnceLock<HashSet<&'static str>> = OnceLock::new();
    METHODS.get_or_init(|| INTERFACES.iter().flat_map(|d| d.methods.iter().copied()).collect())
}

fn all_properties() -> &'static HashSet<&'static str> {
    static PROPERTIES: OnceLock<HashSet<&'static str>> = OnceLock::new();
    PROPERTIES.get_or_init(|| {
        INTERFACES
            .iter()
            .flat_map(|d| d.properties.iter().copied())
            .collect()
    })
}

/// Whether any interface declares `name` as a method.
pub fn is_method(name: &str) -> bool {
    all_methods().contains(name)
}

/// Whether any interface declares `name` as a property.
pub fn is_property(name: &str) -> bool {
    all_properties().contains(name)
}

/// Whether `name` is one of the reserved identity fields.
pub fn is_reserved(name: &str) -> bool {
    RESERVED_FIELDS.contains(&name)
}

/// Union of the methods granted by the given interface names.
///
/// Names missing from the catalog grant nothing.
pub fn methods_for<'a, I>(interfaces: I) -> BTreeSet<&'static str>
where
    I: IntoIterator<Item = &'a str>,
{
    interfaces
        .into_iter()
        .filter_map(descriptor)
        .flat_map(|d| d.methods.iter().copied())
        .collect()
}

/// Whether at least one of `interfaces` declares `method`.
pub fn grants_method<'a, I>(interfaces: I, method: &str) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    interfaces
        .into_iter()
        .filter_map(descriptor)
        .any(|d| d.declares_method(method))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interface_names_are_unique() {
        let names: HashSet<_> = descriptors().iter().map(|d| d.name).collect();
        assert_eq!(names.len(), descriptors().len());
    }

    #[test]
    fn switch_declares_turn_on_but_not_set_brightness() {
        let switch = descriptor("Switch").unwrap();
        assert!(switch.declares_method("turnOn"));
        assert!(!switch.declares_method("setBrightness"));
        assert!(switch.properties.contains(&"on"));
    }

    #[test]
    fn global_sets() {
        assert!(is_method("setBrightness"));
        assert!(is_method(VIDEO_STREAM_METHOD));
        assert!(!is_method("brightness"));
        assert!(is_property("brightness"));
        assert!(is_property("online"));
        assert!(!is_property("turnOn"));
    }

    #[test]
    fn reserved_fields_are_properties_too() {
        for field in RESERVED_FIELDS {
            assert!(is_reserved(field));
            assert!(is_property(field), "{field} missing from Device interface");
        }
        assert!(!is_reserved("online"));
    }

    #[test]
    fn methods_for_unions_interfaces() {
        let methods = methods_for(["Switch", "Brightness"]);
        assert_eq!(
            methods.into_iter().collect::<Vec<_>>(),
            vec!["setBrightness", "turnOff", "turnOn"]
        );
    }

    #[test]
    fn unknown_interface_grants_nothing() {
        assert!(methods_for(["NotARealInterface"]).is_empty());
        assert!(!grants_method(["NotARealInterface"], "turnOn"));
    }

    #[test]
    fn grants_method_checks_membership() {
        assert!(grants_method(["Online", "Switch"], "turnOff"));
        assert!(!grants_method(["Switch"], "setBrightness"));
        assert!(!grants_method(std::iter::empty(), "turnOn"));
    }
}
