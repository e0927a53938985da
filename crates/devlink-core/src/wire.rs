//! JSON frames exchanged over the duplex channel.
//!
//! Every frame is a JSON object with a `type` discriminator:
//!
//! | `type`   | Direction | Shape |
//! |----------|-----------|-------|
//! | `sync`   | inbound   | `{id, eventDetails, eventData}` |
//! | `system` | both      | request `{resultId, method}`, response `{resultId, result?, error?}` |
//! | `media`  | both      | request `{method, resultId, toMimeType, mediaSource}`, response as `system` |
//! | `method` | outbound  | `{id, method, argArray}` |

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Number, Value};

use crate::ids::CorrelationId;

/// Metadata attached to one property update.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetails {
    /// Property that changed. Frames without one carry nothing to mirror.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    /// Server-side event time, epoch milliseconds. Fractional times are
    /// truncated; negative ones read as absent.
    #[serde(
        default,
        deserialize_with = "deserialize_millis",
        skip_serializing_if = "Option::is_none"
    )]
    pub event_time: Option<u64>,
    /// Interface that reported the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_interface: Option<String>,
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn deserialize_millis<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(number) = Option::<Number>::deserialize(deserializer)? else {
        return Ok(None);
    };
    Ok(number.as_u64().or_else(|| {
        number
            .as_f64()
            .filter(|t| t.is_finite() && *t >= 0.0)
            .map(|t| t.trunc() as u64)
    }))
}

/// One property's new value for one device.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFrame {
    /// Device id.
    pub id: String,
    /// Which property changed, when and through which interface.
    pub event_details: EventDetails,
    /// The new value.
    #[serde(default)]
    pub event_data: Value,
}

/// Response to a broker-mediated request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultFrame {
    /// Correlation id echoed from the request.
    pub result_id: CorrelationId,
    /// Result payload; a falsy value means the call failed.
    #[serde(default)]
    pub result: Option<Value>,
    /// Error payload, usually a message string.
    #[serde(default)]
    pub error: Option<Value>,
}

/// Any frame the server may push to the client.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundMessage {
    /// State update for one device property.
    Sync(SyncFrame),
    /// Response to a `system` request.
    System(ResultFrame),
    /// Response to a `media` request.
    Media(ResultFrame),
    /// A frame kind this client does not consume.
    #[serde(other)]
    Other,
}

impl InboundMessage {
    /// Parse one text frame.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Methods of the `system` message kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SystemMethod {
    /// List the packages installed on the server.
    GetInstalledPackages,
}

/// Methods of the `media` message kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MediaMethod {
    /// Convert a media object into base64-encoded bytes.
    ConvertMediaObjectToBuffer,
    /// Convert a media object into a URI reachable from anywhere.
    ConvertMediaObjectToUri,
    /// Convert a media object into a URI reachable on the server's network.
    ConvertMediaObjectToLocalUri,
}

impl MediaMethod {
    /// Wire name of the method.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConvertMediaObjectToBuffer => "convertMediaObjectToBuffer",
            Self::ConvertMediaObjectToUri => "convertMediaObjectToUri",
            Self::ConvertMediaObjectToLocalUri => "convertMediaObjectToLocalUri",
        }
    }
}

/// Any frame the client may send.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum OutboundMessage {
    /// Fire-and-forget method call on a device.
    Method {
        /// Target device id.
        id: String,
        /// Method name.
        method: String,
        /// Positional arguments.
        arg_array: Vec<Value>,
    },
    /// Broker-mediated system query.
    System {
        /// Correlation id the response will echo.
        result_id: CorrelationId,
        /// Query to run.
        method: SystemMethod,
    },
    /// Broker-mediated media conversion.
    Media {
        /// Conversion to run.
        method: MediaMethod,
        /// Correlation id the response will echo.
        result_id: CorrelationId,
        /// Requested output MIME type.
        to_mime_type: String,
        /// Opaque media object reference as handed out by the server.
        media_source: Value,
    },
}

impl OutboundMessage {
    /// Serialize to a text frame.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// JavaScript truthiness of a JSON value.
///
/// `null`, `false`, `0`, `NaN` and `""` are falsy; everything else, including
/// empty arrays and objects, is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
