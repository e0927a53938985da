//! Media object conversions.
//!
//! Media objects are opaque references handed out by the server. The bridge
//! asks the server to convert one into bytes or a URI and waits for the
//! correlated `media` response.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;
use tracing::debug;

use devlink_core::OutboundMessage;
use devlink_core::wire::MediaMethod;

use crate::errors::{ClientError, Result};
use crate::session::ClientSession;

/// Server-side media conversions for one session.
#[derive(Clone, Debug)]
pub struct MediaBridge {
    session: Arc<ClientSession>,
}

impl MediaBridge {
    /// Create a bridge over `session`.
    pub fn new(session: Arc<ClientSession>) -> Self {
        Self { session }
    }

    async fn convert(&self, method: MediaMethod, media: Value, mime_type: &str) -> Result<Value> {
        debug!(method = method.as_str(), mime_type, "requesting media conversion");
        self.session
            .request(|result_id| OutboundMessage::Media {
                method,
                result_id,
                to_mime_type: mime_type.to_string(),
                media_source: media,
            })
            .await
    }

    async fn convert_to_string(&self, method: MediaMethod, media: Value, mime_type: &str) -> Result<String> {
        match self.convert(method, media, mime_type).await? {
            Value::String(s) => Ok(s),
            other => Err(ClientError::InvalidResult {
                method: method.as_str(),
                reason: format!("expected a string, got {other}"),
            }),
        }
    }

    /// Convert a media object into raw bytes of `mime_type`.
    pub async fn convert_to_buffer(&self, media: Value, mime_type: &str) -> Result<Vec<u8>> {
        let method = MediaMethod::ConvertMediaObjectToBuffer;
        let encoded = self.convert_to_string(method, media, mime_type).await?;
        BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| ClientError::InvalidResult {
                method: method.as_str(),
                reason: e.to_string(),
            })
    }

    /// Convert a media object into a URI reachable from anywhere.
    pub async fn convert_to_uri(&self, media: Value, mime_type: &str) -> Result<String> {
        self.convert_to_string(MediaMethod::ConvertMediaObjectToUri, media, mime_type)
            .await
    }

    /// Convert a media object into a URI reachable on the server's network.
    pub async fn convert_to_local_uri(&self, media: Value, mime_type: &str) -> Result<String> {
        self.convert_to_string(MediaMethod::ConvertMediaObjectToLocalUri, media, mime_type)
            .await
    }

    /// Media objects can only be created on the server.
    pub fn create_media_object(&self, _data: Value, _mime_type: &str) -> Result<Value> {
        Err(ClientError::unimplemented("createMediaObject"))
    }

    /// Media objects can only be created on the server.
    pub fn create_ffmpeg_media_object(&self, _input: Value) -> Result<Value> {
        Err(ClientError::unimplemented("createFFmpegMediaObject"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateStore;
    use assert_matches::assert_matches;
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;

    /// Answers the next media request with `result`, returning the request frame.
    fn bridge_answering(result: Value) -> (MediaBridge, JoinHandle<Value>) {
        let (tx, mut rx) = mpsc::channel(8);
        let session = ClientSession::new(Arc::new(StateStore::new()), tx);
        let responder = Arc::clone(&session);
        let task = tokio::spawn(async move {
            let frame: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
            let reply = json!({"type": "media", "resultId": frame["resultId"], "result": result});
            responder.ingest(&reply.to_string());
            frame
        });
        (MediaBridge::new(session), task)
    }

    #[tokio::test]
    async fn buffer_is_base64_decoded() {
        let (bridge, task) = bridge_answering(json!("aGVsbG8="));
        let bytes = bridge
            .convert_to_buffer(json!({"id": "mo1"}), "image/jpeg")
            .await
            .unwrap();
        assert_eq!(bytes, b"hello");

        let frame = task.await.unwrap();
        assert_eq!(frame["type"], "media");
        assert_eq!(frame["method"], "convertMediaObjectToBuffer");
        assert_eq!(frame["toMimeType"], "image/jpeg");
        assert_eq!(frame["mediaSource"], json!({"id": "mo1"}));
    }

    #[tokio::test]
    async fn bad_base64_is_invalid_result() {
        let (bridge, task) = bridge_answering(json!("not base64!!"));
        assert_matches!(
            bridge.convert_to_buffer(json!("mo"), "image/jpeg").await,
            Err(ClientError::InvalidResult { method: "convertMediaObjectToBuffer", .. })
        );
        let _ = task.await.unwrap();
    }

    #[tokio::test]
    async fn uri_conversions_return_strings() {
        let (bridge, task) = bridge_answering(json!("https://hub/media/1"));
        let uri = bridge.convert_to_uri(json!("mo"), "image/jpeg").await.unwrap();
        assert_eq!(uri, "https://hub/media/1");
        assert_eq!(task.await.unwrap()["method"], "convertMediaObjectToUri");

        let (bridge, task) = bridge_answering(json!("http://10.0.0.2/media/1"));
        let uri = bridge.convert_to_local_uri(json!("mo"), "video/mp4").await.unwrap();
        assert_eq!(uri, "http://10.0.0.2/media/1");
        assert_eq!(task.await.unwrap()["method"], "convertMediaObjectToLocalUri");
    }

    #[tokio::test]
    async fn non_string_uri_is_invalid_result() {
        let (bridge, task) = bridge_answering(json!({"uri": "x"}));
        assert_matches!(
            bridge.convert_to_uri(json!("mo"), "image/jpeg").await,
            Err(ClientError::InvalidResult { .. })
        );
        let _ = task.await.unwrap();
    }

    #[test]
    fn local_creation_is_unimplemented() {
        let (tx, _rx) = mpsc::channel(1);
        let bridge = MediaBridge::new(ClientSession::new(Arc::new(StateStore::new()), tx));
        assert_matches!(
            bridge.create_media_object(json!("data"), "image/jpeg"),
            Err(ClientError::Unimplemented { .. })
        );
        assert_matches!(
            bridge.create_ffmpeg_media_object(json!({})),
            Err(ClientError::Unimplemented { .. })
        );
    }
}
