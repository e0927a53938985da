//! Connection bootstrap.
//!
//! Opens the duplex channel, fetches the state snapshot over HTTP, seeds the
//! store and only then starts consuming inbound frames. A client is never
//! handed out with a partially initialized state table.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tracing::{debug, info, instrument, warn};
use url::Url;

use devlink_settings::ConnectionSettings;

use crate::channel;
use crate::errors::{ClientError, Result};
use crate::media::MediaBridge;
use crate::registry::SystemRegistry;
use crate::session::ClientSession;
use crate::state::{StateStore, SystemState};

const SNAPSHOT_PATH: &str = "api/state";

/// URLs derived from the configured server root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
    /// WebSocket channel (`ws`/`wss`).
    pub channel: Url,
    /// State snapshot (`http`/`https`).
    pub snapshot: Url,
}

impl Endpoints {
    /// Derive the channel and snapshot URLs.
    ///
    /// `http`/`ws` roots map to `ws` + `http`; `https`/`wss` roots to `wss` +
    /// `https`. Any other scheme is rejected.
    pub fn resolve(settings: &ConnectionSettings) -> Result<Self> {
        let invalid = |reason: String| ClientError::InvalidUrl {
            url: settings.base_url.clone(),
            reason,
        };

        let base = Url::parse(settings.base_url.trim()).map_err(|e| invalid(e.to_string()))?;
        let (http, ws) = match base.scheme() {
            "http" | "ws" => ("http", "ws"),
            "https" | "wss" => ("https", "wss"),
            other => return Err(invalid(format!("unsupported scheme {other}"))),
        };

        let root = base.as_str().trim_end_matches('/');
        let build = |leaf: &str, scheme: &str| -> Result<Url> {
            let joined = join_path(root, &[&settings.endpoint_path, leaf]);
            let mut url = Url::parse(&joined).map_err(|e| invalid(e.to_string()))?;
            url.set_scheme(scheme)
                .map_err(|()| invalid(format!("cannot switch to scheme {scheme}")))?;
            Ok(url)
        };

        Ok(Self {
            channel: build(&settings.channel_path, ws)?,
            snapshot: build(SNAPSHOT_PATH, http)?,
        })
    }
}

fn join_path(root: &str, segments: &[&str]) -> String {
    let mut out = root.to_string();
    for segment in segments {
        let segment = segment.trim_matches('/');
        if !segment.is_empty() {
            out.push('/');
            out.push_str(segment);
        }
    }
    out
}

/// A connected client.
///
/// Dropping it closes the session and stops the channel driver.
#[derive(Debug)]
pub struct Client {
    registry: SystemRegistry,
    media: MediaBridge,
    session: Arc<ClientSession>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    fn new(session: Arc<ClientSession>, driver: JoinHandle<()>) -> Self {
        Self {
            registry: SystemRegistry::new(Arc::clone(&session)),
            media: MediaBridge::new(Arc::clone(&session)),
            session,
            driver: Mutex::new(Some(driver)),
        }
    }

    /// Device lookup, system state and system queries.
    pub fn registry(&self) -> &SystemRegistry {
        &self.registry
    }

    /// Media conversions.
    pub fn media(&self) -> &MediaBridge {
        &self.media
    }

    /// The underlying session.
    pub fn session(&self) -> &Arc<ClientSession> {
        &self.session
    }

    /// Whether the channel is still open.
    pub fn is_connected(&self) -> bool {
        !self.session.is_closed()
    }

    /// Close the channel and wait for the driver to stop.
    ///
    /// Pending requests fail with [`ClientError::Disconnected`]; no frame is
    /// processed afterwards.
    pub async fn disconnect(&self) {
        self.session.close();
        let driver = self.driver.lock().take();
        if let Some(driver) = driver {
            if let Err(error) = driver.await {
                warn!(%error, "channel driver ended abnormally");
            }
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.session.close();
    }
}

/// Connect to `base_url` with default settings otherwise.
pub async fn connect(base_url: &str) -> Result<Client> {
    connect_with(&ConnectionSettings::for_base_url(base_url)).await
}

/// Connect using explicit settings.
#[instrument(skip_all, fields(base_url = %settings.base_url))]
pub async fn connect_with(settings: &ConnectionSettings) -> Result<Client> {
    let endpoints = Endpoints::resolve(settings)?;

    debug!(url = %endpoints.channel, "opening channel");
    let (mut ws, _response) = connect_async(endpoints.channel.as_str())
        .await
        .map_err(|e| ClientError::Connect {
            url: endpoints.channel.to_string(),
            source: Box::new(e),
        })?;

    let timeout = Duration::from_millis(settings.snapshot_timeout_ms);
    let snapshot = match fetch_snapshot(&endpoints.snapshot, timeout).await {
        Ok(snapshot) => snapshot,
        Err(error) => {
            let _ = ws.close(None).await;
            return Err(error);
        }
    };
    info!(devices = snapshot.len(), "state snapshot loaded");

    let (tx, rx) = mpsc::channel(settings.outbound_queue_capacity.max(1));
    let session = ClientSession::new(Arc::new(StateStore::from_snapshot(snapshot)), tx);
    let driver = tokio::spawn(channel::drive(ws, Arc::clone(&session), rx));
    Ok(Client::new(session, driver))
}

async fn fetch_snapshot(url: &Url, timeout: Duration) -> Result<SystemState> {
    let fail = |source| ClientError::Snapshot {
        url: url.to_string(),
        source,
    };
    let http = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(fail)?;
    let response = http
        .get(url.clone())
        .send()
        .await
        .map_err(fail)?
        .error_for_status()
        .map_err(fail)?;
    response.json::<SystemState>().await.map_err(fail)
}
