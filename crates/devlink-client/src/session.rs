//! The per-connection session.
//!
//! A [`ClientSession`] owns everything one connection needs: the mirrored
//! [`StateStore`], the [`PendingResultBroker`], the [`ListenerRegistry`] and
//! the sending half of the outbound queue. Registry, media bridge and device
//! handles all share it through an `Arc`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use devlink_core::schema::IDENTITY_PROPERTY;
use devlink_core::wire::SyncFrame;
use devlink_core::{CorrelationId, InboundMessage, OutboundMessage, is_truthy};

use crate::broker::PendingResultBroker;
use crate::device::DeviceHandle;
use crate::errors::{ClientError, Result};
use crate::listeners::ListenerRegistry;
use crate::state::StateStore;

/// State and plumbing shared by everything attached to one connection.
#[derive(Debug)]
pub struct ClientSession {
    state: Arc<StateStore>,
    broker: PendingResultBroker,
    listeners: ListenerRegistry,
    outbound: mpsc::Sender<String>,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl ClientSession {
    /// Create a session over `state`, sending frames into `outbound`.
    pub fn new(state: Arc<StateStore>, outbound: mpsc::Sender<String>) -> Arc<Self> {
        Arc::new(Self {
            state,
            broker: PendingResultBroker::new(),
            listeners: ListenerRegistry::new(),
            outbound,
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        })
    }

    /// The mirrored state.
    pub fn state(&self) -> &Arc<StateStore> {
        &self.state
    }

    /// Requests awaiting a response.
    pub fn broker(&self) -> &PendingResultBroker {
        &self.broker
    }

    /// Registered event listeners.
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    pub(crate) fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Queue one frame for sending.
    pub fn send(&self, message: &OutboundMessage) -> Result<()> {
        if self.is_closed() {
            return Err(ClientError::ChannelClosed);
        }
        let text = message.to_text()?;
        self.outbound.try_send(text).map_err(|e| match e {
            TrySendError::Full(_) => {
                warn!("outbound queue full, frame dropped");
                ClientError::QueueFull
            }
            TrySendError::Closed(_) => ClientError::ChannelClosed,
        })
    }

    /// Send a broker-mediated request and wait for its response.
    ///
    /// `build` receives the correlation id the response must echo.
    pub async fn request<F>(&self, build: F) -> Result<Value>
    where
        F: FnOnce(CorrelationId) -> OutboundMessage,
    {
        let id = self.broker.issue();
        let pending = self.broker.register(id.clone());
        if let Err(error) = self.send(&build(id.clone())) {
            let _ = self.broker.forget(&id);
            return Err(error);
        }
        if self.is_closed() {
            let _ = self.broker.forget(&id);
            return Err(ClientError::Disconnected);
        }
        pending.wait().await
    }

    /// Route one inbound text frame.
    ///
    /// Sync frames update the store and fan out to listeners; `system` and
    /// `media` frames settle pending requests. Everything else is logged and
    /// dropped. Frames arriving after [`close`](Self::close) are ignored.
    pub fn ingest(self: &Arc<Self>, text: &str) {
        if self.is_closed() {
            debug!("session closed, inbound frame ignored");
            return;
        }
        let message = match InboundMessage::parse(text) {
            Ok(message) => message,
            Err(error) => {
                warn!(%error, "malformed inbound frame ignored");
                return;
            }
        };
        match message {
            InboundMessage::Sync(frame) => self.apply_sync(&frame),
            InboundMessage::System(frame) | InboundMessage::Media(frame) => {
                let _ = self.broker.settle(&frame.result_id, frame.result, frame.error);
            }
            InboundMessage::Other => debug!("inbound frame of unhandled type ignored"),
        }
    }

    fn apply_sync(self: &Arc<Self>, frame: &SyncFrame) {
        let Some(state) = self.state.apply(frame) else {
            debug!(device_id = %frame.id, "sync frame without property ignored");
            return;
        };
        let device = DeviceHandle::new(frame.id.clone(), Arc::clone(self));
        let _ = self
            .listeners
            .dispatch(Some(&device), &frame.event_details, &frame.event_data);

        let is_identity = frame.event_details.property.as_deref() == Some(IDENTITY_PROPERTY);
        if is_identity && !is_truthy(&state.value) {
            let _ = self.state.remove(&frame.id);
            debug!(device_id = %frame.id, "device removed");
        }
    }

    /// Mark the session closed, stop the channel driver, reject every
    /// pending request with [`ClientError::Disconnected`] and drop all
    /// listeners. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown.cancel();
        let rejected = self.broker.reject_all();
        // listeners may hold device handles, which hold the session
        let released = self.listeners.clear();
        debug!(rejected, released, "session closed");
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
