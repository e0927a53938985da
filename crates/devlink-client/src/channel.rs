//! WebSocket channel driver.
//!
//! One task per connection. It forwards queued outbound frames to the
//! socket, routes inbound text frames into the session in delivery order,
//! and closes the session when the socket ends or shutdown is requested.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::session::ClientSession;

/// Run the channel until the socket closes or the session shuts down.
pub(crate) async fn drive<S>(
    ws: WebSocketStream<S>,
    session: Arc<ClientSession>,
    mut outbound: mpsc::Receiver<String>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut ws_tx, mut ws_rx) = ws.split();
    let shutdown = session.shutdown_token().clone();

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                debug!("shutdown requested, closing channel");
                // frames queued before the close still go out
                while let Ok(text) = outbound.try_recv() {
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
            frame = outbound.recv() => {
                let Some(text) = frame else { break };
                if let Err(error) = ws_tx.send(Message::Text(text.into())).await {
                    warn!(%error, "failed to send frame, closing channel");
                    break;
                }
            }
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => session.ingest(text.as_str()),
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "peer closed channel");
                    break;
                }
                // ping/pong are answered by tungstenite; binary frames are not part of the protocol
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    warn!(%error, "channel read failed");
                    break;
                }
                None => break,
            },
        }
    }

    session.close();
    debug!("channel driver stopped");
}
