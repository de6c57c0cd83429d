//! Connection - serves one relay client.
//!
//! Each Connection runs in its own Tokio task and owns its WebSocket
//! exclusively:
//!
//! ```text
//! queue session id ──▶ register Session
//!    ↓
//! ┌──────────────────────── tokio::select! ────────────────────────┐
//! │  WebSocket read ──▶ Dispatcher ──▶ own / peers' outbound queues │
//! │  outbound queue ──▶ WebSocket write                             │
//! └─────────────────────────────────────────────────────────────────┘
//!    ↓ (exit, close frame, read/write error, end of stream)
//! Disconnect: scrub session from registry ──▶ flush ──▶ close frame
//! ```
//!
//! Frames from this client are dispatched strictly in arrival order. The
//! disconnect scrub is tied to a drop guard so it runs exactly once on every
//! path out of the loop.

use crate::error::RegistryError;
use crate::handlers::{Dispatcher, Outcome};
use crate::state::{ConnectionHandle, Outbound, Registry, Session, SessionId};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, instrument, warn};

/// A client connection handler.
pub struct Connection<S> {
    session: SessionId,
    addr: SocketAddr,
    registry: Arc<Registry>,
    stream: WebSocketStream<S>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a handler for an upgraded WebSocket.
    pub fn new(
        session: SessionId,
        stream: WebSocketStream<S>,
        addr: SocketAddr,
        registry: Arc<Registry>,
    ) -> Self {
        Self {
            session,
            addr,
            registry,
            stream,
        }
    }

    /// Run the connection until the client leaves.
    ///
    /// Fails only if the session cannot be registered; everything after that
    /// ends in an orderly disconnect.
    #[instrument(skip(self), fields(session = %self.session, addr = %self.addr), name = "connection")]
    pub async fn run(self) -> Result<(), RegistryError> {
        let Self {
            session,
            registry,
            stream,
            ..
        } = self;

        let (host, mut outbound_rx) = ConnectionHandle::new(session.clone());

        // The id is queued before registration so it is always the first frame.
        host.send(session.as_str());
        registry.register(Session::new(session.clone(), host.clone()))?;
        let scrub = DisconnectGuard {
            registry: &registry,
            session: &session,
        };
        info!(sessions = registry.len(), "Session registered");

        let dispatcher = Dispatcher::new(session.clone(), Arc::clone(&registry));
        let (mut writer, mut reader) = stream.split();

        loop {
            tokio::select! {
                // BRANCH A: inbound frames
                result = reader.next() => {
                    match result {
                        Some(Ok(Message::Text(text))) => {
                            debug!(frame = %text, "Received frame");
                            if dispatcher.dispatch(&text) == Outcome::Exit {
                                info!("Client sent exit");
                                break;
                            }
                        }
                        Some(Ok(Message::Binary(data))) => {
                            debug!(len = data.len(), "Ignoring binary frame");
                        }
                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "Client sent close frame");
                            break;
                        }
                        // Ping/pong is answered by tungstenite.
                        Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                        Some(Err(e)) => {
                            if is_disconnect(&e) {
                                debug!(error = %e, "Client went away");
                            } else {
                                warn!(error = %e, "Read error");
                            }
                            break;
                        }
                        None => {
                            info!("Client disconnected");
                            break;
                        }
                    }
                }

                // BRANCH B: own replies and frames relayed from other sessions
                Some(event) = outbound_rx.recv() => {
                    match event {
                        Outbound::Frame(frame) => {
                            if let Err(e) = writer.send(Message::Text(frame)).await {
                                warn!(error = %e, "Write error");
                                break;
                            }
                        }
                        Outbound::Close => {
                            debug!("Close requested");
                            break;
                        }
                    }
                }
            }
        }

        drop(scrub);

        // Deliver what was queued before the scrub, then close politely.
        // Failures here only mean the client is already gone.
        while let Ok(Outbound::Frame(frame)) = outbound_rx.try_recv() {
            if writer.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = writer.send(Message::Close(None)).await;
        let _ = writer.close().await;
        drop(host);

        info!("Session closed");
        Ok(())
    }
}

/// Runs the disconnect scrub when dropped.
struct DisconnectGuard<'a> {
    registry: &'a Registry,
    session: &'a SessionId,
}

impl Drop for DisconnectGuard<'_> {
    fn drop(&mut self) {
        let purged = self.registry.disconnect(self.session);
        debug!(purged, "Session removed from registry");
    }
}

/// Whether a read error just means the peer vanished.
fn is_disconnect(e: &tungstenite::Error) -> bool {
    use tungstenite::error::ProtocolError;
    matches!(
        e,
        tungstenite::Error::ConnectionClosed
            | tungstenite::Error::AlreadyClosed
            | tungstenite::Error::Io(_)
            | tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::DuplexStream;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::protocol::Role;

    type ClientSocket = WebSocketStream<DuplexStream>;

    async fn open(registry: &Arc<Registry>) -> (ClientSocket, String, JoinHandle<Result<(), RegistryError>>) {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        let mut client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;

        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let connection = Connection::new(SessionId::generate(), server, addr, Arc::clone(registry));
        let task = tokio::spawn(connection.run());

        let id = recv_text(&mut client).await;
        (client, id, task)
    }

    async fn recv_text(client: &mut ClientSocket) -> String {
        loop {
            let msg = timeout(Duration::from_secs(5), client.next())
                .await
                .expect("timed out waiting for frame")
                .expect("stream ended")
                .expect("read error");
            if let Message::Text(text) = msg {
                return text;
            }
        }
    }

    async fn send_text(client: &mut ClientSocket, text: &str) {
        client.send(Message::Text(text.to_string())).await.unwrap();
    }

    #[tokio::test]
    async fn first_frame_is_the_registered_session_id() {
        let registry = Arc::new(Registry::new());
        let (_client, id, _task) = open(&registry).await;

        assert_eq!(id.len(), 36);
        assert!(registry.lock().lookup(&id).is_some());
    }

    #[tokio::test]
    async fn exit_scrubs_session_and_closes() {
        let registry = Arc::new(Registry::new());
        let (mut client, id, task) = open(&registry).await;

        send_text(&mut client, "exit").await;
        task.await.unwrap().unwrap();

        assert!(registry.lock().lookup(&id).is_none());
        let next = timeout(Duration::from_secs(5), client.next()).await.unwrap();
        assert!(matches!(next, Some(Ok(Message::Close(_))) | None));
    }

    #[tokio::test]
    async fn relays_between_sockets_and_scrubs_on_drop() {
        let registry = Arc::new(Registry::new());
        let (mut a, a_id, _a_task) = open(&registry).await;
        let (mut b, b_id, b_task) = open(&registry).await;

        send_text(&mut b, &format!("join {a_id}")).await;
        assert_eq!(recv_text(&mut b).await, "");
        assert_eq!(recv_text(&mut a).await, format!("joined {b_id}"));

        send_text(&mut a, "publish hi").await;
        assert_eq!(recv_text(&mut b).await, format!("{a_id} hi"));

        drop(b);
        b_task.await.unwrap().unwrap();

        let guard = registry.lock();
        assert!(guard.lookup(&b_id).is_none());
        assert!(!guard.lookup(&a_id).unwrap().has_peer(&b_id));
    }

    #[tokio::test]
    async fn unknown_and_binary_frames_keep_connection_open() {
        let registry = Arc::new(Registry::new());
        let (mut client, id, _task) = open(&registry).await;

        send_text(&mut client, "dance wildly").await;
        client.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
        send_text(&mut client, &format!("join {id}")).await;

        assert_eq!(recv_text(&mut client).await, "already a member");
        assert!(registry.lock().lookup(&id).is_some());
    }

    #[tokio::test]
    async fn close_request_ends_the_worker() {
        let registry = Arc::new(Registry::new());
        let (_client, id, task) = open(&registry).await;

        let host = registry.lock().lookup(&id).unwrap().host().clone();
        host.close();
        task.await.unwrap().unwrap();

        assert!(registry.lock().lookup(&id).is_none());
    }

    #[test]
    fn disconnect_classification() {
        assert!(is_disconnect(&tungstenite::Error::ConnectionClosed));
        assert!(!is_disconnect(&tungstenite::Error::Utf8));
    }
}
