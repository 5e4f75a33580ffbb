//! Per-connection handler: read loop, event routing, teardown.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The task owns the [`Session`] outright, so every input for one client
//! (socket bytes, database responses, forwarded messages, kicks) is
//! applied in order on one task:
//!
//! ```text
//!   socket ──recv──┐
//!                  ├─▶ Session ──Outcome──▶ encode ──▶ socket
//!   table ──events─┘
//! ```
//!
//! The loop ends when the client closes, the socket errors, a write
//! times out, or an outcome asks to disconnect. Every path falls
//! through to the same teardown.
//!
//! A session that stops draining its event channel is evicted by the
//! table and kicked here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hearthgate_protocol::{BinaryMessageCodec, DecodedMessage, FrameCodec};
use hearthgate_session::{ClientKey, Outcome, Session};
use hearthgate_transport::{Connection, TcpConnection};

use crate::server::ServerState;
use crate::table::{Registration, SessionEvent};
use crate::{HearthgateError, SessionTable};

const SLOW_CLIENT_MESSAGE: &str = "Your connection is too slow.";

/// Drop guard that takes the session out of the table when the handler
/// exits, even by panic.
struct TableGuard {
    key: ClientKey,
    closing: Arc<AtomicBool>,
    table: Arc<SessionTable>,
}

impl Drop for TableGuard {
    fn drop(&mut self) {
        self.closing.store(true, Ordering::Release);
        self.table.unregister(self.key);
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    conn: TcpConnection,
    state: Arc<ServerState>,
) -> Result<(), HearthgateError> {
    let conn_id = conn.id();
    let Registration { key, mut events, closing, evicted } =
        state.table.register(state.config.event_channel_size);
    let guard = TableGuard {
        key,
        closing,
        table: Arc::clone(&state.table),
    };
    let mut session = Session::new(key, state.services.clone(), Arc::clone(&state.config));

    tracing::info!(%conn_id, client_key = %key, peer = ?conn.peer_addr(), "Connection accepted");

    let result = loop {
        let outcome: Outcome = tokio::select! {
            read = conn.recv() => match read {
                Ok(Some(data)) => session.on_bytes(&data),
                Ok(None) => {
                    tracing::info!(%conn_id, client_key = %key, "Connection closed by client");
                    break Ok(());
                }
                Err(e) => {
                    if e.is_peer_gone() {
                        tracing::info!(%conn_id, client_key = %key, error = %e, "Connection lost");
                    } else {
                        tracing::debug!(%conn_id, client_key = %key, error = %e, "recv error");
                    }
                    break Err(e.into());
                }
            },
            Some(event) = events.recv() => match event {
                SessionEvent::Db(response) => session.on_db_response(response),
                SessionEvent::Forwarded(msg) => session.on_forwarded(msg),
                SessionEvent::Kick(reason) => session.kick(&reason),
            },
            _ = evicted.notified() => {
                tracing::warn!(%conn_id, client_key = %key, "Session fell behind its event channel");
                session.kick(SLOW_CLIENT_MESSAGE)
            },
        };

        if let Err(e) = flush(&conn, &outcome.outgoing, state.write_timeout).await {
            tracing::debug!(%conn_id, client_key = %key, error = %e, "send failed");
            break Err(e);
        }
        if let Some(reason) = outcome.disconnect {
            tracing::info!(%conn_id, client_key = %key, %reason, "Closing connection");
            break Ok(());
        }
    };

    // Stop routing first so nothing new arrives mid-teardown.
    drop(guard);
    session.teardown();
    let _ = conn.close().await;
    result
}

/// Encodes `outgoing` and writes it in one send, giving up after
/// `timeout`.
async fn flush(
    conn: &TcpConnection,
    outgoing: &[DecodedMessage],
    timeout: Duration,
) -> Result<(), HearthgateError> {
    if outgoing.is_empty() {
        return Ok(());
    }
    let mut wire = Vec::new();
    for msg in outgoing {
        wire.extend(BinaryMessageCodec.encode(msg)?);
    }
    match tokio::time::timeout(timeout, conn.send(&wire)).await {
        Ok(sent) => Ok(sent?),
        Err(_) => Err(HearthgateError::SendTimeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};

    use super::*;

    /// A server-side connection and the raw client socket facing it.
    async fn pair() -> (TcpConnection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, peer) = listener.accept().await.unwrap();
        (TcpConnection::from_stream(server, Some(peer)), client)
    }

    #[tokio::test]
    async fn test_flush_writes_all_messages_in_one_send() {
        let (conn, mut client) = pair().await;
        let msgs = [DecodedMessage::new(1), DecodedMessage::new(2)];

        flush(&conn, &msgs, Duration::from_secs(1)).await.unwrap();

        let expected: usize = msgs.iter().map(|m| BinaryMessageCodec.encode(m).unwrap().len()).sum();
        let mut buf = vec![0u8; expected];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf.iter().filter(|&&b| b == b'!').count(), 2);
    }

    #[tokio::test]
    async fn test_flush_times_out_when_client_stops_reading() {
        let (conn, _client) = pair().await;
        // Far more than the kernel buffers on both ends can hold.
        let big = DecodedMessage::new(1).with_payload(vec![0u8; 32 * 1024 * 1024]);

        let result = flush(&conn, &[big], Duration::from_millis(100)).await;

        assert!(matches!(result, Err(HearthgateError::SendTimeout(_))));
    }
}
