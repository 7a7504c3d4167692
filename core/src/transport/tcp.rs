// TCP transport: one short-lived connection per message, a reader task
// per connection feeding parsed responses to the client's event channel,
// and a tracked connection set for bulk shutdown.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{Connection, Transport, TransportError};
use crate::message::{parse_response, DaemonResponse};

pub struct TcpTransport {
    address: String,
    events: mpsc::UnboundedSender<DaemonResponse>,
    connections: Mutex<Vec<Tracked>>,
}

struct Tracked {
    connection: Arc<TcpConnection>,
    reader: JoinHandle<()>,
}

struct TcpConnection {
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
}

impl TcpTransport {
    /// `events` receives every response parsed off any connection this
    /// transport opens.
    pub fn new(address: String, events: mpsc::UnboundedSender<DaemonResponse>) -> Self {
        Self {
            address,
            events,
            connections: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Connection for TcpConnection {
    async fn write(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        writer
            .write_all(bytes)
            .await
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| TransportError::WriteFailed(e.to_string()))
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self) -> Result<Arc<dyn Connection>, TransportError> {
        let stream = TcpStream::connect(&self.address)
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        let _ = stream.set_nodelay(true);
        debug!(address = %self.address, "connected to daemon");

        let (read_half, write_half) = stream.into_split();
        let connection = Arc::new(TcpConnection {
            writer: tokio::sync::Mutex::new(write_half),
        });
        let reader = tokio::spawn(read_responses(read_half, self.events.clone()));

        let mut connections = self.connections.lock();
        // connections whose reader ended are already dead; drop them here
        connections.retain(|t| !t.reader.is_finished());
        connections.push(Tracked {
            connection: Arc::clone(&connection),
            reader,
        });
        Ok(connection)
    }

    async fn close_all(&self) {
        let drained: Vec<Tracked> = std::mem::take(&mut *self.connections.lock());
        debug!(count = drained.len(), "closing tracked connections");
        for tracked in drained {
            let mut writer = tracked.connection.writer.lock().await;
            let _ = writer.shutdown().await;
            drop(writer);
            tracked.reader.abort();
        }
    }
}

/// Read response blocks (lines up to a blank line) off one connection
/// until EOF, forwarding each parsed response.
async fn read_responses(read_half: OwnedReadHalf, events: mpsc::UnboundedSender<DaemonResponse>) {
    let mut reader = BufReader::new(read_half);
    let mut block: Vec<u8> = Vec::new();
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim_end_matches(['\r', '\n']);
                if trimmed.is_empty() {
                    if !block.is_empty() && !forward(&events, &block) {
                        return;
                    }
                    block.clear();
                } else {
                    block.extend_from_slice(trimmed.as_bytes());
                    block.extend_from_slice(b"\r\n");
                }
            }
            Err(e) => {
                debug!(error = %e, "connection read failed");
                break;
            }
        }
    }
    // daemon may close the socket right after the last header line
    if !block.is_empty() {
        forward(&events, &block);
    }
}

fn forward(events: &mpsc::UnboundedSender<DaemonResponse>, block: &[u8]) -> bool {
    match parse_response(block) {
        Ok(response) => events.send(response).is_ok(),
        Err(e) => {
            warn!(error = %e, "discarding malformed daemon response");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ResponseKind;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_write_and_receive_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 1024];
            let n = stream.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            assert!(request.starts_with("GNTP/1.0 REGISTER NONE"));
            stream
                .write_all(b"GNTP/1.0 -OK NONE\r\nResponse-Action: REGISTER\r\n\r\n")
                .await
                .unwrap();
        });

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let transport = TcpTransport::new(addr.to_string(), events_tx);
        let connection = transport.connect().await.unwrap();
        connection
            .write(b"GNTP/1.0 REGISTER NONE\r\nApplication-Name: t\r\n\r\n")
            .await
            .unwrap();

        let response = tokio::time::timeout(std::time::Duration::from_secs(2), events_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.kind, ResponseKind::Ok);
        assert_eq!(response.action.as_deref(), Some("REGISTER"));
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        // bind then drop to get an address nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = TcpTransport::new(addr.to_string(), events_tx);
        let result = transport.connect().await;
        assert!(matches!(result, Err(TransportError::ConnectFailed(_))));
    }

    #[tokio::test]
    async fn test_multiple_responses_on_one_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream
                .write_all(
                    b"GNTP/1.0 -OK NONE\r\nNotification-Internal-ID: 1\r\n\r\n\
                      GNTP/1.0 -CALLBACK NONE\r\nNotification-Internal-ID: 1\r\n\
                      Notification-Callback-Result: CLICKED\r\n\r\n",
                )
                .await
                .unwrap();
        });

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let transport = TcpTransport::new(addr.to_string(), events_tx);
        let _connection = transport.connect().await.unwrap();

        let first = tokio::time::timeout(std::time::Duration::from_secs(2), events_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.kind, ResponseKind::Ok);
        let second = tokio::time::timeout(std::time::Duration::from_secs(2), events_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.kind, ResponseKind::Callback);
        assert_eq!(second.internal_id, Some(1));
    }

    #[tokio::test]
    async fn test_close_all_drains_tracked_set() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                // hold the socket open until the client closes
                tokio::spawn(async move {
                    let mut stream = stream;
                    let mut buf = [0u8; 64];
                    while matches!(stream.read(&mut buf).await, Ok(n) if n > 0) {}
                });
            }
        });

        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let transport = TcpTransport::new(addr.to_string(), events_tx);
        let _a = transport.connect().await.unwrap();
        let _b = transport.connect().await.unwrap();
        assert_eq!(transport.connections.lock().len(), 2);

        transport.close_all().await;
        assert!(transport.connections.lock().is_empty());

        // idempotent
        transport.close_all().await;
    }
}
