// Transport seam: connection establishment, writes, bulk close
//
// The client consumes these traits; production code wires in the TCP
// implementation, tests substitute stubs. Inbound daemon responses flow
// back through the event channel handed to the transport at
// construction.

mod tcp;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub use tcp::TcpTransport;

/// Connect/write failures. Recoverable; they drive the retry policies.
#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("transport closed")]
    Closed,
}

/// One live connection to the daemon.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Write a complete serialized message. The write is strictly ordered
    /// against other writes on the same connection.
    async fn write(&self, bytes: &[u8]) -> Result<(), TransportError>;
}

/// Connection factory plus bulk teardown.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a fresh connection; it stays tracked for [`Transport::close_all`].
    async fn connect(&self) -> Result<Arc<dyn Connection>, TransportError>;

    /// Close every tracked connection. Best effort; idempotent.
    async fn close_all(&self);
}
