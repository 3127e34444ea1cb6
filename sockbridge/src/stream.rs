//! Contracts the adapters present to the request-serving side.
use crate::error::BridgeError;
use async_trait::async_trait;
use sockbridge_io::tokio::io::{AsyncRead, AsyncWrite};
use std::net::SocketAddr;
use std::time::Instant;

pub trait ConnAddr {
    /// Returns the local endpoint, captured when the connection was wrapped
    fn local_addr(&self) -> std::io::Result<SocketAddr>;
    /// Returns the remote endpoint, captured when the connection was wrapped
    fn peer_addr(&self) -> std::io::Result<SocketAddr>;
}

/// Deadline setters expected by stream consumers.
///
/// Event-driven transports have no way to enforce these, so the adapters
/// accept and ignore them. Consumers that need timeouts should wrap the
/// individual operations in `tokio::time::timeout` instead.
pub trait Deadline {
    fn set_deadline(&self, deadline: Option<Instant>) -> std::io::Result<()>;
    fn set_read_deadline(&self, deadline: Option<Instant>) -> std::io::Result<()>;
    fn set_write_deadline(&self, deadline: Option<Instant>) -> std::io::Result<()>;
}

/// A bidirectional byte stream with endpoint identity
pub trait BridgeConn: AsyncRead + AsyncWrite + ConnAddr + Deadline + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + ConnAddr + Deadline + Send + Unpin> BridgeConn for T {}

#[async_trait]
pub trait BridgeListener: Send + Sync {
    type Conn: BridgeConn + 'static;

    /// Waits for the next connection. Returns [`BridgeError::ListenerClosed`] once the listener is closed
    async fn accept(&self) -> Result<Self::Conn, BridgeError>;
    /// Closes the listener. Connections already accepted are unaffected
    fn close(&self) -> Result<(), BridgeError>;
    fn local_addr(&self) -> Result<SocketAddr, BridgeError>;
}
