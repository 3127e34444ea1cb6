//! # Sockbridge
//!
//! Adapters that present event-driven, callback-based sockets as ordinary
//! async byte streams and an accept-queue listener, so stream-oriented
//! request handling can run on top of an event layer it knows nothing about.
//!
//! ## Features
//!
//! - **Connection adapter**: "data" events become an ordered [`AsyncRead`](sockbridge_io::tokio::io::AsyncRead) stream
//! - **Listener adapter**: "accept" events become a bounded queue of pending connections
//! - **Backpressure**: full queues block the event producer instead of dropping data
//! - **Zero Unsafe Code**: Completely safe Rust implementation
//!
//! ## Core Components
//!
//! - `socket`: Traits the external event layer implements
//! - `conn`: [`EventConn`](conn::EventConn), the per-socket byte stream
//! - `listener`: [`EventListener`](listener::EventListener), the accept queue
//! - `stream`: Contracts exposed to the request-serving side
//! - `serve`: An accept loop spawning one task per connection
//! - `blocking`: Thread-blocking facade over both adapters
//! - `origin`: Origin allow-list and CORS headers
//! - `sim`: In-process event sockets for tests and local wiring
//!
//! ## Example
//!
//! ```rust,no_run
//! use sockbridge::prelude::*;
//! use sockbridge_io::tokio::io::{AsyncReadExt, AsyncWriteExt};
//!
//! async fn example(server: SimServer) -> Result<(), anyhow::Error> {
//!     let listener = EventListener::new(server)?;
//!     serve(&listener, |mut conn: EventConn<SimSocket>| async move {
//!         let mut request = [0u8; 5];
//!         conn.read_exact(&mut request).await?;
//!         conn.write_all(b"ok").await?;
//!         Ok::<(), anyhow::Error>(())
//!     })
//!     .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Usage Notes
//!
//! - Adapters capture a runtime handle when constructed; event callbacks may then fire on any thread
//! - Event callbacks block while a queue is full, so they must never run on a runtime worker of a current-thread runtime
//! - Deadlines are accepted and ignored; wrap operations in `tokio::time::timeout` instead
#![forbid(unsafe_code)]

pub mod blocking;
pub mod config;
pub mod conn;
pub mod error;
pub mod listener;
pub mod origin;
pub mod serve;
pub mod sim;
pub mod socket;
pub mod stream;

pub mod prelude {
    pub use crate::blocking::{BlockingConn, BlockingListener};
    pub use crate::config::BridgeConfig;
    pub use crate::conn::{CloseHandle, EventConn};
    pub use crate::error::BridgeError;
    pub use crate::listener::EventListener;
    pub use crate::origin::{OriginPolicy, SharedOriginPolicy};
    pub use crate::serve::{serve, ConnectionHandler};
    pub use crate::sim::{SimServer, SimSocket};
    pub use crate::socket::{EventedServer, EventedSocket, ServerEvent, SocketEvent};
    pub use crate::stream::{BridgeConn, BridgeListener, ConnAddr, Deadline};
}
