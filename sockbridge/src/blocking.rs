//! Blocking facade for consumers running on plain threads.
//!
//! Every call here parks the calling thread on the supplied runtime handle.
//! Calling into this module from within an async context panics, exactly as
//! [`Handle::block_on`] does.
use crate::conn::EventConn;
use crate::error::BridgeError;
use crate::listener::EventListener;
use crate::socket::{EventedServer, EventedSocket};
use sockbridge_io::tokio::runtime::Handle;
use sockbridge_io::tokio_util::io::SyncIoBridge;
use std::net::SocketAddr;
use std::sync::Arc;

/// A connection usable through [`std::io::Read`] and [`std::io::Write`]
pub type BlockingConn<S> = SyncIoBridge<EventConn<S>>;

impl<S: EventedSocket> EventConn<S> {
    pub fn into_blocking(self, handle: Handle) -> BlockingConn<S> {
        SyncIoBridge::new_with_handle(self, handle)
    }
}

pub struct BlockingListener<Srv: EventedServer> {
    inner: Arc<EventListener<Srv>>,
    handle: Handle,
}

impl<Srv: EventedServer> BlockingListener<Srv> {
    pub fn new(listener: EventListener<Srv>, handle: Handle) -> Self {
        Self::from_shared(Arc::new(listener), handle)
    }

    /// Shares `listener` with async consumers; either side may close it
    pub fn from_shared(listener: Arc<EventListener<Srv>>, handle: Handle) -> Self {
        Self {
            inner: listener,
            handle,
        }
    }

    /// Parks the thread until a connection is pending or the listener closes
    pub fn accept(&self) -> Result<BlockingConn<Srv::Socket>, BridgeError> {
        let conn = self.handle.block_on(self.inner.accept())?;
        Ok(conn.into_blocking(self.handle.clone()))
    }

    pub fn close(&self) -> Result<(), BridgeError> {
        self.inner.close()
    }

    pub fn local_addr(&self) -> Result<SocketAddr, BridgeError> {
        self.inner.local_addr()
    }

    pub fn listener(&self) -> &Arc<EventListener<Srv>> {
        &self.inner
    }
}
