//! In-process stand-ins for the external event layer.
//!
//! [`SimSocket`] and [`SimServer`] behave like event emitters: handlers are
//! invoked synchronously on whichever thread calls `emit_*`, writes are
//! recorded rather than sent, and close calls are counted. They let the
//! adapters be driven without a real event loop.
use crate::socket::{AcceptCallback, DataCallback, EventedServer, EventedSocket};
use bytes::Bytes;
use sockbridge_io::{Mutex, RwLock};
use sockbridge_logging::{trace, warn};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

type SharedDataHandler = Arc<dyn Fn(Bytes) + Send + Sync + 'static>;
type SharedAcceptHandler = Arc<dyn Fn(SimSocket) + Send + Sync + 'static>;

#[derive(Clone)]
pub struct SimSocket {
    inner: Arc<SimSocketInner>,
}

struct SimSocketInner {
    local: (String, u16),
    peer: (String, u16),
    handler: RwLock<Option<SharedDataHandler>>,
    written: Mutex<Vec<Bytes>>,
    close_calls: AtomicUsize,
    closed: AtomicBool,
}

impl SimSocket {
    pub fn new(local: SocketAddr, peer: SocketAddr) -> Self {
        Self::with_raw(
            local.ip().to_string(),
            local.port(),
            peer.ip().to_string(),
            peer.port(),
        )
    }

    /// Creates a socket reporting arbitrary address strings, including unparseable ones
    pub fn with_raw<A: Into<String>, B: Into<String>>(
        local_address: A,
        local_port: u16,
        peer_address: B,
        peer_port: u16,
    ) -> Self {
        Self {
            inner: Arc::new(SimSocketInner {
                local: (local_address.into(), local_port),
                peer: (peer_address.into(), peer_port),
                handler: RwLock::new(None),
                written: Mutex::new(Vec::new()),
                close_calls: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Fires a "data" event. Returns false if no handler was registered.
    /// Blocks for as long as the registered handler blocks
    pub fn emit_data<T: Into<Bytes>>(&self, chunk: T) -> bool {
        let handler = self.inner.handler.read().clone();
        match handler {
            Some(handler) => {
                (handler)(chunk.into());
                true
            }

            None => {
                warn!(target: "sockbridge", "SimSocket dropping chunk: no data handler registered");
                false
            }
        }
    }

    pub fn has_data_handler(&self) -> bool {
        self.inner.handler.read().is_some()
    }

    /// Every chunk passed to `write`, in call order
    pub fn written(&self) -> Vec<Bytes> {
        self.inner.written.lock().clone()
    }

    pub fn written_bytes(&self) -> Vec<u8> {
        self.inner
            .written
            .lock()
            .iter()
            .flat_map(|chunk| chunk.iter().copied())
            .collect()
    }

    pub fn close_calls(&self) -> usize {
        self.inner.close_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl EventedSocket for SimSocket {
    fn on_data(&self, handler: DataCallback) {
        *self.inner.handler.write() = Some(Arc::from(handler));
    }

    fn write(&self, data: Bytes) {
        if self.is_closed() {
            trace!(target: "sockbridge", "SimSocket ignoring write of {} bytes after close", data.len());
            return;
        }

        self.inner.written.lock().push(data);
    }

    fn close(&self) {
        let _ = self.inner.close_calls.fetch_add(1, Ordering::SeqCst);
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            // a closed emitter drops its listeners
            let _ = self.inner.handler.write().take();
        }
    }

    fn local_address(&self) -> String {
        self.inner.local.0.clone()
    }

    fn local_port(&self) -> u16 {
        self.inner.local.1
    }

    fn peer_address(&self) -> String {
        self.inner.peer.0.clone()
    }

    fn peer_port(&self) -> u16 {
        self.inner.peer.1
    }
}

/// A listening endpoint. Unlike [`SimSocket`], a closed server keeps its
/// handler, so late "accept" events still reach whoever registered it
#[derive(Clone)]
pub struct SimServer {
    inner: Arc<SimServerInner>,
}

struct SimServerInner {
    local: RwLock<(String, u16)>,
    handler: RwLock<Option<SharedAcceptHandler>>,
    close_calls: AtomicUsize,
}

impl SimServer {
    pub fn new(local: SocketAddr) -> Self {
        Self::with_raw(local.ip().to_string(), local.port())
    }

    pub fn with_raw<A: Into<String>>(local_address: A, local_port: u16) -> Self {
        Self {
            inner: Arc::new(SimServerInner {
                local: RwLock::new((local_address.into(), local_port)),
                handler: RwLock::new(None),
                close_calls: AtomicUsize::new(0),
            }),
        }
    }

    /// Fires an "accept" event. Returns false if no handler was registered.
    /// Blocks for as long as the registered handler blocks
    pub fn emit_accept(&self, socket: SimSocket) -> bool {
        let handler = self.inner.handler.read().clone();
        match handler {
            Some(handler) => {
                (handler)(socket);
                true
            }

            None => {
                warn!(target: "sockbridge", "SimServer dropping socket: no accept handler registered");
                false
            }
        }
    }

    /// Changes what the server reports as its local endpoint, as a rebind would
    pub fn set_local_endpoint<A: Into<String>>(&self, address: A, port: u16) {
        *self.inner.local.write() = (address.into(), port);
    }

    pub fn close_calls(&self) -> usize {
        self.inner.close_calls.load(Ordering::SeqCst)
    }
}

impl EventedServer for SimServer {
    type Socket = SimSocket;

    fn on_accept(&self, handler: AcceptCallback<SimSocket>) {
        *self.inner.handler.write() = Some(Arc::from(handler));
    }

    fn close(&self) {
        let _ = self.inner.close_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn local_address(&self) -> String {
        self.inner.local.read().0.clone()
    }

    fn local_port(&self) -> u16 {
        self.inner.local.read().1
    }
}
