//! # Listener adapter
//!
//! [`EventListener`] turns the "accept" events of one [`EventedServer`] into a
//! pending-connection queue drained by [`EventListener::accept`].
//!
//! Each accepted socket is wrapped into an [`EventConn`] on the event layer's
//! thread and pushed into a bounded queue. When the queue is full the accept
//! handler blocks, which is the listener's equivalent of a TCP accept backlog.
//! After close, blocked and future `accept` calls fail with
//! [`BridgeError::ListenerClosed`] and sockets still arriving are closed on
//! the spot.
use crate::config::BridgeConfig;
use crate::conn::{endpoints, EventConn};
use crate::error::BridgeError;
use crate::socket::{parse_endpoint, AcceptCallback, EventedServer, EventedSocket};
use crate::stream::BridgeListener;
use async_trait::async_trait;
use sockbridge_io::tokio::runtime::Handle;
use sockbridge_io::tokio::sync::mpsc::error::TrySendError;
use sockbridge_io::tokio::sync::mpsc::{channel, Receiver, Sender};
use sockbridge_io::tokio::sync::Mutex;
use sockbridge_io::tokio_util::sync::CancellationToken;
use sockbridge_logging::{debug, trace, warn};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct EventListener<Srv: EventedServer> {
    server: Srv,
    pending: Mutex<Receiver<EventConn<Srv::Socket>>>,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl<Srv: EventedServer> EventListener<Srv> {
    pub fn new(server: Srv) -> Result<Self, BridgeError> {
        Self::with_config(server, BridgeConfig::default())
    }

    pub fn with_config(server: Srv, config: BridgeConfig) -> Result<Self, BridgeError> {
        let handle = sockbridge_io::current_handle().ok_or(BridgeError::NoRuntime)?;
        Self::with_handle(server, config, handle)
    }

    /// Registers the accept handler. Connections are spawned onto `handle`
    pub fn with_handle(server: Srv, config: BridgeConfig, handle: Handle) -> Result<Self, BridgeError> {
        config.validate()?;
        let (pending_tx, pending_rx) = channel(config.accept_backlog());
        let shutdown = CancellationToken::new();

        server.on_accept(accept_handler(pending_tx, shutdown.clone(), config, handle));

        Ok(Self {
            server,
            pending: Mutex::new(pending_rx),
            closed: AtomicBool::new(false),
            shutdown,
        })
    }

    /// Waits for the next pending connection, in the order the server emitted them
    pub async fn accept(&self) -> Result<EventConn<Srv::Socket>, BridgeError> {
        if self.is_closed() {
            // close may have found the queue held by an accept; whatever landed since goes now
            if let Ok(mut pending) = self.pending.try_lock() {
                discard_pending(&mut pending);
            }

            return Err(BridgeError::ListenerClosed);
        }

        let mut pending = sockbridge_io::tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(BridgeError::ListenerClosed),
            pending = self.pending.lock() => pending,
        };

        let res = sockbridge_io::tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(BridgeError::ListenerClosed),
            conn = pending.recv() => conn.ok_or(BridgeError::ListenerClosed),
        };

        // close cancels before it tries the queue, so if it failed to get it we see the cancellation here
        if self.shutdown.is_cancelled() {
            discard_pending(&mut pending);
        }

        res
    }

    /// Closes the server handle and the pending queue. Only the first call has any effect
    pub fn close(&self) -> Result<(), BridgeError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.server.close();
        self.shutdown.cancel();

        // a concurrent accept holds the queue and discards it once it observes the cancellation
        if let Ok(mut pending) = self.pending.try_lock() {
            discard_pending(&mut pending);
        }

        debug!(target: "sockbridge", "Listener closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Reads the server's current endpoint. Never cached
    pub fn local_addr(&self) -> Result<SocketAddr, BridgeError> {
        parse_endpoint(&self.server.local_address(), self.server.local_port())
    }

    pub fn server(&self) -> &Srv {
        &self.server
    }
}

/// Closes the queue so late sends fail, then closes whatever it still holds
fn discard_pending<S: EventedSocket>(pending: &mut Receiver<EventConn<S>>) {
    pending.close();
    let mut discarded = 0usize;
    while let Ok(conn) = pending.try_recv() {
        let _ = conn.close();
        discarded += 1;
    }

    if discarded != 0 {
        debug!(target: "sockbridge", "Closed {discarded} unclaimed connections");
    }
}

fn accept_handler<S: EventedSocket>(
    pending: Sender<EventConn<S>>,
    shutdown: CancellationToken,
    config: BridgeConfig,
    handle: Handle,
) -> AcceptCallback<S> {
    Box::new(move |socket: S| {
        if shutdown.is_cancelled() {
            debug!(target: "sockbridge", "Listener closed; closing incoming socket");
            socket.close();
            return;
        }

        let (local_addr, peer_addr) = match endpoints(&socket) {
            Ok(addrs) => addrs,
            Err(err) => {
                warn!(target: "sockbridge", "Rejecting incoming socket: {err}");
                socket.close();
                return;
            }
        };

        let conn = EventConn::from_parts(socket, local_addr, peer_addr, config, &handle);

        match pending.try_send(conn) {
            Ok(()) => {
                trace!(target: "sockbridge", "Queued connection from {peer_addr}");
            }

            Err(TrySendError::Full(conn)) => {
                debug!(target: "sockbridge", "Accept backlog full; blocking the event layer");
                // if the listener closes first, the connection is dropped with the send future, which closes it
                let queued = futures::executor::block_on(async {
                    sockbridge_io::tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => false,
                        res = pending.send(conn) => res.is_ok(),
                    }
                });

                if !queued {
                    debug!(target: "sockbridge", "Listener closed while {peer_addr} waited in the backlog");
                }
            }

            Err(TrySendError::Closed(conn)) => {
                let _ = conn.close();
                debug!(target: "sockbridge", "Listener gone; closed connection from {peer_addr}");
            }
        }
    })
}

impl<Srv: EventedServer> Drop for EventListener<Srv> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[async_trait]
impl<Srv: EventedServer> BridgeListener for EventListener<Srv> {
    type Conn = EventConn<Srv::Socket>;

    async fn accept(&self) -> Result<Self::Conn, BridgeError> {
        EventListener::accept(self).await
    }

    fn close(&self) -> Result<(), BridgeError> {
        EventListener::close(self)
    }

    fn local_addr(&self) -> Result<SocketAddr, BridgeError> {
        EventListener::local_addr(self)
    }
}
