//! The external, event-driven socket layer consumed by the adapters.
//!
//! Implementors own the real endpoints. The adapters only register handlers
//! and call the fire-and-forget operations; they never manage the lifetime of
//! the underlying handle.
//!
//! # Integration contract
//!
//! Handlers registered through [`EventedSocket::on_data`] and
//! [`EventedServer::on_accept`] block the calling thread while the adapter's
//! bounded queue is full. The event layer must tolerate this (it is the only
//! backpressure signal) and must not invoke the handlers from inside a
//! single-threaded runtime that also drives the consumer.
use crate::error::BridgeError;
use bytes::Bytes;
use std::fmt::{Display, Formatter};
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;

/// Handler invoked once per "data" event with the delivered chunk
pub type DataCallback = Box<dyn Fn(Bytes) + Send + Sync + 'static>;
/// Handler invoked once per "accept" event with the new socket
pub type AcceptCallback<S> = Box<dyn Fn(S) + Send + Sync + 'static>;

/// One connected endpoint of the external event layer
pub trait EventedSocket: Send + Sync + 'static {
    /// Registers the handler for the "data" event, replacing any previous one
    fn on_data(&self, handler: DataCallback);
    /// Queues `data` for sending. Fire-and-forget
    fn write(&self, data: Bytes);
    /// Closes the endpoint. Fire-and-forget; must tolerate repeated calls
    fn close(&self);
    fn local_address(&self) -> String;
    fn local_port(&self) -> u16;
    fn peer_address(&self) -> String;
    fn peer_port(&self) -> u16;
}

/// One listening endpoint of the external event layer
pub trait EventedServer: Send + Sync + 'static {
    type Socket: EventedSocket;

    /// Registers the handler for the "accept" event, replacing any previous one
    fn on_accept(&self, handler: AcceptCallback<Self::Socket>);
    fn close(&self);
    fn local_address(&self) -> String;
    fn local_port(&self) -> u16;
}

impl<T: EventedSocket + ?Sized> EventedSocket for Arc<T> {
    fn on_data(&self, handler: DataCallback) {
        T::on_data(self, handler)
    }

    fn write(&self, data: Bytes) {
        T::write(self, data)
    }

    fn close(&self) {
        T::close(self)
    }

    fn local_address(&self) -> String {
        T::local_address(self)
    }

    fn local_port(&self) -> u16 {
        T::local_port(self)
    }

    fn peer_address(&self) -> String {
        T::peer_address(self)
    }

    fn peer_port(&self) -> u16 {
        T::peer_port(self)
    }
}

impl<T: EventedServer + ?Sized> EventedServer for Arc<T> {
    type Socket = T::Socket;

    fn on_accept(&self, handler: AcceptCallback<Self::Socket>) {
        T::on_accept(self, handler)
    }

    fn close(&self) {
        T::close(self)
    }

    fn local_address(&self) -> String {
        T::local_address(self)
    }

    fn local_port(&self) -> u16 {
        T::local_port(self)
    }
}

/// Events a socket emits. Event layers that dispatch by name parse into this
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketEvent {
    Data,
}

/// Events a server emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerEvent {
    Accept,
}

impl SocketEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Data => "data",
        }
    }
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
        }
    }
}

impl FromStr for SocketEvent {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "data" => Ok(Self::Data),
            other => Err(BridgeError::UnknownEvent(other.to_string())),
        }
    }
}

impl FromStr for ServerEvent {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accept" => Ok(Self::Accept),
            other => Err(BridgeError::UnknownEvent(other.to_string())),
        }
    }
}

impl Display for SocketEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Display for ServerEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Builds an endpoint from the textual address and port an event layer reports.
/// IPv6 literals may be bracketed
pub fn parse_endpoint(address: &str, port: u16) -> Result<SocketAddr, BridgeError> {
    let trimmed = address
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']');
    let ip = IpAddr::from_str(trimmed)
        .map_err(|_| BridgeError::MalformedAddress(format!("{address}:{port}")))?;
    Ok(SocketAddr::new(ip, port))
}
