use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

/// The basic error type for this crate
pub enum BridgeError {
    /// The listener was closed. Accept calls after close always return this
    ListenerClosed,
    /// The connection was closed before or during the operation
    ConnectionClosed,
    /// The forwarding task could not deliver a chunk to the reader
    ForwardingFailed(String),
    /// The external layer reported an event name outside the registered set
    UnknownEvent(String),
    /// An address or port reported by the external layer could not be parsed
    MalformedAddress(String),
    /// Construction requires a tokio runtime, but none was running on this thread
    NoRuntime,
    /// A configuration value was rejected
    InvalidConfig(&'static str),
    Io(std::io::Error),
    /// For a converted error
    Generic(String),
}

impl Error for BridgeError {}

impl Debug for BridgeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_msg())
    }
}

impl BridgeError {
    fn to_msg(&self) -> String {
        match self {
            BridgeError::ListenerClosed => "Listener closed".to_string(),
            BridgeError::ConnectionClosed => "Connection closed".to_string(),
            BridgeError::ForwardingFailed(err) => format!("Forwarding failed: {err}"),
            BridgeError::UnknownEvent(name) => format!("Unknown event: {name}"),
            BridgeError::MalformedAddress(addr) => format!("Malformed address: {addr}"),
            BridgeError::NoRuntime => "No tokio runtime is running on this thread".to_string(),
            BridgeError::InvalidConfig(err) => format!("Invalid config: {err}"),
            BridgeError::Io(err) => err.to_string(),
            BridgeError::Generic(err) => err.to_string(),
        }
    }

    pub fn into_string(self) -> String {
        match self {
            BridgeError::Generic(err) => err,
            other => other.to_msg(),
        }
    }

    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Generic(msg.into())
    }

    /// Returns true for the expected terminal conditions (a closed listener or connection)
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ListenerClosed | Self::ConnectionClosed)
    }

    pub(crate) fn io_kind(&self) -> std::io::ErrorKind {
        match self {
            BridgeError::ListenerClosed | BridgeError::ConnectionClosed => {
                std::io::ErrorKind::NotConnected
            }
            BridgeError::ForwardingFailed(_) => std::io::ErrorKind::BrokenPipe,
            BridgeError::MalformedAddress(_) | BridgeError::InvalidConfig(_) => {
                std::io::ErrorKind::InvalidInput
            }
            BridgeError::Io(err) => err.kind(),
            _ => std::io::ErrorKind::Other,
        }
    }
}

impl Display for BridgeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        <Self as Debug>::fmt(self, f)
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Io(err)
    }
}

impl From<BridgeError> for std::io::Error {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Io(err) => err,
            other => std::io::Error::new(other.io_kind(), other.to_msg()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BridgeError;
    use std::io::ErrorKind;

    #[test]
    fn closed_errors_are_terminal() {
        assert!(BridgeError::ListenerClosed.is_closed());
        assert!(BridgeError::ConnectionClosed.is_closed());
        assert!(!BridgeError::msg("other").is_closed());
    }

    #[test]
    fn io_round_trip_keeps_kind() {
        let err: std::io::Error = BridgeError::ForwardingFailed("reader gone".into()).into();
        assert_eq!(err.kind(), ErrorKind::BrokenPipe);
        assert!(err.to_string().contains("reader gone"));

        let original = std::io::Error::new(ErrorKind::TimedOut, "slow");
        let err: std::io::Error = BridgeError::from(original).into();
        assert_eq!(err.kind(), ErrorKind::TimedOut);
    }

    #[test]
    fn into_string_unwraps_generic() {
        assert_eq!(BridgeError::msg("plain").into_string(), "plain");
        assert_eq!(
            BridgeError::MalformedAddress("x.y".into()).into_string(),
            "Malformed address: x.y"
        );
    }
}
