use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Returned when a blocking closure panicked or its task was cancelled
#[derive(Debug)]
pub struct BlockingSpawnError {
    pub message: String,
}

impl Display for BlockingSpawnError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Blocking task failed: {}", self.message)
    }
}

impl std::error::Error for BlockingSpawnError {}

/// Future over a closure running on the runtime's blocking pool
pub struct BlockingSpawn<T> {
    pub(crate) handle: tokio::task::JoinHandle<T>,
}

impl<T> Future for BlockingSpawn<T> {
    type Output = Result<T, BlockingSpawnError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle)
            .poll(cx)
            .map_err(|err| BlockingSpawnError {
                message: err.to_string(),
            })
    }
}
