//! Accept loop driving a [`BridgeListener`].
//!
//! Every accepted connection is handed to a [`ConnectionHandler`] on its own
//! task. A failing handler only affects its own connection. The loop returns
//! `Ok(())` once the listener is closed.
use crate::error::BridgeError;
use crate::stream::{BridgeListener, ConnAddr};
use async_trait::async_trait;
use sockbridge_logging::{debug, error, info, warn};
use std::future::Future;
use std::sync::Arc;

#[async_trait]
pub trait ConnectionHandler<C: Send + 'static>: Send + Sync + 'static {
    async fn on_connection(&self, conn: C) -> Result<(), anyhow::Error>;
}

#[async_trait]
impl<C, F, Fut> ConnectionHandler<C> for F
where
    C: Send + 'static,
    F: Fn(C) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
{
    async fn on_connection(&self, conn: C) -> Result<(), anyhow::Error> {
        (self)(conn).await
    }
}

/// Accepts until the listener closes, spawning `handler` once per connection
pub async fn serve<L, H>(listener: &L, handler: H) -> Result<(), BridgeError>
where
    L: BridgeListener,
    H: ConnectionHandler<L::Conn>,
{
    let handler = Arc::new(handler);
    info!(target: "sockbridge", "Serving on {:?}", listener.local_addr().ok());

    loop {
        match listener.accept().await {
            Ok(conn) => {
                let peer_addr = conn.peer_addr().ok();
                debug!(target: "sockbridge", "Accepted connection from {peer_addr:?}");
                let handler = handler.clone();
                let _task = sockbridge_io::spawn(async move {
                    if let Err(err) = handler.on_connection(conn).await {
                        warn!(target: "sockbridge", "Connection handler for {peer_addr:?} failed: {err:?}");
                    }
                });
            }

            Err(BridgeError::ListenerClosed) => {
                info!(target: "sockbridge", "Listener closed; serve loop exiting");
                return Ok(());
            }

            Err(err) => {
                error!(target: "sockbridge", "Accept failed: {err:?}");
                return Err(err);
            }
        }
    }
}
