//! # Connection adapter
//!
//! [`EventConn`] turns one [`EventedSocket`] into an ordered byte stream.
//!
//! ```text
//! data event -> chunk queue (bounded) -> forwarding task -> pipe -> poll_read
//! poll_write -> EventedSocket::write (fire-and-forget)
//! ```
//!
//! The data handler runs on the event layer's thread and blocks once the chunk
//! queue is full; that is the only backpressure the event layer sees. One
//! forwarding task per connection drains the queue into an in-memory pipe in
//! FIFO order, so readers observe the exact concatenation of delivered chunks.
//!
//! Closing is idempotent. The first close flips `closed`, stops the forwarding
//! task, releases any pending reader with end-of-stream and closes the socket.
//! Dropping an open connection closes it.
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::socket::{parse_endpoint, DataCallback, EventedSocket};
use crate::stream::{ConnAddr, Deadline};
use bytes::Bytes;
use futures::task::AtomicWaker;
use sockbridge_io::tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use sockbridge_io::tokio::runtime::Handle;
use sockbridge_io::tokio::sync::mpsc::error::TrySendError;
use sockbridge_io::tokio::sync::mpsc::{channel, Receiver, Sender};
use sockbridge_io::tokio_util::sync::CancellationToken;
use sockbridge_io::Mutex;
use sockbridge_logging::{debug, trace, warn};
use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

pub struct EventConn<S: EventedSocket> {
    shared: Arc<ConnShared<S>>,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
}

/// Closes an [`EventConn`] from another task while the connection itself is
/// borrowed by a reader or writer
pub struct CloseHandle<S: EventedSocket> {
    shared: Arc<ConnShared<S>>,
}

struct ConnShared<S> {
    socket: S,
    closed: AtomicBool,
    /// Read end of the pipe. Taken on close
    reader: Mutex<Option<DuplexStream>>,
    read_waker: AtomicWaker,
    /// Set when the forwarding task tore the connection down
    failure: Mutex<Option<String>>,
    shutdown: CancellationToken,
}

impl<S: EventedSocket> ConnShared<S> {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Returns false if the connection was already closed
    fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }

        self.teardown();
        true
    }

    fn fail(&self, err: std::io::Error) {
        if self.closed.swap(true, Ordering::AcqRel) {
            // already closed by the consumer; the sink error is a consequence, not a cause
            return;
        }

        warn!(target: "sockbridge", "Forwarding failed, closing connection: {err}");
        *self.failure.lock() = Some(err.to_string());
        self.teardown();
    }

    fn teardown(&self) {
        // stop the forwarder before dropping the read end so it never races a broken pipe
        self.shutdown.cancel();
        let reader = self.reader.lock().take();
        drop(reader);
        self.read_waker.wake();
        self.socket.close();
    }

    fn poll_read(&self, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        self.read_waker.register(cx.waker());
        let mut reader = self.reader.lock();
        match reader.as_mut() {
            Some(pipe) => Pin::new(pipe).poll_read(cx, buf),
            None => match self.failure.lock().as_ref() {
                Some(cause) => Poll::Ready(Err(BridgeError::ForwardingFailed(cause.clone()).into())),
                None => Poll::Ready(Ok(())),
            },
        }
    }
}

impl<S: EventedSocket> EventConn<S> {
    /// Wraps `socket` using the default [`BridgeConfig`] and the runtime driving the current thread
    pub fn new(socket: S) -> Result<Self, BridgeError> {
        Self::with_config(socket, BridgeConfig::default())
    }

    pub fn with_config(socket: S, config: BridgeConfig) -> Result<Self, BridgeError> {
        let handle = sockbridge_io::current_handle().ok_or(BridgeError::NoRuntime)?;
        Self::with_handle(socket, config, &handle)
    }

    /// Wraps `socket`, spawning the forwarding task on `handle`. May be called from any thread
    pub fn with_handle(socket: S, config: BridgeConfig, handle: &Handle) -> Result<Self, BridgeError> {
        config.validate()?;
        let (local_addr, peer_addr) = endpoints(&socket)?;
        Ok(Self::from_parts(socket, local_addr, peer_addr, config, handle))
    }

    /// Assumes `config` has been validated and the endpoints parsed
    pub(crate) fn from_parts(
        socket: S,
        local_addr: SocketAddr,
        peer_addr: SocketAddr,
        config: BridgeConfig,
        handle: &Handle,
    ) -> Self {
        let (reader, writer) = sockbridge_io::tokio::io::duplex(config.pipe_buffer_size());
        Self::with_sink(socket, local_addr, peer_addr, config, handle, reader, writer)
    }

    /// Wires the socket to `reader`, with the forwarding task writing every chunk into `sink`
    fn with_sink<W>(
        socket: S,
        local_addr: SocketAddr,
        peer_addr: SocketAddr,
        config: BridgeConfig,
        handle: &Handle,
        reader: DuplexStream,
        sink: W,
    ) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (chunk_tx, chunk_rx) = channel(config.chunk_queue_capacity());
        let shutdown = CancellationToken::new();

        socket.on_data(data_handler(chunk_tx, shutdown.clone()));

        let shared = Arc::new(ConnShared {
            socket,
            closed: AtomicBool::new(false),
            reader: Mutex::new(Some(reader)),
            read_waker: AtomicWaker::new(),
            failure: Mutex::new(None),
            shutdown,
        });

        let _forwarder = handle.spawn(forward(shared.clone(), chunk_rx, sink));
        debug!(target: "sockbridge", "Wrapped socket {local_addr} <-> {peer_addr}");

        Self {
            shared,
            local_addr,
            peer_addr,
        }
    }

    /// Closes the connection. Only the first call has any effect
    pub fn close(&self) -> Result<(), BridgeError> {
        if self.shared.close() {
            debug!(target: "sockbridge", "Closed connection to {}", self.peer_addr);
        }

        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    pub fn close_handle(&self) -> CloseHandle<S> {
        CloseHandle {
            shared: self.shared.clone(),
        }
    }

    /// The wrapped socket
    pub fn socket(&self) -> &S {
        &self.shared.socket
    }
}

impl<S: EventedSocket> CloseHandle<S> {
    pub fn close(&self) -> Result<(), BridgeError> {
        let _ = self.shared.close();
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}

impl<S: EventedSocket> Clone for CloseHandle<S> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

/// Parses the socket's reported endpoints as (local, peer)
pub(crate) fn endpoints<S: EventedSocket>(socket: &S) -> Result<(SocketAddr, SocketAddr), BridgeError> {
    let local_addr = parse_endpoint(&socket.local_address(), socket.local_port())?;
    let peer_addr = parse_endpoint(&socket.peer_address(), socket.peer_port())?;
    Ok((local_addr, peer_addr))
}

fn data_handler(chunks: Sender<Bytes>, shutdown: CancellationToken) -> DataCallback {
    Box::new(move |chunk: Bytes| {
        if chunk.is_empty() {
            return;
        }

        if shutdown.is_cancelled() {
            trace!(target: "sockbridge", "Dropping {} bytes delivered after close", chunk.len());
            return;
        }

        match chunks.try_send(chunk) {
            Ok(()) => {}

            Err(TrySendError::Full(chunk)) => {
                trace!(target: "sockbridge", "Chunk queue full; blocking the event layer");
                // runs on the event layer's thread, which owns no runtime
                let delivered = futures::executor::block_on(async {
                    sockbridge_io::tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => false,
                        res = chunks.send(chunk) => res.is_ok(),
                    }
                });

                if !delivered {
                    trace!(target: "sockbridge", "Connection closed while the event layer was blocked");
                }
            }

            Err(TrySendError::Closed(chunk)) => {
                trace!(target: "sockbridge", "Dropping {} bytes; forwarder has exited", chunk.len());
            }
        }
    })
}

async fn forward<S, W>(shared: Arc<ConnShared<S>>, mut chunks: Receiver<Bytes>, mut sink: W)
where
    S: EventedSocket,
    W: AsyncWrite + Unpin,
{
    let shutdown = shared.shutdown.clone();

    loop {
        let chunk = sockbridge_io::tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            chunk = chunks.recv() => match chunk {
                Some(chunk) => chunk,
                // every sender is gone: the event layer dropped our handler
                None => break,
            },
        };

        let res = sockbridge_io::tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            res = sink.write_all(&chunk) => res,
        };

        if let Err(err) = res {
            shared.fail(err);
            break;
        }
    }

    chunks.close();
    trace!(target: "sockbridge", "Forwarding task exited");
    // dropping the sink ends the stream for the reader once drained
}

impl<S: EventedSocket> AsyncRead for EventConn<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        self.shared.poll_read(cx, buf)
    }
}

impl<S: EventedSocket> AsyncWrite for EventConn<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        if self.shared.is_closed() {
            return Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                BridgeError::ConnectionClosed.into_string(),
            )));
        }

        if !buf.is_empty() {
            self.shared.socket.write(Bytes::copy_from_slice(buf));
        }

        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(self.close().map_err(std::io::Error::from))
    }
}

impl<S: EventedSocket> ConnAddr for EventConn<S> {
    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        Ok(self.local_addr)
    }

    fn peer_addr(&self) -> std::io::Result<SocketAddr> {
        Ok(self.peer_addr)
    }
}

// The event layer cannot enforce deadlines; these are accepted and ignored
impl<S: EventedSocket> Deadline for EventConn<S> {
    fn set_deadline(&self, _deadline: Option<Instant>) -> std::io::Result<()> {
        Ok(())
    }

    fn set_read_deadline(&self, _deadline: Option<Instant>) -> std::io::Result<()> {
        Ok(())
    }

    fn set_write_deadline(&self, _deadline: Option<Instant>) -> std::io::Result<()> {
        Ok(())
    }
}

impl<S: EventedSocket> Drop for EventConn<S> {
    fn drop(&mut self) {
        if self.shared.close() {
            trace!(target: "sockbridge", "Dropped open connection to {}", self.peer_addr);
        }
    }
}

impl<S: EventedSocket> Debug for EventConn<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventConn")
            .field("local_addr", &self.local_addr)
            .field("peer_addr", &self.peer_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimSocket;
    use sockbridge_io::tokio;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn sim_socket() -> SimSocket {
        SimSocket::new(
            "127.0.0.1:1338".parse().unwrap(),
            "192.168.1.20:51000".parse().unwrap(),
        )
    }

    #[tokio::test]
    async fn chunks_are_read_in_order_then_eof_after_close() {
        sockbridge_logging::setup_log();
        let socket = sim_socket();
        let mut conn = EventConn::new(socket.clone()).unwrap();

        assert!(socket.emit_data("ab"));
        assert!(socket.emit_data("c"));
        assert!(socket.emit_data("def"));

        let mut buf = [0u8; 6];
        conn.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"abcdef");

        conn.close().unwrap();
        let mut rest = Vec::new();
        let n = tokio::time::timeout(Duration::from_secs(1), conn.read_to_end(&mut rest))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn endpoints_are_captured_at_construction() {
        sockbridge_logging::setup_log();
        let conn = EventConn::new(sim_socket()).unwrap();
        assert_eq!(conn.local_addr().unwrap(), "127.0.0.1:1338".parse().unwrap());
        assert_eq!(conn.peer_addr().unwrap(), "192.168.1.20:51000".parse().unwrap());
    }

    #[tokio::test]
    async fn malformed_address_fails_construction() {
        sockbridge_logging::setup_log();
        let socket = SimSocket::with_raw("127.0.0.1", 1, "not-an-ip", 2);
        let res = EventConn::new(socket.clone());
        assert!(matches!(res, Err(BridgeError::MalformedAddress(_))));
        assert!(!socket.has_data_handler());
    }

    #[test]
    fn construction_requires_a_runtime() {
        let res = EventConn::new(sim_socket());
        assert!(matches!(res, Err(BridgeError::NoRuntime)));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        sockbridge_logging::setup_log();
        let socket = sim_socket();
        let conn = EventConn::new(socket.clone()).unwrap();

        for _ in 0..3 {
            conn.close().unwrap();
        }

        assert!(conn.is_closed());
        assert_eq!(socket.close_calls(), 1);
        drop(conn);
        assert_eq!(socket.close_calls(), 1);
    }

    #[tokio::test]
    async fn drop_closes_the_socket() {
        sockbridge_logging::setup_log();
        let socket = sim_socket();
        let conn = EventConn::new(socket.clone()).unwrap();
        drop(conn);
        assert!(socket.is_closed());
        assert!(!socket.emit_data("late"));
    }

    #[tokio::test]
    async fn pending_read_is_released_by_close() {
        sockbridge_logging::setup_log();
        let mut conn = EventConn::new(sim_socket()).unwrap();
        let closer = conn.close_handle();

        let reader = tokio::spawn(async move {
            let mut buf = [0u8; 16];
            conn.read(&mut buf).await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!reader.is_finished());
        closer.close().unwrap();

        let n = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(n, 0);
        assert!(closer.is_closed());
    }

    #[tokio::test]
    async fn writes_pass_through_until_closed() {
        sockbridge_logging::setup_log();
        let socket = sim_socket();
        let mut conn = EventConn::new(socket.clone()).unwrap();

        conn.write_all(b"hello ").await.unwrap();
        conn.write_all(b"world").await.unwrap();
        conn.flush().await.unwrap();
        assert_eq!(socket.written_bytes(), b"hello world");
        assert_eq!(socket.written().len(), 2);

        conn.close().unwrap();
        let err = conn.write(b"again").await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
        assert_eq!(socket.written_bytes(), b"hello world");
    }

    #[tokio::test]
    async fn shutdown_closes_the_connection() {
        sockbridge_logging::setup_log();
        let socket = sim_socket();
        let mut conn = EventConn::new(socket.clone()).unwrap();
        conn.shutdown().await.unwrap();
        assert!(conn.is_closed());
        assert!(socket.is_closed());
    }

    #[tokio::test]
    async fn deadlines_are_accepted() {
        sockbridge_logging::setup_log();
        let conn = EventConn::new(sim_socket()).unwrap();
        let later = Some(Instant::now() + Duration::from_secs(5));
        conn.set_deadline(later).unwrap();
        conn.set_read_deadline(later).unwrap();
        conn.set_write_deadline(None).unwrap();
    }

    #[tokio::test]
    async fn stream_ends_when_event_layer_drops_handler() {
        sockbridge_logging::setup_log();
        let socket = sim_socket();
        let mut conn = EventConn::new(socket.clone()).unwrap();
        assert!(socket.emit_data("tail"));
        // closing the external socket directly removes our handler, which closes the queue
        socket.close();

        let mut out = Vec::new();
        let _ = tokio::time::timeout(Duration::from_secs(1), conn.read_to_end(&mut out))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out, b"tail");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn producer_thread_bursts_keep_order() {
        sockbridge_logging::setup_log();
        const COUNT: u32 = 10_000;
        let socket = sim_socket();
        let mut conn = EventConn::new(socket.clone()).unwrap();

        let producer = std::thread::spawn(move || {
            for x in 0..COUNT {
                assert!(socket.emit_data(Bytes::copy_from_slice(&x.to_be_bytes())));
            }
        });

        for x in 0..COUNT {
            let value = conn.read_u32().await.unwrap();
            assert_eq!(value, x);
        }

        producer.join().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn full_queue_blocks_the_producer_without_dropping() {
        sockbridge_logging::setup_log();
        const CHUNKS: usize = 20;
        let config = BridgeConfig::default()
            .with_chunk_queue_capacity(2)
            .with_pipe_buffer_size(4);
        let socket = sim_socket();
        let mut conn = EventConn::with_config(socket.clone(), config).unwrap();

        let emitted = Arc::new(AtomicUsize::new(0));
        let emitted_in = emitted.clone();
        let producer = std::thread::spawn(move || {
            for x in 0..CHUNKS {
                assert!(socket.emit_data(vec![x as u8; 4]));
                let _ = emitted_in.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        let stalled_at = emitted.load(Ordering::SeqCst);
        assert!(stalled_at < CHUNKS, "producer was never blocked");

        let mut out = vec![0u8; CHUNKS * 4];
        conn.read_exact(&mut out).await.unwrap();
        producer.join().unwrap();

        assert_eq!(emitted.load(Ordering::SeqCst), CHUNKS);
        for (idx, chunk) in out.chunks(4).enumerate() {
            assert_eq!(chunk, &[idx as u8; 4]);
        }
    }

    /// Accepts `budget` bytes, then refuses every write
    struct FailingSink {
        budget: usize,
    }

    impl AsyncWrite for FailingSink {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            if self.budget == 0 {
                return Poll::Ready(Err(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "sink refused",
                )));
            }

            let n = buf.len().min(self.budget);
            self.budget -= n;
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn forwarding_failure_closes_and_surfaces_on_read() {
        sockbridge_logging::setup_log();
        let socket = sim_socket();
        let (local_addr, peer_addr) = endpoints(&socket).unwrap();
        // the write half stays alive so only the failing sink can end the stream
        let (reader, _unused_writer) = tokio::io::duplex(64);
        let mut conn = EventConn::with_sink(
            socket.clone(),
            local_addr,
            peer_addr,
            BridgeConfig::default(),
            &Handle::current(),
            reader,
            FailingSink { budget: 3 },
        );

        assert!(socket.emit_data("abc"));
        assert!(socket.emit_data("def"));

        tokio::time::timeout(Duration::from_secs(1), async {
            while !conn.is_closed() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(socket.close_calls(), 1);
        let mut buf = [0u8; 8];
        let err = conn.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
        assert!(err.to_string().contains("sink refused"));

        // a later consumer close does not touch the socket again
        conn.close().unwrap();
        assert_eq!(socket.close_calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn close_releases_a_blocked_producer() {
        sockbridge_logging::setup_log();
        let config = BridgeConfig::default()
            .with_chunk_queue_capacity(1)
            .with_pipe_buffer_size(1);
        let socket = sim_socket();
        let conn = EventConn::with_config(socket.clone(), config).unwrap();

        let producer = std::thread::spawn(move || {
            for _ in 0..10 {
                let _ = socket.emit_data("xx");
            }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        conn.close().unwrap();

        let joined = tokio::time::timeout(
            Duration::from_secs(2),
            sockbridge_io::spawn_blocking(move || producer.join()),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(joined.is_ok());
    }
}
