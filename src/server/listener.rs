//! MJPEG server listener
//!
//! Handles TCP accept loop and spawns connection handlers.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::error::Result;
use crate::hub::StreamHub;
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;
use crate::stats::{ServerCounters, ServerStats};

/// HTTP server publishing the hub's stream
pub struct StreamServer {
    config: ServerConfig,
    hub: Arc<StreamHub>,
    next_connection_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
    counters: Arc<ServerCounters>,
}

impl StreamServer {
    /// Create a new server streaming from `hub`
    pub fn new(config: ServerConfig, hub: Arc<StreamHub>) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config,
            hub,
            next_connection_id: AtomicU64::new(1),
            connection_semaphore,
            counters: Arc::new(ServerCounters::default()),
        }
    }

    /// Get a reference to the stream hub
    pub fn hub(&self) -> &Arc<StreamHub> {
        &self.hub
    }

    pub fn stats(&self) -> ServerStats {
        self.counters.snapshot()
    }

    /// Run the server
    ///
    /// This method blocks until the server is shut down.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "MJPEG server listening");

        self.accept_loop(&listener).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_until(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    ///
    /// On shutdown every subscriber is closed, which ends all open streams.
    /// Connections still reading their request are answered with 503.
    pub async fn serve_until<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "MJPEG server listening");

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        };

        self.hub.close_all();

        result
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    self.counters
                        .rejected_connections
                        .fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            connection_id = connection_id,
            peer = %peer_addr,
            "New connection"
        );

        if let Err(e) = self.configure_socket(&socket) {
            tracing::error!(error = %e, "Failed to configure socket");
            return;
        }

        let config = self.config.clone();
        let hub = Arc::clone(&self.hub);
        let counters = Arc::clone(&self.counters);

        counters.total_connections.fetch_add(1, Ordering::Relaxed);
        counters.active_connections.fetch_add(1, Ordering::Relaxed);

        tokio::spawn(async move {
            let _permit = permit;
            let mut connection = Connection::new(
                connection_id,
                socket,
                peer_addr,
                config,
                hub,
                Arc::clone(&counters),
            );

            if let Err(e) = connection.run().await {
                tracing::debug!(
                    connection_id = connection_id,
                    error = %e,
                    "Connection error"
                );
            }

            counters.active_connections.fetch_sub(1, Ordering::Relaxed);
            tracing::debug!(connection_id = connection_id, "Connection closed");
        });
    }

    fn configure_socket(&self, socket: &TcpStream) -> std::io::Result<()> {
        if self.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(())
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::oneshot;

    use super::*;
    use crate::encode::{EncodeError, FrameEncoder};
    use crate::frame::{Frame, Rgba};

    struct RawEncoder;

    impl FrameEncoder for RawEncoder {
        fn encode(&self, frame: &Frame) -> std::result::Result<Bytes, EncodeError> {
            Ok(Bytes::copy_from_slice(frame.as_bytes()))
        }
    }

    async fn wait_for_subscribers(hub: &StreamHub, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while hub.subscriber_count() != count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    async fn start(
        config: ServerConfig,
    ) -> (
        Arc<StreamServer>,
        SocketAddr,
        oneshot::Sender<()>,
        tokio::task::JoinHandle<Result<()>>,
    ) {
        let hub = Arc::new(StreamHub::new(Arc::new(RawEncoder)));
        let server = Arc::new(StreamServer::new(config, hub));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();

        let handle = tokio::spawn({
            let server = Arc::clone(&server);
            async move {
                server
                    .serve_until(listener, async {
                        let _ = rx.await;
                    })
                    .await
            }
        });

        (server, addr, tx, handle)
    }

    #[tokio::test]
    async fn test_two_viewers_and_disconnect() {
        let (server, addr, shutdown, handle) = start(ServerConfig::default()).await;
        let hub = Arc::clone(server.hub());

        let mut a = TcpStream::connect(addr).await.unwrap();
        let mut b = TcpStream::connect(addr).await.unwrap();
        a.write_all(b"GET /stream HTTP/1.1\r\n\r\n").await.unwrap();
        b.write_all(b"GET /stream HTTP/1.1\r\n\r\n").await.unwrap();
        wait_for_subscribers(&hub, 2).await;

        hub.publish(Frame::filled(1, 1, Rgba::new(7, 7, 7, 7)))
            .await
            .unwrap();

        let preamble_len = crate::server::http::stream_preamble(&hub.content_type()).len();
        let chunk = crate::hub::multipart::encode_part("myboundary", "image/jpeg", &[7, 7, 7, 7]);
        for viewer in [&mut a, &mut b] {
            let mut buf = vec![0u8; preamble_len + chunk.len()];
            viewer.read_exact(&mut buf).await.unwrap();
            assert!(buf.starts_with(b"HTTP/1.1 200 OK\r\n"));
            assert_eq!(&buf[preamble_len..], &chunk[..]);
        }

        // Closing one viewer leaves the other subscribed
        drop(a);
        wait_for_subscribers(&hub, 1).await;

        let stats = server.stats();
        assert_eq!(stats.total_connections, 2);

        shutdown.send(()).unwrap();
        handle.await.unwrap().unwrap();
        assert_eq!(hub.subscriber_count(), 0);

        // Shutdown closes the remaining stream
        let mut rest = Vec::new();
        b.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let (server, addr, shutdown, handle) =
            start(ServerConfig::default().max_connections(1)).await;
        let hub = Arc::clone(server.hub());

        let mut first = TcpStream::connect(addr).await.unwrap();
        first.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        wait_for_subscribers(&hub, 1).await;

        // Second connection is accepted by the OS and dropped by the server
        let mut second = TcpStream::connect(addr).await.unwrap();
        let mut buf = Vec::new();
        let read = tokio::time::timeout(Duration::from_secs(5), second.read_to_end(&mut buf))
            .await
            .unwrap();
        assert!(read.map(|n| n == 0).unwrap_or(true));
        assert_eq!(server.stats().rejected_connections, 1);

        drop(first);
        shutdown.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_pending_request_refused_after_shutdown() {
        let (server, addr, shutdown, handle) = start(ServerConfig::default()).await;
        let hub = Arc::clone(server.hub());

        // Accepted but still reading the request head when shutdown fires
        let mut viewer = TcpStream::connect(addr).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while server.stats().total_connections == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        shutdown.send(()).unwrap();
        handle.await.unwrap().unwrap();

        viewer.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        hub.publish(Frame::filled(1, 1, Rgba::new(1, 1, 1, 1)))
            .await
            .unwrap();

        let mut response = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), viewer.read_to_end(&mut response))
            .await
            .unwrap()
            .unwrap();
        assert!(response.starts_with(b"HTTP/1.1 503 Service Unavailable\r\n"));
        assert_eq!(hub.subscriber_count(), 0);
    }
}
