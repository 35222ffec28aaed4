//! Per-connection handler
//!
//! Reads one request head, then either answers with a fixed response or turns
//! the connection into a hub subscriber and forwards chunks until the viewer
//! goes away, a write fails, or the hub closes the subscription.
//!
//! While streaming, the request side is watched for disconnects. End of input
//! counts as the viewer leaving, so a client that half-closes its write side
//! after the request ends its own stream. Browsers and players keep the
//! request side open for as long as they display the stream.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::config::ServerConfig;
use super::http::{self, RequestHead};
use crate::error::{Error, Result};
use crate::hub::StreamHub;
use crate::stats::ServerCounters;

/// One HTTP connection
pub struct Connection<S> {
    id: u64,
    stream: S,
    peer_addr: SocketAddr,
    config: ServerConfig,
    hub: Arc<StreamHub>,
    counters: Arc<ServerCounters>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub(crate) fn new(
        id: u64,
        stream: S,
        peer_addr: SocketAddr,
        config: ServerConfig,
        hub: Arc<StreamHub>,
        counters: Arc<ServerCounters>,
    ) -> Self {
        Self {
            id,
            stream,
            peer_addr,
            config,
            hub,
            counters,
        }
    }

    /// Serve the connection to completion
    pub async fn run(&mut self) -> Result<()> {
        let head = match tokio::time::timeout(self.config.request_timeout, self.read_head()).await
        {
            Ok(Ok(head)) => head,
            Ok(Err(Error::BadRequest(reason))) => {
                self.send(http::response("400 Bad Request", &[], b"")).await?;
                return Err(Error::BadRequest(reason));
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(Error::Timeout),
        };

        tracing::debug!(
            connection_id = self.id,
            peer = %self.peer_addr,
            method = %head.method,
            path = %head.path,
            "Request"
        );

        if head.method != "GET" {
            return self
                .send(http::response(
                    "405 Method Not Allowed",
                    &[("Allow", "GET")],
                    b"",
                ))
                .await;
        }

        if head.path == self.config.snapshot_path {
            return self.snapshot().await;
        }

        self.stream_frames().await
    }

    async fn read_head(&mut self) -> Result<RequestHead> {
        let mut buf = BytesMut::with_capacity(1024);

        loop {
            if let Some(end) = http::find_head_end(&buf) {
                return http::parse_request_head(&buf[..end]);
            }
            if buf.len() >= self.config.max_request_size {
                return Err(Error::BadRequest("request head too large".into()));
            }

            let n = self.stream.read_buf(&mut buf).await?;
            if n == 0 {
                return Err(Error::Io(std::io::ErrorKind::UnexpectedEof.into()));
            }
        }
    }

    async fn snapshot(&mut self) -> Result<()> {
        let response = match self.hub.latest_frame() {
            Some(frame) => http::response(
                "200 OK",
                &[
                    ("Content-Type", frame.content_type),
                    ("Cache-Control", "no-cache"),
                ],
                &frame.data,
            ),
            None => http::response("204 No Content", &[], b""),
        };
        self.send(response).await
    }

    async fn stream_frames(&mut self) -> Result<()> {
        let mut subscription = self.hub.subscribe();
        let subscriber = subscription.id();

        if !subscription.phase().is_open() {
            tracing::debug!(
                connection_id = self.id,
                subscriber = %subscriber,
                "Stream refused: hub closed"
            );
            return self
                .send(http::response("503 Service Unavailable", &[], b""))
                .await;
        }

        let preamble = http::stream_preamble(&self.hub.content_type());
        if let Err(e) = self.send(preamble).await {
            subscription.write_failed();
            return Err(e);
        }

        let mut probe = [0u8; 512];

        loop {
            tokio::select! {
                chunk = subscription.recv() => {
                    let Some(chunk) = chunk else {
                        tracing::debug!(
                            connection_id = self.id,
                            subscriber = %subscriber,
                            reason = ?subscription.close_reason(),
                            "Subscription closed by hub"
                        );
                        return Ok(());
                    };

                    let write = tokio::time::timeout(
                        self.config.write_timeout,
                        self.stream.write_all(&chunk),
                    )
                    .await;

                    match write {
                        Ok(Ok(())) => {
                            self.counters
                                .total_bytes_sent
                                .fetch_add(chunk.len() as u64, Ordering::Relaxed);
                        }
                        Ok(Err(e)) => {
                            subscription.write_failed();
                            return Err(e.into());
                        }
                        Err(_) => {
                            subscription.write_failed();
                            return Err(Error::Timeout);
                        }
                    }
                }
                read = self.stream.read(&mut probe) => {
                    match read {
                        // EOF, including a half-close, ends the stream
                        Ok(0) | Err(_) => {
                            let stats = subscription.stats();
                            tracing::debug!(
                                connection_id = self.id,
                                subscriber = %subscriber,
                                chunks = stats.chunks_delivered,
                                skipped = stats.frames_skipped,
                                bitrate = stats.bitrate(),
                                "Viewer disconnected"
                            );
                            return Ok(());
                        }
                        // Pipelined bytes after the request are ignored
                        Ok(_) => {}
                    }
                }
            }
        }
    }

    async fn send(&mut self, bytes: bytes::Bytes) -> Result<()> {
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.counters
            .total_bytes_sent
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tokio::io::{duplex, DuplexStream};
    use tokio::task::JoinHandle;

    use super::*;
    use crate::encode::{EncodeError, FrameEncoder};
    use crate::frame::{Frame, Rgba};
    use crate::hub::multipart;

    struct RawEncoder;

    impl FrameEncoder for RawEncoder {
        fn encode(&self, frame: &Frame) -> std::result::Result<Bytes, EncodeError> {
            Ok(Bytes::copy_from_slice(frame.as_bytes()))
        }
    }

    fn spawn_connection(hub: Arc<StreamHub>) -> (DuplexStream, JoinHandle<Result<()>>) {
        let (client, server) = duplex(64 * 1024);
        let mut connection = Connection::new(
            1,
            server,
            "127.0.0.1:50000".parse().unwrap(),
            ServerConfig::default(),
            hub,
            Arc::new(ServerCounters::default()),
        );
        let handle = tokio::spawn(async move { connection.run().await });
        (client, handle)
    }

    async fn read_head(client: &mut DuplexStream) -> String {
        let mut buf = Vec::new();
        let mut byte = [0u8; 1];
        while !buf.ends_with(b"\r\n\r\n") {
            client.read_exact(&mut byte).await.unwrap();
            buf.push(byte[0]);
        }
        String::from_utf8(buf).unwrap()
    }

    fn hub() -> Arc<StreamHub> {
        Arc::new(StreamHub::new(Arc::new(RawEncoder)))
    }

    #[tokio::test]
    async fn test_stream_forwards_chunks() {
        let hub = hub();
        let (mut client, handle) = spawn_connection(hub.clone());

        client
            .write_all(b"GET /stream HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();

        let head = read_head(&mut client).await;
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(head.contains("Content-Type: multipart/x-mixed-replace; boundary=myboundary\r\n"));
        assert!(head.contains("Cache-Control: no-cache\r\n"));
        assert!(head.contains("Pragma: no-cache\r\n"));
        assert_eq!(hub.subscriber_count(), 1);

        hub.publish(Frame::filled(1, 1, Rgba::new(1, 2, 3, 4)))
            .await
            .unwrap();

        let expected = multipart::encode_part("myboundary", "image/jpeg", &[1, 2, 3, 4]);
        let mut chunk = vec![0u8; expected.len()];
        client.read_exact(&mut chunk).await.unwrap();
        assert_eq!(&chunk[..], &expected[..]);

        // Viewer goes away: connection ends and the subscriber is removed
        drop(client);
        handle.await.unwrap().unwrap();
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_hub_shutdown_ends_stream() {
        let hub = hub();
        let (mut client, handle) = spawn_connection(hub.clone());

        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        read_head(&mut client).await;

        hub.close_all();
        handle.await.unwrap().unwrap();

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot() {
        let hub = hub();

        let (mut client, handle) = spawn_connection(hub.clone());
        client.write_all(b"GET /frame.jpg HTTP/1.1\r\n\r\n").await.unwrap();
        let head = read_head(&mut client).await;
        assert!(head.starts_with("HTTP/1.1 204 No Content\r\n"));
        handle.await.unwrap().unwrap();

        hub.publish(Frame::filled(1, 1, Rgba::new(9, 9, 9, 9)))
            .await
            .unwrap();

        let (mut client, handle) = spawn_connection(hub.clone());
        client.write_all(b"GET /frame.jpg HTTP/1.1\r\n\r\n").await.unwrap();
        let head = read_head(&mut client).await;
        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(head.contains("Content-Type: image/jpeg\r\n"));
        assert!(head.contains("Content-Length: 4\r\n"));

        let mut body = [0u8; 4];
        client.read_exact(&mut body).await.unwrap();
        assert_eq!(body, [9, 9, 9, 9]);
        handle.await.unwrap().unwrap();

        // Snapshots never register a subscriber
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let (mut client, handle) = spawn_connection(hub());

        client.write_all(b"POST / HTTP/1.1\r\n\r\n").await.unwrap();
        let head = read_head(&mut client).await;

        assert!(head.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"));
        assert!(head.contains("Allow: GET\r\n"));
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bad_request() {
        let (mut client, handle) = spawn_connection(hub());

        client.write_all(b"NONSENSE\r\n\r\n").await.unwrap();
        let head = read_head(&mut client).await;

        assert!(head.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(matches!(handle.await.unwrap(), Err(Error::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_request_too_large() {
        let (mut client, handle) = spawn_connection(hub());

        let mut request = b"GET / HTTP/1.1\r\n".to_vec();
        request.extend(std::iter::repeat(b'a').take(9 * 1024));
        client.write_all(&request).await.unwrap();

        let head = read_head(&mut client).await;
        assert!(head.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(matches!(handle.await.unwrap(), Err(Error::BadRequest(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout() {
        let (_client, handle) = spawn_connection(hub());

        assert!(matches!(handle.await.unwrap(), Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn test_stream_refused_after_shutdown() {
        let hub = hub();
        hub.close_all();
        let (mut client, handle) = spawn_connection(hub.clone());

        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        let head = read_head(&mut client).await;

        assert!(head.starts_with("HTTP/1.1 503 Service Unavailable\r\n"));
        handle.await.unwrap().unwrap();
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_half_close_ends_stream() {
        let hub = hub();
        let (mut client, handle) = spawn_connection(hub.clone());

        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        read_head(&mut client).await;
        assert_eq!(hub.subscriber_count(), 1);

        client.shutdown().await.unwrap();
        handle.await.unwrap().unwrap();
        assert_eq!(hub.subscriber_count(), 0);
    }
}
