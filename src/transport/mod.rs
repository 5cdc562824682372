//! Transport module - the byte channel the protocol engine runs over.
//!
//! A [`Channel`] is a duplex, ordered byte pipe: writes go out via
//! [`Channel::send`], reads arrive as [`ChannelEvent`]s produced by a
//! spawned read task. The engine owns the channel exclusively for the
//! lifetime of one connection.
//!
//! [`Channel::from_stream`] accepts any `AsyncRead + AsyncWrite` stream, so
//! the same machinery serves TCP ([`TcpTransport`]), TLS wrappers built
//! outside this crate, and in-memory duplex pipes in tests.

mod tcp;

pub use tcp::{TcpTransport, DEFAULT_CONNECT_TIMEOUT};

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::error::ChannelError;

/// Default bound on a single channel write.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Read buffer size for the channel read task.
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Asynchronous events delivered by a channel.
///
/// `Closed` and `Error` are terminal: no further `Data` follows either.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A chunk of bytes in peer write order.
    Data(Bytes),
    /// The peer closed the connection.
    Closed,
    /// The transport failed.
    Error(String),
}

/// Configuration for a [`Channel`].
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// How long a single `send` may block before it fails.
    pub send_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

/// A connected duplex byte pipe.
pub struct Channel {
    writer: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    events: mpsc::Receiver<ChannelEvent>,
    send_timeout: Duration,
}

impl Channel {
    /// Wrap a connected stream, spawning its read task.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::from_stream_with_config(stream, ChannelConfig::default())
    }

    /// Wrap a connected stream with explicit configuration.
    pub fn from_stream_with_config<S>(stream: S, config: ChannelConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(read_loop(reader, tx));

        Self {
            writer: Some(Box::new(writer)),
            events: rx,
            send_timeout: config.send_timeout,
        }
    }

    /// Write bytes to the peer.
    ///
    /// Fails with [`ChannelError::SendFailed`] on I/O error, on timeout, or
    /// after [`shutdown`](Self::shutdown).
    pub async fn send(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| ChannelError::SendFailed("channel is shut down".into()))?;

        let write = async {
            writer.write_all(bytes).await?;
            writer.flush().await
        };
        match tokio::time::timeout(self.send_timeout, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(ChannelError::SendFailed(err.to_string())),
            Err(_) => Err(ChannelError::SendFailed("send timed out".into())),
        }
    }

    /// Next inbound event. Keeps yielding `Closed` once the read task ends.
    pub async fn recv(&mut self) -> ChannelEvent {
        self.events.recv().await.unwrap_or(ChannelEvent::Closed)
    }

    /// Close the write side. Idempotent and best-effort.
    pub async fn shutdown(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.shutdown().await;
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("open", &self.writer.is_some())
            .finish()
    }
}

/// Read task: forwards chunks until EOF, error, or the channel is dropped.
async fn read_loop<R>(mut reader: R, events: mpsc::Sender<ChannelEvent>)
where
    R: AsyncRead + Send + Unpin,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                let _ = events.send(ChannelEvent::Closed).await;
                return;
            }
            Ok(n) => {
                let chunk = Bytes::copy_from_slice(&buf[..n]);
                if events.send(ChannelEvent::Data(chunk)).await.is_err() {
                    return;
                }
            }
            Err(err) => {
                let _ = events.send(ChannelEvent::Error(err.to_string())).await;
                return;
            }
        }
    }
}

/// Factory for connected channels.
///
/// The engine calls [`open`](Transport::open) on every connect attempt.
/// Implementations outside this crate supply TLS, WebSocket or test
/// transports; [`TcpTransport`] is the built-in one.
pub trait Transport: Send {
    /// Establish a fresh connection.
    fn open(&mut self) -> Pin<Box<dyn Future<Output = Result<Channel, ChannelError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_send_reaches_peer() {
        let (local, mut remote) = tokio::io::duplex(1024);
        let mut channel = Channel::from_stream(local);

        channel.send(b"hello").await.unwrap();

        let mut buf = [0u8; 5];
        tokio::io::AsyncReadExt::read_exact(&mut remote, &mut buf)
            .await
            .unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[tokio::test]
    async fn test_recv_delivers_in_order() {
        let (local, mut remote) = tokio::io::duplex(1024);
        let mut channel = Channel::from_stream(local);

        remote.write_all(b"ab").await.unwrap();
        remote.write_all(b"cd").await.unwrap();

        let mut seen = Vec::new();
        while seen.len() < 4 {
            match channel.recv().await {
                ChannelEvent::Data(chunk) => seen.extend_from_slice(&chunk),
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert_eq!(seen, b"abcd");
    }

    #[tokio::test]
    async fn test_peer_close_is_terminal() {
        let (local, remote) = tokio::io::duplex(1024);
        let mut channel = Channel::from_stream(local);

        drop(remote);

        assert_eq!(channel.recv().await, ChannelEvent::Closed);
        // Terminal events repeat instead of blocking forever.
        assert_eq!(channel.recv().await, ChannelEvent::Closed);
    }

    #[tokio::test]
    async fn test_send_after_shutdown_fails() {
        let (local, _remote) = tokio::io::duplex(1024);
        let mut channel = Channel::from_stream(local);

        channel.shutdown().await;
        channel.shutdown().await; // idempotent

        let err = channel.send(b"x").await.unwrap_err();
        assert!(matches!(err, ChannelError::SendFailed(_)));
    }
}
