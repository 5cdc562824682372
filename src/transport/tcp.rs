//! TCP transport.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::net::TcpStream;

use super::{Channel, ChannelConfig, Transport};
use crate::error::ChannelError;

/// Default bound on establishing a TCP connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connects plain TCP channels to a fixed host and port.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    host: String,
    port: u16,
    connect_timeout: Duration,
    channel_config: ChannelConfig,
}

impl TcpTransport {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            channel_config: ChannelConfig::default(),
        }
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    async fn connect(&self) -> Result<Channel, ChannelError> {
        let address = (self.host.as_str(), self.port);
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| ChannelError::TransportError("tcp connect timed out".into()))?
            .map_err(|err| ChannelError::TransportError(err.to_string()))?;

        // Control packets are small; don't let Nagle delay acks and pings.
        stream
            .set_nodelay(true)
            .map_err(|err| ChannelError::TransportError(err.to_string()))?;

        Ok(Channel::from_stream_with_config(
            stream,
            self.channel_config.clone(),
        ))
    }
}

impl Transport for TcpTransport {
    fn open(&mut self) -> Pin<Box<dyn Future<Output = Result<Channel, ChannelError>> + Send + '_>> {
        Box::pin(self.connect())
    }
}
