//! Client configuration.

use std::time::Duration;

use crate::transport::{TcpTransport, Transport};

/// Default keep-alive interval.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Default bound on waiting for the server's ping response.
pub const DEFAULT_SERVER_TIMEOUT: Duration = Duration::from_secs(10);

/// Protocol-level connection settings.
///
/// Every session is a clean session: the client carries no state across
/// connects and asks the server to discard any it kept.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Client identifier sent in CONNECT.
    pub client_id: String,
    /// Maximum idle interval before the client pings. Encoded on the wire
    /// in whole seconds; the engine keeps millisecond precision internally.
    pub keep_alive: Duration,
    /// How long to wait for a PINGRESP before declaring the connection dead.
    pub server_timeout: Duration,
}

impl ConnectOptions {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            keep_alive: DEFAULT_KEEP_ALIVE,
            server_timeout: DEFAULT_SERVER_TIMEOUT,
        }
    }

    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn server_timeout(mut self, server_timeout: Duration) -> Self {
        self.server_timeout = server_timeout;
        self
    }

    /// Keep-alive as the wire's u16 seconds field.
    pub(crate) fn keep_alive_seconds(&self) -> u16 {
        self.keep_alive.as_secs().min(u16::MAX as u64) as u16
    }
}

/// Recognized built-in transports.
///
/// Anything beyond plain TCP (TLS, WebSocket) is supplied by the caller as
/// a [`Transport`] implementation via
/// [`Client::start_with_transport`](crate::Client::start_with_transport).
#[derive(Debug, Clone)]
pub enum TransportOptions {
    Tcp {
        host: String,
        port: u16,
        connect_timeout: Duration,
    },
}

impl TransportOptions {
    /// Plain TCP with the default connect timeout.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
            connect_timeout: crate::transport::DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub(crate) fn into_transport(self) -> Box<dyn Transport> {
        match self {
            Self::Tcp {
                host,
                port,
                connect_timeout,
            } => Box::new(TcpTransport::new(host, port).connect_timeout(connect_timeout)),
        }
    }
}
