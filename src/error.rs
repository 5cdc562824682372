//! Error types for mqttwire.

use thiserror::Error;

/// Errors raised while decoding incoming bytes into packets.
///
/// `DataTooShort` is recoverable: the framing layer buffers the partial
/// packet and retries once more bytes arrive. Every other variant is fatal
/// for the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The buffer does not yet hold a complete packet.
    #[error("not enough data for a complete packet")]
    DataTooShort,

    /// The packet is structurally malformed (bad flags, bad remaining
    /// length, reserved values).
    #[error("malformed packet data")]
    InvalidData,

    /// A length-prefixed string ran past the end of the packet body.
    #[error("string length exceeds packet body")]
    InvalidStringLength,

    /// A string field holds bytes that are not valid UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    /// A variable-length integer used more than four bytes.
    #[error("malformed variable-length integer")]
    InvalidVarint,

    /// The fixed header carries a packet type this client does not accept.
    #[error("unrecognized packet type identifier: {0}")]
    InvalidPacketIdentifier(u8),
}

/// Errors raised while encoding an outgoing packet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// A SUBSCRIBE packet must carry at least one topic filter.
    #[error("subscribe packet with an empty topic list")]
    EmptySubscribeList,

    /// An UNSUBSCRIBE packet must carry at least one topic filter.
    #[error("unsubscribe packet with an empty topic list")]
    EmptyUnsubscribeList,
}

/// Errors surfaced by a byte channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// A write to the peer failed or timed out.
    #[error("channel send failed: {0}")]
    SendFailed(String),

    /// The transport could not be established or broke down.
    #[error("transport error: {0}")]
    TransportError(String),
}

/// Errors returned by [`Client::connect`](crate::Client::connect).
///
/// The first five variants mirror the CONNACK refusal codes of MQTT 3.1.1;
/// the rest are produced client-side.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("server does not support this protocol revision")]
    UnacceptableProtocolVersion,

    #[error("server refused the client identifier")]
    IdentifierRefused,

    #[error("server is unavailable")]
    ServerUnavailable,

    #[error("bad user name or password")]
    BadUsernameOrPassword,

    #[error("client is not authorized to connect")]
    NotAuthorized,

    /// No CONNACK arrived within the caller's timeout.
    #[error("connect timed out")]
    Timeout,

    /// `disconnect` was called while the connect handshake was in flight.
    #[error("disconnect requested during connect")]
    DisconnectRequested,

    /// A connection is already established or being established.
    #[error("client is already connected")]
    AlreadyConnected,

    /// The transport failed before the handshake completed.
    #[error(transparent)]
    Transport(#[from] ChannelError),

    /// The client task terminated before replying.
    #[error("client task was killed")]
    Killed,
}

impl From<crate::codec::ConnectReturnCode> for ConnectError {
    fn from(code: crate::codec::ConnectReturnCode) -> Self {
        use crate::codec::ConnectReturnCode as Code;
        match code {
            Code::UnacceptableProtocolVersion => Self::UnacceptableProtocolVersion,
            Code::IdentifierRefused => Self::IdentifierRefused,
            Code::ServerUnavailable => Self::ServerUnavailable,
            Code::BadUsernameOrPassword => Self::BadUsernameOrPassword,
            Code::NotAuthorized => Self::NotAuthorized,
        }
    }
}

/// Errors returned by [`Client::publish`](crate::Client::publish).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("not connected")]
    NotConnected,

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("publish timed out")]
    Timeout,

    #[error("client task was killed")]
    Killed,
}

/// Errors returned by [`Client::subscribe`](crate::Client::subscribe).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscribeError {
    #[error("not connected")]
    NotConnected,

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("subscribe timed out")]
    Timeout,

    #[error("client task was killed")]
    Killed,
}

/// Errors returned by [`Client::unsubscribe`](crate::Client::unsubscribe).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnsubscribeError {
    #[error("not connected")]
    NotConnected,

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("unsubscribe timed out")]
    Timeout,

    #[error("client task was killed")]
    Killed,
}
