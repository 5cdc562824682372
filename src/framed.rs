//! Packet-level view of a byte channel.
//!
//! [`FramedChannel`] wraps a [`Channel`] and owns the inbound byte
//! accumulator: each raw chunk is appended to the carried tail, the
//! streaming decoder drains every whole packet, and the undecodable suffix
//! is retained for the next chunk. `DataTooShort` never escapes this layer.

use bytes::{Buf, BytesMut};

use crate::codec::{decode_many, IncomingPacket, OutgoingPacket};
use crate::error::{ChannelError, DecodeError};
use crate::transport::{Channel, ChannelEvent};

/// Events yielded by [`FramedChannel::recv`].
#[derive(Debug)]
pub(crate) enum FramedEvent {
    /// One or more complete packets arrived, in wire order.
    Packets(Vec<IncomingPacket>),
    /// The inbound byte stream is malformed; the connection must die.
    DecodeFailed(DecodeError),
    /// Channel passthroughs.
    Closed,
    Error(String),
}

/// A [`Channel`] that speaks packets instead of bytes.
pub(crate) struct FramedChannel {
    channel: Channel,
    acc: BytesMut,
}

impl FramedChannel {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            acc: BytesMut::new(),
        }
    }

    /// Encode and forward one packet.
    ///
    /// Encode rejections (empty subscribe/unsubscribe lists) surface as
    /// send failures; they never reach the wire.
    pub async fn send(&mut self, packet: &OutgoingPacket) -> Result<(), ChannelError> {
        let bytes = packet
            .encode()
            .map_err(|err| ChannelError::SendFailed(err.to_string()))?;
        self.channel.send(&bytes).await
    }

    /// Next packet-level event.
    ///
    /// Chunks that complete no packet are absorbed silently; the call only
    /// returns once there is something to act on.
    pub async fn recv(&mut self) -> FramedEvent {
        loop {
            match self.channel.recv().await {
                ChannelEvent::Data(chunk) => {
                    self.acc.extend_from_slice(&chunk);
                    match decode_many(&self.acc) {
                        Ok((packets, consumed)) => {
                            self.acc.advance(consumed);
                            if !packets.is_empty() {
                                return FramedEvent::Packets(packets);
                            }
                        }
                        Err(err) => return FramedEvent::DecodeFailed(err),
                    }
                }
                ChannelEvent::Closed => return FramedEvent::Closed,
                ChannelEvent::Error(info) => return FramedEvent::Error(info),
            }
        }
    }

    /// Shut down the underlying channel.
    pub async fn shutdown(&mut self) {
        self.channel.shutdown().await;
    }
}
