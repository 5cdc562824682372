//! MQTT 3.1.1 control packet types and encoding.
//!
//! Packets are split by direction: [`OutgoingPacket`] covers everything a
//! client writes, [`IncomingPacket`] everything a server may send back.
//! Encoding produces the fixed header (type nibble + flags nibble, then the
//! remaining length as a variable-length integer) followed by the variable
//! header and payload:
//!
//! ```text
//! ┌───────────────┬──────────────────┬─────────────────────────────┐
//! │ type | flags  │ remaining length │ variable header ++ payload  │
//! │ 1 byte        │ 1-4 byte varint  │ remaining-length bytes      │
//! └───────────────┴──────────────────┴─────────────────────────────┘
//! ```

use bytes::Bytes;

use super::primitives::{varint_len, write_string, write_u16, write_varint};
use crate::error::EncodeError;

/// Packet type identifiers (high nibble of the fixed header).
pub(crate) mod packet_type {
    pub const CONNECT: u8 = 1;
    pub const CONNACK: u8 = 2;
    pub const PUBLISH: u8 = 3;
    pub const PUBACK: u8 = 4;
    pub const PUBREC: u8 = 5;
    pub const PUBREL: u8 = 6;
    pub const PUBCOMP: u8 = 7;
    pub const SUBSCRIBE: u8 = 8;
    pub const SUBACK: u8 = 9;
    pub const UNSUBSCRIBE: u8 = 10;
    pub const UNSUBACK: u8 = 11;
    pub const PINGREQ: u8 = 12;
    pub const PINGRESP: u8 = 13;
    pub const DISCONNECT: u8 = 14;
}

/// Quality of service level for a message delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum QoS {
    /// Fire and forget.
    #[default]
    AtMostOnce = 0,
    /// Acknowledged delivery (PUBACK).
    AtLeastOnce = 1,
    /// Assured delivery (PUBREC / PUBREL / PUBCOMP).
    ExactlyOnce = 2,
}

impl QoS {
    /// Two-bit wire representation; `0b11` is reserved and rejected.
    pub(crate) fn from_bits(bits: u8) -> Option<QoS> {
        match bits {
            0 => Some(QoS::AtMostOnce),
            1 => Some(QoS::AtLeastOnce),
            2 => Some(QoS::ExactlyOnce),
            _ => None,
        }
    }
}

/// An application message: what gets published and what subscribers receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// UTF-8 topic name (no wildcards).
    pub topic: String,
    /// Opaque payload bytes.
    pub payload: Bytes,
    pub qos: QoS,
    /// Ask the broker to retain this message for future subscribers.
    pub retain: bool,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>, qos: QoS) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain: false,
        }
    }

    pub fn retained(mut self) -> Self {
        self.retain = true;
        self
    }
}

/// A PUBLISH packet in either direction.
///
/// Invariant: `dup == false` and `packet_id == None` exactly when the
/// message QoS is [`QoS::AtMostOnce`]; otherwise `packet_id` is a non-zero
/// identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    pub message: Message,
    /// Redelivery flag; never set on a first attempt.
    pub dup: bool,
    pub packet_id: Option<u16>,
}

impl Publish {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            dup: false,
            packet_id: None,
        }
    }

    /// Packet id with the QoS-0 case folded away.
    pub(crate) fn id(&self) -> Option<u16> {
        match self.message.qos {
            QoS::AtMostOnce => None,
            _ => self.packet_id,
        }
    }
}

/// One topic filter with its requested maximum QoS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    pub filter: String,
    pub qos: QoS,
}

impl SubscribeRequest {
    pub fn new(filter: impl Into<String>, qos: QoS) -> Self {
        Self {
            filter: filter.into(),
            qos,
        }
    }
}

/// Per-filter outcome reported in a SUBACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeResult {
    /// Granted, possibly at a lower QoS than requested.
    Success(QoS),
    Failure,
}

/// CONNACK refusal codes as they appear on the wire.
///
/// Kept distinct from the public [`ConnectError`](crate::ConnectError) so
/// the API surface is insulated from wire-format evolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectReturnCode {
    UnacceptableProtocolVersion = 1,
    IdentifierRefused = 2,
    ServerUnavailable = 3,
    BadUsernameOrPassword = 4,
    NotAuthorized = 5,
}

impl ConnectReturnCode {
    pub(crate) fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::UnacceptableProtocolVersion),
            2 => Some(Self::IdentifierRefused),
            3 => Some(Self::ServerUnavailable),
            4 => Some(Self::BadUsernameOrPassword),
            5 => Some(Self::NotAuthorized),
            _ => None,
        }
    }
}

/// Control packets a client writes to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutgoingPacket {
    /// Clean-session MQTT 3.1.1 CONNECT.
    Connect {
        client_id: String,
        keep_alive_seconds: u16,
    },
    Publish(Publish),
    PubAck(u16),
    PubRec(u16),
    PubRel(u16),
    PubComp(u16),
    Subscribe {
        packet_id: u16,
        topics: Vec<SubscribeRequest>,
    },
    Unsubscribe {
        packet_id: u16,
        filters: Vec<String>,
    },
    PingReq,
    Disconnect,
}

/// Control packets a server sends to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingPacket {
    ConnAck {
        session_present: bool,
        result: Result<(), ConnectReturnCode>,
    },
    Publish(Publish),
    PubAck(u16),
    PubRec(u16),
    PubRel(u16),
    PubComp(u16),
    SubAck {
        packet_id: u16,
        results: Vec<SubscribeResult>,
    },
    UnsubAck(u16),
    PingResp,
}

impl OutgoingPacket {
    /// Encode this packet to its wire representation.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let mut body = Vec::new();
        let first_byte = match self {
            OutgoingPacket::Connect {
                client_id,
                keep_alive_seconds,
            } => {
                write_string(&mut body, "MQTT");
                body.push(PROTOCOL_LEVEL);
                body.push(CONNECT_FLAGS_CLEAN_SESSION);
                write_u16(&mut body, *keep_alive_seconds);
                write_string(&mut body, client_id);
                packet_type::CONNECT << 4
            }
            OutgoingPacket::Publish(publish) => {
                let msg = &publish.message;
                write_string(&mut body, &msg.topic);
                if msg.qos != QoS::AtMostOnce {
                    write_u16(&mut body, publish.packet_id.unwrap_or(0));
                }
                body.extend_from_slice(&msg.payload);

                // The DUP bit is meaningless at QoS 0 and forced to zero.
                let dup = publish.dup && msg.qos != QoS::AtMostOnce;
                let mut flags = (msg.qos as u8) << 1;
                if dup {
                    flags |= 0x08;
                }
                if msg.retain {
                    flags |= 0x01;
                }
                packet_type::PUBLISH << 4 | flags
            }
            OutgoingPacket::PubAck(id) => {
                write_u16(&mut body, *id);
                packet_type::PUBACK << 4
            }
            OutgoingPacket::PubRec(id) => {
                write_u16(&mut body, *id);
                packet_type::PUBREC << 4
            }
            OutgoingPacket::PubRel(id) => {
                write_u16(&mut body, *id);
                packet_type::PUBREL << 4 | 0x02
            }
            OutgoingPacket::PubComp(id) => {
                write_u16(&mut body, *id);
                packet_type::PUBCOMP << 4
            }
            OutgoingPacket::Subscribe { packet_id, topics } => {
                if topics.is_empty() {
                    return Err(EncodeError::EmptySubscribeList);
                }
                write_u16(&mut body, *packet_id);
                for topic in topics {
                    write_string(&mut body, &topic.filter);
                    body.push(topic.qos as u8);
                }
                packet_type::SUBSCRIBE << 4 | 0x02
            }
            OutgoingPacket::Unsubscribe { packet_id, filters } => {
                if filters.is_empty() {
                    return Err(EncodeError::EmptyUnsubscribeList);
                }
                write_u16(&mut body, *packet_id);
                for filter in filters {
                    write_string(&mut body, filter);
                }
                packet_type::UNSUBSCRIBE << 4 | 0x02
            }
            OutgoingPacket::PingReq => packet_type::PINGREQ << 4,
            OutgoingPacket::Disconnect => packet_type::DISCONNECT << 4,
        };

        let mut packet = Vec::with_capacity(1 + varint_len(body.len() as u32) + body.len());
        packet.push(first_byte);
        write_varint(&mut packet, body.len() as u32);
        packet.extend_from_slice(&body);
        Ok(packet)
    }
}

/// Protocol level byte for MQTT 3.1.1.
pub(crate) const PROTOCOL_LEVEL: u8 = 4;

/// Connect flags: clean session only; no will, no credentials.
pub(crate) const CONNECT_FLAGS_CLEAN_SESSION: u8 = 0b0000_0010;
