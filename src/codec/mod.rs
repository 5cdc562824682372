//! Codec module - MQTT 3.1.1 packet encoding and decoding.
//!
//! Pure functions over byte buffers; no I/O and no state beyond the input:
//!
//! - [`primitives`] - the fundamental encodings (u16, string, varint)
//! - [`OutgoingPacket::encode`] - packet to wire bytes
//! - [`decode_packet`] / [`decode_many`] - wire bytes to packets, with
//!   partial-read continuation via `DataTooShort`

mod decode;
mod packet;
pub mod primitives;

pub use decode::{decode_many, decode_packet};
pub use packet::{
    ConnectReturnCode, IncomingPacket, Message, OutgoingPacket, Publish, QoS, SubscribeRequest,
    SubscribeResult,
};
