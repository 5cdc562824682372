//! Decoding incoming bytes into [`IncomingPacket`]s.
//!
//! [`decode_packet`] frames and parses a single packet from the front of a
//! buffer; [`decode_many`] drains as many whole packets as the buffer holds
//! so a read loop can hand over arbitrary chunk boundaries.

use bytes::Bytes;

use super::packet::{
    packet_type, ConnectReturnCode, IncomingPacket, Message, Publish, QoS, SubscribeResult,
};
use super::primitives::{read_varint, Reader};
use crate::error::DecodeError;

/// Decode one packet from the front of `buf`.
///
/// On success returns the packet and the unconsumed suffix of `buf`.
/// [`DecodeError::DataTooShort`] means the caller should retry with more
/// bytes; every other error is fatal for the connection.
pub fn decode_packet(buf: &[u8]) -> Result<(IncomingPacket, &[u8]), DecodeError> {
    if buf.len() < 2 {
        return Err(DecodeError::DataTooShort);
    }
    let type_id = buf[0] >> 4;
    let flags = buf[0] & 0x0F;

    let (remaining_length, varint_bytes) = match read_varint(&buf[1..])? {
        Some(decoded) => decoded,
        None => return Err(DecodeError::DataTooShort),
    };

    let body_start = 1 + varint_bytes;
    let total = body_start + remaining_length as usize;
    if buf.len() < total {
        return Err(DecodeError::DataTooShort);
    }
    let body = &buf[body_start..total];

    let packet = match type_id {
        packet_type::CONNACK => decode_connack(flags, body)?,
        packet_type::PUBLISH => decode_publish(flags, body)?,
        packet_type::PUBACK => IncomingPacket::PubAck(decode_packet_id(flags, 0, body)?),
        packet_type::PUBREC => IncomingPacket::PubRec(decode_packet_id(flags, 0, body)?),
        packet_type::PUBREL => IncomingPacket::PubRel(decode_packet_id(flags, 0x02, body)?),
        packet_type::PUBCOMP => IncomingPacket::PubComp(decode_packet_id(flags, 0, body)?),
        packet_type::SUBACK => decode_suback(flags, body)?,
        packet_type::UNSUBACK => IncomingPacket::UnsubAck(decode_packet_id(flags, 0, body)?),
        packet_type::PINGRESP => {
            if flags != 0 || !body.is_empty() {
                return Err(DecodeError::InvalidData);
            }
            IncomingPacket::PingResp
        }
        other => return Err(DecodeError::InvalidPacketIdentifier(other)),
    };

    Ok((packet, &buf[total..]))
}

/// Decode every whole packet at the front of `buf`.
///
/// Returns the packets in arrival order plus the number of bytes consumed;
/// `&buf[consumed..]` is the partial-packet tail the caller must retain.
/// A `DataTooShort` on the tail stops the drain without error; any other
/// decode error is propagated.
pub fn decode_many(buf: &[u8]) -> Result<(Vec<IncomingPacket>, usize), DecodeError> {
    let mut packets = Vec::new();
    let mut rest = buf;

    loop {
        match decode_packet(rest) {
            Ok((packet, leftover)) => {
                packets.push(packet);
                rest = leftover;
            }
            Err(DecodeError::DataTooShort) => break,
            Err(err) => return Err(err),
        }
        if rest.is_empty() {
            break;
        }
    }

    Ok((packets, buf.len() - rest.len()))
}

fn decode_connack(flags: u8, body: &[u8]) -> Result<IncomingPacket, DecodeError> {
    if flags != 0 || body.len() != 2 {
        return Err(DecodeError::InvalidData);
    }
    // Acknowledge-flags byte: only bit 0 (session present) is defined.
    if body[0] & !0x01 != 0 {
        return Err(DecodeError::InvalidData);
    }
    let session_present = body[0] & 0x01 != 0;
    let result = match body[1] {
        0 => Ok(()),
        code => match ConnectReturnCode::from_byte(code) {
            Some(code) => Err(code),
            None => return Err(DecodeError::InvalidData),
        },
    };
    Ok(IncomingPacket::ConnAck {
        session_present,
        result,
    })
}

fn decode_publish(flags: u8, body: &[u8]) -> Result<IncomingPacket, DecodeError> {
    let qos = QoS::from_bits((flags >> 1) & 0x03).ok_or(DecodeError::InvalidData)?;
    let retain = flags & 0x01 != 0;
    // DUP is undefined at QoS 0; normalize so the invariant holds.
    let dup = flags & 0x08 != 0 && qos != QoS::AtMostOnce;

    let mut reader = Reader::new(body);
    let topic = reader.read_string()?.to_owned();
    let packet_id = match qos {
        QoS::AtMostOnce => None,
        _ => match reader.read_u16()? {
            0 => return Err(DecodeError::InvalidData),
            id => Some(id),
        },
    };
    let payload = Bytes::copy_from_slice(reader.read_rest());

    Ok(IncomingPacket::Publish(Publish {
        message: Message {
            topic,
            payload,
            qos,
            retain,
        },
        dup,
        packet_id,
    }))
}

fn decode_packet_id(flags: u8, expected_flags: u8, body: &[u8]) -> Result<u16, DecodeError> {
    if flags != expected_flags || body.len() != 2 {
        return Err(DecodeError::InvalidData);
    }
    Ok(u16::from_be_bytes([body[0], body[1]]))
}

fn decode_suback(flags: u8, body: &[u8]) -> Result<IncomingPacket, DecodeError> {
    if flags != 0 || body.len() < 2 {
        return Err(DecodeError::InvalidData);
    }
    let mut reader = Reader::new(body);
    let packet_id = reader.read_u16()?;
    let results = reader
        .read_rest()
        .iter()
        .map(|&code| match code {
            0x00 => Ok(SubscribeResult::Success(QoS::AtMostOnce)),
            0x01 => Ok(SubscribeResult::Success(QoS::AtLeastOnce)),
            0x02 => Ok(SubscribeResult::Success(QoS::ExactlyOnce)),
            0x80 => Ok(SubscribeResult::Failure),
            _ => Err(DecodeError::InvalidData),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(IncomingPacket::SubAck { packet_id, results })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::OutgoingPacket;

    #[test]
    fn test_connack_accepted() {
        let (packet, rest) = decode_packet(&[0x20, 0x02, 0x00, 0x00]).unwrap();
        assert_eq!(
            packet,
            IncomingPacket::ConnAck {
                session_present: false,
                result: Ok(()),
            }
        );
        assert!(rest.is_empty());
    }

    #[test]
    fn test_connack_session_present() {
        let (packet, _) = decode_packet(&[0x20, 0x02, 0x01, 0x00]).unwrap();
        assert_eq!(
            packet,
            IncomingPacket::ConnAck {
                session_present: true,
                result: Ok(()),
            }
        );
    }

    #[test]
    fn test_connack_refusal_codes() {
        let codes = [
            (1, ConnectReturnCode::UnacceptableProtocolVersion),
            (2, ConnectReturnCode::IdentifierRefused),
            (3, ConnectReturnCode::ServerUnavailable),
            (4, ConnectReturnCode::BadUsernameOrPassword),
            (5, ConnectReturnCode::NotAuthorized),
        ];
        for (byte, expected) in codes {
            let (packet, _) = decode_packet(&[0x20, 0x02, 0x00, byte]).unwrap();
            assert_eq!(
                packet,
                IncomingPacket::ConnAck {
                    session_present: false,
                    result: Err(expected),
                }
            );
        }
    }

    #[test]
    fn test_connack_unknown_return_code() {
        assert_eq!(
            decode_packet(&[0x20, 0x02, 0x00, 0x06]),
            Err(DecodeError::InvalidData)
        );
    }

    #[test]
    fn test_connack_reserved_ack_flags() {
        assert_eq!(
            decode_packet(&[0x20, 0x02, 0x02, 0x00]),
            Err(DecodeError::InvalidData)
        );
    }

    #[test]
    fn test_connack_wrong_length() {
        assert_eq!(
            decode_packet(&[0x20, 0x03, 0x00, 0x00, 0x00]),
            Err(DecodeError::InvalidData)
        );
    }

    #[test]
    fn test_publish_qos0() {
        let mut wire = vec![0x30, 14, 0x00, 0x05];
        wire.extend_from_slice(b"topic");
        wire.extend_from_slice(b"payload");
        let (packet, _) = decode_packet(&wire).unwrap();

        let IncomingPacket::Publish(publish) = packet else {
            panic!("expected publish");
        };
        assert_eq!(publish.message.topic, "topic");
        assert_eq!(&publish.message.payload[..], b"payload");
        assert_eq!(publish.message.qos, QoS::AtMostOnce);
        assert!(!publish.message.retain);
        assert!(!publish.dup);
        assert_eq!(publish.packet_id, None);
    }

    #[test]
    fn test_publish_qos2_retained() {
        let mut wire = vec![0x35, 7, 0x00, 0x01, b't', 0x00, 0x2A];
        wire.extend_from_slice(b"hi");
        let (packet, _) = decode_packet(&wire).unwrap();

        let IncomingPacket::Publish(publish) = packet else {
            panic!("expected publish");
        };
        assert_eq!(publish.message.qos, QoS::ExactlyOnce);
        assert!(publish.message.retain);
        assert_eq!(publish.packet_id, Some(42));
        assert_eq!(&publish.message.payload[..], b"hi");
    }

    #[test]
    fn test_publish_reserved_qos_bits() {
        assert_eq!(
            decode_packet(&[0x36, 0x04, 0x00, 0x01, b't', 0x01]),
            Err(DecodeError::InvalidData)
        );
    }

    #[test]
    fn test_publish_zero_packet_id() {
        assert_eq!(
            decode_packet(&[0x32, 0x05, 0x00, 0x01, b't', 0x00, 0x00]),
            Err(DecodeError::InvalidData)
        );
    }

    #[test]
    fn test_publish_qos0_ignores_dup_bit() {
        let (packet, _) = decode_packet(&[0x38, 0x03, 0x00, 0x01, b't']).unwrap();
        let IncomingPacket::Publish(publish) = packet else {
            panic!("expected publish");
        };
        assert!(!publish.dup);
    }

    #[test]
    fn test_ack_packets() {
        let cases: [(u8, fn(u16) -> IncomingPacket); 4] = [
            (0x40, IncomingPacket::PubAck),
            (0x50, IncomingPacket::PubRec),
            (0x62, IncomingPacket::PubRel),
            (0x70, IncomingPacket::PubComp),
        ];
        for (first, make) in cases {
            let (packet, _) = decode_packet(&[first, 0x02, 0x12, 0x34]).unwrap();
            assert_eq!(packet, make(0x1234));
        }
    }

    #[test]
    fn test_pubrel_requires_reserved_flags() {
        assert_eq!(
            decode_packet(&[0x60, 0x02, 0x00, 0x01]),
            Err(DecodeError::InvalidData)
        );
    }

    #[test]
    fn test_suback() {
        let (packet, _) =
            decode_packet(&[0x90, 0x05, 0x00, 0x01, 0x00, 0x01, 0x80]).unwrap();
        assert_eq!(
            packet,
            IncomingPacket::SubAck {
                packet_id: 1,
                results: vec![
                    SubscribeResult::Success(QoS::AtMostOnce),
                    SubscribeResult::Success(QoS::AtLeastOnce),
                    SubscribeResult::Failure,
                ],
            }
        );
    }

    #[test]
    fn test_suback_unknown_return_code() {
        assert_eq!(
            decode_packet(&[0x90, 0x03, 0x00, 0x01, 0x03]),
            Err(DecodeError::InvalidData)
        );
    }

    #[test]
    fn test_unsuback() {
        let (packet, _) = decode_packet(&[0xB0, 0x02, 0x00, 0x09]).unwrap();
        assert_eq!(packet, IncomingPacket::UnsubAck(9));
    }

    #[test]
    fn test_pingresp() {
        let (packet, _) = decode_packet(&[0xD0, 0x00]).unwrap();
        assert_eq!(packet, IncomingPacket::PingResp);
        assert_eq!(
            decode_packet(&[0xD0, 0x01, 0x00]),
            Err(DecodeError::InvalidData)
        );
    }

    #[test]
    fn test_unknown_type_id() {
        assert_eq!(
            decode_packet(&[0x00, 0x00]),
            Err(DecodeError::InvalidPacketIdentifier(0))
        );
        assert_eq!(
            decode_packet(&[0xF0, 0x00]),
            Err(DecodeError::InvalidPacketIdentifier(15))
        );
        // A client never receives CONNECT.
        assert_eq!(
            decode_packet(&[0x10, 0x00]),
            Err(DecodeError::InvalidPacketIdentifier(1))
        );
    }

    #[test]
    fn test_partial_packets_report_too_short() {
        assert_eq!(decode_packet(&[]), Err(DecodeError::DataTooShort));
        assert_eq!(decode_packet(&[0x20]), Err(DecodeError::DataTooShort));
        assert_eq!(decode_packet(&[0x20, 0x02]), Err(DecodeError::DataTooShort));
        assert_eq!(
            decode_packet(&[0x20, 0x02, 0x00]),
            Err(DecodeError::DataTooShort)
        );
        // Remaining length itself is split across reads.
        assert_eq!(
            decode_packet(&[0x30, 0x80]),
            Err(DecodeError::DataTooShort)
        );
    }

    #[test]
    fn test_roundtrip_outgoing_acks_through_decoder() {
        // The ack types a client both sends and receives must survive a
        // full encode/decode cycle.
        let pairs = [
            (OutgoingPacket::PubAck(7), IncomingPacket::PubAck(7)),
            (OutgoingPacket::PubRec(7), IncomingPacket::PubRec(7)),
            (OutgoingPacket::PubRel(7), IncomingPacket::PubRel(7)),
            (OutgoingPacket::PubComp(7), IncomingPacket::PubComp(7)),
        ];
        for (outgoing, incoming) in pairs {
            let wire = outgoing.encode().unwrap();
            let (decoded, rest) = decode_packet(&wire).unwrap();
            assert_eq!(decoded, incoming);
            assert!(rest.is_empty());
        }
    }

    #[test]
    fn test_publish_roundtrip() {
        let mut publish = Publish::new(Message::new("a/b/c", &b"data"[..], QoS::AtLeastOnce));
        publish.packet_id = Some(99);
        publish.dup = true;
        let wire = OutgoingPacket::Publish(publish.clone()).encode().unwrap();
        let (decoded, _) = decode_packet(&wire).unwrap();
        assert_eq!(decoded, IncomingPacket::Publish(publish));
    }

    #[test]
    fn test_decode_many_drains_whole_packets() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&[0x20, 0x02, 0x00, 0x00]);
        wire.extend_from_slice(&[0xD0, 0x00]);
        wire.extend_from_slice(&[0x40, 0x02, 0x00, 0x05]);

        let (packets, consumed) = decode_many(&wire).unwrap();
        assert_eq!(consumed, wire.len());
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[2], IncomingPacket::PubAck(5));
    }

    #[test]
    fn test_decode_many_keeps_partial_tail() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&[0xD0, 0x00]);
        wire.extend_from_slice(&[0x40, 0x02, 0x00]); // truncated PUBACK

        let (packets, consumed) = decode_many(&wire).unwrap();
        assert_eq!(packets, vec![IncomingPacket::PingResp]);
        assert_eq!(consumed, 2);
        assert_eq!(&wire[consumed..], &[0x40, 0x02, 0x00]);
    }

    #[test]
    fn test_decode_many_propagates_fatal_errors() {
        let mut wire = Vec::new();
        wire.extend_from_slice(&[0xD0, 0x00]);
        wire.extend_from_slice(&[0x20, 0x02, 0x00, 0x06]); // bad return code

        assert_eq!(decode_many(&wire), Err(DecodeError::InvalidData));
    }

    #[test]
    fn test_decode_many_split_anywhere_equivalence() {
        // Decoding a buffer in two pieces (carrying the leftover forward)
        // must equal decoding the joined buffer, wherever the split lands.
        let mut wire = Vec::new();
        wire.extend_from_slice(&[0x20, 0x02, 0x00, 0x00]);
        let mut publish = vec![0x32, 0x09, 0x00, 0x03];
        publish.extend_from_slice(b"t/1");
        publish.extend_from_slice(&[0x00, 0x01]);
        publish.extend_from_slice(b"hi");
        wire.extend_from_slice(&publish);
        wire.extend_from_slice(&[0xD0, 0x00]);

        let (joined, consumed) = decode_many(&wire).unwrap();
        assert_eq!(consumed, wire.len());

        for split in 0..=wire.len() {
            let (mut packets, used) = decode_many(&wire[..split]).unwrap();
            let mut carry = wire[used..split].to_vec();
            carry.extend_from_slice(&wire[split..]);
            let (tail_packets, tail_used) = decode_many(&carry).unwrap();
            packets.extend(tail_packets);
            assert_eq!(packets, joined, "split at {split}");
            assert_eq!(used + tail_used, wire.len());
        }
    }
}
