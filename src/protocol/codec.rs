//! Datagram encode/decode, with the transport's safe-size bound.

use super::message::Envelope;
use crate::error::{Error, Result};

/// Conservative safe UDP payload bound ("~1200 bytes is conservative").
pub const MAX_DATAGRAM_SIZE: usize = 1200;

/// Encode an envelope. Returns `SerializationError`-equivalent (as a
/// plain `Error::Encode`) if the result would exceed the transport's
/// safe datagram bound - callers must log and drop, not retry.
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>> {
    let bytes = bincode::serialize(envelope)?;
    if bytes.len() > MAX_DATAGRAM_SIZE {
        return Err(Error::Decode(format!(
            "encoded envelope is {} bytes, exceeds {} byte datagram bound",
            bytes.len(),
            MAX_DATAGRAM_SIZE
        )));
    }
    Ok(bytes)
}

/// Decode a received datagram. Malformed input is reported as
/// `Error::Decode`; callers drop it silently without observing the
/// sender.
pub fn decode(bytes: &[u8]) -> Result<Envelope> {
    bincode::deserialize(bytes).map_err(|e| Error::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::NodeId;
    use crate::protocol::message::RequestPayload;

    #[test]
    fn round_trips_a_ping_request() {
        let envelope = Envelope::Request {
            message_id: NodeId::random(),
            payload: RequestPayload::Ping {
                sender_id: NodeId::random(),
            },
        };
        let bytes = encode(&envelope).unwrap();
        let decoded = decode(&bytes).unwrap();
        match (envelope, decoded) {
            (
                Envelope::Request { message_id: a, .. },
                Envelope::Request { message_id: b, .. },
            ) => assert_eq!(a, b),
            _ => panic!("shape changed across encode/decode"),
        }
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(decode(&[0xff, 0x00, 0x13, 0x37]).is_err());
    }

    #[test]
    fn oversized_payload_is_rejected_at_encode_time() {
        let envelope = Envelope::Request {
            message_id: NodeId::random(),
            payload: RequestPayload::Store {
                sender_id: NodeId::random(),
                key: NodeId::random(),
                value: crate::protocol::message::Value::Bytes(vec![0u8; MAX_DATAGRAM_SIZE * 2]),
            },
        };
        assert!(encode(&envelope).is_err());
    }
}
