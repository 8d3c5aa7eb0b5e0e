//! `tokio_util` codec framing [`Message`]s on a byte stream.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::PxsError;
use crate::header::{HEADER_LENGTH, MessageHeader};
use crate::packet::{MAX_PAYLOAD_SIZE, Message};

#[derive(Debug, Default, Clone, Copy)]
pub struct PxsCodec;

impl Decoder for PxsCodec {
    type Item = Message;
    type Error = PxsError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LENGTH {
            return Ok(None);
        }

        let header = MessageHeader::from_bytes(&src[..HEADER_LENGTH])?;
        let payload_length = header.payload_length() as usize;
        if payload_length > MAX_PAYLOAD_SIZE {
            return Err(PxsError::PayloadTooLarge {
                size: payload_length,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let total = HEADER_LENGTH + payload_length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LENGTH);
        let payload = src.split_to(payload_length).freeze();
        Message::from_parts(header, payload).map(Some)
    }
}

impl Encoder<Message> for PxsCodec {
    type Error = PxsError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = item.payload();
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(PxsError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        dst.reserve(HEADER_LENGTH + payload.len());
        dst.put_slice(&item.header().to_bytes());
        dst.put_slice(payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;
    use bytes::Bytes;

    fn encoded(msg: Message) -> BytesMut {
        let mut buf = BytesMut::new();
        PxsCodec.encode(msg, &mut buf).unwrap();
        buf
    }

    #[test]
    fn decode_waits_for_complete_message() {
        let full = encoded(Message::data("s", Bytes::from_static(b"hello")).unwrap());

        let mut partial = BytesMut::from(&full[..HEADER_LENGTH + 2]);
        assert!(PxsCodec.decode(&mut partial).unwrap().is_none());

        let mut partial = BytesMut::from(&full[..HEADER_LENGTH - 1]);
        assert!(PxsCodec.decode(&mut partial).unwrap().is_none());
    }

    #[test]
    fn decode_consecutive_messages() {
        let mut buf = encoded(Message::open("s").unwrap());
        buf.extend_from_slice(&encoded(Message::finish_frame("s").unwrap()));

        let first = PxsCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.message_type(), MessageType::PixelStreamOpen);
        let second = PxsCodec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(second.message_type(), MessageType::PixelStreamFinishFrame);
        assert!(buf.is_empty());
        assert!(PxsCodec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn decode_rejects_oversized_length() {
        let mut buf = encoded(Message::quit("s").unwrap());
        buf[12..16].copy_from_slice(&(MAX_PAYLOAD_SIZE as u32 + 1).to_le_bytes());
        assert!(matches!(
            PxsCodec.decode(&mut buf),
            Err(PxsError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn decode_rejects_zero_checksum_with_payload() {
        let mut buf = encoded(Message::data("s", Bytes::from_static(b"x")).unwrap());
        buf[4..8].copy_from_slice(&0u32.to_le_bytes());
        assert!(matches!(
            PxsCodec.decode(&mut buf),
            Err(PxsError::ProtocolViolation(_))
        ));
    }
}
