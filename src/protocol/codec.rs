use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::message::Message;
use crate::core::{Error, MAX_LINE_LEN};

/// Extracts the next newline-terminated line from the buffer
///
/// Partial lines stay buffered across reads, so fragmented or coalesced
/// segments reassemble correctly. An optional trailing '\r' is stripped.
fn take_line(src: &mut BytesMut) -> Result<Option<String>, Error> {
    match src.iter().position(|&b| b == b'\n') {
        Some(pos) => {
            if pos > MAX_LINE_LEN {
                return Err(Error::protocol("line exceeds maximum length"));
            }
            let mut line = src.split_to(pos + 1);
            line.truncate(pos);
            if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }
            Ok(Some(String::from_utf8_lossy(&line).into_owned()))
        }
        None if src.len() > MAX_LINE_LEN => Err(Error::protocol("line exceeds maximum length")),
        None => Ok(None),
    }
}

/// Drains an unterminated final line once the stream has ended
fn take_line_eof(src: &mut BytesMut) -> Result<Option<String>, Error> {
    if let Some(line) = take_line(src)? {
        return Ok(Some(line));
    }
    if src.is_empty() {
        return Ok(None);
    }
    let line = src.split_to(src.len());
    Ok(Some(String::from_utf8_lossy(&line).into_owned()))
}

/// Codec for the protocol side of a connection
///
/// Decodes inbound lines into [`Message`]s and encodes outbound [`Message`]s;
/// used by the peer agent, and by the coordinator for its outbound frames.
#[derive(Clone, Default)]
pub struct MessageCodec;

impl MessageCodec {
    /// Creates a new message codec
    pub fn new() -> Self {
        MessageCodec
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(take_line(src)?.map(|line| Message::parse(&line)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(take_line_eof(src)?.map(|line| Message::parse(&line)))
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = item.encode();
        dst.reserve(line.len() + 1);
        dst.extend_from_slice(line.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

/// Codec for the raw-payload side of a connection
///
/// Decodes inbound lines verbatim and encodes outbound payload lines; used by
/// the coordinator for inbound transmissions (so relayed text stays
/// byte-identical) and by the peer agent's transmit gate.
#[derive(Clone, Default)]
pub struct LineCodec;

impl LineCodec {
    /// Creates a new line codec
    pub fn new() -> Self {
        LineCodec
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        take_line(src)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        take_line_eof(src)
    }
}

impl Encoder<String> for LineCodec {
    type Error = Error;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len() + 1);
        dst.extend_from_slice(item.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ClientId;
    use std::time::Duration;

    #[test]
    fn test_codec_welcome_message() {
        let mut codec = MessageCodec::new();
        let mut bytes = BytesMut::new();

        let message = Message::Welcome {
            client_id: ClientId(1),
            slot: 0,
            slot_duration: Duration::from_millis(100),
        };

        codec.encode(message.clone(), &mut bytes).unwrap();
        let decoded = codec.decode(&mut bytes).unwrap().expect("one message");
        assert_eq!(decoded, message);
        assert!(codec.decode(&mut bytes).unwrap().is_none());
    }

    #[test]
    fn test_decode_fragmented_input() {
        let mut codec = MessageCodec::new();
        let mut bytes = BytesMut::new();

        // Feed one frame a few bytes at a time; nothing decodes until the
        // terminator arrives.
        let wire = "COLLISION|your_slot=1|current_slot=0|message_dropped\n";
        for chunk in wire.as_bytes().chunks(5) {
            let last = bytes.len() + chunk.len() == wire.len();
            bytes.extend_from_slice(chunk);
            let decoded = codec.decode(&mut bytes).unwrap();
            if last {
                assert_eq!(
                    decoded,
                    Some(Message::Collision {
                        your_slot: 1,
                        current_slot: 0,
                    })
                );
            } else {
                assert!(decoded.is_none());
            }
        }
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_decode_coalesced_input() {
        let mut codec = MessageCodec::new();
        let mut bytes = BytesMut::from(
            "SLOT_ACTIVE|your_turn=1|slot=0|duration=100|active_slots=2\n\
             SLOT_ACTIVE|your_turn=0|current_slot=1|your_slot=0|wait_time=100|active_slots=2\n",
        );

        assert!(matches!(
            codec.decode(&mut bytes).unwrap(),
            Some(Message::YourTurn { slot: 0, .. })
        ));
        assert!(matches!(
            codec.decode(&mut bytes).unwrap(),
            Some(Message::WaitTurn { current_slot: 1, .. })
        ));
        assert!(codec.decode(&mut bytes).unwrap().is_none());
    }

    #[test]
    fn test_line_codec_verbatim() {
        let mut codec = LineCodec::new();
        let mut bytes = BytesMut::from("hello|not=a_frame\r\nsecond\n");

        assert_eq!(
            codec.decode(&mut bytes).unwrap().as_deref(),
            Some("hello|not=a_frame")
        );
        assert_eq!(codec.decode(&mut bytes).unwrap().as_deref(), Some("second"));
        assert!(codec.decode(&mut bytes).unwrap().is_none());
    }

    #[test]
    fn test_decode_eof_drains_unterminated_line() {
        let mut codec = LineCodec::new();
        let mut bytes = BytesMut::from("trailing without newline");

        assert!(codec.decode(&mut bytes).unwrap().is_none());
        assert_eq!(
            codec.decode_eof(&mut bytes).unwrap().as_deref(),
            Some("trailing without newline")
        );
        assert!(codec.decode_eof(&mut bytes).unwrap().is_none());
    }

    #[test]
    fn test_oversized_line_rejected() {
        let mut codec = LineCodec::new();
        let mut bytes = BytesMut::from(vec![b'x'; MAX_LINE_LEN + 1].as_slice());
        assert!(codec.decode(&mut bytes).is_err());
    }

    #[test]
    fn test_encode_appends_terminator() {
        let mut codec = LineCodec::new();
        let mut bytes = BytesMut::new();
        codec.encode("payload".to_string(), &mut bytes).unwrap();
        assert_eq!(&bytes[..], b"payload\n");
    }
}
