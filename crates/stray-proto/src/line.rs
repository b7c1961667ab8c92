//! Newline-delimited codec for tokio.
//!
//! Decodes inbound frames into terminator-stripped `String`s and encodes
//! outbound lines with a CR-LF terminator, enforcing the frame limit in both
//! directions. The relay dialect raises the standard 512-byte limit to
//! [`RELAY_MAX_LINE`] bytes.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{ProtocolError, Result};

/// Frame limit used by the relay dialect, terminator included.
pub const RELAY_MAX_LINE: usize = 2048;

/// Validate a line about to be framed: no embedded CR/LF, and short enough
/// that the terminated frame fits the limit.
///
/// The transport calls this synchronously before queueing a write, so a
/// protocol violation surfaces to the caller rather than to the writer task.
pub fn validate_outbound(line: &str, max_len: usize) -> Result<()> {
    if line.contains('\r') || line.contains('\n') {
        return Err(ProtocolError::EmbeddedCrLf);
    }
    let framed_len = line.len() + 2;
    if framed_len > max_len {
        return Err(ProtocolError::FrameTooLong {
            actual: framed_len,
            limit: max_len,
        });
    }
    Ok(())
}

/// Line codec with a configurable frame limit.
pub struct LineCodec {
    /// Index of the next byte to scan for a newline.
    next_index: usize,
    /// Maximum frame length, terminator included.
    max_len: usize,
}

impl LineCodec {
    /// Codec with the standard 512-byte limit.
    pub fn new() -> Self {
        Self {
            next_index: 0,
            max_len: 512,
        }
    }

    /// Codec with a custom frame limit.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
        }
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        if let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') {
            let frame = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;

            if frame.len() > self.max_len {
                return Err(ProtocolError::FrameTooLong {
                    actual: frame.len(),
                    limit: self.max_len,
                });
            }

            let line = std::str::from_utf8(&frame)
                .map_err(|e| ProtocolError::InvalidUtf8 {
                    byte_pos: e.valid_up_to(),
                })?
                .trim_end_matches(['\r', '\n'])
                .to_string();

            Ok(Some(line))
        } else {
            // No complete frame yet; remember how far we scanned.
            self.next_index = src.len();

            if src.len() > self.max_len {
                return Err(ProtocolError::FrameTooLong {
                    actual: src.len(),
                    limit: self.max_len,
                });
            }

            Ok(None)
        }
    }
}

impl Encoder<String> for LineCodec {
    type Error = ProtocolError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<()> {
        validate_outbound(&line, self.max_len)?;
        dst.reserve(line.len() + 2);
        dst.put_slice(line.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_complete_frame_without_terminator() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from("PING :test\r\nPARTIAL");

        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some("PING :test".to_string())
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(&buf[..], b"PARTIAL");
    }

    #[test]
    fn rejects_oversized_frame() {
        let mut codec = LineCodec::with_max_len(16);
        let mut buf = BytesMut::from("this line is far too long for the limit\n");

        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::FrameTooLong { limit: 16, .. })
        ));
    }

    #[test]
    fn rejects_oversized_partial_frame() {
        let mut codec = LineCodec::with_max_len(8);
        let mut buf = BytesMut::from("no newline here");

        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::FrameTooLong { .. })
        ));
    }

    #[test]
    fn encodes_with_terminator() {
        let mut codec = LineCodec::with_max_len(RELAY_MAX_LINE);
        let mut buf = BytesMut::new();

        codec.encode("PONG :test".to_string(), &mut buf).unwrap();
        assert_eq!(&buf[..], b"PONG :test\r\n");
    }

    #[test]
    fn encode_rejects_embedded_line_breaks() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();

        let result = codec.encode("PRIVMSG #c :hi\r\nQUIT".to_string(), &mut buf);
        assert!(matches!(result, Err(ProtocolError::EmbeddedCrLf)));
        assert!(buf.is_empty());
    }

    #[test]
    fn encode_enforces_relay_limit() {
        let mut codec = LineCodec::with_max_len(RELAY_MAX_LINE);
        let mut buf = BytesMut::new();

        let ok = "x".repeat(RELAY_MAX_LINE - 2);
        codec.encode(ok, &mut buf).unwrap();

        let too_long = "x".repeat(RELAY_MAX_LINE - 1);
        assert!(matches!(
            codec.encode(too_long, &mut buf),
            Err(ProtocolError::FrameTooLong {
                actual,
                limit: RELAY_MAX_LINE,
            }) if actual == RELAY_MAX_LINE + 1
        ));
    }
}
