//! NETCONF message framing.
//!
//! Before and during the `<hello>` exchange messages end with `]]>]]>`
//! (base:1.0). Once both sides advertise base:1.1, messages are sent as
//! chunks: `\n#<len>\n<len bytes>` repeated, closed by `\n##\n`.

use crate::error::NetconfError;

/// Delimiter that ends a base:1.0 message.
pub const END_OF_MESSAGE: &[u8] = b"]]>]]>";

/// Largest chunk size allowed by RFC 6242.
const MAX_CHUNK_SIZE: u64 = 4_294_967_295;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    EndOfMessage,
    Chunked,
}

impl Framing {
    pub fn encode(&self, message: &str) -> Vec<u8> {
        match self {
            Framing::EndOfMessage => {
                let mut out = Vec::with_capacity(message.len() + END_OF_MESSAGE.len());
                out.extend_from_slice(message.as_bytes());
                out.extend_from_slice(END_OF_MESSAGE);
                out
            }
            Framing::Chunked => {
                format!("\n#{}\n{}\n##\n", message.len(), message).into_bytes()
            }
        }
    }
}

/// Accumulates bytes read from a transport and yields complete messages.
#[derive(Debug)]
pub struct FrameDecoder {
    framing: Framing,
    buffer: Vec<u8>,
}

impl FrameDecoder {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            buffer: Vec::new(),
        }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Switches framing after the hello exchange. Bytes already buffered are
    /// decoded with the new framing.
    pub fn set_framing(&mut self, framing: Framing) {
        self.framing = framing;
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// True when no partial message is buffered (ignoring whitespace).
    pub fn is_idle(&self) -> bool {
        self.buffer.iter().all(u8::is_ascii_whitespace)
    }

    /// Returns the next complete message, `Ok(None)` if more bytes are
    /// needed, or an error if the buffered bytes cannot be a valid frame.
    pub fn next_message(&mut self) -> Result<Option<Vec<u8>>, NetconfError> {
        match self.framing {
            Framing::EndOfMessage => Ok(self.next_delimited()),
            Framing::Chunked => self.next_chunked(),
        }
    }

    fn next_delimited(&mut self) -> Option<Vec<u8>> {
        let end = self
            .buffer
            .windows(END_OF_MESSAGE.len())
            .position(|w| w == END_OF_MESSAGE)?;
        let rest = self.buffer.split_off(end + END_OF_MESSAGE.len());
        let mut message = std::mem::replace(&mut self.buffer, rest);
        message.truncate(end);
        Some(message)
    }

    fn next_chunked(&mut self) -> Result<Option<Vec<u8>>, NetconfError> {
        let buf = &self.buffer;
        let mut pos = 0;
        let mut message = Vec::new();

        loop {
            if buf.len() < pos + 4 {
                return Ok(None);
            }
            if buf[pos] != b'\n' || buf[pos + 1] != b'#' {
                return Err(NetconfError::Framing(format!(
                    "expected chunk header at byte {pos}, found {:?}",
                    String::from_utf8_lossy(&buf[pos..(pos + 8).min(buf.len())])
                )));
            }
            if buf[pos + 2] == b'#' {
                if buf[pos + 3] != b'\n' {
                    return Err(NetconfError::Framing(
                        "end-of-chunks marker is not followed by a newline".to_string(),
                    ));
                }
                if message.is_empty() {
                    return Err(NetconfError::Framing(
                        "message contains no chunks".to_string(),
                    ));
                }
                self.buffer.drain(..pos + 4);
                return Ok(Some(message));
            }

            let digits_start = pos + 2;
            let mut cursor = digits_start;
            while cursor < buf.len() && buf[cursor].is_ascii_digit() {
                cursor += 1;
                if cursor - digits_start > 10 {
                    return Err(NetconfError::Framing("chunk size is too large".to_string()));
                }
            }
            if cursor == buf.len() {
                return Ok(None);
            }
            if buf[cursor] != b'\n' || cursor == digits_start {
                return Err(NetconfError::Framing(format!(
                    "invalid chunk size at byte {digits_start}"
                )));
            }
            if buf[digits_start] == b'0' {
                return Err(NetconfError::Framing(
                    "chunk size must be a positive number without leading zeros".to_string(),
                ));
            }
            let digits = std::str::from_utf8(&buf[digits_start..cursor])
                .map_err(|e| NetconfError::Framing(e.to_string()))?;
            let size: u64 = digits
                .parse()
                .map_err(|_| NetconfError::Framing(format!("invalid chunk size {digits}")))?;
            if size > MAX_CHUNK_SIZE {
                return Err(NetconfError::Framing(format!("chunk size {size} exceeds the maximum")));
            }

            let data_start = cursor + 1;
            let data_end = data_start + size as usize;
            if buf.len() < data_end {
                return Ok(None);
            }
            message.extend_from_slice(&buf[data_start..data_end]);
            pos = data_end;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunked_encoding_uses_byte_length() {
        let frame = Framing::Chunked.encode("<ok/>é");
        assert_eq!(frame, "\n#7\n<ok/>é\n##\n".as_bytes());
    }

    #[test]
    fn decodes_message_split_across_reads_and_chunks() {
        let mut decoder = FrameDecoder::new(Framing::Chunked);
        decoder.extend(b"\n#4\n<rpc");
        assert_eq!(decoder.next_message().expect("partial"), None);
        decoder.extend(b"\n#3\n/>\n\n##\n\n#2\n<a");
        let first = decoder.next_message().expect("decode").expect("message");
        assert_eq!(first, b"<rpc/>\n");
        assert_eq!(decoder.next_message().expect("partial"), None);
        assert!(!decoder.is_idle());
    }

    #[test]
    fn rejects_leading_zero_and_zero_size() {
        let mut decoder = FrameDecoder::new(Framing::Chunked);
        decoder.extend(b"\n#0\n\n##\n");
        assert!(matches!(decoder.next_message(), Err(NetconfError::Framing(_))));

        let mut decoder = FrameDecoder::new(Framing::Chunked);
        decoder.extend(b"\n#05\nhello\n##\n");
        assert!(decoder.next_message().is_err());
    }

    #[test]
    fn rejects_garbage_header() {
        let mut decoder = FrameDecoder::new(Framing::Chunked);
        decoder.extend(b"<rpc-reply/>");
        assert!(decoder.next_message().is_err());
    }

    #[test]
    fn rejects_oversized_chunk() {
        let mut decoder = FrameDecoder::new(Framing::Chunked);
        decoder.extend(b"\n#4294967296\n");
        assert!(decoder.next_message().is_err());
    }

    #[test]
    fn end_of_message_then_switch_to_chunked() {
        let mut decoder = FrameDecoder::new(Framing::EndOfMessage);
        decoder.extend(b"<hello/>]]>]]>\n#5\n<ok/>\n##\n");
        let hello = decoder.next_message().expect("decode").expect("hello");
        assert_eq!(hello, b"<hello/>");
        decoder.set_framing(Framing::Chunked);
        let reply = decoder.next_message().expect("decode").expect("reply");
        assert_eq!(reply, b"<ok/>");
        assert!(decoder.is_idle());
    }
}
