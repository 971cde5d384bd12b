use crate::{
    codec::{self, FrameHeader},
    error::FrameError,
    packet::SessionId,
    specification::HEADER_LEN,
};

/// One complete frame sliced out of the inbound byte stream.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct Frame {
    pub(crate) session_id: SessionId,
    pub(crate) body: Vec<u8>,
}

/// State Transition Diagram:
///
/// ```text
///
///          |
///          V
///   +> AwaitingHeader
///   |      |
///   |      V
///   +-- AwaitingBody
///
/// ```
#[derive(Debug)]
enum ReadState {
    AwaitingHeader,
    AwaitingBody(FrameHeader),
}

/// Accumulates arbitrary-sized wire chunks and slices out complete frames.
///
/// The reader owns its buffer exclusively; no partial frame is ever exposed
/// downstream. A header that fails to decode leaves the stream unusable:
/// the same error is returned on every subsequent call, since the protocol
/// has no way to resynchronize.
#[derive(Debug)]
pub(crate) struct FrameReader {
    state: ReadState,
    buf: Vec<u8>,
}

impl FrameReader {
    pub(crate) fn new() -> Self {
        Self {
            state: ReadState::AwaitingHeader,
            buf: Vec::new(),
        }
    }

    /// Appends a chunk of wire bytes to the internal buffer.
    pub(crate) fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Extracts the next complete frame, if the buffer holds one.
    ///
    /// Returns `Ok(None)` when more bytes are needed. A single pushed chunk
    /// may yield several frames; call until `None`.
    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        loop {
            match self.state {
                ReadState::AwaitingHeader => {
                    if self.buf.len() < HEADER_LEN {
                        return Ok(None);
                    }
                    let header = codec::decode_header(&self.buf[..HEADER_LEN])?;
                    self.buf.drain(..HEADER_LEN);
                    self.state = ReadState::AwaitingBody(header);
                }
                ReadState::AwaitingBody(ref header) => {
                    if self.buf.len() < header.body_len {
                        return Ok(None);
                    }
                    let session_id = header.session_id;
                    let body: Vec<u8> = self.buf.drain(..header.body_len).collect();
                    self.state = ReadState::AwaitingHeader;
                    return Ok(Some(Frame { session_id, body }));
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::specification::SESSION_ID_LEN;

    fn frame_bytes(session_byte: u8, body: &[u8]) -> Vec<u8> {
        let sid = SessionId::from([session_byte; SESSION_ID_LEN]);
        let header = codec::encode_header(&sid, body.len());
        let mut out = header.to_vec();
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn test_whole_frame_in_one_chunk() {
        let mut reader = FrameReader::new();
        reader.push(&frame_bytes(1, b"<A><x>1</x></A>"));
        let frame = reader.next_frame().unwrap().unwrap();
        assert_eq!(frame.session_id, SessionId::from([1; SESSION_ID_LEN]));
        assert_eq!(frame.body, b"<A><x>1</x></A>");
        assert_eq!(reader.next_frame().unwrap(), None);
    }

    #[test]
    fn test_one_byte_chunks_yield_the_same_frame() {
        let bytes = frame_bytes(2, b"<A><x>hello</x></A>");
        let mut reader = FrameReader::new();
        for (i, byte) in bytes.iter().enumerate() {
            reader.push(&[*byte]);
            let frame = reader.next_frame().unwrap();
            if i + 1 < bytes.len() {
                assert_eq!(frame, None, "frame emitted early at byte {}", i);
            } else {
                assert_eq!(frame.unwrap().body, b"<A><x>hello</x></A>");
            }
        }
    }

    #[test]
    fn test_two_frames_in_one_chunk_decode_in_order() {
        let mut chunk = frame_bytes(3, b"<A></A>");
        chunk.extend_from_slice(&frame_bytes(4, b"<B></B>"));
        let mut reader = FrameReader::new();
        reader.push(&chunk);

        let first = reader.next_frame().unwrap().unwrap();
        assert_eq!(first.session_id, SessionId::from([3; SESSION_ID_LEN]));
        assert_eq!(first.body, b"<A></A>");

        let second = reader.next_frame().unwrap().unwrap();
        assert_eq!(second.session_id, SessionId::from([4; SESSION_ID_LEN]));
        assert_eq!(second.body, b"<B></B>");

        assert_eq!(reader.next_frame().unwrap(), None);
    }

    #[test]
    fn test_zero_length_body_is_a_valid_frame() {
        let mut reader = FrameReader::new();
        reader.push(&frame_bytes(5, b""));
        let frame = reader.next_frame().unwrap().unwrap();
        assert!(frame.body.is_empty());
    }

    #[test]
    fn test_header_split_across_chunks() {
        let bytes = frame_bytes(6, b"<A></A>");
        let mut reader = FrameReader::new();
        reader.push(&bytes[..10]);
        assert_eq!(reader.next_frame().unwrap(), None);
        reader.push(&bytes[10..]);
        assert_eq!(reader.next_frame().unwrap().unwrap().body, b"<A></A>");
    }

    #[test]
    fn test_bad_header_is_a_permanent_error() {
        let mut reader = FrameReader::new();
        let mut bytes = frame_bytes(7, b"<A></A>");
        bytes[SESSION_ID_LEN] = b'?';
        reader.push(&bytes);
        assert!(matches!(
            reader.next_frame(),
            Err(FrameError::LengthNotDecimal { .. })
        ));
        // The stream cannot be resynchronized; the error repeats.
        assert!(matches!(
            reader.next_frame(),
            Err(FrameError::LengthNotDecimal { .. })
        ));
    }
}
