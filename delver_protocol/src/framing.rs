// Length-delimited message framing.
//
// Wire format: a 4-byte big-endian length prefix followed by a UTF-8 JSON
// payload. There is no content sniffing; every message on the wire, in both
// directions, is framed this way.
//
// Two entry points:
// - `write_message` / `read_message`: blocking helpers over any
//   `Write`/`Read` stream. Used by tests and scripted peers.
// - `FrameBuffer`: a pure accumulator. Push whatever bytes a socket read
//   returned, then pop complete frames. A trailing partial frame stays in the
//   buffer across calls. `transport.rs` builds its receive path on this so
//   that timeouts never lose half-read data.
//
// `MAX_MESSAGE_SIZE` (16 MB) caps both a declared frame length and the amount
// of unread data the buffer will hold. Exceeding it resets the buffer and
// reports `ProtocolError::FrameTooLarge`; the caller treats that as fatal.

use std::io::{self, Read, Write};

use crate::error::ProtocolError;

/// Maximum allowed message size (16 MB). Protects against unbounded allocation
/// from malformed length prefixes or a peer that never stops sending.
pub const MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024;

/// Size of the big-endian length prefix.
pub const HEADER_LEN: usize = 4;

/// Bytes requested from the socket per read.
pub const READ_CHUNK: usize = 8 * 1024;

/// Write a length-delimited message: 4-byte big-endian length, then payload.
pub fn write_message<W: Write>(writer: &mut W, msg: &[u8]) -> io::Result<()> {
    let len = msg.len();
    if len > MAX_MESSAGE_SIZE as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("message too large: {len} bytes (max {MAX_MESSAGE_SIZE})"),
        ));
    }
    #[expect(clippy::cast_possible_truncation)]
    let len_bytes = (len as u32).to_be_bytes();
    writer.write_all(&len_bytes)?;
    writer.write_all(msg)?;
    writer.flush()?;
    Ok(())
}

/// Read a length-delimited message: 4-byte big-endian length, then payload.
///
/// Returns `UnexpectedEof` if the stream closes cleanly before or during a
/// message. Returns `InvalidData` if the length exceeds `MAX_MESSAGE_SIZE`.
pub fn read_message<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; HEADER_LEN];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("message too large: {len} bytes (max {MAX_MESSAGE_SIZE})"),
        ));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Accumulates raw bytes and splits them into complete frames.
#[derive(Debug)]
pub struct FrameBuffer {
    buf: Vec<u8>,
    limit: usize,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::with_limit(MAX_MESSAGE_SIZE as usize)
    }

    /// A buffer with a smaller frame cap. Tests use this to exercise the
    /// overflow path without allocating 16 MB.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
        }
    }

    /// Append bytes read from the peer.
    ///
    /// A peer may legitimately have one full frame plus the start of the
    /// next in flight, so the unread cap is one maximal frame, its header and
    /// one read chunk.
    pub fn extend(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.buf.extend_from_slice(bytes);
        let max = self.limit + HEADER_LEN + READ_CHUNK;
        if self.buf.len() > max {
            let size = self.buf.len();
            self.reset();
            return Err(ProtocolError::FrameTooLarge { size, max });
        }
        Ok(())
    }

    /// Pop the next complete frame, if one is buffered.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, ProtocolError> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let mut len_buf = [0u8; HEADER_LEN];
        len_buf.copy_from_slice(&self.buf[..HEADER_LEN]);
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > self.limit {
            self.reset();
            return Err(ProtocolError::FrameTooLarge {
                size: len,
                max: self.limit,
            });
        }
        if self.buf.len() < HEADER_LEN + len {
            return Ok(None);
        }
        let frame = self.buf[HEADER_LEN..HEADER_LEN + len].to_vec();
        self.buf.drain(..HEADER_LEN + len);
        Ok(Some(frame))
    }

    /// Bytes received but not yet returned as a frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Drop everything buffered.
    pub fn reset(&mut self) {
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn framed(payload: &[u8]) -> Vec<u8> {
        let mut wire = Vec::new();
        write_message(&mut wire, payload).unwrap();
        wire
    }

    #[test]
    fn roundtrip_simple_message() {
        let original = b"{\"auth\":{}}";
        let wire = framed(original);
        let mut cursor = Cursor::new(&wire);
        let recovered = read_message(&mut cursor).unwrap();
        assert_eq!(recovered, original);
    }

    #[test]
    fn rejects_oversized_write() {
        let big = vec![0u8; MAX_MESSAGE_SIZE as usize + 1];
        let mut buf = Vec::new();
        let err = write_message(&mut buf, &big).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn rejects_oversized_read() {
        let fake_len = (MAX_MESSAGE_SIZE + 1).to_be_bytes();
        let mut cursor = Cursor::new(fake_len.to_vec());
        let err = read_message(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn read_unexpected_eof() {
        let mut cursor = Cursor::new(vec![0u8, 1]);
        let err = read_message(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn partial_frame_survives_across_reads() {
        let wire = framed(b"hello");
        let mut frames = FrameBuffer::new();

        // Header and half the body.
        frames.extend(&wire[..6]).unwrap();
        assert_eq!(frames.next_frame().unwrap(), None);
        assert_eq!(frames.pending(), 6);

        frames.extend(&wire[6..]).unwrap();
        assert_eq!(frames.next_frame().unwrap().as_deref(), Some(&b"hello"[..]));
        assert_eq!(frames.pending(), 0);
    }

    #[test]
    fn several_frames_in_one_read() {
        let mut wire = framed(b"first");
        wire.extend(framed(b""));
        wire.extend(framed(b"third"));
        // Trailing fragment of a fourth frame.
        wire.extend(&framed(b"fourth")[..3]);

        let mut frames = FrameBuffer::new();
        frames.extend(&wire).unwrap();
        assert_eq!(frames.next_frame().unwrap().as_deref(), Some(&b"first"[..]));
        assert_eq!(frames.next_frame().unwrap().as_deref(), Some(&b""[..]));
        assert_eq!(frames.next_frame().unwrap().as_deref(), Some(&b"third"[..]));
        assert_eq!(frames.next_frame().unwrap(), None);
        assert_eq!(frames.pending(), 3);
    }

    #[test]
    fn oversized_declared_length_resets_buffer() {
        let mut frames = FrameBuffer::with_limit(16);
        frames.extend(&17u32.to_be_bytes()).unwrap();
        let err = frames.next_frame().unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { size: 17, max: 16 }));
        assert_eq!(frames.pending(), 0);
    }

    #[test]
    fn unbounded_unread_data_resets_buffer() {
        let mut frames = FrameBuffer::with_limit(16);
        let junk = vec![0u8; 16 + HEADER_LEN + READ_CHUNK + 1];
        let err = frames.extend(&junk).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLarge { .. }));
        assert_eq!(frames.pending(), 0);
    }
}
