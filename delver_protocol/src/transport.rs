// Blocking TCP transport: a socket plus a `FrameBuffer`.
//
// `send` writes one complete framed message. `std::io::Write::write_all`
// already retries `ErrorKind::Interrupted`, so a short or interrupted write
// is finished transparently; any other write failure is a hard
// `TransportError`.
//
// `receive` waits up to the configured timeout for a complete frame. Reads
// are done in `READ_CHUNK` pieces against a shrinking deadline, so a peer
// that trickles bytes cannot extend the wait indefinitely. Bytes of a
// partial frame stay buffered across calls. Timeouts, resets and clean
// closes are reported, never retried here; the client's reconnection logic
// and the server's session loop decide what happens next.
//
// One `Transport` is driven by exactly one thread at a time (the client
// connection or the server session that owns it).

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{ProtocolError, TransportError, WireError};
use crate::framing::{FrameBuffer, HEADER_LEN, MAX_MESSAGE_SIZE, READ_CHUNK};
use crate::message::Message;

pub struct Transport {
    stream: TcpStream,
    frames: FrameBuffer,
    recv_timeout: Duration,
}

impl Transport {
    /// Resolve `host` and connect to the first address that accepts within
    /// `connect_timeout`.
    pub fn connect(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        recv_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let mut last_err = None;
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, connect_timeout) {
                Ok(stream) => return Self::from_stream(stream, recv_timeout),
                Err(e) => last_err = Some(e),
            }
        }
        Err(match last_err {
            Some(e) => classify(e, connect_timeout),
            None => TransportError::Io(std::io::Error::new(
                ErrorKind::NotFound,
                format!("{host} did not resolve to any address"),
            )),
        })
    }

    /// Wrap an already-connected stream (the server's accepted sockets).
    pub fn from_stream(stream: TcpStream, recv_timeout: Duration) -> Result<Self, TransportError> {
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(recv_timeout))?;
        Ok(Self {
            stream,
            frames: FrameBuffer::new(),
            recv_timeout,
        })
    }

    pub fn recv_timeout(&self) -> Duration {
        self.recv_timeout
    }

    pub fn set_recv_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.stream.set_write_timeout(Some(timeout))?;
        self.recv_timeout = timeout;
        Ok(())
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.peer_addr().ok()
    }

    /// Serialize and write one message.
    pub fn send(&mut self, msg: &Message) -> Result<(), WireError> {
        let bytes = msg.to_bytes()?;
        if bytes.len() > MAX_MESSAGE_SIZE as usize {
            return Err(ProtocolError::FrameTooLarge {
                size: bytes.len(),
                max: MAX_MESSAGE_SIZE as usize,
            }
            .into());
        }
        debug!(tag = %msg.tag, notifications = msg.notifications.len(), "send");
        self.send_raw(&bytes)?;
        Ok(())
    }

    /// Frame and write an arbitrary payload. Also used to push deliberately
    /// unparseable bytes at a peer in tests.
    pub fn send_raw(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        #[expect(clippy::cast_possible_truncation)]
        let len_bytes = (payload.len() as u32).to_be_bytes();
        let mut wire = Vec::with_capacity(HEADER_LEN + payload.len());
        wire.extend_from_slice(&len_bytes);
        wire.extend_from_slice(payload);
        self.stream
            .write_all(&wire)
            .and_then(|()| self.stream.flush())
            .map_err(|e| classify(e, self.recv_timeout))
    }

    /// Wait for the next complete frame.
    pub fn receive_frame(&mut self) -> Result<Vec<u8>, WireError> {
        let deadline = Instant::now() + self.recv_timeout;
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(frame) = self.frames.next_frame()? {
                return Ok(frame);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::Timeout(self.recv_timeout).into());
            }
            self.stream.set_read_timeout(Some(remaining))?;
            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(TransportError::Closed.into()),
                Ok(n) => self.frames.extend(&chunk[..n])?,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(classify(e, self.recv_timeout).into()),
            }
        }
    }

    /// Wait for the next complete message and parse its envelope.
    pub fn receive(&mut self) -> Result<Message, WireError> {
        let frame = self.receive_frame()?;
        let msg = Message::from_slice(&frame)?;
        debug!(tag = %msg.tag, notifications = msg.notifications.len(), "receive");
        Ok(msg)
    }

    /// Close both directions. Errors are ignored; the socket is going away.
    pub fn shutdown(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

fn classify(err: std::io::Error, timeout: Duration) -> TransportError {
    match err.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => TransportError::Timeout(timeout),
        ErrorKind::UnexpectedEof => TransportError::Closed,
        _ => TransportError::Io(err),
    }
}
