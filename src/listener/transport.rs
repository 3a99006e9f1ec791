//! Message transports feeding the listener.
//!
//! A transport yields whole messages. Over TCP every message is framed
//! with a 4-byte big-endian length prefix.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Largest accepted message body.
pub const MAX_FRAME_LEN: usize = 1 << 20;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

/// A source of raw messages.
pub trait Transport: Send {
    /// Wait up to `timeout` for the next message.
    ///
    /// `Ok(None)` means nothing arrived in time.
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        (**self).recv_timeout(timeout)
    }
}

/// Errors that end a transport.
#[derive(Debug)]
pub enum TransportError {
    Io(std::io::Error),
    /// The peer went away
    Closed,
    FrameTooLarge(usize),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Io(e) => write!(f, "Transport IO error: {e}"),
            TransportError::Closed => write!(f, "Transport closed by peer"),
            TransportError::FrameTooLarge(len) => {
                write!(f, "Frame of {len} bytes exceeds limit of {MAX_FRAME_LEN}")
            }
        }
    }
}

impl std::error::Error for TransportError {}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        TransportError::Io(e)
    }
}

/// Prefix `payload` with its big-endian length.
pub fn frame_message(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 4);
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// In-process transport backed by a bounded channel.
pub struct ChannelTransport {
    receiver: Receiver<Vec<u8>>,
}

impl ChannelTransport {
    /// Create a transport and the sender that feeds it.
    pub fn new(capacity: usize) -> (Sender<Vec<u8>>, Self) {
        let (sender, receiver) = bounded(capacity);
        (sender, Self { receiver })
    }
}

impl Transport for ChannelTransport {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(message) => Ok(Some(message)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }
}

/// Length-prefixed message stream over TCP.
///
/// In connect mode the transport dials the publisher once. In bind mode it
/// accepts one publisher at a time and goes back to accepting when that
/// publisher disconnects.
///
/// Only the 4-byte length framing is spoken here. A ZeroMQ PUB socket
/// talks ZMTP and cannot be read directly: its greeting fails as an
/// oversized frame. Such a sensor needs a bridge that forwards each
/// message through [`send_framed`].
pub struct TcpTransport {
    acceptor: Option<TcpListener>,
    stream: Option<TcpStream>,
    pending: Vec<u8>,
}

impl TcpTransport {
    /// Connect to a publisher.
    pub fn connect(address: impl ToSocketAddrs) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(address)?;
        stream.set_nodelay(true)?;
        info!(peer = ?stream.peer_addr().ok(), "Connected to publisher");
        Ok(Self {
            acceptor: None,
            stream: Some(stream),
            pending: Vec::new(),
        })
    }

    /// Listen for a publisher on `address`.
    pub fn bind(address: impl ToSocketAddrs) -> Result<Self, TransportError> {
        let acceptor = TcpListener::bind(address)?;
        acceptor.set_nonblocking(true)?;
        info!(address = ?acceptor.local_addr().ok(), "Waiting for publisher");
        Ok(Self {
            acceptor: Some(acceptor),
            stream: None,
            pending: Vec::new(),
        })
    }

    /// Bound address in bind mode.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.acceptor.as_ref().and_then(|a| a.local_addr().ok())
    }

    fn take_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        if self.pending.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes([
            self.pending[0],
            self.pending[1],
            self.pending[2],
            self.pending[3],
        ]) as usize;
        if len > MAX_FRAME_LEN {
            return Err(TransportError::FrameTooLarge(len));
        }
        if self.pending.len() < 4 + len {
            return Ok(None);
        }
        let frame = self.pending[4..4 + len].to_vec();
        self.pending.drain(..4 + len);
        Ok(Some(frame))
    }

    fn try_accept(&mut self, deadline: Instant) -> Result<bool, TransportError> {
        let Some(acceptor) = self.acceptor.as_ref() else {
            return Err(TransportError::Closed);
        };
        loop {
            match acceptor.accept() {
                Ok((stream, peer)) => {
                    stream.set_nonblocking(false)?;
                    stream.set_nodelay(true)?;
                    info!(%peer, "Publisher connected");
                    self.stream = Some(stream);
                    self.pending.clear();
                    return Ok(true);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(false);
                    }
                    thread::sleep(ACCEPT_BACKOFF.min(deadline - now));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn peer_closed(&mut self) -> Result<(), TransportError> {
        self.stream = None;
        self.pending.clear();
        if self.acceptor.is_some() {
            debug!("Publisher disconnected, accepting again");
            Ok(())
        } else {
            Err(TransportError::Closed)
        }
    }
}

impl Transport for TcpTransport {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; 4096];

        loop {
            if let Some(frame) = self.take_frame()? {
                return Ok(Some(frame));
            }
            if self.stream.is_none() && !self.try_accept(deadline)? {
                return Ok(None);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let Some(stream) = self.stream.as_mut() else {
                continue;
            };
            stream.set_read_timeout(Some(remaining))?;
            match stream.read(&mut chunk) {
                Ok(0) => self.peer_closed()?,
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(None)
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if e.kind() == ErrorKind::ConnectionReset => self.peer_closed()?,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Write one framed message to a publisher-side stream.
pub fn send_framed(stream: &mut impl Write, payload: &[u8]) -> std::io::Result<()> {
    stream.write_all(&frame_message(payload))
}
