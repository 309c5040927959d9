//! TCP backend for the pub/sub sockets
//!
//! # Wire Format
//!
//! ```text
//! ┌──────────────────┬──────────────┬──────────────┬───────────────┐
//! │ Length (4 bytes) │ Topic length │ Topic        │ Payload       │
//! │ Big-endian u32   │ u8           │ UTF-8 bytes  │ JSON document │
//! └──────────────────┴──────────────┴──────────────┴───────────────┘
//! ```
//!
//! The length counts everything after itself. Frames larger than
//! [`MAX_FRAME_LEN`] or with an inconsistent topic length close that client.
//!
//! The publisher accepts any number of clients and broadcasts every frame to
//! all of them. The subscriber accepts any number of clients, reads frames
//! from each, and keeps the ones whose topic starts with a subscribed prefix.

use crate::error::{Error, Result};
use crate::pubsub::{Envelope, PubSocket, SubSocket};
use log::{debug, info, trace, warn};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

/// Largest accepted frame body
pub const MAX_FRAME_LEN: usize = 64 * 1024;

const LEN_PREFIX: usize = 4;

/// Decoded frames held by the subscriber before it stops reading
const MAX_PENDING: usize = 64;

/// Bytes read from one client per poll
const READ_BUDGET: usize = LEN_PREFIX + MAX_FRAME_LEN;

/// Polling period of the subscriber while waiting for data
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// A stalled telemetry client is dropped after this long
const WRITE_TIMEOUT: Duration = Duration::from_millis(200);

fn invalid_input(msg: String) -> Error {
    Error::Io(io::Error::new(io::ErrorKind::InvalidInput, msg))
}

/// Build one length-prefixed frame
pub fn encode_frame(topic: &str, payload: &[u8]) -> Result<Vec<u8>> {
    let topic_len = u8::try_from(topic.len())
        .map_err(|_| invalid_input(format!("topic too long: {} bytes", topic.len())))?;
    let body_len = 1 + topic.len() + payload.len();
    if body_len > MAX_FRAME_LEN {
        return Err(invalid_input(format!("frame too large: {} bytes", body_len)));
    }

    let mut frame = Vec::with_capacity(LEN_PREFIX + body_len);
    frame.extend_from_slice(&(body_len as u32).to_be_bytes());
    frame.push(topic_len);
    frame.extend_from_slice(topic.as_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Result of looking for a frame at the start of a buffer
#[derive(Debug, PartialEq)]
pub enum Decoded {
    /// A frame and the number of bytes it occupied
    Frame(Envelope, usize),
    /// More bytes are needed
    Incomplete,
    /// The stream cannot be resynchronised
    Invalid(String),
}

pub fn decode_frame(buf: &[u8]) -> Decoded {
    if buf.len() < LEN_PREFIX {
        return Decoded::Incomplete;
    }
    let mut len_bytes = [0u8; LEN_PREFIX];
    len_bytes.copy_from_slice(&buf[..LEN_PREFIX]);
    let body_len = u32::from_be_bytes(len_bytes) as usize;

    if body_len == 0 || body_len > MAX_FRAME_LEN {
        return Decoded::Invalid(format!("bad frame length {}", body_len));
    }
    if buf.len() < LEN_PREFIX + body_len {
        return Decoded::Incomplete;
    }

    let body = &buf[LEN_PREFIX..LEN_PREFIX + body_len];
    let topic_end = 1 + body[0] as usize;
    if topic_end > body.len() {
        return Decoded::Invalid(format!("topic length {} exceeds frame", body[0]));
    }
    match std::str::from_utf8(&body[1..topic_end]) {
        Ok(topic) => Decoded::Frame(Envelope::new(topic, &body[topic_end..]), LEN_PREFIX + body_len),
        Err(_) => Decoded::Invalid("topic is not UTF-8".to_string()),
    }
}

fn bind_listener<A: ToSocketAddrs>(addr: A) -> Result<TcpListener> {
    let listener = TcpListener::bind(addr)?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// Broadcasting publisher socket
pub struct TcpPublisher {
    listener: TcpListener,
    clients: Mutex<Vec<TcpStream>>,
}

impl TcpPublisher {
    /// Bind on all interfaces
    pub fn bind(port: u16) -> Result<Self> {
        Self::bind_addr(("0.0.0.0", port))
    }

    pub fn bind_addr<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let listener = bind_listener(addr)?;
        info!("Telemetry publisher bound to {}", listener.local_addr()?);
        Ok(Self {
            listener,
            clients: Mutex::new(Vec::new()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    fn accept_pending(&self, clients: &mut Vec<TcpStream>) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    let setup = stream
                        .set_nonblocking(false)
                        .and_then(|_| stream.set_write_timeout(Some(WRITE_TIMEOUT)));
                    match setup {
                        Ok(()) => {
                            info!("Telemetry client connected: {}", addr);
                            clients.push(stream);
                        }
                        Err(e) => warn!("Failed to configure telemetry client {}: {}", addr, e),
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("Error accepting telemetry client: {}", e);
                    break;
                }
            }
        }
    }
}

impl PubSocket for TcpPublisher {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<()> {
        let frame = encode_frame(topic, payload)?;

        let mut clients = self.clients.lock();
        self.accept_pending(&mut clients);
        clients.retain_mut(|client| match client.write_all(&frame) {
            Ok(()) => true,
            Err(e) => {
                if let Ok(addr) = client.peer_addr() {
                    debug!("Telemetry client {} disconnected: {}", addr, e);
                }
                false
            }
        });
        Ok(())
    }
}

struct Peer {
    stream: TcpStream,
    addr: SocketAddr,
    buf: Vec<u8>,
}

impl Peer {
    /// Read what is available and queue matching frames; false once the peer is gone.
    /// Reads stop when `pending` is full or the per-poll budget is used up, so
    /// unread data stays in the socket until the consumer catches up.
    fn poll(&mut self, filters: &[String], pending: &mut VecDeque<Envelope>) -> bool {
        let mut chunk = [0u8; 4096];
        let mut budget = READ_BUDGET;
        loop {
            if !self.drain_frames(filters, pending) {
                return false;
            }
            if pending.len() >= MAX_PENDING || budget == 0 {
                return true;
            }

            let want = chunk.len().min(budget);
            match self.stream.read(&mut chunk[..want]) {
                Ok(0) => {
                    info!("Command client disconnected: {}", self.addr);
                    self.drain_frames(filters, pending);
                    return false;
                }
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    budget -= n;
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return true,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("Command client {} read error: {}", self.addr, e);
                    return false;
                }
            }
        }
    }

    /// Decode buffered frames into `pending` until it is full; false on a bad frame
    fn drain_frames(&mut self, filters: &[String], pending: &mut VecDeque<Envelope>) -> bool {
        while pending.len() < MAX_PENDING {
            match decode_frame(&self.buf) {
                Decoded::Frame(envelope, used) => {
                    self.buf.drain(..used);
                    if filters.iter().any(|f| envelope.matches(f)) {
                        pending.push_back(envelope);
                    } else {
                        trace!("Ignoring unsubscribed topic {}", envelope.topic);
                    }
                }
                Decoded::Incomplete => break,
                Decoded::Invalid(reason) => {
                    warn!("Closing command client {}: {}", self.addr, reason);
                    return false;
                }
            }
        }
        true
    }
}

/// Prefix-filtering subscriber socket
pub struct TcpSubscriber {
    listener: TcpListener,
    peers: Vec<Peer>,
    filters: Vec<String>,
    pending: VecDeque<Envelope>,
}

impl TcpSubscriber {
    /// Bind on all interfaces
    pub fn bind(port: u16) -> Result<Self> {
        Self::bind_addr(("0.0.0.0", port))
    }

    pub fn bind_addr<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let listener = bind_listener(addr)?;
        info!("Command subscriber bound to {}", listener.local_addr()?);
        Ok(Self {
            listener,
            peers: Vec::new(),
            filters: Vec::new(),
            pending: VecDeque::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => match stream.set_nonblocking(true) {
                    Ok(()) => {
                        info!("Command client connected: {}", addr);
                        self.peers.push(Peer {
                            stream,
                            addr,
                            buf: Vec::new(),
                        });
                    }
                    Err(e) => warn!("Failed to configure command client {}: {}", addr, e),
                },
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("Error accepting command client: {}", e);
                    break;
                }
            }
        }
    }

    fn poll_peers(&mut self) {
        let filters = &self.filters;
        let pending = &mut self.pending;
        self.peers.retain_mut(|peer| peer.poll(filters, pending));
    }
}

impl SubSocket for TcpSubscriber {
    fn subscribe(&mut self, topic: &str) -> Result<()> {
        if !self.filters.iter().any(|f| f == topic) {
            self.filters.push(topic.to_string());
        }
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Envelope>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(envelope) = self.pending.pop_front() {
                return Ok(Some(envelope));
            }

            self.accept_pending();
            self.poll_peers();
            if !self.pending.is_empty() {
                continue;
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }
}
