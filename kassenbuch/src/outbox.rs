//! The output path of one session.

use kassenbuch_api::ServerMessage;
use std::{
    io::{self, Write},
    net::{Shutdown, SocketAddr, TcpStream},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

/// A cloneable handle to write whole messages to one client.
///
/// A message is written with a single `write_all` while the write lock is held,
/// so replies and broadcasts never interleave inside a message.
#[derive(Debug, Clone)]
pub struct Outbox {
    addr: SocketAddr,
    stream: Arc<TcpStream>,
    write_lock: Arc<Mutex<()>>,
}

impl Outbox {
    /// Create an outbox writing to (a clone of) `stream`.
    pub fn new(stream: &TcpStream, write_timeout: Option<Duration>) -> io::Result<Self> {
        let addr = stream.peer_addr()?;
        let stream = stream.try_clone()?;
        stream.set_write_timeout(write_timeout)?;
        Ok(Self {
            addr,
            stream: Arc::new(stream),
            write_lock: Arc::default(),
        })
    }

    /// The address of the client.
    #[must_use]
    pub const fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Send `message` to the client.
    pub fn send(&self, message: &ServerMessage) -> io::Result<()> {
        self.lock().send(message)
    }

    /// Hold the output path exclusively, e.g. to write a message before any queued broadcast.
    pub fn lock(&self) -> OutboxGuard<'_> {
        OutboxGuard {
            _guard: self.write_lock.lock().unwrap(),
            stream: &self.stream,
        }
    }

    /// Shut the connection down in both directions.
    ///
    /// A session blocked reading from this connection sees the end of the stream.
    /// Does not wait for a write in progress.
    pub fn close(&self) {
        if let Err(err) = self.stream.shutdown(Shutdown::Both) {
            log::debug!("Could not shut down connection to {}: {}", self.addr, err);
        }
    }
}

/// Exclusive access to an [`Outbox`](struct.Outbox.html).
pub struct OutboxGuard<'a> {
    _guard: MutexGuard<'a, ()>,
    stream: &'a TcpStream,
}

impl OutboxGuard<'_> {
    /// Send `message` while holding the output path.
    pub fn send(&mut self, message: &ServerMessage) -> io::Result<()> {
        let mut stream = self.stream;
        stream.write_all(message.encode().as_bytes())?;
        stream.flush()
    }
}
