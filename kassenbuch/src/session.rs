//! The per-connection read loop.

use crate::{
    dispatcher::{CommandDispatcher, Outcome},
    outbox::Outbox,
    registry::{ConnectionRegistry, SessionId},
    Error,
};
use kassenbuch_api::{Block, BlockNumber, ServerMessage};
use std::{
    io::{self, BufRead, BufReader, Read},
    net::{SocketAddr, TcpStream},
    sync::Arc,
    time::Duration,
};

/// The states a session goes through.
///
/// `Connected` → `AwaitingCommand` → `Processing` → `Replying` → `AwaitingCommand` → …,
/// until the client disconnects, the connection fails or the client sends `5`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// The connection was accepted, the ledger dump is being sent.
    Connected,
    /// Waiting for the next request line.
    AwaitingCommand,
    /// A request is being dispatched.
    Processing,
    /// A reply is being written.
    Replying,
    /// The session ended.
    Disconnected,
}

/// Per-session limits.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Maximum length of a request line in bytes.
    pub max_line_length: usize,
    /// Write timeout of the client socket.
    pub write_timeout: Option<Duration>,
}

/// A client session.
///
/// The session owns the connection; its `Outbox` is shared with the broadcaster
/// while the session is registered.
pub struct ClientSession {
    addr: SocketAddr,
    reader: BufReader<TcpStream>,
    outbox: Outbox,
    registry: Arc<ConnectionRegistry>,
    dispatcher: CommandDispatcher,
    max_line_length: usize,
    state: SessionState,
}

impl ClientSession {
    /// Create a new session for an accepted connection.
    pub fn new(
        stream: TcpStream,
        dispatcher: CommandDispatcher,
        registry: Arc<ConnectionRegistry>,
        config: SessionConfig,
    ) -> Result<Self, Error> {
        let addr = stream.peer_addr()?;
        let outbox = Outbox::new(&stream, config.write_timeout)?;
        Ok(Self {
            addr,
            reader: BufReader::new(stream),
            outbox,
            registry,
            dispatcher,
            max_line_length: config.max_line_length,
            state: SessionState::Connected,
        })
    }

    /// The address of the client.
    #[must_use]
    pub const fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve the client until it disconnects.
    ///
    /// Returns an error only if the connection failed. The session is unregistered
    /// and the connection is closed on every path out of this function.
    pub fn run(mut self) -> Result<(), Error> {
        let _registration = match self.connect()? {
            Some(registration) => registration,
            None => {
                log::debug!("Not serving {}: the server is shutting down.", self.addr);
                self.outbox.close();
                return Ok(());
            }
        };

        loop {
            self.transition(SessionState::AwaitingCommand);
            let request = match self.read_request()? {
                Some(request) => request,
                None => break,
            };

            self.transition(SessionState::Processing);
            let outcome = match request {
                Ok(line) => {
                    log::trace!("Received from {}: {}", self.addr, line);
                    self.dispatcher.dispatch(&line)
                }
                Err(err) => Outcome::Reply(ServerMessage::error(&err)),
            };

            match outcome {
                Outcome::Reply(message) => {
                    self.transition(SessionState::Replying);
                    self.outbox.send(&message)?;
                }
                Outcome::Published => {}
                Outcome::Disconnect => break,
            }
        }

        self.transition(SessionState::Disconnected);
        Ok(())
    }

    /// Register the session and send the initial ledger dump.
    ///
    /// The session is registered together with the last block of its dump, and the
    /// broadcaster skips notices for that block and every earlier one. The output path
    /// is held while registering, so every notice reaching this session is written after
    /// the dump and describes a block the dump does not contain.
    /// Returns `None` if the registry is closed.
    fn connect(&self) -> Result<Option<Registration>, Error> {
        let mut output = self.outbox.lock();
        let (registration, snapshot) = self.dispatcher.ledger().snapshot_with(|chain| {
            let synced_to = chain.back().map_or(BlockNumber::GENESIS, Block::index);
            let registration =
                Registration::new(self.registry.clone(), self.outbox.clone(), synced_to);
            (registration, chain.clone())
        });
        let registration = match registration {
            Some(registration) => registration,
            None => return Ok(None),
        };
        output.send(&ServerMessage::Ledger(snapshot.into_iter().collect()))?;
        Ok(Some(registration))
    }

    /// Read the next request line.
    ///
    /// Returns `None` at the end of the stream. Lines that are too long or not
    /// UTF-8 are returned as protocol errors.
    fn read_request(&mut self) -> io::Result<Option<Result<String, kassenbuch_api::Error>>> {
        let limit = self.max_line_length as u64 + 1;
        let mut line = Vec::new();
        let read = (&mut self.reader).take(limit).read_until(b'\n', &mut line)?;
        if read == 0 {
            return Ok(None);
        }

        if line.last() == Some(&b'\n') {
            line.pop();
        } else if line.len() as u64 >= limit {
            self.skip_line()?;
            return Ok(Some(Err(kassenbuch_api::Error::LineTooLong(
                self.max_line_length,
            ))));
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }

        Ok(Some(
            String::from_utf8(line).map_err(|_| kassenbuch_api::Error::InvalidUtf8),
        ))
    }

    /// Discard input up to and including the next newline.
    fn skip_line(&mut self) -> io::Result<()> {
        loop {
            let buf = self.reader.fill_buf()?;
            if buf.is_empty() {
                return Ok(());
            }
            if let Some(position) = buf.iter().position(|&b| b == b'\n') {
                self.reader.consume(position + 1);
                return Ok(());
            }
            let len = buf.len();
            self.reader.consume(len);
        }
    }

    fn transition(&mut self, state: SessionState) {
        log::trace!("Session {}: {:?} -> {:?}", self.addr, self.state, state);
        self.state = state;
    }
}

/// Keeps a session registered. Dropping it unregisters the session and closes the connection.
struct Registration {
    registry: Arc<ConnectionRegistry>,
    outbox: Outbox,
    id: SessionId,
}

impl Registration {
    fn new(
        registry: Arc<ConnectionRegistry>,
        outbox: Outbox,
        synced_to: BlockNumber,
    ) -> Option<Self> {
        let id = registry.register(outbox.clone(), synced_to)?;
        Some(Self {
            registry,
            outbox,
            id,
        })
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
        self.outbox.close();
    }
}
