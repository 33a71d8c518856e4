//! A blocking line client for the ledger server.

use crate::{Command, Error, ServerMessage};
use std::{
    io::{BufReader, Write},
    net::{Shutdown, SocketAddr, TcpStream},
    time::Duration,
};

/// A client instance.
///
/// The server may push broadcasts at any time, so a message returned by
/// [`receive`](#method.receive) is not necessarily the reply to the last command sent.
///
/// # Example
///
/// ```no_run
/// use kassenbuch_api::{Client, Command, ServerMessage};
///
/// let mut client = Client::connect("127.0.0.1:8888".parse().unwrap()).unwrap();
/// // Every connection starts with a dump of the ledger.
/// let dump = client.receive().unwrap();
/// assert!(matches!(dump, Some(ServerMessage::Ledger(_))));
///
/// client.send(&Command::Mine).unwrap();
/// match client.receive().unwrap() {
///     Some(ServerMessage::MinedBlock(block)) => println!("mined {}", block),
///     other => println!("unexpected: {:?}", other),
/// }
/// ```
pub struct Client {
    addr: SocketAddr,
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Client {
    /// Connect to the server at `addr`.
    pub fn connect(addr: SocketAddr) -> Result<Self, Error> {
        let stream = TcpStream::connect(addr)?;
        let writer = stream.try_clone()?;
        log::debug!("Connected to {}.", addr);
        Ok(Self {
            addr,
            reader: BufReader::new(stream),
            writer,
        })
    }

    /// Set a timeout for [`receive`](#method.receive). `None` blocks forever.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), Error> {
        self.writer.set_read_timeout(timeout)?;
        Ok(())
    }

    /// Send a command.
    pub fn send(&mut self, command: &Command) -> Result<(), Error> {
        self.send_line(&command.to_line())
    }

    /// Send a raw protocol line (a newline is appended).
    pub fn send_line(&mut self, line: &str) -> Result<(), Error> {
        log::trace!("Sending to {}: {}", self.addr, line);
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');
        self.writer.write_all(&data)?;
        Ok(())
    }

    /// Receive the next message. Returns `Ok(None)` when the server closed the connection.
    pub fn receive(&mut self) -> Result<Option<ServerMessage>, Error> {
        let message = ServerMessage::read_from(&mut self.reader)?;
        log::trace!("Received from {}: {:?}", self.addr, message);
        Ok(message)
    }

    /// Send a command and wait for the first message that is not a block broadcast.
    ///
    /// Block notices that arrive in between are handed to `on_broadcast`.
    pub fn request(
        &mut self,
        command: &Command,
        mut on_broadcast: impl FnMut(ServerMessage),
    ) -> Result<Option<ServerMessage>, Error> {
        self.send(command)?;
        loop {
            match self.receive()? {
                Some(message @ ServerMessage::NewBlock(_))
                | Some(message @ ServerMessage::MinedBlock(_)) => on_broadcast(message),
                other => return Ok(other),
            }
        }
    }

    /// Send the disconnect command and close the connection.
    pub fn disconnect(mut self) -> Result<(), Error> {
        self.send(&Command::Disconnect)?;
        self.writer.shutdown(Shutdown::Write)?;
        Ok(())
    }
}
