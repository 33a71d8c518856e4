#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::similar_names)]

//! Library crate shared by the `kassenbuch` server and its clients.
//!
//! ## Overview
//!
//! `Kassenbuch` is a minimal networked ledger: one authoritative server keeps an append-only,
//! hash-chained sequence of transfer records and talks a newline-delimited text protocol to
//! many clients at once.
//!
//! This crate contains everything both sides of the connection need to agree on:
//!
//! - the [`Block`](block/struct.Block.html) record and its hash function,
//! - the [`Amount`](amount/struct.Amount.html) type used for transfers,
//! - the client [`Command`](command/enum.Command.html)s,
//! - the server [`ServerMessage`](message/enum.ServerMessage.html)s and their line format,
//! - a small blocking [`Client`](client/struct.Client.html).
//!
//! ## Example
//! ```
//! use kassenbuch_api::{Command, ServerMessage};
//!
//! let command: Command = "2:alice:bob:12.5".parse().unwrap();
//! assert_eq!(command.to_line(), "2:alice:bob:12.5");
//!
//! let mut lines = "ERROR:protocol:unknown command `9`\n".as_bytes();
//! let message = ServerMessage::read_from(&mut lines).unwrap();
//! assert!(matches!(message, Some(ServerMessage::Error { .. })));
//! ```

pub mod amount;
pub mod audit;
pub mod block;
pub mod client;
pub mod command;
pub mod message;

mod block_number;
mod error;

pub use amount::Amount;
pub use audit::AuditReport;
pub use block::{Block, BlockHash};
pub use block_number::BlockNumber;
pub use client::Client;
pub use command::Command;
pub use error::{Error, ErrorKind};
pub use message::ServerMessage;

/// The separator between the fields of a protocol line.
pub const FIELD_SEPARATOR: char = ':';
