#![allow(clippy::pub_enum_variant_names)]

use err_derive::Error;

/// An error of the `kassenbuch-api` crate.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The first field of a line does not name a known command.
    #[error(display = "unknown command `{}`", 0)]
    UnknownCommand(String),

    /// A command was sent with the wrong number of fields.
    #[error(
        display = "command `{}` expects {} field(s), got {}",
        command,
        expected,
        actual
    )]
    WrongFieldCount {
        /// The command selector.
        command: String,
        /// The number of fields the command takes (without the selector).
        expected: usize,
        /// The number of fields that were sent.
        actual: usize,
    },

    /// An account identifier was empty.
    #[error(display = "account identifiers must not be empty")]
    EmptyAccount,

    /// A line exceeded the maximum line length.
    #[error(display = "line exceeds {} bytes", 0)]
    LineTooLong(usize),

    /// A line was not valid UTF-8.
    #[error(display = "line is not valid UTF-8")]
    InvalidUtf8,

    /// The amount is not a positive decimal number.
    #[error(display = "invalid amount `{}`: must be a positive decimal", 0)]
    InvalidAmount(String),

    /// A server message could not be decoded.
    #[error(display = "malformed server message: {}", 0)]
    MalformedMessage(String),

    /// An IO error.
    #[error(display = "{}", 0)]
    Io(#[error(from)] std::io::Error),
}

/// The category of an [`Error`](enum.Error.html).
///
/// Only `Connection` errors end a session.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown command, wrong field count or unreadable line.
    Protocol,
    /// A well-formed request that was rejected before touching the ledger.
    Validation,
    /// The connection itself failed.
    Connection,
}

impl Error {
    /// The category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownCommand(_)
            | Self::WrongFieldCount { .. }
            | Self::EmptyAccount
            | Self::LineTooLong(_)
            | Self::InvalidUtf8
            | Self::MalformedMessage(_) => ErrorKind::Protocol,
            Self::InvalidAmount(_) => ErrorKind::Validation,
            Self::Io(_) => ErrorKind::Connection,
        }
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedMessage(message.into())
    }
}

impl ErrorKind {
    /// The name of the kind in the wire format.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Protocol => "protocol",
            Self::Validation => "validation",
            Self::Connection => "connection",
        }
    }

    /// Parse the wire name of a kind.
    #[must_use]
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "protocol" => Some(Self::Protocol),
            "validation" => Some(Self::Validation),
            "connection" => Some(Self::Connection),
            _ => None,
        }
    }
}
