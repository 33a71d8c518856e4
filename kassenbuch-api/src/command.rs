//! Commands sent from a client to the server.

use crate::{Error, FIELD_SEPARATOR};
use std::str::FromStr;

/// A client request, one per line.
///
/// | line | command |
/// |---|---|
/// | `1` | [`ShowLedger`](#variant.ShowLedger) |
/// | `2:<from>:<to>:<amount>` | [`Transfer`](#variant.Transfer) |
/// | `3` | [`Mine`](#variant.Mine) |
/// | `4` | [`Audit`](#variant.Audit) |
/// | `5` | [`Disconnect`](#variant.Disconnect) |
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Request a dump of the whole ledger.
    ShowLedger,
    /// Propose a transfer.
    ///
    /// The amount is kept as text, it is validated by the ledger.
    Transfer {
        /// The sending account.
        from: String,
        /// The receiving account.
        to: String,
        /// The amount as sent by the client.
        amount: String,
    },
    /// Request a mined reward block.
    Mine,
    /// Request a double-spend audit.
    Audit,
    /// End the session.
    Disconnect,
}

impl Command {
    /// Encode the command as a protocol line (without the newline).
    #[must_use]
    pub fn to_line(&self) -> String {
        match self {
            Self::ShowLedger => "1".to_string(),
            Self::Transfer { from, to, amount } => {
                format!("2:{}:{}:{}", from, to, amount)
            }
            Self::Mine => "3".to_string(),
            Self::Audit => "4".to_string(),
            Self::Disconnect => "5".to_string(),
        }
    }
}

impl FromStr for Command {
    type Err = Error;

    /// Parse a protocol line. A trailing `\r` is ignored.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let mut fields = line.split(FIELD_SEPARATOR);
        let selector = fields.next().unwrap_or_default();
        let mut args: Vec<&str> = fields.collect();
        // Trailing empty fields are not fields: `1:` is `1`, `2:a:b:5:` is `2:a:b:5`.
        while args.last() == Some(&"") {
            args.pop();
        }

        let expect_args = |expected: usize| {
            if args.len() == expected {
                Ok(())
            } else {
                Err(Error::WrongFieldCount {
                    command: selector.to_string(),
                    expected,
                    actual: args.len(),
                })
            }
        };

        match selector {
            "1" => expect_args(0).map(|()| Self::ShowLedger),
            "2" => {
                expect_args(3)?;
                let (from, to, amount) = (args[0], args[1], args[2]);
                if from.is_empty() || to.is_empty() {
                    return Err(Error::EmptyAccount);
                }
                Ok(Self::Transfer {
                    from: from.to_string(),
                    to: to.to_string(),
                    amount: amount.to_string(),
                })
            }
            "3" => expect_args(0).map(|()| Self::Mine),
            "4" => expect_args(0).map(|()| Self::Audit),
            "5" => expect_args(0).map(|()| Self::Disconnect),
            other => Err(Error::UnknownCommand(other.to_string())),
        }
    }
}
