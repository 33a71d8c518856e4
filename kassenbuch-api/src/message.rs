//! Messages sent from the server to its clients.
//!
//! Every message is one or more `\n` terminated lines with `:` separated fields.
//! Multi-line messages start with a header line that carries the number of lines to follow.
//!
//! ```text
//! LEDGER:<count>
//! BLOCK:<index>:<from>:<to>:<amount>:<timestamp>:<previous_hash>:<hash>   (count times)
//! NEW_BLOCK:<index>:<from>:<to>:<amount>:<timestamp>:<previous_hash>:<hash>
//! MINED_BLOCK:<index>:<from>:<to>:<amount>:<timestamp>:<previous_hash>:<hash>
//! AUDIT:<accounts>:<flagged>
//! BALANCE:<account>:<balance>                                             (accounts times)
//! DOUBLE_SPEND:<account>                                                  (flagged times)
//! ERROR:<kind>:<message>
//! ```

use crate::{Amount, AuditReport, Block, BlockHash, Error, ErrorKind, FIELD_SEPARATOR};
use rust_decimal::Decimal;
use std::{
    fmt::Write as _,
    io::BufRead,
    str::{FromStr, Split},
};

const LEDGER: &str = "LEDGER";
const BLOCK: &str = "BLOCK";
const NEW_BLOCK: &str = "NEW_BLOCK";
const MINED_BLOCK: &str = "MINED_BLOCK";
const AUDIT: &str = "AUDIT";
const BALANCE: &str = "BALANCE";
const DOUBLE_SPEND: &str = "DOUBLE_SPEND";
const ERROR: &str = "ERROR";

/// A message from the server, either a reply to one client or a broadcast to all of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// The full ledger, oldest block first.
    Ledger(Vec<Block>),
    /// A transfer was appended to the ledger.
    NewBlock(Block),
    /// A reward block was mined.
    MinedBlock(Block),
    /// The result of a double-spend audit.
    Audit(AuditReport),
    /// A request was rejected.
    Error {
        /// The category of the error.
        kind: ErrorKind,
        /// A human readable description.
        message: String,
    },
}

impl ServerMessage {
    /// Create an error reply for `err`.
    #[must_use]
    pub fn error(err: &Error) -> Self {
        Self::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// The block announced by a block notice.
    #[must_use]
    pub const fn block(&self) -> Option<&Block> {
        match self {
            Self::NewBlock(block) | Self::MinedBlock(block) => Some(block),
            _ => None,
        }
    }

    /// Encode the message as newline terminated protocol lines.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = String::new();
        // Writing into a `String` cannot fail.
        let _ = self.write_lines(&mut out);
        out
    }

    fn write_lines(&self, out: &mut String) -> std::fmt::Result {
        match self {
            Self::Ledger(blocks) => {
                writeln!(out, "{}:{}", LEDGER, blocks.len())?;
                for block in blocks {
                    write_block(out, BLOCK, block)?;
                }
            }
            Self::NewBlock(block) => write_block(out, NEW_BLOCK, block)?,
            Self::MinedBlock(block) => write_block(out, MINED_BLOCK, block)?,
            Self::Audit(report) => {
                writeln!(
                    out,
                    "{}:{}:{}",
                    AUDIT,
                    report.balances.len(),
                    report.double_spenders.len()
                )?;
                for (account, balance) in &report.balances {
                    writeln!(out, "{}:{}:{}", BALANCE, account, balance)?;
                }
                for account in &report.double_spenders {
                    writeln!(out, "{}:{}", DOUBLE_SPEND, account)?;
                }
            }
            Self::Error { kind, message } => {
                // The message must stay on one line.
                let message = message.replace(|c: char| c == '\n' || c == '\r', " ");
                writeln!(out, "{}:{}:{}", ERROR, kind.as_str(), message)?;
            }
        }
        Ok(())
    }

    /// Read the next message from `reader`.
    ///
    /// Returns `Ok(None)` if the stream ended before a new message started.
    pub fn read_from<R>(reader: &mut R) -> Result<Option<Self>, Error>
    where
        R: BufRead,
    {
        let header = match read_line(reader)? {
            Some(header) => header,
            None => return Ok(None),
        };

        let (tag, rest) = split_tag(&header);
        let message = match tag {
            LEDGER => {
                let count = parse_count(rest)?;
                let mut blocks = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    let line = expect_line(reader)?;
                    let (tag, rest) = split_tag(&line);
                    expect_tag(tag, BLOCK)?;
                    blocks.push(parse_block(rest)?);
                }
                Self::Ledger(blocks)
            }
            NEW_BLOCK => Self::NewBlock(parse_block(rest)?),
            MINED_BLOCK => Self::MinedBlock(parse_block(rest)?),
            AUDIT => {
                let mut counts = rest.split(FIELD_SEPARATOR);
                let accounts = parse_count(next_field(&mut counts)?)?;
                let flagged = parse_count(next_field(&mut counts)?)?;
                let mut report = AuditReport::default();
                for _ in 0..accounts {
                    let line = expect_line(reader)?;
                    let (tag, rest) = split_tag(&line);
                    expect_tag(tag, BALANCE)?;
                    let (account, balance) = split_tag(rest);
                    let balance = Decimal::from_str(balance)
                        .map_err(|_| Error::malformed(format!("invalid balance `{}`", balance)))?;
                    report.balances.insert(account.to_string(), balance);
                }
                for _ in 0..flagged {
                    let line = expect_line(reader)?;
                    let (tag, account) = split_tag(&line);
                    expect_tag(tag, DOUBLE_SPEND)?;
                    report.double_spenders.insert(account.to_string());
                }
                Self::Audit(report)
            }
            ERROR => {
                let (kind, message) = split_tag(rest);
                let kind = ErrorKind::from_wire(kind)
                    .ok_or_else(|| Error::malformed(format!("unknown error kind `{}`", kind)))?;
                Self::Error {
                    kind,
                    message: message.to_string(),
                }
            }
            other => return Err(Error::malformed(format!("unknown message `{}`", other))),
        };
        Ok(Some(message))
    }
}

fn write_block(out: &mut String, tag: &str, block: &Block) -> std::fmt::Result {
    writeln!(
        out,
        "{}:{}:{}:{}:{}:{}:{}:{}",
        tag,
        block.index(),
        block.from(),
        block.to(),
        block.amount(),
        block.timestamp(),
        block.previous_hash(),
        block.hash()
    )
}

fn parse_block(fields: &str) -> Result<Block, Error> {
    let mut fields = fields.split(FIELD_SEPARATOR);
    let index = next_field(&mut fields)?;
    let index = index
        .parse()
        .map_err(|_| Error::malformed(format!("invalid block index `{}`", index)))?;
    let from = next_field(&mut fields)?.to_string();
    let to = next_field(&mut fields)?.to_string();
    let amount = next_field(&mut fields)?;
    let amount = if amount == "0" {
        Amount::zero()
    } else {
        amount.parse::<Amount>()?
    };
    let timestamp = next_field(&mut fields)?;
    let timestamp = timestamp
        .parse()
        .map_err(|_| Error::malformed(format!("invalid timestamp `{}`", timestamp)))?;
    let previous_hash = parse_hash(next_field(&mut fields)?)?;
    let hash = parse_hash(next_field(&mut fields)?)?;
    if fields.next().is_some() {
        return Err(Error::malformed("too many block fields"));
    }
    Ok(Block::from_parts(
        index,
        from,
        to,
        amount,
        timestamp,
        previous_hash,
        hash,
    ))
}

fn parse_hash(field: &str) -> Result<BlockHash, Error> {
    BlockHash::from_wire(field).ok_or_else(|| Error::malformed(format!("invalid hash `{}`", field)))
}

fn parse_count(field: &str) -> Result<usize, Error> {
    field
        .parse()
        .map_err(|_| Error::malformed(format!("invalid count `{}`", field)))
}

fn next_field<'a>(fields: &mut Split<'a, char>) -> Result<&'a str, Error> {
    fields
        .next()
        .ok_or_else(|| Error::malformed("missing field"))
}

fn split_tag(line: &str) -> (&str, &str) {
    let mut parts = line.splitn(2, FIELD_SEPARATOR);
    let tag = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or_default();
    (tag, rest)
}

fn expect_tag(tag: &str, expected: &str) -> Result<(), Error> {
    if tag == expected {
        Ok(())
    } else {
        Err(Error::malformed(format!(
            "expected `{}` line, got `{}`",
            expected, tag
        )))
    }
}

fn read_line<R>(reader: &mut R) -> Result<Option<String>, Error>
where
    R: BufRead,
{
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let len = line.trim_end_matches(|c: char| c == '\n' || c == '\r').len();
    line.truncate(len);
    Ok(Some(line))
}

fn expect_line<R>(reader: &mut R) -> Result<String, Error>
where
    R: BufRead,
{
    read_line(reader)?.ok_or_else(|| Error::malformed("stream ended inside a message"))
}
