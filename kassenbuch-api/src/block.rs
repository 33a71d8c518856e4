//! The hash-chained ledger record.

use crate::{Amount, BlockNumber};
use sha2::{Digest, Sha256};
use std::fmt;

/// A `Block` records one transfer of `amount` from one account to another.
///
/// Blocks are immutable: the hash is computed once in [`Block::new`](#method.new)
/// and every field is read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    index: BlockNumber,
    from: String,
    to: String,
    amount: Amount,
    timestamp: i64,
    previous_hash: BlockHash,
    hash: BlockHash,
}

impl Block {
    /// Create a new block and compute its hash.
    #[must_use]
    pub fn new(
        index: BlockNumber,
        from: String,
        to: String,
        amount: Amount,
        timestamp: i64,
        previous_hash: BlockHash,
    ) -> Self {
        let hash = compute_hash(index, &from, &to, &amount, timestamp, &previous_hash);
        Self {
            index,
            from,
            to,
            amount,
            timestamp,
            previous_hash,
            hash,
        }
    }

    /// Create the genesis block: block `0`, from `account` to `account`, chained to `"0"`.
    #[must_use]
    pub fn genesis(account: &str, timestamp: i64) -> Self {
        Self::new(
            BlockNumber::GENESIS,
            account.to_string(),
            account.to_string(),
            Amount::zero(),
            timestamp,
            BlockHash::genesis_parent(),
        )
    }

    /// Rebuild a block received over the wire, keeping the hash that was sent.
    pub(crate) fn from_parts(
        index: BlockNumber,
        from: String,
        to: String,
        amount: Amount,
        timestamp: i64,
        previous_hash: BlockHash,
        hash: BlockHash,
    ) -> Self {
        Self {
            index,
            from,
            to,
            amount,
            timestamp,
            previous_hash,
            hash,
        }
    }

    /// The position of this block in the ledger.
    #[must_use]
    pub const fn index(&self) -> BlockNumber {
        self.index
    }

    /// The sending account.
    #[must_use]
    pub fn from(&self) -> &str {
        &self.from
    }

    /// The receiving account.
    #[must_use]
    pub fn to(&self) -> &str {
        &self.to
    }

    /// The transferred amount.
    #[must_use]
    pub const fn amount(&self) -> &Amount {
        &self.amount
    }

    /// Creation time in unix seconds.
    #[must_use]
    pub const fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// The hash of the preceding block (`"0"` for genesis).
    #[must_use]
    pub const fn previous_hash(&self) -> &BlockHash {
        &self.previous_hash
    }

    /// The hash of this block.
    #[must_use]
    pub const fn hash(&self) -> &BlockHash {
        &self.hash
    }

    /// Check that the stored hash matches the block's fields.
    #[must_use]
    pub fn verify(&self) -> bool {
        compute_hash(
            self.index,
            &self.from,
            &self.to,
            &self.amount,
            self.timestamp,
            &self.previous_hash,
        ) == self.hash
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Block #{} [{} -> {}, amount {}, hash {}]",
            self.index,
            self.from,
            self.to,
            self.amount,
            self.hash.short()
        )
    }
}

/// Calculate the hash of a block's fields.
///
/// The hash is the lowercase hex SHA-256 digest of
/// `index ‖ from ‖ to ‖ amount ‖ timestamp ‖ previous_hash`.
///
/// ```
/// use kassenbuch_api::{block::compute_hash, Amount, BlockHash, BlockNumber};
///
/// let hash = compute_hash(
///     BlockNumber::GENESIS,
///     "Genesis",
///     "Genesis",
///     &Amount::zero(),
///     0,
///     &BlockHash::genesis_parent(),
/// );
/// assert_eq!(hash.as_str().len(), 64);
/// ```
#[must_use]
pub fn compute_hash(
    index: BlockNumber,
    from: &str,
    to: &str,
    amount: &Amount,
    timestamp: i64,
    previous_hash: &BlockHash,
) -> BlockHash {
    let mut hasher = Sha256::new();
    hasher.update(index.to_string());
    hasher.update(from);
    hasher.update(to);
    hasher.update(amount.as_str());
    hasher.update(timestamp.to_string());
    hasher.update(previous_hash.as_str());
    BlockHash(hex::encode(hasher.finalize()))
}

/// A hex encoded block hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[allow(clippy::module_name_repetitions)]
pub struct BlockHash(String);

impl BlockHash {
    const SHORT_LEN: usize = 10;

    /// The `previous_hash` of the genesis block.
    #[must_use]
    pub fn genesis_parent() -> Self {
        Self("0".to_string())
    }

    /// The hash as hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first characters of the hash, for log output.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..Self::SHORT_LEN).unwrap_or(&self.0)
    }

    /// Parse a hash received over the wire.
    pub(crate) fn from_wire(s: &str) -> Option<Self> {
        if s == "0" || (s.len() == 64 && s.bytes().all(|b| b.is_ascii_hexdigit())) {
            Some(Self(s.to_ascii_lowercase()))
        } else {
            None
        }
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}
