//! The append-only, hash-chained ledger.

use crate::config::{LedgerConfig, ReservedAccounts};
use chrono::Utc;
use im::Vector;
use kassenbuch_api::{Amount, Block, Error};
use std::sync::Mutex;

/// The ledger owns the chain of `Block`s.
///
/// All mutations and snapshots go through one lock, so blocks are totally ordered,
/// indices are contiguous and every snapshot ends at a block boundary.
///
/// ```
/// use kassenbuch::{config::LedgerConfig, Ledger};
///
/// let ledger = Ledger::new(LedgerConfig::default());
/// let block = ledger.append("alice", "bob", "30", |_| {}).unwrap();
/// assert_eq!(u64::from(block.index()), 1);
/// assert!(ledger.append("alice", "bob", "-1", |_| {}).is_err());
/// assert_eq!(ledger.len(), 2);
/// ```
#[derive(Debug)]
pub struct Ledger {
    chain: Mutex<Vector<Block>>,
    config: LedgerConfig,
    reserved: ReservedAccounts,
}

impl Ledger {
    /// Create a new ledger containing only the genesis block.
    #[must_use]
    pub fn new(config: LedgerConfig) -> Self {
        let genesis = Block::genesis(&config.genesis_account, Utc::now().timestamp());
        log::info!("Created genesis block: {}", genesis);

        let mut chain = Vector::new();
        chain.push_back(genesis);
        Self {
            chain: Mutex::new(chain),
            reserved: config.reserved_accounts(),
            config,
        }
    }

    /// The identifiers the audit never debits.
    #[must_use]
    pub const fn reserved_accounts(&self) -> &ReservedAccounts {
        &self.reserved
    }

    /// Append a transfer of `amount` from `from` to `to`.
    ///
    /// Any account may send, reserved ones included; the audit just never debits those.
    /// The amount is validated before the lock is taken; on error the ledger is unchanged.
    /// `on_commit` runs with the new block while the lock is still held. It must not block.
    pub fn append<F>(&self, from: &str, to: &str, amount: &str, on_commit: F) -> Result<Block, Error>
    where
        F: FnOnce(&Block),
    {
        let amount: Amount = amount.parse()?;
        let block = self.push(from, to, amount, on_commit);
        log::info!("Appended {}", block);
        Ok(block)
    }

    /// Mine a reward block. Mining is instantaneous and always succeeds.
    ///
    /// `on_commit` runs with the new block while the lock is still held. It must not block.
    pub fn mine<F>(&self, on_commit: F) -> Block
    where
        F: FnOnce(&Block),
    {
        let block = self.push(
            &self.config.reward_source,
            &self.config.reward_account,
            self.config.reward_amount.clone(),
            on_commit,
        );
        log::info!("Mined {}", block);
        block
    }

    fn push<F>(&self, from: &str, to: &str, amount: Amount, on_commit: F) -> Block
    where
        F: FnOnce(&Block),
    {
        let mut chain = self.chain.lock().unwrap();
        let block = {
            // The genesis block is inserted on creation, so there always is a tail.
            let tail = chain.back().expect("ledger without genesis block");
            Block::new(
                tail.index().next(),
                from.to_string(),
                to.to_string(),
                amount,
                Utc::now().timestamp(),
                tail.hash().clone(),
            )
        };
        chain.push_back(block.clone());
        on_commit(&block);
        block
    }

    /// A point-in-time copy of the whole chain.
    #[must_use]
    pub fn snapshot(&self) -> Vector<Block> {
        self.chain.lock().unwrap().clone()
    }

    /// Run `f` with a snapshot while holding the lock, so no block is appended until `f` returns.
    pub fn snapshot_with<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&Vector<Block>) -> T,
    {
        let chain = self.chain.lock().unwrap();
        f(&chain)
    }

    /// The number of blocks, including the genesis block.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chain.lock().unwrap().len()
    }

    /// A ledger always contains the genesis block.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// The most recent block.
    #[must_use]
    pub fn tail(&self) -> Block {
        let chain = self.chain.lock().unwrap();
        chain.back().cloned().expect("ledger without genesis block")
    }
}

/// Check that `blocks` form an unbroken chain starting at a genesis block.
///
/// Returns the index of the first offending block.
pub fn verify_chain<'a>(blocks: impl IntoIterator<Item = &'a Block>) -> Result<(), usize> {
    let mut previous: Option<&Block> = None;
    for (position, block) in blocks.into_iter().enumerate() {
        let linked = match previous {
            None => block.previous_hash().as_str() == "0",
            Some(previous) => {
                block.previous_hash() == previous.hash() && block.index() == previous.index().next()
            }
        };
        if !linked || u64::from(block.index()) != position as u64 || !block.verify() {
            return Err(position);
        }
        previous = Some(block);
    }
    Ok(())
}
