//! The result of a double-spend audit.

use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};

/// Net balance of every account seen in the ledger and the accounts flagged as double spenders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    /// Net balance per account.
    pub balances: BTreeMap<String, Decimal>,
    /// Accounts with a negative balance.
    pub double_spenders: BTreeSet<String>,
}

impl AuditReport {
    /// Whether any account was flagged.
    #[must_use]
    pub fn has_double_spend(&self) -> bool {
        !self.double_spenders.is_empty()
    }

    /// The balance of `account`, if it ever sent or received funds.
    #[must_use]
    pub fn balance(&self, account: &str) -> Option<Decimal> {
        self.balances.get(account).copied()
    }
}
