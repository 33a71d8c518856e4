//! Balance audit over a ledger snapshot.
//!
//! Every audit recomputes all balances from the genesis block (O(n) in the ledger length).
//! No incremental index is kept, which limits how large a ledger can be audited per request.

use crate::config::ReservedAccounts;
use kassenbuch_api::{AuditReport, Block};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};

/// Fold `blocks` (in index order) into the net balance of every account.
///
/// The sender is debited unless it is a reserved identifier; the receiver is always credited.
pub fn compute_balances<'a>(
    blocks: impl IntoIterator<Item = &'a Block>,
    reserved: &ReservedAccounts,
) -> BTreeMap<String, Decimal> {
    let mut balances = BTreeMap::new();
    for block in blocks {
        let amount = block.amount().value();
        if !reserved.contains(block.from()) {
            apply(&mut balances, block.from(), -amount);
        }
        apply(&mut balances, block.to(), amount);
    }
    balances
}

fn apply(balances: &mut BTreeMap<String, Decimal>, account: &str, delta: Decimal) {
    let balance = balances
        .entry(account.to_string())
        .or_insert(Decimal::ZERO);
    *balance = balance.checked_add(delta).unwrap_or_else(|| {
        log::warn!("Balance of {} overflowed, saturating.", account);
        if delta.is_sign_negative() {
            Decimal::MIN
        } else {
            Decimal::MAX
        }
    });
}

/// All accounts with a negative balance.
#[must_use]
pub fn detect_double_spend(balances: &BTreeMap<String, Decimal>) -> BTreeSet<String> {
    balances
        .iter()
        .filter(|(_, balance)| balance.is_sign_negative() && !balance.is_zero())
        .map(|(account, _)| account.clone())
        .collect()
}

/// Compute balances and flag double spenders in one pass.
pub fn audit<'a>(
    blocks: impl IntoIterator<Item = &'a Block>,
    reserved: &ReservedAccounts,
) -> AuditReport {
    let balances = compute_balances(blocks, reserved);
    let double_spenders = detect_double_spend(&balances);
    if !double_spenders.is_empty() {
        log::debug!("Double spend detected for: {:?}", double_spenders);
    }
    AuditReport {
        balances,
        double_spenders,
    }
}
