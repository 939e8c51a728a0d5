use crate::core::{BalanceBook, Transaction};
use crate::error::{BlockchainError, Result};
use log::{debug, info};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Unconfirmed transactions, unique by hash, kept in fee order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingPool {
    inner: Vec<Transaction>,
}

/// Pool order: higher fee first, then higher value first.
///
/// Written out branch by branch to mirror the admission rule: `a` goes first
/// when its fee is greater; on equal fees `a` goes first when its value is
/// greater; otherwise `b` goes first. The "equal fee, smaller value" branch is
/// resolved as `b` first so the comparator stays a total order.
pub fn fee_priority(a: &Transaction, b: &Transaction) -> Ordering {
    if a.get_fee() > b.get_fee() {
        Ordering::Less
    } else if a.get_fee() == b.get_fee() {
        if a.get_value() > b.get_value() {
            Ordering::Less
        } else if a.get_value() < b.get_value() {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    } else {
        Ordering::Greater
    }
}

impl PendingPool {
    pub fn new() -> PendingPool {
        PendingPool { inner: Vec::new() }
    }

    /// Structural admission; never mutates on rejection
    pub fn admit(&mut self, tx: Transaction) -> Result<()> {
        tx.validate_format()?;
        if tx.is_mint() {
            return Err(BlockchainError::InvalidTransaction(format!(
                "Mint transaction {} cannot be submitted",
                tx.get_hash()
            )));
        }
        if self.contains(tx.get_hash()) {
            return Err(BlockchainError::DuplicateTransaction(
                tx.get_hash().to_string(),
            ));
        }
        debug!("Admitted pending transaction {}", tx.get_hash());
        self.inner.push(tx);
        self.reorder_by_fee();
        Ok(())
    }

    /// Stable, so exact fee+value ties keep arrival order
    pub fn reorder_by_fee(&mut self) {
        self.inner.sort_by(fee_priority);
    }

    /// Drop every transaction whose hash appears in `confirmed`
    pub fn prune_confirmed(&mut self, confirmed: &[Transaction]) -> usize {
        let hashes: HashSet<&str> = confirmed.iter().map(|tx| tx.get_hash()).collect();
        let before = self.inner.len();
        self.inner.retain(|tx| !hashes.contains(tx.get_hash()));
        before - self.inner.len()
    }

    /// Drop transactions the sender cannot cover from its safe balance.
    ///
    /// Walks the pool in fee order and charges each kept transaction against
    /// a running balance per sender, so two pending spends of the same funds
    /// cannot both survive.
    pub fn prune_insufficient_funds(&mut self, balances: &BalanceBook) -> usize {
        let mut remaining = HashMap::new();
        let before = self.inner.len();
        self.inner.retain(|tx| {
            let available = remaining
                .entry(tx.get_from().to_string())
                .or_insert_with(|| balances.safe_balance(tx.get_from()));
            let debit = tx.total_debit();
            if *available >= debit {
                *available = &*available - &debit;
                true
            } else {
                info!(
                    "Dropping pending transaction {}: sender {} cannot cover {debit}",
                    tx.get_hash(),
                    tx.get_from()
                );
                false
            }
        });
        before - self.inner.len()
    }

    pub fn get(&self, hash: &str) -> Option<&Transaction> {
        self.inner.iter().find(|tx| tx.get_hash() == hash)
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.get(hash).is_some()
    }

    /// The first `limit` transactions in pool order
    pub fn top(&self, limit: usize) -> Vec<Transaction> {
        self.inner.iter().take(limit).cloned().collect()
    }

    pub fn get_all(&self) -> &[Transaction] {
        self.inner.as_slice()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
