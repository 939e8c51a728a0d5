//! Address balances derived from the confirmed chain
//!
//! This is the minimum bookkeeping consensus needs: it answers "can this
//! sender afford `value + fee`" for pool pruning and backs the balance
//! accessor. It is always rebuilt from blocks, never edited by hand.

use crate::core::{Amount, Block, Transaction};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressBalance {
    /// Balance over every confirmed block
    pub confirmed_balance: Amount,
    /// Balance over blocks with enough confirmations to be spent
    pub safe_balance: Amount,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceBook {
    balances: HashMap<String, AddressBalance>,
}

impl BalanceBook {
    /// Replay `chain`; a block at height h has `len - h` confirmations
    pub fn from_chain(chain: &[Block], safe_confirmations: u64) -> BalanceBook {
        let mut book = BalanceBook::default();
        let length = chain.len() as u64;
        for block in chain {
            let confirmations = length - block.get_index();
            let safe = confirmations >= safe_confirmations;
            for tx in block.get_transactions() {
                book.apply(tx, safe);
            }
        }
        book
    }

    fn apply(&mut self, tx: &Transaction, safe: bool) {
        if !tx.is_mint() {
            let debit = tx.total_debit();
            let sender = self.balances.entry(tx.get_from().to_string()).or_default();
            sender.confirmed_balance = &sender.confirmed_balance - &debit;
            if safe {
                sender.safe_balance = &sender.safe_balance - &debit;
            }
        }
        let recipient = self.balances.entry(tx.get_to().to_string()).or_default();
        recipient.confirmed_balance = &recipient.confirmed_balance + tx.get_value();
        if safe {
            recipient.safe_balance = &recipient.safe_balance + tx.get_value();
        }
    }

    /// Unknown addresses hold zero
    pub fn balance(&self, address: &str) -> AddressBalance {
        self.balances.get(address).cloned().unwrap_or_default()
    }

    pub fn safe_balance(&self, address: &str) -> Amount {
        self.balance(address).safe_balance
    }

    /// Every address with a non-zero confirmed balance
    pub fn non_zero(&self) -> Vec<(String, AddressBalance)> {
        let mut entries: Vec<_> = self
            .balances
            .iter()
            .filter(|(_, b)| !b.confirmed_balance.is_zero())
            .map(|(a, b)| (a.clone(), b.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}
