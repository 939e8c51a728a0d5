// This file is the transaction model: a transfer of `value` from one address
// to another, paying `fee` to whoever mines it. Amounts are exact decimals.
// Signatures are checked for shape only, nothing here verifies ECDSA.

use crate::core::Amount;
use crate::error::{BlockchainError, Result};
use crate::utils::{hex_bytes, is_hex_of_len, sha256_hex};
use serde::{Deserialize, Serialize};

pub const ADDRESS_LEN: usize = 40;
pub const PUBLIC_KEY_LEN: usize = 65;
pub const SIGNATURE_PART_LEN: usize = 64;
pub const TRANSACTION_HASH_PREFIX: &str = "0x";

/// Source address of genesis and coinbase transactions
pub const ZERO_ADDRESS: &str = "0000000000000000000000000000000000000000";
const ZERO_PUBLIC_KEY: &str = "00000000000000000000000000000000000000000000000000000000000000000";
const ZERO_SIGNATURE_PART: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    from: String,
    to: String,
    value: Amount,
    fee: Amount,
    #[serde(with = "hex_bytes")]
    data: Vec<u8>,
    sender_pub_key: String,
    sender_signature: [String; 2],
    transaction_data_hash: String,
    date_created: i64,
}

// Hash preimage: every economic field plus the timestamp, in a fixed order.
// The signature is left out because it is produced over this hash.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TransactionHashInput<'a> {
    from: &'a str,
    to: &'a str,
    value: &'a Amount,
    fee: &'a Amount,
    date_created: i64,
    #[serde(with = "hex_bytes")]
    data: &'a [u8],
    sender_pub_key: &'a str,
}

impl Transaction {
    /// Build a transaction and stamp its content hash
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        from: &str,
        to: &str,
        value: Amount,
        fee: Amount,
        data: Vec<u8>,
        sender_pub_key: &str,
        sender_signature: [String; 2],
        date_created: i64,
    ) -> Transaction {
        let mut tx = Transaction {
            from: from.to_string(),
            to: to.to_string(),
            value,
            fee,
            data,
            sender_pub_key: sender_pub_key.to_string(),
            sender_signature,
            transaction_data_hash: String::new(),
            date_created,
        };
        tx.transaction_data_hash = tx.compute_hash();
        tx
    }

    /// A transfer out of the zero address: genesis faucet credit or coinbase
    pub fn new_mint(to: &str, value: Amount, date_created: i64) -> Transaction {
        Transaction::new(
            ZERO_ADDRESS,
            to,
            value,
            Amount::zero(),
            vec![],
            ZERO_PUBLIC_KEY,
            [
                ZERO_SIGNATURE_PART.to_string(),
                ZERO_SIGNATURE_PART.to_string(),
            ],
            date_created,
        )
    }

    /// Block reward paid to the miner; the height in `data` keeps coinbase
    /// hashes distinct between blocks mined within the same millisecond
    pub fn new_coinbase(to: &str, value: Amount, block_index: u64, date_created: i64) -> Transaction {
        Transaction::new(
            ZERO_ADDRESS,
            to,
            value,
            Amount::zero(),
            block_index.to_be_bytes().to_vec(),
            ZERO_PUBLIC_KEY,
            [
                ZERO_SIGNATURE_PART.to_string(),
                ZERO_SIGNATURE_PART.to_string(),
            ],
            date_created,
        )
    }

    /// `0x` + SHA-256 over the canonical JSON of the hashed fields
    pub fn compute_hash(&self) -> String {
        let input = TransactionHashInput {
            from: &self.from,
            to: &self.to,
            value: &self.value,
            fee: &self.fee,
            date_created: self.date_created,
            data: &self.data,
            sender_pub_key: &self.sender_pub_key,
        };
        // Serializing a struct of strings and integers cannot fail
        let json = serde_json::to_vec(&input).unwrap_or_default();
        format!("{TRANSACTION_HASH_PREFIX}{}", sha256_hex(&json))
    }

    /// Structural checks only; balances are the pool's and chain's concern
    pub fn validate_format(&self) -> Result<()> {
        if !is_valid_address(&self.from) {
            return Err(BlockchainError::InvalidAddress(format!(
                "Invalid sender address: {}",
                self.from
            )));
        }
        if !is_valid_address(&self.to) {
            return Err(BlockchainError::InvalidAddress(format!(
                "Invalid recipient address: {}",
                self.to
            )));
        }
        if !is_valid_public_key(&self.sender_pub_key) {
            return Err(BlockchainError::InvalidPublicKey(self.sender_pub_key.clone()));
        }
        if !is_valid_signature(&self.sender_signature) {
            return Err(BlockchainError::InvalidSignature(format!(
                "[{}, {}]",
                self.sender_signature[0], self.sender_signature[1]
            )));
        }
        if self.value.is_negative() || self.fee.is_negative() {
            return Err(BlockchainError::InvalidAmount(format!(
                "value {} and fee {} must not be negative",
                self.value, self.fee
            )));
        }
        if !is_valid_transaction_hash(&self.transaction_data_hash) {
            return Err(BlockchainError::InvalidHash(
                self.transaction_data_hash.clone(),
            ));
        }
        let expected = self.compute_hash();
        if expected != self.transaction_data_hash {
            return Err(BlockchainError::InvalidTransaction(format!(
                "Hash mismatch: stored {}, computed {expected}",
                self.transaction_data_hash
            )));
        }
        Ok(())
    }

    pub fn is_mint(&self) -> bool {
        self.from == ZERO_ADDRESS
    }

    /// What the sender must hold for this transaction to confirm
    pub fn total_debit(&self) -> Amount {
        &self.value + &self.fee
    }

    pub fn get_from(&self) -> &str {
        self.from.as_str()
    }

    pub fn get_to(&self) -> &str {
        self.to.as_str()
    }

    pub fn get_value(&self) -> &Amount {
        &self.value
    }

    pub fn get_fee(&self) -> &Amount {
        &self.fee
    }

    pub fn get_data(&self) -> &[u8] {
        self.data.as_slice()
    }

    pub fn get_sender_pub_key(&self) -> &str {
        self.sender_pub_key.as_str()
    }

    pub fn get_sender_signature(&self) -> &[String; 2] {
        &self.sender_signature
    }

    pub fn get_hash(&self) -> &str {
        self.transaction_data_hash.as_str()
    }

    pub fn get_date_created(&self) -> i64 {
        self.date_created
    }
}

pub fn is_valid_address(address: &str) -> bool {
    is_hex_of_len(address, ADDRESS_LEN)
}

pub fn is_valid_public_key(key: &str) -> bool {
    key.len() == PUBLIC_KEY_LEN
        && key.is_ascii()
        && is_hex_of_len(&key[..PUBLIC_KEY_LEN - 1], PUBLIC_KEY_LEN - 1)
        && matches!(key.as_bytes()[PUBLIC_KEY_LEN - 1], b'0' | b'1')
}

pub fn is_valid_signature(signature: &[String; 2]) -> bool {
    signature
        .iter()
        .all(|part| is_hex_of_len(part, SIGNATURE_PART_LEN))
}

pub fn is_valid_transaction_hash(hash: &str) -> bool {
    match hash.strip_prefix(TRANSACTION_HASH_PREFIX) {
        Some(digest) => is_hex_of_len(digest, 64),
        None => false,
    }
}
