//! # Instructions, signatures, and transaction records
//!
//! A [`SignedTransaction`] carries the instruction, the signer identity and
//! a deterministic signature over `(signer, nonce, instruction)`. The nonce
//! is the caller's idempotency token: resubmitting the same signed payload
//! produces the same signature, which the bank rejects with the structured
//! `AlreadyProcessed` signal instead of applying the operation twice.
//!
//! Confirmed transactions are kept as [`TransactionRecord`]s with their
//! program logs, so a past release can be recovered by scanning the history
//! of the milestone's derived address.

use std::fmt;
use std::str::FromStr;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::address::Pubkey;

/// Log line emitted by every `ReleaseFunds` transaction. The recovery scan
/// matches on this marker.
pub const LOG_RELEASE_FUNDS: &str = "Instruction: ReleaseFunds";
/// Log line emitted by every `InitializeProject` transaction.
pub const LOG_INITIALIZE_PROJECT: &str = "Instruction: InitializeProject";

/// The four ledger operations. There are no others: every mutation of
/// ledger state goes through one of these.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum Instruction {
    InitializePlatform,
    InitializeProject {
        project_id: String,
        title: String,
        ministry: String,
        total_budget: u64,
    },
    AddMilestone {
        project_id: String,
        index: u8,
        description: String,
        amount: u64,
    },
    ReleaseFunds {
        project_id: String,
        index: u8,
        proof_url: String,
    },
}

/// A 32-byte transaction signature, displayed as hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct Signature([u8; 32]);

impl Signature {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl FromStr for Signature {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Signature(arr))
    }
}

/// An instruction bound to a signer and an idempotency nonce.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTransaction {
    pub instruction: Instruction,
    pub signer: Pubkey,
    pub nonce: u64,
    pub signature: Signature,
}

/// Produce a signed transaction for `signer`.
///
/// Key custody is out of scope here: the signature is a deterministic
/// digest standing in for the external wallet's output. Identical
/// `(instruction, signer, nonce)` triples always sign to the same value.
pub fn sign_transaction(instruction: Instruction, signer: Pubkey, nonce: u64) -> SignedTransaction {
    let mut hasher = Sha256::new();
    hasher.update(b"openbudget:tx");
    hasher.update(signer.as_bytes());
    hasher.update(nonce.to_le_bytes());
    let encoded = borsh::to_vec(&instruction).expect("instruction encoding is infallible");
    hasher.update(&encoded);
    let signature = Signature(hasher.finalize().into());
    SignedTransaction {
        instruction,
        signer,
        nonce,
        signature,
    }
}

/// A confirmed transaction as kept in ledger history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TransactionRecord {
    pub signature: Signature,
    /// Monotonic slot at which the transaction was confirmed.
    pub slot: u64,
    /// Unix timestamp of confirmation.
    pub block_time: i64,
    /// Every account the transaction read or wrote, signer included.
    pub accounts: Vec<Pubkey>,
    /// Program log lines, in emission order.
    pub logs: Vec<String>,
}

impl TransactionRecord {
    /// Whether this transaction executed the named instruction, judged by
    /// its program log marker.
    pub fn has_log_marker(&self, marker: &str) -> bool {
        self.logs.iter().any(|line| line.contains(marker))
    }
}

/// Returned by the bank once a transaction is durably confirmed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TxReceipt {
    pub signature: Signature,
    pub slot: u64,
}
