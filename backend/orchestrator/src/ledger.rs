//! Ledger client boundary.
//!
//! The orchestrators speak to the ledger through [`LedgerClient`]:
//! submit-transaction, wait-for-confirmation, fetch-account-by-address,
//! fetch-recent-transactions-for-address, fetch-transaction-by-signature.
//! [`InProcessLedger`] wraps the [`Bank`] directly; a remote deployment
//! would implement the same trait over RPC.

use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use openbudget_ledger::{
    Bank, Pubkey, Signature, SignedTransaction, TransactionRecord, TxReceipt,
};

use crate::errors::ClientError;

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submit a signed transaction for execution. Returns once the ledger
    /// has accepted it; program-level rejections come back structured.
    async fn submit_transaction(&self, tx: &SignedTransaction) -> Result<TxReceipt, ClientError>;

    /// Wait until `signature` is durably confirmed.
    async fn wait_for_confirmation(&self, signature: &Signature) -> Result<(), ClientError>;

    /// Raw account bytes at `address`, or `None` if the account does not
    /// exist. Decoding goes through the shared codec.
    async fn get_account(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, ClientError>;

    /// Confirmed transactions touching `address`, newest first.
    async fn recent_transactions(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, ClientError>;

    /// Look up a confirmed transaction by signature.
    async fn get_transaction(
        &self,
        signature: &Signature,
    ) -> Result<Option<TransactionRecord>, ClientError>;
}

/// A ledger client backed by an in-process [`Bank`].
pub struct InProcessLedger {
    bank: Arc<Mutex<Bank>>,
}

impl InProcessLedger {
    pub fn new(bank: Bank) -> Self {
        InProcessLedger {
            bank: Arc::new(Mutex::new(bank)),
        }
    }

    /// Shared handle to the underlying bank (used at startup and in tests).
    pub fn bank(&self) -> Arc<Mutex<Bank>> {
        Arc::clone(&self.bank)
    }
}

#[async_trait]
impl LedgerClient for InProcessLedger {
    async fn submit_transaction(&self, tx: &SignedTransaction) -> Result<TxReceipt, ClientError> {
        let mut bank = self.bank.lock().await;
        Ok(bank.execute(tx)?)
    }

    async fn wait_for_confirmation(&self, signature: &Signature) -> Result<(), ClientError> {
        let bank = self.bank.lock().await;
        if bank.is_confirmed(signature) {
            Ok(())
        } else {
            Err(ClientError::ConfirmationTimeout(*signature))
        }
    }

    async fn get_account(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, ClientError> {
        let bank = self.bank.lock().await;
        Ok(bank.account(address).map(<[u8]>::to_vec))
    }

    async fn recent_transactions(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, ClientError> {
        let bank = self.bank.lock().await;
        Ok(bank.transactions_for(address, limit))
    }

    async fn get_transaction(
        &self,
        signature: &Signature,
    ) -> Result<Option<TransactionRecord>, ClientError> {
        let bank = self.bank.lock().await;
        Ok(bank.transaction(signature).cloned())
    }
}

/// Derive a request-scoped idempotency nonce from stable parts (row ids,
/// natural keys). A retried request signs the identical payload, so the
/// ledger answers `AlreadyProcessed` instead of double-applying it.
pub fn idempotency_nonce(parts: &[&[u8]]) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(b"openbudget:nonce");
    for part in parts {
        hasher.update((part.len() as u32).to_le_bytes());
        hasher.update(part);
    }
    let digest = hasher.finalize();
    u64::from_le_bytes(digest[..8].try_into().expect("digest is 32 bytes"))
}
