//! Application-wide error types.

use openbudget_ledger::{LedgerError, Signature};
use thiserror::Error;

/// Errors returned by the ledger client boundary.
///
/// Program-level rejections stay structured ([`LedgerError`]) so callers can
/// branch on protocol signals like `AlreadyProcessed` without string
/// matching; transport and confirmation failures get their own variants.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Program(#[from] LedgerError),

    #[error("confirmation timed out for transaction {0}")]
    ConfirmationTimeout(Signature),

    #[error("ledger transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Ledger(#[from] ClientError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("a release for this milestone is already in flight")]
    ReleaseInFlight,

    /// The ledger transaction is durably confirmed but the cache could not
    /// be brought into agreement after exhausting retries. The signature is
    /// included so an operator can reconcile manually; the ledger fact must
    /// not be lost.
    #[error("critical inconsistency: ledger transaction {signature} confirmed but cache update failed after {attempts} attempts")]
    CriticalInconsistency { signature: Signature, attempts: u32 },

    /// The ledger reports a state the cache cannot be converged to
    /// automatically (no matching transaction found in history).
    #[error("manual intervention required: {0}")]
    ManualInterventionRequired(String),

    /// Cache claims released but the ledger does not. Never auto-corrected:
    /// the ledger is authoritative and write-once per milestone.
    #[error("cache integrity error: {0}")]
    CacheIntegrity(String),
}

impl CoreError {
    /// Convenience accessor for the underlying program rejection, if any.
    pub fn as_program_error(&self) -> Option<&LedgerError> {
        match self {
            CoreError::Ledger(ClientError::Program(e)) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
