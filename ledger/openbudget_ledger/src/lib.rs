//! # OpenBudget Ledger Program
//!
//! Authoritative state machine for government budget allocations and fund
//! releases. The ledger holds three account kinds and exactly four
//! operations:
//!
//! | Phase        | Instruction                              |
//! |--------------|------------------------------------------|
//! | Bootstrap    | [`Instruction::InitializePlatform`]      |
//! | Registration | [`Instruction::InitializeProject`]       |
//! | Allocation   | [`Instruction::AddMilestone`]            |
//! | Release      | [`Instruction::ReleaseFunds`]            |
//!
//! ## Architecture
//!
//! Accounts are addressed by [`address::derive_address`] — a pure function
//! of `(program id, seeds)` — so any party can locate an account without a
//! directory lookup. Account bytes are written and read through the
//! versioned codec in [`codec`]; no caller ever hand-parses offsets.
//! [`bank::Bank`] executes signed transactions atomically: every operation
//! validates fully before any write, and records per-address transaction
//! history with program logs so a confirmed release can be recovered later
//! by scanning logs.
//!
//! This crate contains **only** ledger semantics. Mirroring ledger facts
//! into the relational cache, retries, and reconciliation live in the
//! backend orchestrator.

pub mod address;
pub mod bank;
pub mod codec;
pub mod tx;
pub mod types;

#[cfg(test)]
mod invariants;
#[cfg(test)]
mod test_program;

pub use address::Pubkey;
pub use bank::Bank;
pub use codec::{AccountData, CodecError};
pub use tx::{Instruction, SignedTransaction, Signature, TransactionRecord, TxReceipt};
pub use types::{Milestone, PlatformState, Project};

use thiserror::Error;

/// Every way a ledger transaction can be rejected.
///
/// Rejections are structured, never string-matched: the backend relies on
/// [`LedgerError::AlreadyProcessed`] and
/// [`LedgerError::MilestoneAlreadyReleased`] as protocol signals, not as
/// plain failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("platform already initialized")]
    AlreadyInitialized,

    #[error("project id exceeds {} bytes", types::MAX_PROJECT_ID_LEN)]
    ProjectIdTooLong,

    #[error("title must be 1..={} bytes", types::MAX_TITLE_LEN)]
    InvalidTitle,

    #[error("ministry exceeds {} bytes", types::MAX_MINISTRY_LEN)]
    InvalidMinistry,

    #[error("description must be 1..={} bytes", types::MAX_DESCRIPTION_LEN)]
    InvalidDescription,

    #[error("proof url exceeds {} bytes", types::MAX_PROOF_URL_LEN)]
    InvalidProofUrl,

    #[error("budget/amount must be greater than zero")]
    InvalidBudget,

    #[error("allocation would exceed total budget")]
    InsufficientBudget,

    #[error("signer is not the project authority")]
    UnauthorizedAccess,

    #[error("milestone already released")]
    MilestoneAlreadyReleased,

    #[error("milestone count limit reached")]
    MilestoneLimitReached,

    #[error("account already in use: {0}")]
    AccountInUse(Pubkey),

    #[error("account not found: {0}")]
    AccountNotFound(Pubkey),

    #[error("transaction already processed: {0}")]
    AlreadyProcessed(Signature),

    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    #[error(transparent)]
    Codec(#[from] CodecError),
}
