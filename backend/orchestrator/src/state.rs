//! Shared state handed to the orchestrators and the API layer.

use std::sync::Arc;

use sqlx::SqlitePool;

use openbudget_ledger::Pubkey;

use crate::ledger::LedgerClient;
use crate::release::ReleaseLocks;
use crate::retry::RetryPolicy;

pub struct CoreState {
    pub pool: SqlitePool,
    pub ledger: Arc<dyn LedgerClient>,
    /// Identity of the deployed ledger program; all derived addresses hang
    /// off this key.
    pub program_id: Pubkey,
    /// The releasing authority this process signs for.
    pub authority: Pubkey,
    /// Cache-write retry schedule shared by dual-write paths.
    pub retry: RetryPolicy,
    /// Process-local in-flight guard for release attempts.
    pub release_locks: ReleaseLocks,
}
