//! Cache row types as stored in / read from the database.

use serde::Serialize;

/// A project row. `status` is `draft` until the Publish Orchestrator has a
/// confirmed ledger counterpart, after which `ledger_id`, `ledger_address`
/// and `creation_tx` are populated and the row is `published`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProjectRow {
    pub id: String,
    pub title: String,
    pub ministry: String,
    pub status: String,
    pub ledger_id: Option<String>,
    pub ledger_address: Option<String>,
    pub creation_tx: Option<String>,
    /// Hex identity of the signer that published the project.
    pub authority: Option<String>,
    pub total_budget: i64,
    pub total_allocated: i64,
    pub total_released: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ProjectRow {
    pub fn is_published(&self) -> bool {
        self.status == "published"
    }
}

/// A milestone row mirroring the ledger milestone plus the release
/// transaction signature.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MilestoneRow {
    pub id: String,
    pub project_id: String,
    pub milestone_index: i64,
    pub description: String,
    pub amount: i64,
    pub is_released: bool,
    pub release_tx: Option<String>,
    pub proof_url: Option<String>,
    pub released_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}
