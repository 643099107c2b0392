//! Milestone Allocator — adds a milestone on the ledger and in the cache,
//! enforcing the budget invariant redundantly on both sides.
//!
//! The cache check is not cosmetic: two concurrent requests could both read
//! a stale "remaining budget" before either reaches the ledger. The whole
//! read-validate-submit-insert sequence therefore runs inside one immediate
//! (write-locked) transaction, serializing allocation attempts per cache,
//! while the ledger's own check remains the final authoritative guard.
//!
//! Milestone indexes are assigned server-side from the current milestone
//! count — clients never pick indexes, so there are no gaps or races over
//! index choice.

use sqlx::SqliteConnection;
use tracing::info;

use openbudget_ledger::tx::{sign_transaction, Instruction};
use openbudget_ledger::LedgerError;

use crate::db;
use crate::errors::{ClientError, CoreError, Result};
use crate::ledger::idempotency_nonce;
use crate::models::MilestoneRow;
use crate::state::CoreState;

pub async fn add_milestone(
    state: &CoreState,
    project_id: &str,
    description: &str,
    amount: u64,
) -> Result<MilestoneRow> {
    if description.is_empty() || description.len() > 200 {
        return Err(CoreError::Validation(
            "description must be 1..=200 bytes".to_string(),
        ));
    }
    if amount == 0 {
        return Err(CoreError::Validation("amount must be greater than zero".to_string()));
    }
    let amount_i64 = i64::try_from(amount)
        .map_err(|_| CoreError::Validation("amount exceeds supported range".to_string()))?;

    let mut conn = db::begin_immediate(&state.pool).await?;
    let result = allocate_locked(state, &mut conn, project_id, description, amount_i64).await;
    match result {
        Ok(row) => {
            db::commit(&mut conn).await?;
            info!(
                "milestone {} allocated for project {project_id} (amount {amount})",
                row.milestone_index
            );
            Ok(row)
        }
        Err(e) => {
            let _ = db::rollback(&mut conn).await;
            Err(e)
        }
    }
}

/// Runs with the write lock held: validate against the cache, submit to the
/// ledger, and only insert the cache rows once the ledger has confirmed.
async fn allocate_locked(
    state: &CoreState,
    conn: &mut SqliteConnection,
    project_id: &str,
    description: &str,
    amount: i64,
) -> Result<MilestoneRow> {
    let project = db::get_project_locked(conn, project_id)
        .await?
        .ok_or_else(|| CoreError::NotFound("project".to_string()))?;

    let ledger_id = project.ledger_id.clone().filter(|_| project.is_published()).ok_or_else(
        || CoreError::Validation("project must be published before adding milestones".to_string()),
    )?;

    // Cache-side budget guard, mirroring the ledger's checked arithmetic:
    // an overflowing total is as over-budget as a plain excess.
    let within_budget = project
        .total_allocated
        .checked_add(amount)
        .is_some_and(|total| total <= project.total_budget);
    if !within_budget {
        return Err(CoreError::Validation(format!(
            "insufficient budget: allocated {} + {} > budget {}",
            project.total_allocated, amount, project.total_budget
        )));
    }

    let index = db::count_milestones(conn, project_id).await?;
    if index > u8::MAX as i64 {
        return Err(CoreError::Validation("milestone limit reached".to_string()));
    }
    if db::milestone_index_exists(conn, project_id, index).await? {
        return Err(CoreError::Validation(format!(
            "milestone index {index} already exists"
        )));
    }

    let instruction = Instruction::AddMilestone {
        project_id: ledger_id,
        index: index as u8,
        description: description.to_string(),
        amount: amount as u64,
    };
    let nonce = idempotency_nonce(&[
        b"allocate",
        project.id.as_bytes(),
        &index.to_le_bytes(),
    ]);
    let tx = sign_transaction(instruction, state.authority, nonce);

    match state.ledger.submit_transaction(&tx).await {
        Ok(receipt) => {
            state.ledger.wait_for_confirmation(&receipt.signature).await?;
        }
        // An earlier identical submission was confirmed but its cache
        // insert never landed. Converge the cache instead of failing.
        Err(ClientError::Program(LedgerError::AlreadyProcessed(sig))) => {
            info!("allocation for {project_id} index {index} already processed as {sig}");
        }
        Err(e) => return Err(e.into()),
    }

    db::insert_milestone(conn, project_id, index, description, amount).await
}
