//! Reconciliation Scanner — compares one milestone's cache flag against its
//! ledger flag, and repairs the cache by replaying ledger history.
//!
//! The ledger is truth and the cache follows, in that direction only:
//! `sync` will write a missed release into the cache, but a cache row that
//! claims released while the ledger does not is reported as a
//! cache-integrity error for an operator — never "fixed" by writing to the
//! ledger, which is authoritative and write-once per milestone.

use serde::Serialize;
use tracing::{info, warn};

use openbudget_ledger::address::milestone_address;
use openbudget_ledger::codec::decode_milestone;
use openbudget_ledger::tx::LOG_RELEASE_FUNDS;
use openbudget_ledger::{LedgerError, Signature};

use crate::db;
use crate::errors::{ClientError, CoreError, Result};
use crate::models::MilestoneRow;
use crate::state::CoreState;
use crate::MAX_HISTORY_SCAN;

/// Outcome of comparing the cache row to the ledger account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Synced,
    /// The ledger says released, the cache does not — repairable.
    LedgerReleasedCacheNot,
    /// The cache says released, the ledger does not — integrity error.
    CacheReleasedLedgerNot,
}

#[derive(Debug, Serialize)]
pub struct VerifyReport {
    pub milestone_id: String,
    pub ledger_address: String,
    pub status: SyncStatus,
    pub cache_released: bool,
    pub ledger_released: bool,
}

#[derive(Debug, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SyncReport {
    Synced { recovered: bool },
}

/// Compare the cache's released flag with the ledger's, decoding the
/// account through the shared versioned codec.
pub async fn verify_milestone(state: &CoreState, milestone_id: &str) -> Result<VerifyReport> {
    let (milestone, ledger_id) = load_published(state, milestone_id).await?;

    let address = milestone_address(&state.program_id, &ledger_id, milestone.milestone_index as u8);
    let bytes = state
        .ledger
        .get_account(&address)
        .await?
        .ok_or_else(|| CoreError::NotFound("ledger milestone account".to_string()))?;
    let on_ledger = decode_milestone(&bytes)
        .map_err(|e| CoreError::Ledger(ClientError::Program(LedgerError::from(e))))?;

    let status = match (on_ledger.is_released, milestone.is_released) {
        (a, b) if a == b => SyncStatus::Synced,
        (true, false) => SyncStatus::LedgerReleasedCacheNot,
        (false, true) => SyncStatus::CacheReleasedLedgerNot,
        _ => unreachable!(),
    };

    Ok(VerifyReport {
        milestone_id: milestone.id,
        ledger_address: address.to_hex(),
        status,
        cache_released: milestone.is_released,
        ledger_released: on_ledger.is_released,
    })
}

/// Converge the cache to the ledger for one milestone.
pub async fn sync_milestone(state: &CoreState, milestone_id: &str) -> Result<SyncReport> {
    let report = verify_milestone(state, milestone_id).await?;
    match report.status {
        SyncStatus::Synced => Ok(SyncReport::Synced { recovered: false }),
        SyncStatus::LedgerReleasedCacheNot => {
            let (milestone, ledger_id) = load_published(state, milestone_id).await?;
            recover_release_from_history(state, &milestone, &ledger_id, "").await?;
            info!("milestone {milestone_id} repaired from ledger history");
            Ok(SyncReport::Synced { recovered: true })
        }
        SyncStatus::CacheReleasedLedgerNot => Err(CoreError::CacheIntegrity(format!(
            "milestone {milestone_id} is released in the cache but not on the ledger; operator attention required"
        ))),
    }
}

/// Replay ledger history to repair a cache row that missed a release.
///
/// Scans the milestone address's recent transactions for the release log
/// marker, then writes the cache using the recovered signature and the
/// ledger account's own proof reference and timestamp. Failing to find the
/// transaction is a detectable, non-silent error — never a guess.
pub async fn recover_release_from_history(
    state: &CoreState,
    milestone: &MilestoneRow,
    ledger_id: &str,
    fallback_proof: &str,
) -> Result<Signature> {
    let address = milestone_address(&state.program_id, ledger_id, milestone.milestone_index as u8);

    let records = state
        .ledger
        .recent_transactions(&address, MAX_HISTORY_SCAN)
        .await?;
    let release_tx = records
        .iter()
        .find(|rec| rec.has_log_marker(LOG_RELEASE_FUNDS))
        .ok_or_else(|| {
            warn!(
                "no release transaction found in the last {MAX_HISTORY_SCAN} entries for milestone {}",
                milestone.id
            );
            CoreError::ManualInterventionRequired(format!(
                "milestone {} is released on the ledger but its release transaction was not found in recent history",
                milestone.id
            ))
        })?;

    // The ledger account carries the authoritative proof and timestamp.
    let (proof_url, released_at) = match state.ledger.get_account(&address).await? {
        Some(bytes) => match decode_milestone(&bytes) {
            Ok(on_ledger) if on_ledger.is_released => (
                if on_ledger.proof_url.is_empty() {
                    fallback_proof.to_string()
                } else {
                    on_ledger.proof_url
                },
                on_ledger.released_at.unwrap_or(release_tx.block_time),
            ),
            _ => (fallback_proof.to_string(), release_tx.block_time),
        },
        None => (fallback_proof.to_string(), release_tx.block_time),
    };

    db::mark_released(
        &state.pool,
        &milestone.id,
        &release_tx.signature.to_hex(),
        &proof_url,
        released_at,
    )
    .await?;

    Ok(release_tx.signature)
}

async fn load_published(state: &CoreState, milestone_id: &str) -> Result<(MilestoneRow, String)> {
    let (milestone, project) = db::get_milestone_with_project(&state.pool, milestone_id)
        .await?
        .ok_or_else(|| CoreError::NotFound("milestone".to_string()))?;
    let ledger_id = project
        .ledger_id
        .ok_or_else(|| CoreError::Validation("project is not published".to_string()))?;
    Ok((milestone, ledger_id))
}
