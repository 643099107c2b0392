//! Release Coordinator — submits a fund-release ledger transaction and then
//! drives the cache into agreement with it, tolerating failures at every
//! step.
//!
//! Protocol:
//! 1. A process-local in-flight guard rejects a second concurrent attempt
//!    for the same milestone before any network I/O.
//! 2. Submit `ReleaseFunds` with a deterministic idempotency nonce and wait
//!    for durable confirmation.
//! 3. `AlreadyProcessed` is absorbed as success: an earlier identical
//!    submission went through, continue to the cache write.
//! 4. `MilestoneAlreadyReleased` means some other path released it on the
//!    ledger; recover the release transaction from the address history and
//!    repair the cache from the ledger account itself.
//! 5. The cache write runs under the shared retry policy. Exhaustion is a
//!    critical inconsistency carrying the signature: the ledger fact is
//!    durable and irreversible, so it is reported loudly, never rolled
//!    back, never silently dropped.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{error, info, warn};

use openbudget_ledger::tx::{sign_transaction, Instruction};
use openbudget_ledger::{LedgerError, Signature};

use crate::db;
use crate::errors::{ClientError, CoreError, Result};
use crate::ledger::idempotency_nonce;
use crate::models::MilestoneRow;
use crate::reconcile::recover_release_from_history;
use crate::state::CoreState;

/// Process-local set of milestone ids with a release currently in flight.
/// Guards one caller against its own duplicate clicks; racing *between*
/// operators is caught by the ledger's `MilestoneAlreadyReleased` check.
#[derive(Clone, Default)]
pub struct ReleaseLocks {
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl ReleaseLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the milestone for this attempt, or `None` if one is in flight.
    pub fn try_acquire(&self, milestone_id: &str) -> Option<InFlightGuard> {
        let mut set = self.in_flight.lock().expect("release lock poisoned");
        if set.insert(milestone_id.to_string()) {
            Some(InFlightGuard {
                locks: Arc::clone(&self.in_flight),
                milestone_id: milestone_id.to_string(),
            })
        } else {
            None
        }
    }
}

/// Releases the claim when dropped, including on error paths.
pub struct InFlightGuard {
    locks: Arc<Mutex<HashSet<String>>>,
    milestone_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.locks.lock() {
            set.remove(&self.milestone_id);
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReleaseOutcome {
    Released {
        milestone: MilestoneRow,
    },
    /// The milestone was already released. `recovered` is true when this
    /// call had to repair the cache from ledger history to learn that.
    AlreadyReleased {
        recovered: bool,
        milestone: MilestoneRow,
    },
}

pub async fn release_milestone(
    state: &CoreState,
    milestone_id: &str,
    proof_url: &str,
) -> Result<ReleaseOutcome> {
    if proof_url.trim().is_empty() {
        return Err(CoreError::Validation("proof url is required".to_string()));
    }

    let _guard = state
        .release_locks
        .try_acquire(milestone_id)
        .ok_or(CoreError::ReleaseInFlight)?;

    let (milestone, project) = db::get_milestone_with_project(&state.pool, milestone_id)
        .await?
        .ok_or_else(|| CoreError::NotFound("milestone".to_string()))?;

    let ledger_id = project.ledger_id.clone().ok_or_else(|| {
        CoreError::Validation("project must be published before releasing milestones".to_string())
    })?;

    if milestone.is_released {
        return Ok(ReleaseOutcome::AlreadyReleased {
            recovered: false,
            milestone,
        });
    }

    let index = milestone.milestone_index as u8;
    let instruction = Instruction::ReleaseFunds {
        project_id: ledger_id.clone(),
        index,
        proof_url: proof_url.to_string(),
    };
    let nonce = idempotency_nonce(&[b"release", milestone.id.as_bytes()]);
    let tx = sign_transaction(instruction, state.authority, nonce);

    let signature = match state.ledger.submit_transaction(&tx).await {
        Ok(receipt) => {
            state.ledger.wait_for_confirmation(&receipt.signature).await?;
            receipt.signature
        }
        // Idempotent duplicate: the network accepted an earlier identical
        // submission. Not an error — continue to the cache write.
        Err(ClientError::Program(LedgerError::AlreadyProcessed(sig))) => {
            info!("release of milestone {milestone_id} already processed as {sig}");
            sig
        }
        // Another path already released this milestone on the ledger while
        // the cache still says unreleased. Self-heal from history.
        Err(ClientError::Program(LedgerError::MilestoneAlreadyReleased)) => {
            warn!("milestone {milestone_id} already released on ledger; recovering from history");
            recover_release_from_history(state, &milestone, &ledger_id, proof_url).await?;
            let repaired = db::get_milestone(&state.pool, milestone_id)
                .await?
                .ok_or_else(|| CoreError::NotFound("milestone".to_string()))?;
            return Ok(ReleaseOutcome::AlreadyReleased {
                recovered: true,
                milestone: repaired,
            });
        }
        Err(e) => return Err(e.into()),
    };

    write_cache_release(state, &milestone, &signature, proof_url).await?;

    let released = db::get_milestone(&state.pool, milestone_id)
        .await?
        .ok_or_else(|| CoreError::NotFound("milestone".to_string()))?;
    info!("milestone {milestone_id} released ({signature})");
    Ok(ReleaseOutcome::Released { milestone: released })
}

/// The bounded-retry cache-write phase. The ledger transaction behind
/// `signature` is already durable; exhausting the retries therefore
/// escalates instead of rolling anything back.
async fn write_cache_release(
    state: &CoreState,
    milestone: &MilestoneRow,
    signature: &Signature,
    proof_url: &str,
) -> Result<()> {
    let released_at = chrono::Utc::now().timestamp();
    let sig_hex = signature.to_hex();
    let outcome = state
        .retry
        .run("cache release write", || {
            db::mark_released(&state.pool, &milestone.id, &sig_hex, proof_url, released_at)
        })
        .await;

    match outcome {
        Ok(_) => Ok(()),
        Err(crate::retry::RetryError::Exhausted { attempts, .. }) => {
            error!(
                "ledger transaction {signature} confirmed but cache write failed after {attempts} attempts; manual reconciliation required"
            );
            Err(CoreError::CriticalInconsistency {
                signature: *signature,
                attempts,
            })
        }
    }
}
