//! Publish Orchestrator — promotes a cache-only draft to a ledger-backed
//! published project.
//!
//! Flow: derive the project address from the chosen natural-key id, submit
//! `InitializeProject`, wait for durable confirmation, then atomically
//! update the cache row with the ledger identifiers. The cache is touched
//! only after the ledger fact is confirmed.

use serde::Serialize;
use tracing::{info, warn};

use openbudget_ledger::address::project_address;
use openbudget_ledger::codec::decode_project;
use openbudget_ledger::tx::{sign_transaction, Instruction, LOG_INITIALIZE_PROJECT};
use openbudget_ledger::{LedgerError, Pubkey, Signature};

use crate::db;
use crate::errors::{ClientError, CoreError, Result};
use crate::ledger::idempotency_nonce;
use crate::state::CoreState;
use crate::MAX_HISTORY_SCAN;

#[derive(Debug, Clone, Serialize)]
pub struct PublishReceipt {
    pub project_id: String,
    pub ledger_id: String,
    pub ledger_address: String,
    pub tx_signature: String,
}

pub async fn publish_project(
    state: &CoreState,
    project_id: &str,
    ledger_id: &str,
) -> Result<PublishReceipt> {
    if ledger_id.is_empty() || ledger_id.len() > 32 {
        return Err(CoreError::Validation(
            "ledger id must be 1..=32 bytes".to_string(),
        ));
    }

    let project = db::get_project(&state.pool, project_id)
        .await?
        .ok_or_else(|| CoreError::NotFound("project".to_string()))?;

    if project.is_published() {
        // Re-publishing an already published row is a no-op; hand back the
        // stored identifiers so a retried caller converges.
        if project.ledger_id.as_deref() == Some(ledger_id) {
            return Ok(PublishReceipt {
                project_id: project.id,
                ledger_id: ledger_id.to_string(),
                ledger_address: project.ledger_address.unwrap_or_default(),
                tx_signature: project.creation_tx.unwrap_or_default(),
            });
        }
        return Err(CoreError::Validation(
            "project is already published under a different ledger id".to_string(),
        ));
    }

    let address = project_address(&state.program_id, ledger_id);
    let instruction = Instruction::InitializeProject {
        project_id: ledger_id.to_string(),
        title: project.title.clone(),
        ministry: project.ministry.clone(),
        total_budget: project.total_budget as u64,
    };
    let nonce = idempotency_nonce(&[b"publish", project.id.as_bytes(), ledger_id.as_bytes()]);
    let tx = sign_transaction(instruction, state.authority, nonce);

    let signature = match state.ledger.submit_transaction(&tx).await {
        Ok(receipt) => {
            state.ledger.wait_for_confirmation(&receipt.signature).await?;
            receipt.signature
        }
        // A retry of the identical signed payload: the earlier submission
        // went through, continue with its signature.
        Err(ClientError::Program(LedgerError::AlreadyProcessed(sig))) => {
            info!("publish of {ledger_id} already processed as {sig}");
            sig
        }
        // The natural key is taken. If the existing account is ours, a
        // previous publish succeeded without reaching the cache; adopt it
        // instead of failing.
        Err(ClientError::Program(LedgerError::AccountInUse(_))) => {
            adopt_existing_project(state, ledger_id, &address).await?
        }
        Err(e) => return Err(e.into()),
    };

    let mut conn = db::begin_immediate(&state.pool).await?;
    let address_hex = address.to_hex();
    let sig_hex = signature.to_hex();
    let write = db::mark_published(
        &mut conn,
        &project.id,
        ledger_id,
        &address_hex,
        &sig_hex,
        &state.authority.to_hex(),
    )
    .await;
    match write {
        Ok(()) => db::commit(&mut conn).await?,
        Err(e) => {
            let _ = db::rollback(&mut conn).await;
            return Err(e);
        }
    }

    info!("project {} published as {ledger_id} ({sig_hex})", project.id);
    Ok(PublishReceipt {
        project_id: project.id,
        ledger_id: ledger_id.to_string(),
        ledger_address: address_hex,
        tx_signature: sig_hex,
    })
}

/// Recover from a duplicate-id rejection: verify the existing ledger
/// project belongs to our authority, then dig its creation signature out of
/// the address history.
async fn adopt_existing_project(
    state: &CoreState,
    ledger_id: &str,
    address: &Pubkey,
) -> Result<Signature> {
    let bytes = state
        .ledger
        .get_account(address)
        .await?
        .ok_or_else(|| CoreError::NotFound("ledger project account".to_string()))?;
    let on_ledger = decode_project(&bytes)
        .map_err(|e| CoreError::Ledger(ClientError::Program(LedgerError::from(e))))?;

    if on_ledger.authority != state.authority {
        return Err(CoreError::Validation(format!(
            "ledger id {ledger_id} is already taken by another authority"
        )));
    }

    let records = state.ledger.recent_transactions(address, MAX_HISTORY_SCAN).await?;
    match records
        .iter()
        .find(|rec| rec.has_log_marker(LOG_INITIALIZE_PROJECT))
    {
        Some(rec) => {
            warn!("adopting existing ledger project {ledger_id} (tx {})", rec.signature);
            Ok(rec.signature)
        }
        None => Err(CoreError::ManualInterventionRequired(format!(
            "ledger project {ledger_id} exists but its creation transaction was not found in history"
        ))),
    }
}
