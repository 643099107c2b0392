//! Shared test fixtures: an in-memory cache, an in-process ledger with the
//! platform bootstrapped, and helpers that stage ledger state out-of-band.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use openbudget_ledger::address::program_id;
use openbudget_ledger::tx::{sign_transaction, Instruction};
use openbudget_ledger::{
    Bank, LedgerError, Pubkey, Signature, SignedTransaction, TransactionRecord, TxReceipt,
};

use crate::db;
use crate::errors::ClientError;
use crate::ledger::{idempotency_nonce, InProcessLedger, LedgerClient};
use crate::models::{MilestoneRow, ProjectRow};
use crate::publish::publish_project;
use crate::release::ReleaseLocks;
use crate::retry::RetryPolicy;
use crate::state::CoreState;

/// Fresh in-memory database with migrations applied. A single connection
/// keeps every query on the same in-memory instance.
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");
    pool
}

pub struct TestCore {
    pub state: CoreState,
    pub ledger: Arc<InProcessLedger>,
    pub other_authority: Pubkey,
}

/// Full orchestrator state over a bootstrapped in-process ledger, with a
/// retry schedule fast enough for tests.
pub async fn test_state() -> TestCore {
    let pool = test_pool().await;
    let pid = program_id("openbudget");
    let authority = Pubkey::from_seed("test-authority");

    let mut bank = Bank::new(pid);
    let init = sign_transaction(Instruction::InitializePlatform, authority, 0);
    bank.execute(&init).expect("platform bootstrap");

    let ledger = Arc::new(InProcessLedger::new(bank));
    let state = CoreState {
        pool,
        ledger: ledger.clone(),
        program_id: pid,
        authority,
        retry: RetryPolicy {
            max_attempts: 3,
            backoff_step: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            attempt_timeout: Duration::from_secs(1),
        },
        release_locks: ReleaseLocks::new(),
    };

    TestCore {
        state,
        ledger,
        other_authority: Pubkey::from_seed("other-authority"),
    }
}

/// Swap the ledger client out from under an existing state.
pub fn with_ledger(state: CoreState, client: FlakyLedger) -> CoreState {
    CoreState {
        ledger: Arc::new(client),
        ..state
    }
}

/// A draft created and published in one step.
pub async fn published_project(state: &CoreState, ledger_id: &str, budget: i64) -> ProjectRow {
    let draft = db::create_draft_project(&state.pool, "Community Clinics", "Health", budget)
        .await
        .expect("draft");
    publish_project(state, &draft.id, ledger_id)
        .await
        .expect("publish");
    db::get_project(&state.pool, &draft.id)
        .await
        .expect("query")
        .expect("published row")
}

/// A published project with one allocated milestone (index 0).
pub async fn allocated_milestone(
    state: &CoreState,
    ledger_id: &str,
    budget: i64,
    amount: u64,
) -> (ProjectRow, MilestoneRow) {
    let project = published_project(state, ledger_id, budget).await;
    let milestone = crate::allocate::add_milestone(state, &project.id, "Tranche 0", amount)
        .await
        .expect("allocate");
    let project = db::get_project(&state.pool, &project.id)
        .await
        .expect("query")
        .expect("row");
    (project, milestone)
}

/// Create a project directly on the ledger, bypassing the cache. Models a
/// publish that happened outside this process (or before a cache loss).
pub async fn publish_on_ledger(state: &CoreState, authority: Pubkey, ledger_id: &str, budget: u64) {
    let instruction = Instruction::InitializeProject {
        project_id: ledger_id.to_string(),
        title: "Community Clinics".to_string(),
        ministry: "Health".to_string(),
        total_budget: budget,
    };
    let nonce = idempotency_nonce(&[b"test-publish", ledger_id.as_bytes()]);
    let tx = sign_transaction(instruction, authority, nonce);
    state.ledger.submit_transaction(&tx).await.expect("ledger publish");
}

/// Release a milestone directly on the ledger, bypassing the cache.
pub async fn release_on_ledger(state: &CoreState, ledger_id: &str, index: u8) -> Signature {
    let instruction = Instruction::ReleaseFunds {
        project_id: ledger_id.to_string(),
        index,
        proof_url: "https://proofs.example/ledger.pdf".to_string(),
    };
    let nonce = idempotency_nonce(&[b"test-release", ledger_id.as_bytes(), &[index]]);
    let tx = sign_transaction(instruction, state.authority, nonce);
    let receipt = state
        .ledger
        .submit_transaction(&tx)
        .await
        .expect("ledger release");
    receipt.signature
}

enum SubmitScript {
    AlreadyProcessed(Signature),
    MilestoneAlreadyReleased,
}

/// A ledger client that answers every submission with a scripted program
/// rejection while delegating reads to the real in-process ledger.
pub struct FlakyLedger {
    inner: Arc<InProcessLedger>,
    script: SubmitScript,
}

impl FlakyLedger {
    /// Every submission is reported as a duplicate of `signature`.
    pub fn already_processed(inner: Arc<InProcessLedger>, signature: Signature) -> Self {
        FlakyLedger {
            inner,
            script: SubmitScript::AlreadyProcessed(signature),
        }
    }

    /// Every submission is rejected as already released, while the real
    /// ledger account and history remain whatever they are.
    pub fn phantom_release(inner: Arc<InProcessLedger>) -> Self {
        FlakyLedger {
            inner,
            script: SubmitScript::MilestoneAlreadyReleased,
        }
    }
}

#[async_trait]
impl LedgerClient for FlakyLedger {
    async fn submit_transaction(&self, _tx: &SignedTransaction) -> Result<TxReceipt, ClientError> {
        match self.script {
            SubmitScript::AlreadyProcessed(sig) => {
                Err(ClientError::Program(LedgerError::AlreadyProcessed(sig)))
            }
            SubmitScript::MilestoneAlreadyReleased => {
                Err(ClientError::Program(LedgerError::MilestoneAlreadyReleased))
            }
        }
    }

    async fn wait_for_confirmation(&self, signature: &Signature) -> Result<(), ClientError> {
        self.inner.wait_for_confirmation(signature).await
    }

    async fn get_account(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, ClientError> {
        self.inner.get_account(address).await
    }

    async fn recent_transactions(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> Result<Vec<TransactionRecord>, ClientError> {
        self.inner.recent_transactions(address, limit).await
    }

    async fn get_transaction(
        &self,
        signature: &Signature,
    ) -> Result<Option<TransactionRecord>, ClientError> {
        self.inner.get_transaction(signature).await
    }
}
