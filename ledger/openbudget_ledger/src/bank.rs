//! # Bank — the account-oriented ledger store
//!
//! Executes signed transactions against a map of derived addresses to
//! encoded account bytes. Each of the four operations is all-or-nothing:
//! handlers validate everything and stage their writes first, and the bank
//! applies the staged writes only when the whole instruction succeeded.
//! There is no partially-applied state to observe.
//!
//! The bank also keeps what the protocol needs from a ledger node:
//! a processed-signature set (duplicate submissions fail with
//! [`LedgerError::AlreadyProcessed`] and change nothing) and a transaction
//! history with program logs, queryable per address.

use std::collections::{HashMap, HashSet};

use crate::address::{self, Pubkey};
use crate::codec::{self, AccountData};
use crate::tx::{
    Instruction, SignedTransaction, Signature, TransactionRecord, TxReceipt,
    LOG_INITIALIZE_PROJECT, LOG_RELEASE_FUNDS,
};
use crate::types::{
    Milestone, PlatformState, Project, MAX_DESCRIPTION_LEN, MAX_MINISTRY_LEN, MAX_PROJECT_ID_LEN,
    MAX_PROOF_URL_LEN, MAX_TITLE_LEN,
};
use crate::LedgerError;

/// Writes staged by a successfully validated instruction.
struct Effects {
    writes: Vec<(Pubkey, AccountData)>,
    accounts: Vec<Pubkey>,
    logs: Vec<String>,
}

/// Single-node, in-process ledger. Consensus is out of scope; the bank
/// provides the per-transaction atomicity and durability the protocol
/// depends on.
pub struct Bank {
    program_id: Pubkey,
    accounts: HashMap<Pubkey, Vec<u8>>,
    history: Vec<TransactionRecord>,
    processed: HashSet<Signature>,
    slot: u64,
}

impl Bank {
    pub fn new(program_id: Pubkey) -> Self {
        Bank {
            program_id,
            accounts: HashMap::new(),
            history: Vec::new(),
            processed: HashSet::new(),
            slot: 0,
        }
    }

    pub fn program_id(&self) -> Pubkey {
        self.program_id
    }

    /// Raw bytes of the account at `address`, if it exists. Callers decode
    /// through [`crate::codec`].
    pub fn account(&self, address: &Pubkey) -> Option<&[u8]> {
        self.accounts.get(address).map(Vec::as_slice)
    }

    /// Confirmed transactions touching `address`, newest first.
    pub fn transactions_for(&self, address: &Pubkey, limit: usize) -> Vec<TransactionRecord> {
        self.history
            .iter()
            .rev()
            .filter(|rec| rec.accounts.contains(address))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Look up one confirmed transaction by signature.
    pub fn transaction(&self, signature: &Signature) -> Option<&TransactionRecord> {
        self.history.iter().find(|rec| rec.signature == *signature)
    }

    /// Whether `signature` has been durably confirmed.
    pub fn is_confirmed(&self, signature: &Signature) -> bool {
        self.processed.contains(signature)
    }

    /// Execute one signed transaction atomically.
    pub fn execute(&mut self, tx: &SignedTransaction) -> Result<TxReceipt, LedgerError> {
        if self.processed.contains(&tx.signature) {
            return Err(LedgerError::AlreadyProcessed(tx.signature));
        }

        let effects = self.process(tx)?;

        // Validation passed; apply staged writes and record the transaction.
        self.slot += 1;
        for (addr, data) in &effects.writes {
            self.accounts.insert(*addr, codec::encode_account(data)?);
        }
        let record = TransactionRecord {
            signature: tx.signature,
            slot: self.slot,
            block_time: now(),
            accounts: effects.accounts,
            logs: effects.logs,
        };
        self.history.push(record);
        self.processed.insert(tx.signature);

        Ok(TxReceipt {
            signature: tx.signature,
            slot: self.slot,
        })
    }

    fn process(&self, tx: &SignedTransaction) -> Result<Effects, LedgerError> {
        match &tx.instruction {
            Instruction::InitializePlatform => self.initialize_platform(tx.signer),
            Instruction::InitializeProject {
                project_id,
                title,
                ministry,
                total_budget,
            } => self.initialize_project(tx.signer, project_id, title, ministry, *total_budget),
            Instruction::AddMilestone {
                project_id,
                index,
                description,
                amount,
            } => self.add_milestone(tx.signer, project_id, *index, description, *amount),
            Instruction::ReleaseFunds {
                project_id,
                index,
                proof_url,
            } => self.release_funds(tx.signer, project_id, *index, proof_url),
        }
    }

    // ─────────────────────────────────────────────────────────
    // Instruction handlers (validate fully, then stage writes)
    // ─────────────────────────────────────────────────────────

    fn initialize_platform(&self, signer: Pubkey) -> Result<Effects, LedgerError> {
        let platform_addr = address::platform_address(&self.program_id);
        if self.accounts.contains_key(&platform_addr) {
            return Err(LedgerError::AlreadyInitialized);
        }

        let platform = PlatformState {
            admin: signer,
            project_count: 0,
        };
        Ok(Effects {
            writes: vec![(platform_addr, AccountData::Platform(platform))],
            accounts: vec![platform_addr, signer],
            logs: vec![
                "Instruction: InitializePlatform".to_string(),
                format!("Platform initialized by admin: {signer}"),
            ],
        })
    }

    fn initialize_project(
        &self,
        signer: Pubkey,
        project_id: &str,
        title: &str,
        ministry: &str,
        total_budget: u64,
    ) -> Result<Effects, LedgerError> {
        if project_id.is_empty() || project_id.len() > MAX_PROJECT_ID_LEN {
            return Err(LedgerError::ProjectIdTooLong);
        }
        if title.is_empty() || title.len() > MAX_TITLE_LEN {
            return Err(LedgerError::InvalidTitle);
        }
        if ministry.len() > MAX_MINISTRY_LEN {
            return Err(LedgerError::InvalidMinistry);
        }
        if total_budget == 0 {
            return Err(LedgerError::InvalidBudget);
        }

        let platform_addr = address::platform_address(&self.program_id);
        let mut platform = self.load_platform(&platform_addr)?;

        let project_addr = address::project_address(&self.program_id, project_id);
        if self.accounts.contains_key(&project_addr) {
            return Err(LedgerError::AccountInUse(project_addr));
        }

        platform.project_count = platform
            .project_count
            .checked_add(1)
            .ok_or(LedgerError::ArithmeticOverflow)?;

        let project = Project {
            id: project_id.to_string(),
            title: title.to_string(),
            ministry: ministry.to_string(),
            total_budget,
            total_allocated: 0,
            total_released: 0,
            milestone_count: 0,
            created_at: now(),
            authority: signer,
        };

        Ok(Effects {
            writes: vec![
                (project_addr, AccountData::Project(project)),
                (platform_addr, AccountData::Platform(platform)),
            ],
            accounts: vec![project_addr, platform_addr, signer],
            logs: vec![
                LOG_INITIALIZE_PROJECT.to_string(),
                format!("Project created: {project_id} by {signer}"),
            ],
        })
    }

    fn add_milestone(
        &self,
        signer: Pubkey,
        project_id: &str,
        index: u8,
        description: &str,
        amount: u64,
    ) -> Result<Effects, LedgerError> {
        if description.is_empty() || description.len() > MAX_DESCRIPTION_LEN {
            return Err(LedgerError::InvalidDescription);
        }
        if amount == 0 {
            return Err(LedgerError::InvalidBudget);
        }

        let project_addr = address::project_address(&self.program_id, project_id);
        let mut project = self.load_project(&project_addr)?;
        if project.authority != signer {
            return Err(LedgerError::UnauthorizedAccess);
        }

        let milestone_addr = address::milestone_address(&self.program_id, project_id, index);
        if self.accounts.contains_key(&milestone_addr) {
            return Err(LedgerError::AccountInUse(milestone_addr));
        }

        let new_allocated = project
            .total_allocated
            .checked_add(amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;
        if new_allocated > project.total_budget {
            return Err(LedgerError::InsufficientBudget);
        }

        project.total_allocated = new_allocated;
        project.milestone_count = project
            .milestone_count
            .checked_add(1)
            .ok_or(LedgerError::MilestoneLimitReached)?;

        let milestone = Milestone {
            project_id: project_id.to_string(),
            index,
            description: description.to_string(),
            amount,
            is_released: false,
            released_at: None,
            proof_url: String::new(),
        };

        Ok(Effects {
            writes: vec![
                (milestone_addr, AccountData::Milestone(milestone)),
                (project_addr, AccountData::Project(project)),
            ],
            accounts: vec![milestone_addr, project_addr, signer],
            logs: vec![
                "Instruction: AddMilestone".to_string(),
                format!("Milestone {index} added to project {project_id}"),
            ],
        })
    }

    fn release_funds(
        &self,
        signer: Pubkey,
        project_id: &str,
        index: u8,
        proof_url: &str,
    ) -> Result<Effects, LedgerError> {
        if proof_url.len() > MAX_PROOF_URL_LEN {
            return Err(LedgerError::InvalidProofUrl);
        }

        let project_addr = address::project_address(&self.program_id, project_id);
        let mut project = self.load_project(&project_addr)?;
        if project.authority != signer {
            return Err(LedgerError::UnauthorizedAccess);
        }

        let milestone_addr = address::milestone_address(&self.program_id, project_id, index);
        let bytes = self
            .accounts
            .get(&milestone_addr)
            .ok_or(LedgerError::AccountNotFound(milestone_addr))?;
        let mut milestone = codec::decode_milestone(bytes)?;

        if milestone.is_released {
            return Err(LedgerError::MilestoneAlreadyReleased);
        }

        project.total_released = project
            .total_released
            .checked_add(milestone.amount)
            .ok_or(LedgerError::ArithmeticOverflow)?;

        milestone.is_released = true;
        milestone.released_at = Some(now());
        milestone.proof_url = proof_url.to_string();
        let amount = milestone.amount;

        Ok(Effects {
            writes: vec![
                (milestone_addr, AccountData::Milestone(milestone)),
                (project_addr, AccountData::Project(project)),
            ],
            accounts: vec![milestone_addr, project_addr, signer],
            logs: vec![
                LOG_RELEASE_FUNDS.to_string(),
                format!(
                    "Funds released for milestone {index} of project {project_id} (amount: {amount})"
                ),
            ],
        })
    }

    // ─────────────────────────────────────────────────────────
    // Typed loads
    // ─────────────────────────────────────────────────────────

    fn load_platform(&self, addr: &Pubkey) -> Result<PlatformState, LedgerError> {
        let bytes = self
            .accounts
            .get(addr)
            .ok_or(LedgerError::AccountNotFound(*addr))?;
        Ok(codec::decode_platform(bytes)?)
    }

    fn load_project(&self, addr: &Pubkey) -> Result<Project, LedgerError> {
        let bytes = self
            .accounts
            .get(addr)
            .ok_or(LedgerError::AccountNotFound(*addr))?;
        Ok(codec::decode_project(bytes)?)
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
