//! # Account types
//!
//! The three account kinds held by the ledger program.
//!
//! ## Mutability rules
//!
//! - [`PlatformState`] is created once; only `project_count` ever changes.
//! - [`Project`] is created by `InitializeProject`; `AddMilestone` may bump
//!   `total_allocated` and `milestone_count`, `ReleaseFunds` may bump
//!   `total_released`. Everything else is write-once.
//! - [`Milestone`] transitions `Unreleased -> Released` exactly once; the
//!   release sets `is_released`, `released_at` and `proof_url` and nothing
//!   else, ever.
//!
//! ## Invariants
//!
//! `total_allocated <= total_budget` and `total_released <= total_allocated`
//! hold after every operation; violating inputs are rejected atomically.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::Serialize;

use crate::address::Pubkey;

pub const MAX_PROJECT_ID_LEN: usize = 32;
pub const MAX_TITLE_LEN: usize = 100;
pub const MAX_MINISTRY_LEN: usize = 50;
pub const MAX_DESCRIPTION_LEN: usize = 200;
pub const MAX_PROOF_URL_LEN: usize = 200;

/// Process-wide ledger singleton. Seeds: `["platform"]`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize)]
pub struct PlatformState {
    /// Platform administrator identity.
    pub admin: Pubkey,
    /// Monotonically increasing count of projects ever created.
    pub project_count: u64,
}

/// One published government spending project. Seeds: `["project", id]`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize)]
pub struct Project {
    /// Natural-key id, max 32 bytes (e.g. "KEMENKES-2025-001").
    pub id: String,
    pub title: String,
    /// Ministry / recipient name.
    pub ministry: String,
    /// Total approved budget.
    pub total_budget: u64,
    /// Sum of all milestone amounts, released or not.
    pub total_allocated: u64,
    /// Sum of released milestone amounts.
    pub total_released: u64,
    pub milestone_count: u8,
    /// Unix timestamp of creation.
    pub created_at: i64,
    /// The only signer permitted to mutate this project.
    pub authority: Pubkey,
}

/// One spending tranche within a project. Seeds:
/// `["milestone", project_id, [index]]`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize)]
pub struct Milestone {
    pub project_id: String,
    /// Milestone number within the project (0-based, unique per project).
    pub index: u8,
    pub description: String,
    pub amount: u64,
    pub is_released: bool,
    /// Unix timestamp of release; `None` until released.
    pub released_at: Option<i64>,
    /// Reference to the proof document; empty until released.
    pub proof_url: String,
}
