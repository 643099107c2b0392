//! # Derived account addressing
//!
//! Every ledger account lives at an address computed from a fixed seed
//! scheme, so two independent parties always agree on where an account is
//! without any registry lookup:
//!
//! | Account   | Seeds                                    |
//! |-----------|------------------------------------------|
//! | Platform  | `["platform"]`                           |
//! | Project   | `["project", project_id]`                |
//! | Milestone | `["milestone", project_id, [index]]`     |
//!
//! Seeds are length-prefixed before hashing so that `("ab", "c")` and
//! `("a", "bc")` derive different addresses.

use std::fmt;
use std::str::FromStr;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Seed prefix for the platform singleton.
pub const PLATFORM_SEED: &[u8] = b"platform";
/// Seed prefix for budget-project accounts.
pub const PROJECT_SEED: &[u8] = b"project";
/// Seed prefix for milestone accounts.
pub const MILESTONE_SEED: &[u8] = b"milestone";

/// A 32-byte account address or signer identity, displayed as hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, BorshSerialize, BorshDeserialize)]
pub struct Pubkey([u8; 32]);

impl Pubkey {
    pub fn new(bytes: [u8; 32]) -> Self {
        Pubkey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Deterministic identity derived from a seed string. Real key custody
    /// lives in an external wallet; this covers development and tests.
    pub fn from_seed(seed: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"identity:");
        hasher.update(seed.as_bytes());
        Pubkey(hasher.finalize().into())
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pubkey({})", self.to_hex())
    }
}

impl Serialize for Pubkey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl FromStr for Pubkey {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Pubkey(arr))
    }
}

/// Derive the program identity for a named program deployment.
pub fn program_id(name: &str) -> Pubkey {
    let mut hasher = Sha256::new();
    hasher.update(b"program:");
    hasher.update(name.as_bytes());
    Pubkey::new(hasher.finalize().into())
}

/// Derive a deterministic sub-account address from `(program id, seeds)`.
///
/// Pure function: the same inputs always produce the same address.
pub fn derive_address(program_id: &Pubkey, seeds: &[&[u8]]) -> Pubkey {
    let mut hasher = Sha256::new();
    hasher.update(program_id.as_bytes());
    for seed in seeds {
        // Length prefix keeps seed boundaries unambiguous.
        hasher.update((seed.len() as u32).to_le_bytes());
        hasher.update(seed);
    }
    Pubkey::new(hasher.finalize().into())
}

/// Address of the platform singleton.
pub fn platform_address(program_id: &Pubkey) -> Pubkey {
    derive_address(program_id, &[PLATFORM_SEED])
}

/// Address of a budget-project account, keyed by its natural-key id.
pub fn project_address(program_id: &Pubkey, project_id: &str) -> Pubkey {
    derive_address(program_id, &[PROJECT_SEED, project_id.as_bytes()])
}

/// Address of a milestone account, keyed by `(project id, index)`.
pub fn milestone_address(program_id: &Pubkey, project_id: &str, index: u8) -> Pubkey {
    derive_address(
        program_id,
        &[MILESTONE_SEED, project_id.as_bytes(), &[index]],
    )
}
