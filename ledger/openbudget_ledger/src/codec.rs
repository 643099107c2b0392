//! # Versioned account codec
//!
//! Single source of truth for the binary layout of ledger accounts, shared
//! between the program (writer) and the reconciliation scanner (verifier).
//! Nothing outside this module touches raw offsets.
//!
//! ## Layout
//!
//! ```text
//! [ version: u8 ][ kind tag: u8 (borsh enum discriminator) ][ payload ]
//! ```
//!
//! The payload is borsh-encoded: fixed-width integers little-endian,
//! strings length-prefixed with a `u32`, `Option` as a one-byte flag.
//! Bumping [`CODEC_VERSION`] is the only sanctioned way to change the
//! layout; decoders reject versions they do not understand instead of
//! misreading bytes.

use borsh::{BorshDeserialize, BorshSerialize};
use thiserror::Error;

use crate::types::{Milestone, PlatformState, Project};

/// Current account layout version.
pub const CODEC_VERSION: u8 = 1;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("account data is empty")]
    Empty,

    #[error("unsupported account layout version {0}")]
    UnsupportedVersion(u8),

    #[error("expected {expected} account, found {found}")]
    KindMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("malformed account payload: {0}")]
    Malformed(String),
}

/// A decoded ledger account of any kind. The borsh enum tag doubles as the
/// on-ledger kind discriminator.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub enum AccountData {
    Platform(PlatformState),
    Project(Project),
    Milestone(Milestone),
}

impl AccountData {
    pub fn kind(&self) -> &'static str {
        match self {
            AccountData::Platform(_) => "platform",
            AccountData::Project(_) => "project",
            AccountData::Milestone(_) => "milestone",
        }
    }
}

/// Encode an account with the version header.
pub fn encode_account(data: &AccountData) -> Result<Vec<u8>, CodecError> {
    let mut buf = vec![CODEC_VERSION];
    borsh::to_writer(&mut buf, data).map_err(|e| CodecError::Malformed(e.to_string()))?;
    Ok(buf)
}

/// Decode any account, checking the version header.
pub fn decode_account(bytes: &[u8]) -> Result<AccountData, CodecError> {
    let (&version, payload) = bytes.split_first().ok_or(CodecError::Empty)?;
    if version != CODEC_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    AccountData::try_from_slice(payload).map_err(|e| CodecError::Malformed(e.to_string()))
}

/// Decode bytes that must hold a platform account.
pub fn decode_platform(bytes: &[u8]) -> Result<PlatformState, CodecError> {
    match decode_account(bytes)? {
        AccountData::Platform(p) => Ok(p),
        other => Err(CodecError::KindMismatch {
            expected: "platform",
            found: other.kind(),
        }),
    }
}

/// Decode bytes that must hold a budget-project account.
pub fn decode_project(bytes: &[u8]) -> Result<Project, CodecError> {
    match decode_account(bytes)? {
        AccountData::Project(p) => Ok(p),
        other => Err(CodecError::KindMismatch {
            expected: "project",
            found: other.kind(),
        }),
    }
}

/// Decode bytes that must hold a milestone account.
pub fn decode_milestone(bytes: &[u8]) -> Result<Milestone, CodecError> {
    match decode_account(bytes)? {
        AccountData::Milestone(m) => Ok(m),
        other => Err(CodecError::KindMismatch {
            expected: "milestone",
            found: other.kind(),
        }),
    }
}
