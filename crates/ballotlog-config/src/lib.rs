// SPDX-License-Identifier: Apache-2.0

//! Operational configuration for the Submission Engine, Merge Engine, and
//! Receipt Builder.
//!
//! All fields should tolerate inconsistencies across actors without
//! affecting the correctness of the protocol: two actors running with
//! different `ballot_receipt_rows` still produce valid (if differently
//! shaped) receipts. Most operators should not need to specify any field
//! beyond `election_data_root`.

use std::path::PathBuf;

use ballotlog_core::constants;
use serde::{Deserialize, Serialize};

/// Configuration shared by every actor (CLI invocation or long-running
/// process) that operates on one election's ledger.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LedgerConfig {
    /// Root directory of the election data tree. The Log Store's working
    /// copy and bare repository both live under here.
    pub election_data_root: PathBuf,

    /// Subdirectory, relative to `election_data_root`, holding the
    /// per-contest CVR log repository.
    #[serde(default = "LedgerConfig::default_cvr_subdir")]
    pub cvr_subdir: String,

    /// Minimum number of cast CVRs that must accumulate on a contest's
    /// pending branches before the Merge Engine will fold any of them into
    /// `main` (k-anonymity threshold, spec §4.3).
    #[serde(default = "LedgerConfig::default_minimum_cast_cache")]
    pub minimum_cast_cache: usize,

    /// Number of rows (including the voter's own, if present) in a ballot
    /// receipt (spec §4.4).
    #[serde(default = "LedgerConfig::default_ballot_receipt_rows")]
    pub ballot_receipt_rows: usize,

    /// Maximum attempts the Submission Engine makes to allocate a unique
    /// branch name for one contest before giving up.
    #[serde(default = "LedgerConfig::default_max_branch_allocation_attempts")]
    pub max_branch_allocation_attempts: u32,
}

impl LedgerConfig {
    pub fn default_cvr_subdir() -> String {
        constants::CONTEST_FILE_SUBDIR.to_string()
    }

    pub fn default_minimum_cast_cache() -> usize {
        constants::DEFAULT_MINIMUM_CAST_CACHE
    }

    pub fn default_ballot_receipt_rows() -> usize {
        constants::DEFAULT_BALLOT_RECEIPT_ROWS
    }

    pub fn default_max_branch_allocation_attempts() -> u32 {
        constants::MAX_BRANCH_ALLOCATION_ATTEMPTS
    }

    pub fn new(election_data_root: impl Into<PathBuf>) -> Self {
        LedgerConfig {
            election_data_root: election_data_root.into(),
            cvr_subdir: Self::default_cvr_subdir(),
            minimum_cast_cache: Self::default_minimum_cast_cache(),
            ballot_receipt_rows: Self::default_ballot_receipt_rows(),
            max_branch_allocation_attempts: Self::default_max_branch_allocation_attempts(),
        }
    }

    /// Full path to the per-contest CVR log repository.
    pub fn cvr_repo_path(&self) -> PathBuf {
        self.election_data_root.join(&self.cvr_subdir)
    }
}
