// SPDX-License-Identifier: Apache-2.0

/// Directory under the election data root that holds the per-contest CVR log.
pub const CONTEST_FILE_SUBDIR: &str = "CVRs";

/// Name of the canonical, monotonically-growing branch.
pub const MAIN_BRANCH: &str = "main";

/// Name of the remote every submission/merge actor pushes to and pulls from.
pub const ORIGIN_REMOTE: &str = "origin";

/// File name of the one-contest payload at the working-directory tip.
pub const CONTEST_PAYLOAD_FILE: &str = "contest.json";

/// File name of the cloak-peer marker committed alongside a cloaked contest.
pub const CLOAK_MARKER_FILE: &str = "cloak.json";

/// Number of hex characters in a branch token (5 bytes of entropy).
pub const BRANCH_TOKEN_HEX_LEN: usize = 10;

/// Number of attempts `accept-ballot` makes to allocate a unique branch name
/// before giving up with `branch_collision`.
pub const MAX_BRANCH_ALLOCATION_ATTEMPTS: u32 = 3;

/// Default k-anonymity threshold for the Merge Engine.
pub const DEFAULT_MINIMUM_CAST_CACHE: usize = 100;

/// Default number of rows (including the voter's own) in a ballot receipt.
pub const DEFAULT_BALLOT_RECEIPT_ROWS: usize = 100;

/// Sentinel used for `GIT_AUTHOR_DATE` / `GIT_COMMITTER_DATE` so that commit
/// digests are determined only by payload and ancestry, never by wall clock.
pub const SENTINEL_COMMIT_DATE: &str = "2022-01-01T12:00:00Z";

/// Commit message used by the Merge Engine for every merge-to-main commit.
pub const MERGE_COMMIT_MESSAGE: &str = "auto commit - thank you for voting";
