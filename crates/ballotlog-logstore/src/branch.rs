// SPDX-License-Identifier: Apache-2.0

use once_cell::sync::Lazy;
use regex::Regex;

use ballotlog_core::constants::CONTEST_FILE_SUBDIR;

/// Matches a per-contest pending branch, local or as seen through the
/// `origin/` remote-tracking prefix: `CVRs/<contest-uid>/<10-hex-char
/// token>`.
static CONTEST_BRANCH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^(?:origin/)?{}/([^/]+)/([0-9a-f]{{10}})$",
        regex::escape(CONTEST_FILE_SUBDIR)
    ))
    .expect("contest branch pattern is a valid regex")
});

/// A parsed reference to one contest's pending (not yet merged) branch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BranchRef {
    /// Full branch name as it appears in `git branch`/`git branch -r`
    /// output, e.g. `CVRs/president/3f9a2b10c4`.
    pub full_name: String,
    pub contest_uid: String,
    pub token: String,
}

impl BranchRef {
    /// Builds the canonical branch name for a contest and token, without
    /// requiring the branch to exist.
    pub fn name_for(contest_uid: &str, token: &str) -> String {
        format!("{CONTEST_FILE_SUBDIR}/{contest_uid}/{token}")
    }

    /// Parses a branch name (local or `origin/`-prefixed) into its contest
    /// uid and token, returning `None` for anything that doesn't match the
    /// pending-CVR-branch shape (e.g. `main`, `origin/main`).
    pub fn parse(name: &str) -> Option<BranchRef> {
        let caps = CONTEST_BRANCH_RE.captures(name)?;
        Some(BranchRef {
            full_name: name.to_string(),
            contest_uid: caps[1].to_string(),
            token: caps[2].to_string(),
        })
    }
}
