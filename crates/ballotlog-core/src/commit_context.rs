// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};

use crate::constants::SENTINEL_COMMIT_DATE;

/// Deterministic commit metadata threaded through every log store write for
/// the duration of one operation (one `accept-ballot` run, one `merge`
/// pass).
///
/// Fixing author/committer dates to a constant means a commit's digest is a
/// function of its payload and ancestry alone, never of wall-clock time —
/// two implementations replaying the same ballot produce the same digest.
/// See spec §9: a modern implementation should pass this explicitly instead
/// of mutating `GIT_AUTHOR_DATE`/`GIT_COMMITTER_DATE` in the process
/// environment; this type is that parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitContext {
    pub author_name: String,
    pub author_email: String,
    pub author_date: DateTime<Utc>,
    pub committer_date: DateTime<Utc>,
}

impl CommitContext {
    /// The sentinel context used by every core operation: fixed dates, fixed
    /// committer identity. There is exactly one legitimate committer
    /// identity in this system (the ledger itself never records which
    /// physical node or voter authored a commit — that's the whole point).
    pub fn sentinel() -> Self {
        let date = DateTime::parse_from_rfc3339(SENTINEL_COMMIT_DATE)
            .expect("sentinel date constant is valid RFC3339")
            .with_timezone(&Utc);
        Self {
            author_name: "ballotlog".to_string(),
            author_email: "ballotlog@localhost".to_string(),
            author_date: date,
            committer_date: date,
        }
    }
}

impl Default for CommitContext {
    fn default() -> Self {
        Self::sentinel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_is_deterministic() {
        assert_eq!(CommitContext::sentinel(), CommitContext::sentinel());
    }
}
