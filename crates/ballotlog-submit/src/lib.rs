// SPDX-License-Identifier: Apache-2.0

//! Submission Engine: takes a validated cast ballot and submits each
//! contest as its own CVR, each in a freshly allocated branch rooted at a
//! random point in `main`'s history (spec §4.2).

use std::collections::{HashMap, HashSet};

use ballotlog_config::LedgerConfig;
use ballotlog_core::constants::MAIN_BRANCH;
use ballotlog_core::{BallotLogError, CommitContext, Digest, Result};
use ballotlog_logstore::{BranchRef, CvrHead, LogStore};
use ballotlog_model::{Ballot, Contest};
use rand::rngs::OsRng;
use rand::RngCore;

/// Per-contest outcome of submitting one cast ballot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionOutcome {
    pub ballot_uid: String,
    /// Branch each contest was committed to, keyed by contest uid.
    pub branches: HashMap<String, String>,
    /// The digest of the voter's own commit for each contest, keyed by
    /// contest uid. This is the row the Receipt Builder hides among the
    /// unmerged pool.
    pub contest_receipts: HashMap<String, Digest>,
    /// For contests with `cloak` set, the other pending cloaked branches'
    /// tip digests for the same contest uid.
    pub cloak_peers: HashMap<String, Vec<Digest>>,
    /// The Pending Pool as it stood *before* this ballot's own branches
    /// were created (spec §4.2 step 2: "Retain this for receipt
    /// building"). The Receipt Builder must draw its decoy rows from this
    /// snapshot rather than the live pool, since by the time a receipt is
    /// built this ballot's own branches have already been pushed and
    /// locally dropped.
    pub pending_pool: HashMap<String, Vec<Digest>>,
}

pub struct SubmissionEngine<S: LogStore> {
    store: S,
    config: LedgerConfig,
}

impl<S: LogStore> SubmissionEngine<S> {
    pub fn new(store: S, config: LedgerConfig) -> Self {
        SubmissionEngine { store, config }
    }

    /// Submits every contest on `cast` as an independent CVR branch. The
    /// caller is responsible for having already validated `cast` against
    /// its blank ballot (`ballotlog_validate::validate_cast_ballot_traced`)
    /// -- this engine only handles the log-store side of submission.
    ///
    /// Per spec §4.2 step 4, every contest is committed *locally* first;
    /// only once all of them have landed does this method push each branch
    /// and drop its local copy, so a failure partway through never leaves a
    /// receipt built against a contest that never reached the remote.
    pub fn submit_ballot(&self, cast: &Ballot, ctx: &CommitContext) -> Result<SubmissionOutcome> {
        let mut pending_pool: HashMap<String, Vec<Digest>> = HashMap::new();
        for head in self.all_pending_heads()? {
            pending_pool.entry(head.contest_uid).or_default().push(head.head);
        }

        let mut branches = HashMap::with_capacity(cast.contests.len());
        let mut contest_receipts = HashMap::with_capacity(cast.contests.len());
        let mut cloak_peers = HashMap::new();

        for contest in &cast.contests {
            let branch_name = match self.allocate_branch(&contest.uid) {
                Ok(name) => name,
                Err(e) => {
                    self.rollback(&branches);
                    return Err(e);
                }
            };

            let mut committed = contest.clone();
            committed.cast_branch = Some(branch_name.clone());
            let payload = committed.to_stable_json();

            let cloak_marker = if committed.cloak == Some(true) {
                Some(serde_json::to_vec(&serde_json::json!({ "uid": contest.uid })).expect(
                    "serializing a cloak marker of two known-good fields cannot fail",
                ))
            } else {
                None
            };

            let digest = match self.store.write_contest_payload(
                &branch_name,
                &payload,
                cloak_marker.as_deref(),
                "cast ballot contest",
                ctx,
            ) {
                Ok(digest) => digest,
                Err(e) => {
                    let _ = self.store.delete_local_branch(&branch_name);
                    self.rollback(&branches);
                    return Err(e);
                }
            };

            tracing::info!(
                uid = %contest.uid,
                branch = %branch_name,
                digest = %digest,
                "committed contest CVR locally"
            );

            if cloak_marker.is_some() {
                let peers = self.find_cloak_peers(&contest.uid, &branch_name)?;
                cloak_peers.insert(contest.uid.clone(), peers);
            }

            branches.insert(contest.uid.clone(), branch_name);
            contest_receipts.insert(contest.uid.clone(), digest);
        }

        // All contests are committed locally; now push each (re-pushing the
        // branch allocated earlier, this time carrying the CVR commit) and
        // release the local copy. The remote keeps every pushed branch for
        // the Merge Engine even though this actor drops it locally.
        for (uid, branch_name) in &branches {
            if let Err(e) = self.store.push_branch(branch_name) {
                tracing::error!(uid = %uid, branch = %branch_name, error = %e, "failed to push committed CVR branch");
                return Err(e);
            }
            if let Err(e) = self.store.delete_local_branch(branch_name) {
                tracing::warn!(uid = %uid, branch = %branch_name, error = %e, "failed to delete local branch after push");
            }
        }

        Ok(SubmissionOutcome {
            ballot_uid: cast.ballot_uid.clone(),
            branches,
            contest_receipts,
            cloak_peers,
            pending_pool,
        })
    }

    /// Rolls back every local branch created so far for this ballot (spec
    /// §4.2 failure semantics: a failure before all contests are pushed
    /// must undo local state; anything already pushed is left for the
    /// Merge Engine, which tolerates orphaned branches).
    fn rollback(&self, branches: &HashMap<String, String>) {
        for branch_name in branches.values() {
            let _ = self.store.delete_local_branch(branch_name);
        }
    }

    /// Allocates a uniquely named branch for `contest_uid`, rooted at a
    /// fresh random ancestor of `main` on every attempt, retrying up to
    /// `max_branch_allocation_attempts` times and rolling back the local
    /// branch on a push failure before retrying (spec §4.2).
    fn allocate_branch(&self, contest_uid: &str) -> Result<String> {
        let mut last_error = None;

        for attempt in 0..self.config.max_branch_allocation_attempts {
            let start_point = self.store.random_ancestor(MAIN_BRANCH)?;
            let token = random_branch_token();
            let branch_name = BranchRef::name_for(contest_uid, &token);

            if let Err(e) = self.store.create_branch(&branch_name, start_point) {
                tracing::warn!(uid = %contest_uid, attempt, error = %e, "branch allocation collided locally");
                last_error = Some(e);
                continue;
            }

            match self.store.push_branch(&branch_name) {
                Ok(()) => return Ok(branch_name),
                Err(e) => {
                    tracing::warn!(uid = %contest_uid, attempt, branch = %branch_name, error = %e, "branch push failed, rolling back");
                    // Best-effort rollback: a failure here does not mask
                    // the original push error.
                    let _ = self.store.delete_local_branch(&branch_name);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            BallotLogError::BranchCollision {
                uid: contest_uid.to_string(),
                attempts: self.config.max_branch_allocation_attempts,
            }
        }))
    }

    fn find_cloak_peers(&self, contest_uid: &str, own_branch: &str) -> Result<Vec<Digest>> {
        let mut peers = Vec::new();
        for head in self.all_pending_heads()? {
            if head.contest_uid != contest_uid || strip_remote_prefix(&head.branch) == own_branch {
                continue;
            }
            if self.store.read_cloak_marker(head.head)?.is_some() {
                peers.push(head.head);
            }
        }
        Ok(peers)
    }

    /// Unions local and remote-tracking pending CVR heads, deduplicating by
    /// branch identity (a local branch and its `origin/`-prefixed
    /// remote-tracking counterpart name the same branch). A submission
    /// actor drops its local branch copy immediately after pushing (spec
    /// §4.2 step 4), so anything but this actor's own in-flight ballot is
    /// visible only as a remote-tracking ref by the time the next ballot is
    /// submitted -- querying local branches alone would make every prior
    /// ballot's contests invisible to both the pending-pool snapshot and
    /// cloak-peer lookup.
    fn all_pending_heads(&self) -> Result<Vec<CvrHead>> {
        let mut seen = HashSet::new();
        let mut heads = Vec::new();
        for remote in [false, true] {
            for head in self.store.list_pending_cvr_heads(remote)? {
                if seen.insert(strip_remote_prefix(&head.branch).to_string()) {
                    heads.push(head);
                }
            }
        }
        Ok(heads)
    }
}

fn strip_remote_prefix(branch: &str) -> &str {
    branch.strip_prefix("origin/").unwrap_or(branch)
}

fn random_branch_token() -> String {
    let mut bytes = [0u8; ballotlog_core::constants::BRANCH_TOKEN_HEX_LEN / 2];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballotlog_logstore::{CvrHead, MockLogStore};
    use serde_json::json;

    fn contest(uid: &str) -> Contest {
        Contest::from_json_value(json!({
            "Race": {
                "uid": uid,
                "tally": "plurality",
                "win-by": "plurality",
                "candidates": ["Alice", "Bob"],
                "selection": [0]
            }
        }))
        .unwrap()
    }

    fn digest_of(bytes: &[u8]) -> Digest {
        Digest::from_oid(git2::Oid::hash_object(git2::ObjectType::Blob, bytes).unwrap())
    }

    #[test]
    fn submits_one_contest_and_records_its_digest() {
        let mut store = MockLogStore::new();
        let expected_digest = digest_of(b"commit-1");

        store
            .expect_random_ancestor()
            .returning(move |_| Ok(digest_of(b"root")));
        store.expect_create_branch().returning(|_, _| Ok(()));
        store.expect_push_branch().returning(|_| Ok(()));
        store.expect_delete_local_branch().returning(|_| Ok(()));
        store.expect_list_pending_cvr_heads().returning(|_| Ok(Vec::new()));
        store
            .expect_write_contest_payload()
            .returning(move |_, _, _, _, _| Ok(expected_digest));

        let engine = SubmissionEngine::new(store, LedgerConfig::new("/tmp/election"));
        let ballot = Ballot::new("precinct-1", vec![contest("president")]);
        let outcome = engine.submit_ballot(&ballot, &CommitContext::sentinel()).unwrap();

        assert_eq!(outcome.contest_receipts["president"], expected_digest);
        assert!(outcome.branches["president"].starts_with("CVRs/president/"));
    }

    #[test]
    fn retries_branch_allocation_after_a_push_failure() {
        let mut store = MockLogStore::new();
        store
            .expect_random_ancestor()
            .returning(move |_| Ok(digest_of(b"root")));
        store.expect_create_branch().returning(|_, _| Ok(()));
        store.expect_delete_local_branch().returning(|_| Ok(()));
        store.expect_list_pending_cvr_heads().returning(|_| Ok(Vec::new()));

        let mut call = 0;
        store.expect_push_branch().returning(move |_| {
            call += 1;
            if call == 1 {
                Err(BallotLogError::Other(anyhow::anyhow!("network blip")))
            } else {
                Ok(())
            }
        });
        store
            .expect_write_contest_payload()
            .returning(move |_, _, _, _, _| Ok(digest_of(b"commit-2")));

        let engine = SubmissionEngine::new(store, LedgerConfig::new("/tmp/election"));
        let ballot = Ballot::new("precinct-1", vec![contest("president")]);
        let outcome = engine.submit_ballot(&ballot, &CommitContext::sentinel()).unwrap();
        assert!(outcome.branches.contains_key("president"));
    }

    #[test]
    fn gives_up_after_max_branch_allocation_attempts() {
        let mut store = MockLogStore::new();
        store
            .expect_random_ancestor()
            .returning(move |_| Ok(digest_of(b"root")));
        store.expect_create_branch().returning(|_, _| Ok(()));
        store.expect_delete_local_branch().returning(|_| Ok(()));
        store.expect_list_pending_cvr_heads().returning(|_| Ok(Vec::new()));
        store
            .expect_push_branch()
            .returning(|_| Err(BallotLogError::Other(anyhow::anyhow!("always fails"))));

        let engine = SubmissionEngine::new(store, LedgerConfig::new("/tmp/election"));
        let ballot = Ballot::new("precinct-1", vec![contest("president")]);
        assert!(engine.submit_ballot(&ballot, &CommitContext::sentinel()).is_err());
    }

    #[test]
    fn rolls_back_earlier_contests_when_a_later_one_fails_to_commit() {
        let mut store = MockLogStore::new();
        store
            .expect_random_ancestor()
            .returning(move |_| Ok(digest_of(b"root")));
        store.expect_create_branch().returning(|_, _| Ok(()));
        store.expect_push_branch().returning(|_| Ok(()));
        store.expect_list_pending_cvr_heads().returning(|_| Ok(Vec::new()));

        let deleted = std::sync::Arc::new(std::sync::Mutex::new(std::collections::HashSet::new()));
        let deleted_handle = deleted.clone();
        store.expect_delete_local_branch().returning(move |name| {
            deleted_handle.lock().unwrap().insert(name.to_string());
            Ok(())
        });

        let mut call = 0;
        store.expect_write_contest_payload().returning(move |_, _, _, _, _| {
            call += 1;
            if call == 1 {
                Ok(digest_of(b"commit-president"))
            } else {
                Err(BallotLogError::Other(anyhow::anyhow!("disk full")))
            }
        });

        let engine = SubmissionEngine::new(store, LedgerConfig::new("/tmp/election"));
        let ballot = Ballot::new(
            "precinct-1",
            vec![contest("president"), contest("school-board")],
        );
        let result = engine.submit_ballot(&ballot, &CommitContext::sentinel());
        assert!(result.is_err());
        // The first contest's local branch must be rolled back even though
        // it committed successfully, since the ballot as a whole never
        // reached "every contest pushed" (spec §4.2 failure semantics).
        assert_eq!(deleted.lock().unwrap().len(), 2);
    }

    #[test]
    fn collects_cloak_peers_for_cloaked_contests() {
        let mut store = MockLogStore::new();
        store
            .expect_random_ancestor()
            .returning(move |_| Ok(digest_of(b"root")));
        store.expect_create_branch().returning(|_, _| Ok(()));
        store.expect_push_branch().returning(|_| Ok(()));
        store.expect_delete_local_branch().returning(|_| Ok(()));
        store
            .expect_write_contest_payload()
            .returning(move |_, _, _, _, _| Ok(digest_of(b"commit-3")));
        store.expect_list_pending_cvr_heads().returning(|_| {
            Ok(vec![CvrHead {
                branch: "CVRs/president/deadbeef01".to_string(),
                contest_uid: "president".to_string(),
                head: digest_of(b"peer"),
            }])
        });
        store
            .expect_read_cloak_marker()
            .returning(|_| Ok(Some(br#"{"uid":"president"}"#.to_vec())));

        let mut cast_contest = contest("president");
        cast_contest.cloak = Some(true);
        let engine = SubmissionEngine::new(store, LedgerConfig::new("/tmp/election"));
        let ballot = Ballot::new("precinct-1", vec![cast_contest]);
        let outcome = engine.submit_ballot(&ballot, &CommitContext::sentinel()).unwrap();

        assert_eq!(outcome.cloak_peers["president"].len(), 1);
    }
}
