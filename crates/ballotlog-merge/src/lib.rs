// SPDX-License-Identifier: Apache-2.0

//! Merge Engine: once a contest's pending CVR branches exceed the
//! k-anonymity threshold, randomly fold the surplus into `main`, replacing
//! each CVR's payload with a fresh witness value so the merged object can
//! no longer be traced back to a specific voter submission while its
//! ancestry (the branch commit itself) remains in the log for audit (spec
//! §4.3).

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ballotlog_config::LedgerConfig;
use ballotlog_core::constants::MAIN_BRANCH;
use ballotlog_core::{CommitContext, Digest, Result, Warning};
use ballotlog_logstore::LogStore;
use indexmap::IndexMap;
use rand::rngs::{OsRng, SmallRng};
use rand::{Rng, RngCore, SeedableRng};

/// Outcome of one `merge_pending` pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Number of branches folded into `main`, keyed by contest uid.
    pub merged_per_uid: HashMap<String, usize>,
    /// Non-fatal conditions encountered along the way (spec §7).
    pub warnings: Vec<Warning>,
}

pub struct MergeEngine<S: LogStore> {
    store: S,
    config: LedgerConfig,
}

impl<S: LogStore> MergeEngine<S> {
    pub fn new(store: S, config: LedgerConfig) -> Self {
        MergeEngine { store, config }
    }

    /// Merges exactly one named branch, bypassing the k-anonymity batching
    /// below (the `merge-contests --branch` shortcut).
    pub fn merge_explicit_branch(
        &self,
        branch: &str,
        remote: bool,
        ctx: &CommitContext,
    ) -> Result<Option<Digest>> {
        self.merge_one(branch, remote, ctx)
    }

    /// Groups every pending CVR branch by contest uid (first-seen order
    /// preserved) and, for each contest whose pool exceeds
    /// `minimum_cast_cache`, randomly merges the surplus into `main`. A
    /// contest at or below the threshold is skipped (logged as
    /// `insufficient_anonymity`) unless `flush` is set, in which case the
    /// whole pool is merged regardless of size.
    pub fn merge_pending(&self, flush: bool, remote: bool, ctx: &CommitContext) -> Result<MergeSummary> {
        self.store.pull_main()?;

        let mut grouped: IndexMap<String, Vec<String>> = IndexMap::new();
        for head in self.store.list_pending_cvr_heads(remote)? {
            grouped.entry(head.contest_uid).or_default().push(head.branch);
        }

        let mut summary = MergeSummary::default();
        // Unpredictable but not security-critical: merge ordering needn't
        // resist a determined adversary, only avoid an exploitable pattern.
        let mut rng = SmallRng::from_rng(rand::thread_rng())
            .map_err(|e| ballotlog_core::BallotLogError::Other(anyhow::anyhow!(e)))?;

        for (uid, mut batch) in grouped {
            let pool_size = batch.len();
            let count = if pool_size <= self.config.minimum_cast_cache {
                if flush {
                    pool_size
                } else {
                    tracing::info!(uid = %uid, pool_size, "contest not merged, pool below threshold");
                    summary.warnings.push(Warning::InsufficientAnonymity {
                        uid,
                        pool_size,
                        required: self.config.minimum_cast_cache + 1,
                    });
                    continue;
                }
            } else {
                pool_size - self.config.minimum_cast_cache
            };

            let mut merged = 0;
            for _ in 0..count {
                let pick = rng.gen_range(0..batch.len());
                let branch = batch.remove(pick);
                match self.merge_one(&branch, remote, ctx)? {
                    Some(_) => merged += 1,
                    None => summary.warnings.push(Warning::MergeEmptyDiff { branch }),
                }
            }
            tracing::info!(uid = %uid, merged, "merged contest branches");
            summary.merged_per_uid.insert(uid, merged);
        }

        Ok(summary)
    }

    fn merge_one(&self, branch: &str, remote: bool, ctx: &CommitContext) -> Result<Option<Digest>> {
        let witness = random_witness_value();
        let merged = self.store.merge_branch_into_main(branch, &witness, ctx)?;
        let Some(digest) = merged else {
            tracing::warn!(branch, "branch has no changed payload, skipping");
            return Ok(None);
        };

        self.store.push_branch(MAIN_BRANCH)?;
        if remote {
            let local_name = branch.strip_prefix("origin/").unwrap_or(branch);
            self.store.delete_remote_branch(local_name)?;
        } else {
            self.store.delete_remote_branch(branch)?;
            self.store.delete_local_branch(branch)?;
        }
        Ok(Some(digest))
    }
}

/// A fresh, cryptographically random replacement for a merged CVR's
/// payload (spec §4.3's "witness value"): derived from no election key or
/// ballot content, purely to sever the content link.
fn random_witness_value() -> Vec<u8> {
    let mut bytes = [0u8; 36];
    OsRng.fill_bytes(&mut bytes);
    BASE64.encode(bytes).into_bytes()
}
