// SPDX-License-Identifier: Apache-2.0

//! Receipt Builder: produces the CSV a voter takes home. The voter's own
//! row of digests is hidden among `ballot_receipt_rows - 1` other unmerged
//! CVRs, shuffled per contest, so the receipt lets a voter confirm their
//! ballot was recorded without letting anyone else pick their row out of
//! the crowd (spec §4.4).

use std::collections::HashMap;

use ballotlog_config::LedgerConfig;
use ballotlog_core::{BallotLogError, Digest, Result, Warning};
use ballotlog_model::Ballot;
use indexmap::IndexMap;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// The built receipt, or the degraded (empty) form produced when one or
/// more contests don't yet have enough unmerged CVRs to hide behind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BallotReceipt {
    /// CSV bytes: a header row of `"<uid> - <contest name>"` columns
    /// followed by `ballot_receipt_rows` digest rows. Empty when degraded.
    pub csv_bytes: Vec<u8>,
    /// 1-based row (within the body, not counting the header) holding the
    /// voter's own digests. `None` when degraded.
    pub voters_row: Option<usize>,
    pub warnings: Vec<Warning>,
}

impl BallotReceipt {
    pub fn is_degraded(&self) -> bool {
        self.voters_row.is_none()
    }
}

pub struct ReceiptBuilder {
    config: LedgerConfig,
}

impl ReceiptBuilder {
    pub fn new(config: LedgerConfig) -> Self {
        ReceiptBuilder { config }
    }

    /// Builds the receipt for one cast ballot. `contest_receipts` is the
    /// voter's own digest per contest uid, as returned by the Submission
    /// Engine. `pending_pool` is the Pending Pool snapshot captured
    /// *before* this ballot's own branches were created (spec §4.2 step 2,
    /// §4.4): the Submission Engine retains it precisely so this builder
    /// never needs to query the log store itself, since by the time a
    /// receipt is built the voter's own branches may already be gone from
    /// local state.
    pub fn build_receipt(
        &self,
        ballot: &Ballot,
        contest_receipts: &HashMap<String, Digest>,
        pending_pool: &HashMap<String, Vec<Digest>>,
    ) -> Result<BallotReceipt> {
        let required = self.config.ballot_receipt_rows;

        let mut pools: IndexMap<String, Vec<Digest>> = pending_pool
            .iter()
            .map(|(uid, digests)| (uid.clone(), digests.clone()))
            .collect();

        let mut rng = SmallRng::from_rng(rand::thread_rng())
            .map_err(|e| BallotLogError::Other(anyhow::anyhow!(e)))?;

        let mut warnings = Vec::new();
        let mut degraded = false;
        for contest in &ballot.contests {
            match pools.get_mut(&contest.uid) {
                Some(pool) if pool.len() >= required => {
                    pool.shuffle(&mut rng);
                }
                Some(pool) => {
                    degraded = true;
                    warnings.push(Warning::InsufficientAnonymity {
                        uid: contest.uid.clone(),
                        pool_size: pool.len(),
                        required,
                    });
                }
                None => {
                    degraded = true;
                    warnings.push(Warning::InsufficientAnonymity {
                        uid: contest.uid.clone(),
                        pool_size: 0,
                        required,
                    });
                }
            }
        }

        if degraded {
            tracing::warn!(ballot_uid = %ballot.ballot_uid, "skipping ballot receipt, insufficient unmerged CVRs");
            return Ok(BallotReceipt {
                csv_bytes: Vec::new(),
                voters_row: None,
                warnings,
            });
        }

        // Not zero-based, matching the voter-facing row numbering.
        let voters_row = rng.gen_range(1..=required);

        let mut writer = csv::Writer::from_writer(Vec::new());
        let header: Vec<String> = ballot
            .contests
            .iter()
            .map(|c| format!("{} - {}", c.uid, c.name))
            .collect();
        writer
            .write_record(&header)
            .map_err(|e| BallotLogError::Other(anyhow::anyhow!(e)))?;

        for row in 0..required {
            let record: Vec<String> = ballot
                .contests
                .iter()
                .map(|contest| {
                    let voters_digest = contest_receipts[&contest.uid];
                    let digest = if row == voters_row - 1 {
                        voters_digest
                    } else {
                        let pool = &pools[&contest.uid];
                        let candidate = pool[row];
                        // The voter's own digest landed in the pool by
                        // chance at a non-voter row: swap in the row the
                        // voter's row will show instead, so no row other
                        // than `voters_row` can be matched to the voter.
                        if candidate == voters_digest {
                            pool[voters_row - 1]
                        } else {
                            candidate
                        }
                    };
                    digest.to_string()
                })
                .collect();
            writer
                .write_record(&record)
                .map_err(|e| BallotLogError::Other(anyhow::anyhow!(e)))?;
        }

        let csv_bytes = writer
            .into_inner()
            .map_err(|e| BallotLogError::Other(anyhow::anyhow!(e.to_string())))?;

        Ok(BallotReceipt {
            csv_bytes,
            voters_row: Some(voters_row),
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballotlog_model::Contest;
    use serde_json::json;

    fn digest_of(bytes: &[u8]) -> Digest {
        Digest::from_oid(git2::Oid::hash_object(git2::ObjectType::Blob, bytes).unwrap())
    }

    fn contest(uid: &str) -> Contest {
        Contest::from_json_value(json!({
            "President": {
                "uid": uid,
                "tally": "plurality",
                "win-by": "plurality",
                "candidates": ["Alice", "Bob"],
                "selection": [0]
            }
        }))
        .unwrap()
    }

    #[test]
    fn degrades_to_empty_receipt_when_pool_too_small() {
        let mut pending_pool = HashMap::new();
        pending_pool.insert("president".to_string(), vec![digest_of(b"a")]);

        let mut config = LedgerConfig::new("/tmp/election");
        config.ballot_receipt_rows = 10;
        let builder = ReceiptBuilder::new(config);
        let ballot = Ballot::new("precinct-1", vec![contest("president")]);
        let mut own = HashMap::new();
        own.insert("president".to_string(), digest_of(b"voter"));

        let receipt = builder.build_receipt(&ballot, &own, &pending_pool).unwrap();
        assert!(receipt.is_degraded());
        assert_eq!(receipt.warnings.len(), 1);
    }

    #[test]
    fn builds_full_receipt_with_voter_row_hidden() {
        let mut pending_pool = HashMap::new();
        pending_pool.insert(
            "president".to_string(),
            (0..5).map(|i| digest_of(format!("cvr-{i}").as_bytes())).collect(),
        );

        let mut config = LedgerConfig::new("/tmp/election");
        config.ballot_receipt_rows = 5;
        let builder = ReceiptBuilder::new(config);
        let ballot = Ballot::new("precinct-1", vec![contest("president")]);
        let mut own = HashMap::new();
        own.insert("president".to_string(), digest_of(b"voter-digest"));

        let receipt = builder.build_receipt(&ballot, &own, &pending_pool).unwrap();
        assert!(!receipt.is_degraded());
        assert!(receipt.warnings.is_empty());

        let text = String::from_utf8(receipt.csv_bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        // header + 5 rows
        assert_eq!(lines.len(), 6);
        assert!(lines[0].contains("president - President"));
        let voters_row = receipt.voters_row.unwrap();
        assert!(lines[voters_row].contains(&digest_of(b"voter-digest").to_string()));
    }
}
