// SPDX-License-Identifier: Apache-2.0

//! Validation for blank and cast ballots: schema checks on a ballot in
//! isolation, and the cross-check of a cast ballot against the blank ballot
//! it was generated from (spec §4.5, §7).

use ballotlog_core::{Result as BallotLogResult, SchemaError, ValidationError};
use ballotlog_model::Ballot;

/// Validates a blank ballot: every contest must carry no `selection`.
pub fn validate_blank_ballot(blank: &Ballot) -> Result<(), SchemaError> {
    blank.validate_as_blank()
}

/// Validates a cast ballot against the blank ballot it was generated from:
/// every cast contest must match a blank contest by `uid` and `choices`,
/// and its selection must pass schema validation (range, duplicates, and,
/// for non-ranked tallies, the `max` cap).
pub fn validate_cast_ballot(cast: &Ballot, blank: &Ballot) -> Result<(), ValidationError> {
    cast.validate_against_blank(blank)
}

/// Runs [`validate_cast_ballot`] and logs the outcome at the appropriate
/// level, for callers (the Submission Engine) that want tracing output
/// without duplicating the log statement at every call site.
pub fn validate_cast_ballot_traced(cast: &Ballot, blank: &Ballot) -> BallotLogResult<()> {
    match validate_cast_ballot(cast, blank) {
        Ok(()) => {
            tracing::debug!(ballot_uid = %cast.ballot_uid, "cast ballot validated against blank");
            Ok(())
        }
        Err(e) => {
            tracing::warn!(ballot_uid = %cast.ballot_uid, error = %e, "cast ballot failed validation");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ballotlog_model::Contest;
    use serde_json::json;

    fn contest(uid: &str, selection: Option<Vec<usize>>) -> Contest {
        let mut doc = json!({
            "Race": {
                "uid": uid,
                "tally": "plurality",
                "win-by": "plurality",
                "candidates": ["Alice", "Bob"]
            }
        });
        if let Some(sel) = selection {
            doc["Race"]["selection"] = json!(sel);
        }
        Contest::from_json_value(doc).unwrap()
    }

    #[test]
    fn accepts_matching_cast_and_blank() {
        let blank = Ballot::new("precinct-1", vec![contest("race-1", None)]);
        let cast = Ballot::new("precinct-1", vec![contest("race-1", Some(vec![1]))]);
        validate_cast_ballot_traced(&cast, &blank).unwrap();
    }

    #[test]
    fn rejects_cast_ballot_with_no_matching_blank_contest() {
        let blank = Ballot::new("precinct-1", vec![contest("race-1", None)]);
        let cast = Ballot::new("precinct-1", vec![contest("race-2", Some(vec![0]))]);
        assert!(validate_cast_ballot_traced(&cast, &blank).is_err());
    }
}
