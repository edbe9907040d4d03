// SPDX-License-Identifier: Apache-2.0

use ballotlog_core::{SchemaError, ValidationError};

use crate::contest::Contest;

/// An ordered collection of contests, either the blank template for a
/// precinct/district or a voter's cast selections (spec §3: "A ballot is an
/// ordered list of contests sharing a common geographic/administrative
/// scope").
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ballot {
    /// Identifies the geographic/administrative scope this ballot style
    /// belongs to (spec §3), e.g. a precinct or district code.
    pub ballot_uid: String,
    pub contests: Vec<Contest>,
}

impl Ballot {
    pub fn new(ballot_uid: impl Into<String>, contests: Vec<Contest>) -> Self {
        Ballot {
            ballot_uid: ballot_uid.into(),
            contests,
        }
    }

    /// Validates every contest on this ballot as blank.
    pub fn validate_as_blank(&self) -> Result<(), SchemaError> {
        for contest in &self.contests {
            contest.validate_as_blank()?;
        }
        Ok(())
    }

    /// Validates every contest on this ballot as cast, independent of any
    /// blank ballot to check against.
    pub fn validate_as_cast(&self) -> Result<(), SchemaError> {
        for contest in &self.contests {
            contest.validate_as_cast()?;
        }
        Ok(())
    }

    /// Cross-checks a cast ballot against the blank ballot it was generated
    /// from: every cast contest must have a matching blank contest (by
    /// `uid`) with the same choices (spec §4.5, "the cast ballot's contests
    /// must agree with the blank ballot's").
    pub fn validate_against_blank(&self, blank: &Ballot) -> Result<(), ValidationError> {
        for cast in &self.contests {
            let blank_contest = blank
                .contests
                .iter()
                .find(|b| b.uid == cast.uid)
                .ok_or_else(|| ValidationError::NoMatchingBlankContest(cast.uid.clone()))?;

            if blank_contest.choices != cast.choices {
                return Err(ValidationError::ChoicesMismatch {
                    uid: cast.uid.clone(),
                });
            }

            cast.validate_as_cast()
                .map_err(|e| ValidationError::MalformedSelection(cast.uid.clone(), e))?;
        }
        Ok(())
    }

    pub fn contest_by_uid(&self, uid: &str) -> Option<&Contest> {
        self.contests.iter().find(|c| c.uid == uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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
    fn cast_ballot_validates_against_matching_blank() {
        let blank = Ballot::new("precinct-1", vec![contest("race-1", None)]);
        let cast = Ballot::new("precinct-1", vec![contest("race-1", Some(vec![0]))]);
        cast.validate_against_blank(&blank).unwrap();
    }

    #[test]
    fn cast_ballot_rejects_unknown_contest_uid() {
        let blank = Ballot::new("precinct-1", vec![contest("race-1", None)]);
        let cast = Ballot::new("precinct-1", vec![contest("race-2", Some(vec![0]))]);
        assert!(matches!(
            cast.validate_against_blank(&blank),
            Err(ValidationError::NoMatchingBlankContest(_))
        ));
    }

    #[test]
    fn cast_ballot_rejects_choices_mismatch() {
        let blank = Ballot::new("precinct-1", vec![contest("race-1", None)]);
        let mut mismatched = contest("race-1", Some(vec![0]));
        mismatched.choices = crate::choices::Choices::Candidates(vec!["Carol".to_string()]);
        let cast = Ballot::new("precinct-1", vec![mismatched]);
        assert!(matches!(
            cast.validate_against_blank(&blank),
            Err(ValidationError::ChoicesMismatch { .. })
        ));
    }
}
