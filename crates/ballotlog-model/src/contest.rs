// SPDX-License-Identifier: Apache-2.0

use ballotlog_core::SchemaError;
use serde_json::{Map, Value};

use crate::choices::Choices;
use crate::json::to_stable_json_bytes;
use crate::selection::Selection;
use crate::tally::Tally;

/// Every key a contest's inner JSON object may carry. Anything else is a
/// `schema_error` (spec §3: "A contest blob carries exactly the keys listed
/// above; unknown keys are rejected").
const ALLOWED_KEYS: &[&str] = &[
    "candidates",
    "question",
    "tally",
    "win-by",
    "max",
    "write-in",
    "selection",
    "uid",
    "cast_branch",
    "cloak",
];

/// One race or question on a ballot.
///
/// The wire form (spec §6) wraps this in a single-key JSON object keyed by
/// `name`; [`Contest::name`] is that key, not an inner field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contest {
    pub uid: String,
    pub name: String,
    pub tally: Tally,
    pub max: u32,
    pub win_by: String,
    pub choices: Choices,
    pub selection: Option<Selection>,
    pub write_in: Option<bool>,
    pub cloak: Option<bool>,
    pub cast_branch: Option<String>,
}

impl Contest {
    /// Parses one contest document, enforcing the schema invariants that
    /// hold regardless of whether this turns out to be a blank or cast
    /// contest: known keys only, `max >= 1`, exactly one of
    /// `candidates`/`question`.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, SchemaError> {
        let doc: Value =
            serde_json::from_slice(bytes).map_err(|e| SchemaError::Malformed(e.to_string()))?;
        Self::from_json_value(doc)
    }

    pub fn from_json_value(doc: Value) -> Result<Self, SchemaError> {
        let Value::Object(outer) = doc else {
            return Err(SchemaError::Malformed(
                "contest document must be a JSON object".to_string(),
            ));
        };
        if outer.len() != 1 {
            return Err(SchemaError::NotSingleKeyedDocument(outer.len()));
        }
        let (name, inner) = outer.into_iter().next().expect("checked len == 1");
        let Value::Object(fields) = inner else {
            return Err(SchemaError::Malformed(format!(
                "contest `{name}` value must be a JSON object"
            )));
        };

        for key in fields.keys() {
            if !ALLOWED_KEYS.contains(&key.as_str()) {
                return Err(SchemaError::UnknownKey(key.clone()));
            }
        }

        let uid = take_string(&fields, "uid")?;
        let tally_str = take_string(&fields, "tally")?;
        let tally = Tally::parse(&tally_str)
            .ok_or_else(|| SchemaError::Malformed(format!("unknown tally method `{tally_str}`")))?;
        let win_by = take_string(&fields, "win-by")?;

        let has_candidates = fields.contains_key("candidates");
        let has_question = fields.contains_key("question");
        let choices = match (has_candidates, has_question) {
            (true, false) => Choices::Candidates(take_string_vec(&fields, "candidates")?),
            (false, true) => Choices::Question(take_string(&fields, "question")?),
            (a, b) => {
                return Err(SchemaError::ChoicesAmbiguous(a as usize + b as usize));
            }
        };

        let max = match fields.get("max") {
            Some(v) => {
                let n = v
                    .as_i64()
                    .ok_or_else(|| SchemaError::Malformed("`max` must be an integer".to_string()))?;
                if n < 1 {
                    return Err(SchemaError::MaxLessThanOne(n));
                }
                n as u32
            }
            None => {
                if tally == Tally::Plurality {
                    1
                } else {
                    return Err(SchemaError::MissingMaxForNonPlurality {
                        uid,
                        tally: tally.as_str().to_string(),
                    });
                }
            }
        };

        let selection = match fields.get("selection") {
            Some(v) => Some(parse_selection(v, tally)?),
            None => None,
        };

        let write_in = match fields.get("write-in") {
            Some(v) => Some(v.as_bool().ok_or_else(|| {
                SchemaError::Malformed("`write-in` must be a boolean".to_string())
            })?),
            None => None,
        };

        let cloak = match fields.get("cloak") {
            Some(v) => {
                Some(v.as_bool().ok_or_else(|| {
                    SchemaError::Malformed("`cloak` must be a boolean".to_string())
                })?)
            }
            None => None,
        };

        let cast_branch = match fields.get("cast_branch") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                return Err(SchemaError::Malformed(
                    "`cast_branch` must be a string".to_string(),
                ))
            }
            None => None,
        };

        Ok(Contest {
            uid,
            name,
            tally,
            max,
            win_by,
            choices,
            selection,
            write_in,
            cloak,
            cast_branch,
        })
    }

    /// Re-encodes this contest as the stable (sorted-key, UTF-8) wire JSON
    /// described by spec §6. This is exactly the bytes committed to the log
    /// store.
    pub fn to_stable_json(&self) -> Vec<u8> {
        to_stable_json_bytes(&self.to_json_value())
    }

    pub fn to_json_value(&self) -> Value {
        let mut fields = Map::new();
        fields.insert("uid".to_string(), Value::String(self.uid.clone()));
        fields.insert(
            "tally".to_string(),
            Value::String(self.tally.as_str().to_string()),
        );
        fields.insert("win-by".to_string(), Value::String(self.win_by.clone()));
        fields.insert("max".to_string(), Value::from(self.max));
        match &self.choices {
            Choices::Candidates(c) => {
                fields.insert(
                    "candidates".to_string(),
                    Value::Array(c.iter().cloned().map(Value::String).collect()),
                );
            }
            Choices::Question(q) => {
                fields.insert("question".to_string(), Value::String(q.clone()));
            }
        }
        if let Some(selection) = &self.selection {
            fields.insert(
                "selection".to_string(),
                Value::Array(
                    selection
                        .indices()
                        .iter()
                        .map(|i| Value::from(*i as u64))
                        .collect(),
                ),
            );
        }
        if let Some(write_in) = self.write_in {
            fields.insert("write-in".to_string(), Value::Bool(write_in));
        }
        if let Some(cloak) = self.cloak {
            fields.insert("cloak".to_string(), Value::Bool(cloak));
        }
        if let Some(cast_branch) = &self.cast_branch {
            fields.insert("cast_branch".to_string(), Value::String(cast_branch.clone()));
        }
        let mut outer = Map::new();
        outer.insert(self.name.clone(), Value::Object(fields));
        Value::Object(outer)
    }

    /// Checks the invariants that hold on a blank (un-cast) contest: no
    /// `selection`.
    pub fn validate_as_blank(&self) -> Result<(), SchemaError> {
        if self.selection.is_some() {
            return Err(SchemaError::SelectionOnBlankContest(self.uid.clone()));
        }
        Ok(())
    }

    /// Checks the invariants that hold on a cast contest: `selection`
    /// present, every index in range, no duplicates, and (for
    /// non-ranked tallies) no more than `max` choices made.
    pub fn validate_as_cast(&self) -> Result<(), SchemaError> {
        let selection = self
            .selection
            .as_ref()
            .ok_or_else(|| SchemaError::MissingSelection(self.uid.clone()))?;

        let num_choices = self.choices.len();
        for &index in selection.indices() {
            if index >= num_choices {
                return Err(SchemaError::SelectionOutOfRange {
                    uid: self.uid.clone(),
                    index,
                    num_choices,
                });
            }
        }

        if selection.has_duplicates() {
            return Err(SchemaError::DuplicateSelection(self.uid.clone()));
        }

        if !self.tally.is_ranked() && selection.indices().len() as u32 > self.max {
            return Err(SchemaError::TooManySelections {
                uid: self.uid.clone(),
                max: self.max,
                got: selection.indices().len(),
            });
        }

        Ok(())
    }
}

fn parse_selection(value: &Value, tally: Tally) -> Result<Selection, SchemaError> {
    let Value::Array(items) = value else {
        return Err(SchemaError::Malformed(
            "`selection` must be an array of indices".to_string(),
        ));
    };
    let mut indices = Vec::with_capacity(items.len());
    for item in items {
        let n = item
            .as_u64()
            .ok_or_else(|| SchemaError::Malformed("selection indices must be non-negative integers".to_string()))?;
        indices.push(n as usize);
    }
    Ok(if tally.is_ranked() {
        Selection::Ranked(indices)
    } else {
        Selection::Unranked(indices)
    })
}

fn take_string(fields: &Map<String, Value>, key: &'static str) -> Result<String, SchemaError> {
    match fields.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(SchemaError::Malformed(format!("`{key}` must be a string"))),
        None => Err(SchemaError::MissingRequiredField(key)),
    }
}

fn take_string_vec(fields: &Map<String, Value>, key: &'static str) -> Result<Vec<String>, SchemaError> {
    match fields.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| SchemaError::Malformed(format!("`{key}` entries must be strings")))
            })
            .collect(),
        Some(_) => Err(SchemaError::Malformed(format!("`{key}` must be an array of strings"))),
        None => Err(SchemaError::MissingRequiredField(key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn blank_plurality() -> Value {
        json!({
            "President": {
                "uid": "president",
                "tally": "plurality",
                "win-by": "plurality",
                "candidates": ["Alice", "Bob"]
            }
        })
    }

    #[test]
    fn parses_blank_plurality_contest_with_default_max() {
        let contest = Contest::from_json_value(blank_plurality()).unwrap();
        assert_eq!(contest.max, 1);
        assert_eq!(contest.name, "President");
        assert!(contest.selection.is_none());
        contest.validate_as_blank().unwrap();
    }

    #[test]
    fn rejects_unknown_key() {
        let mut doc = blank_plurality();
        doc["President"]["bogus"] = json!(true);
        let err = Contest::from_json_value(doc).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownKey(k) if k == "bogus"));
    }

    #[test]
    fn rejects_max_less_than_one() {
        let mut doc = blank_plurality();
        doc["President"]["max"] = json!(0);
        let err = Contest::from_json_value(doc).unwrap_err();
        assert!(matches!(err, SchemaError::MaxLessThanOne(0)));
    }

    #[test]
    fn requires_max_for_non_plurality_tally() {
        let mut doc = blank_plurality();
        doc["President"]["tally"] = json!("rcv");
        let err = Contest::from_json_value(doc).unwrap_err();
        assert!(matches!(err, SchemaError::MissingMaxForNonPlurality { .. }));
    }

    #[test]
    fn rejects_both_candidates_and_question() {
        let mut doc = blank_plurality();
        doc["President"]["question"] = json!("Yes or no?");
        let err = Contest::from_json_value(doc).unwrap_err();
        assert!(matches!(err, SchemaError::ChoicesAmbiguous(2)));
    }

    #[test]
    fn cast_contest_round_trips_and_validates() {
        let mut doc = blank_plurality();
        doc["President"]["selection"] = json!([1]);
        let contest = Contest::from_json_value(doc).unwrap();
        contest.validate_as_cast().unwrap();

        let reparsed = Contest::from_json_slice(&contest.to_stable_json()).unwrap();
        assert_eq!(reparsed, contest);
    }

    #[test]
    fn blank_contest_rejects_selection() {
        let mut doc = blank_plurality();
        doc["President"]["selection"] = json!([0]);
        let contest = Contest::from_json_value(doc).unwrap();
        assert!(matches!(
            contest.validate_as_blank(),
            Err(SchemaError::SelectionOnBlankContest(_))
        ));
    }

    #[test]
    fn cast_contest_rejects_out_of_range_selection() {
        let mut doc = blank_plurality();
        doc["President"]["selection"] = json!([5]);
        let contest = Contest::from_json_value(doc).unwrap();
        assert!(matches!(
            contest.validate_as_cast(),
            Err(SchemaError::SelectionOutOfRange { .. })
        ));
    }

    #[test]
    fn cast_contest_rejects_too_many_plurality_selections() {
        let mut doc = blank_plurality();
        doc["President"]["selection"] = json!([0, 1]);
        let contest = Contest::from_json_value(doc).unwrap();
        assert!(matches!(
            contest.validate_as_cast(),
            Err(SchemaError::TooManySelections { .. })
        ));
    }

    #[test]
    fn ranked_selection_rejects_duplicates() {
        let mut doc = blank_plurality();
        doc["President"]["tally"] = json!("rcv");
        doc["President"]["max"] = json!(2);
        doc["President"]["selection"] = json!([0, 0]);
        let contest = Contest::from_json_value(doc).unwrap();
        assert!(matches!(
            contest.validate_as_cast(),
            Err(SchemaError::DuplicateSelection(_))
        ));
    }

    #[test]
    fn stable_json_has_sorted_keys() {
        let contest = Contest::from_json_value(blank_plurality()).unwrap();
        let bytes = contest.to_stable_json();
        let text = String::from_utf8(bytes).unwrap();
        // "candidates" < "max" < "tally" < "uid" < "win-by" alphabetically.
        let candidates_pos = text.find("candidates").unwrap();
        let max_pos = text.find("max").unwrap();
        let tally_pos = text.find("tally").unwrap();
        let uid_pos = text.find("uid").unwrap();
        let win_by_pos = text.find("win-by").unwrap();
        assert!(candidates_pos < max_pos);
        assert!(max_pos < tally_pos);
        assert!(tally_pos < uid_pos);
        assert!(uid_pos < win_by_pos);
    }
}
