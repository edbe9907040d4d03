// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// A contest or ballot blob failed the schema validator (spec §4.5, §7).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("contest document must have exactly one top-level key (the contest name), found {0}")]
    NotSingleKeyedDocument(usize),

    #[error("contest is missing required field `{0}`")]
    MissingRequiredField(&'static str),

    #[error("contest blob has unknown key `{0}`")]
    UnknownKey(String),

    #[error("contest `max` must be >= 1, got {0}")]
    MaxLessThanOne(i64),

    #[error("non-plurality contest `{uid}` (tally={tally}) has no explicit `max`")]
    MissingMaxForNonPlurality { uid: String, tally: String },

    #[error("contest blob must have exactly one of `candidates` or `question`, has {0}")]
    ChoicesAmbiguous(usize),

    #[error("blank contest `{0}` must not carry a `selection`")]
    SelectionOnBlankContest(String),

    #[error("cast contest `{0}` is missing a `selection`")]
    MissingSelection(String),

    #[error("selection index {index} out of range for contest `{uid}` with {num_choices} choices")]
    SelectionOutOfRange {
        uid: String,
        index: usize,
        num_choices: usize,
    },

    #[error("plurality/approval contest `{uid}` allows at most {max} selections, got {got}")]
    TooManySelections { uid: String, max: u32, got: usize },

    #[error("selection for contest `{0}` contains a duplicate index")]
    DuplicateSelection(String),

    #[error("malformed contest document: {0}")]
    Malformed(String),
}

/// A cast ballot disagreed with the blank ballot it was checked against
/// (spec §4.5, §7).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("cast ballot has no blank contest matching uid `{0}`")]
    NoMatchingBlankContest(String),

    #[error("contest `{uid}` choices do not match the blank ballot's choices")]
    ChoicesMismatch { uid: String },

    #[error("contest `{0}` selection failed schema validation: {1}")]
    MalformedSelection(String, SchemaError),
}

/// The top-level error type for the ballot ledger core.
///
/// `insufficient_anonymity` and `merge_empty_diff` are deliberately *not*
/// variants here: spec §7 classifies them as non-fatal, logged warnings that
/// let the operation continue, so they are modeled as `Ok`-carried
/// [`Warning`] values rather than errors.
#[derive(Debug, Error)]
pub enum BallotLogError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("log store I/O error: {0}")]
    LogStoreIo(#[from] git2::Error),

    #[error("could not allocate a unique branch for contest `{uid}` after {attempts} attempts")]
    BranchCollision { uid: String, attempts: u32 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, BallotLogError>;

/// Non-fatal conditions that a caller should surface (logged at `warn`) but
/// that do not abort the operation they arose in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// The Receipt Builder could not fill an `R`-row receipt; the returned
    /// receipt is empty.
    InsufficientAnonymity { uid: String, pool_size: usize, required: usize },
    /// A branch slated for merge showed no changed payload file; it was
    /// skipped rather than merged.
    MergeEmptyDiff { branch: String },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::InsufficientAnonymity {
                uid,
                pool_size,
                required,
            } => write!(
                f,
                "insufficient anonymity for contest `{uid}`: pool has {pool_size}, need {required}"
            ),
            Warning::MergeEmptyDiff { branch } => {
                write!(f, "branch `{branch}` has no changed payload file, skipping")
            }
        }
    }
}
