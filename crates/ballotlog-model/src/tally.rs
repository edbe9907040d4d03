// SPDX-License-Identifier: Apache-2.0

use std::fmt;

/// The tallying method for one contest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tally {
    Plurality,
    Rcv,
    Approval,
}

impl Tally {
    pub fn as_str(self) -> &'static str {
        match self {
            Tally::Plurality => "plurality",
            Tally::Rcv => "rcv",
            Tally::Approval => "approval",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "plurality" => Some(Tally::Plurality),
            "rcv" => Some(Tally::Rcv),
            "approval" => Some(Tally::Approval),
            _ => None,
        }
    }

    /// Whether a `selection` for this tally is an ordered ranking (`rcv`) as
    /// opposed to an unordered set of up to `max` choices.
    pub fn is_ranked(self) -> bool {
        matches!(self, Tally::Rcv)
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
