// SPDX-License-Identifier: Apache-2.0

/// The candidate list or free-form question text for a contest. Exactly one
/// variant is ever present on a given contest (spec §3: "Exactly one of the
/// two must be present").
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Choices {
    Candidates(Vec<String>),
    Question(String),
}

impl Choices {
    /// Number of selectable indices. A free-form question has none to index
    /// into; callers that need an index range should treat this as zero.
    pub fn len(&self) -> usize {
        match self {
            Choices::Candidates(c) => c.len(),
            Choices::Question(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_candidates(&self) -> Option<&[String]> {
        match self {
            Choices::Candidates(c) => Some(c),
            Choices::Question(_) => None,
        }
    }
}
