// SPDX-License-Identifier: Apache-2.0

/// A voter's selection for one contest.
///
/// `Unranked` covers plurality and approval contests: an unordered,
/// duplicate-free set of up to `max` choice indices (`max == 1` is the
/// familiar single-choice case). `Ranked` covers rcv: an ordered,
/// duplicate-free sequence of choice indices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selection {
    Unranked(Vec<usize>),
    Ranked(Vec<usize>),
}

impl Selection {
    pub fn indices(&self) -> &[usize] {
        match self {
            Selection::Unranked(v) | Selection::Ranked(v) => v,
        }
    }

    pub fn has_duplicates(&self) -> bool {
        let indices = self.indices();
        let mut seen = std::collections::HashSet::with_capacity(indices.len());
        for i in indices {
            if !seen.insert(i) {
                return true;
            }
        }
        false
    }
}
