// SPDX-License-Identifier: Apache-2.0

//! Ballot and contest data types: the wire schema described in spec §3 and
//! §6, independent of how they are stored, validated against each other, or
//! merged.

mod ballot;
mod choices;
mod contest;
mod json;
mod selection;
mod tally;

pub use ballot::Ballot;
pub use choices::Choices;
pub use contest::Contest;
pub use json::to_stable_json_bytes;
pub use selection::Selection;
pub use tally::Tally;
