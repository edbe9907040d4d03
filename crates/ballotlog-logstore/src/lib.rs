// SPDX-License-Identifier: Apache-2.0

//! The Log Store: a content-addressed, append-only DAG of commits backed by
//! a real git object database (spec §4.1). Callers never touch `git2`
//! directly; they go through [`LogStore`].

mod branch;
mod store;

pub use branch::BranchRef;
pub use store::{CvrHead, GitLogStore, LogStore};

#[cfg(any(test, feature = "mock"))]
pub use store::MockLogStore;
