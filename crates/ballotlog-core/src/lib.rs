// SPDX-License-Identifier: Apache-2.0

//! Shared foundation for the ballot ledger core: digests, deterministic
//! commit metadata, and the error/warning types every other crate in this
//! workspace builds on.

mod commit_context;
pub mod constants;
mod digest;
mod error;

pub use commit_context::CommitContext;
pub use digest::Digest;
pub use error::{BallotLogError, Result, SchemaError, ValidationError, Warning};
