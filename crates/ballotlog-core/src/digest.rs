// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The content-addressed identifier of a commit in the log store.
///
/// This is a thin wrapper around a git object id so that callers outside of
/// `ballotlog-logstore` never need to depend on `git2` directly. It prints
/// and (de)serializes as the familiar hex string that ends up on a voter's
/// receipt.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Digest(#[serde(with = "hex_oid")] git2::Oid);

impl Digest {
    pub fn from_oid(oid: git2::Oid) -> Self {
        Self(oid)
    }

    pub fn oid(&self) -> git2::Oid {
        self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.0)
    }
}

impl FromStr for Digest {
    type Err = git2::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(git2::Oid::from_str(s)?))
    }
}

mod hex_oid {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(oid: &git2::Oid, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&oid.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<git2::Oid, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        git2::Oid::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display_and_from_str() {
        let oid = git2::Oid::hash_object(git2::ObjectType::Blob, b"hello").unwrap();
        let digest = Digest::from_oid(oid);
        let parsed: Digest = digest.to_string().parse().unwrap();
        assert_eq!(digest, parsed);
    }
}
