//! Versionstamp - store-assigned commit version
//!
//! - Assigned once per successful atomic commit
//! - Strictly increasing across commits of one store
//! - Every entry written by a commit carries that commit's versionstamp
//! - Rendered on the wire as 20 lowercase hex digits

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Width of the wire encoding.
const ENCODED_LEN: usize = 20;

/// A totally ordered commit version.
///
/// There is no `Default`; versionstamps only come from a store commit or
/// from parsing a caller-supplied value.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Versionstamp(u64);

impl Versionstamp {
    #[inline]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn value(&self) -> u64 {
        self.0
    }

    /// The versionstamp following this one.
    #[inline]
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Versionstamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:020x}", self.0)
    }
}

/// Error returned for a malformed versionstamp string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseVersionstampError(String);

impl fmt::Display for ParseVersionstampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed versionstamp '{}'", self.0)
    }
}

impl std::error::Error for ParseVersionstampError {}

impl FromStr for Versionstamp {
    type Err = ParseVersionstampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != ENCODED_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseVersionstampError(s.to_string()));
        }
        // 20 hex digits can exceed u64; only the low 16 are significant.
        let (high, low) = s.split_at(ENCODED_LEN - 16);
        if high.bytes().any(|b| b != b'0') {
            return Err(ParseVersionstampError(s.to_string()));
        }
        u64::from_str_radix(low, 16)
            .map(Versionstamp)
            .map_err(|_| ParseVersionstampError(s.to_string()))
    }
}

impl Serialize for Versionstamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Versionstamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
