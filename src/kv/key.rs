//! Ordered tuple keys
//!
//! Keys are tuples of parts. Ordering is part-wise: integers sort before
//! strings, integers numerically, strings by bytes, and a key sorts before
//! every key it is a prefix of.
//!
//! Row layout (one entry per column):
//! - `[table, id, "id"]` holds the row identifier and marks existence
//! - `[table, id, column]` holds a column value
//! - `[table, id, column, ref]` is the fan-out entry of a list reference

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::row::RowId;

/// Name of the identifier column.
pub const ID_COLUMN: &str = "id";

/// A single component of a key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPart {
    Int(u64),
    Str(String),
}

impl KeyPart {
    pub fn as_int(&self) -> Option<u64> {
        match self {
            KeyPart::Int(v) => Some(*v),
            KeyPart::Str(_) => None,
        }
    }
}

impl From<&str> for KeyPart {
    fn from(s: &str) -> Self {
        KeyPart::Str(s.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(s: String) -> Self {
        KeyPart::Str(s)
    }
}

impl From<u64> for KeyPart {
    fn from(v: u64) -> Self {
        KeyPart::Int(v)
    }
}

impl From<RowId> for KeyPart {
    fn from(id: RowId) -> Self {
        KeyPart::Int(id.value())
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Int(v) => write!(f, "{}", v),
            KeyPart::Str(s) => write!(f, "{:?}", s),
        }
    }
}

/// A tuple key in the ordered keyspace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(Vec<KeyPart>);

impl Key {
    pub fn new(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }

    /// Prefix covering every row of a table.
    pub fn table(table: &str) -> Self {
        Self(vec![table.into()])
    }

    /// Prefix covering every entry of one row.
    pub fn row(table: &str, id: RowId) -> Self {
        Self(vec![table.into(), id.into()])
    }

    /// The identifier entry of a row. Its presence defines row existence.
    pub fn id(table: &str, id: RowId) -> Self {
        Self::column(table, id, ID_COLUMN)
    }

    pub fn column(table: &str, id: RowId, column: &str) -> Self {
        Self(vec![table.into(), id.into(), column.into()])
    }

    /// Per-element entry of a list reference column.
    pub fn fan_out(table: &str, id: RowId, column: &str, target: RowId) -> Self {
        Self(vec![table.into(), id.into(), column.into(), target.into()])
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn starts_with(&self, prefix: &Key) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Row identifier encoded in a row-layout key, if any.
    pub fn row_id(&self) -> Option<RowId> {
        self.0.get(1).and_then(KeyPart::as_int).and_then(RowId::new)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", part)?;
        }
        write!(f, "]")
    }
}
