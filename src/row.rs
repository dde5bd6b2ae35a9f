//! Row identity and fetched rows

use std::fmt;

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::kv::Versionstamp;

/// Positive integer row identifier, unique within one table.
///
/// On the wire (and inside stored reference values) it is a decimal string.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RowId(u64);

impl RowId {
    /// Returns `None` for zero.
    pub fn new(value: u64) -> Option<Self> {
        (value > 0).then_some(Self(value))
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// The identifier following this one.
    pub fn next(&self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }

    /// Parse a wire-encoded identifier.
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::invalid_input(format!("malformed id '{}'", s)));
        }
        let value: u64 = s
            .parse()
            .map_err(|_| Error::invalid_input(format!("id '{}' is out of range", s)))?;
        Self::new(value).ok_or_else(|| Error::invalid_input(format!("id '{}' is not positive", s)))
    }

    /// Parse an identifier held in a JSON value (must be a string).
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) => Self::parse(s),
            other => Err(Error::invalid_input(format!(
                "id must be a string, got {}",
                other
            ))),
        }
    }

    pub fn to_json(&self) -> Value {
        Value::String(self.to_string())
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A row read from the store.
///
/// `values` holds every present column exactly as stored, including `id`.
/// Absent columns are null. The versionstamp is the one of the row's
/// identifier entry; a transaction delete must present it.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    table: String,
    id: RowId,
    values: Map<String, Value>,
    versionstamp: Versionstamp,
}

impl Row {
    pub fn new(
        table: impl Into<String>,
        id: RowId,
        values: Map<String, Value>,
        versionstamp: Versionstamp,
    ) -> Self {
        Self {
            table: table.into(),
            id,
            values,
            versionstamp,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn id(&self) -> RowId {
        self.id
    }

    pub fn versionstamp(&self) -> Versionstamp {
        self.versionstamp
    }

    /// Stored value of a column, `None` when absent.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column).filter(|v| !v.is_null())
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.values.clone())
    }
}
