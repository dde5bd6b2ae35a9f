//! Operation results

use serde_json::{json, Map, Value};

use crate::kv::Versionstamp;
use crate::row::{Row, RowId};

/// Marker record returned by successful writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Success {
    /// Row assigned or confirmed by the write, if it concerns one row
    pub id: Option<RowId>,
    /// Versionstamp of the commit
    pub versionstamp: Versionstamp,
}

impl Success {
    pub fn to_json(&self) -> Value {
        let mut obj = Map::new();
        if let Some(id) = self.id {
            obj.insert("id".into(), id.to_json());
        }
        obj.insert("versionstamp".into(), json!(self.versionstamp.to_string()));
        Value::Object(obj)
    }
}

/// Result of a compiled operation
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    /// Absent row, null column, or a transaction that lost its checks
    Null,
    /// Leaf column value
    Value(Value),
    /// One row
    Row(Row),
    /// Rows of a list reference, in stored order
    Rows(Vec<Row>),
    /// Write committed
    Success(Success),
}

impl Output {
    pub fn is_null(&self) -> bool {
        matches!(self, Output::Null)
    }

    pub fn as_row(&self) -> Option<&Row> {
        match self {
            Output::Row(row) => Some(row),
            _ => None,
        }
    }

    pub fn into_row(self) -> Option<Row> {
        match self {
            Output::Row(row) => Some(row),
            _ => None,
        }
    }

    pub fn as_rows(&self) -> Option<&[Row]> {
        match self {
            Output::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn as_success(&self) -> Option<&Success> {
        match self {
            Output::Success(success) => Some(success),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Output::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Output::Null => Value::Null,
            Output::Value(value) => value.clone(),
            Output::Row(row) => row.to_json(),
            Output::Rows(rows) => Value::Array(rows.iter().map(Row::to_json).collect()),
            Output::Success(success) => success.to_json(),
        }
    }
}
