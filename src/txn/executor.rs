//! Checks-before-writes execution of row writes
//!
//! A `WriteBatch` is a set of row inserts and row deletes that must apply
//! together. The executor turns it into one atomic store operation:
//!
//! 1. list the keys of every deleted row
//! 2. stage every check of every row
//! 3. stage every write of every row
//! 4. commit
//!
//! The store evaluates all checks against one state before it applies any
//! write, so staging all checks first keeps the batch all-or-nothing.

use serde_json::{Map, Value};

use crate::compiler::{ColumnDescriptor, ColumnKind, TableDescriptor};
use crate::error::{Error, Result};
use crate::kv::{AtomicOperation, Check, CommitResult, Key, KvStore, ListSelector, Versionstamp};
use crate::row::RowId;

/// Encoded entries of one new row
#[derive(Debug, Clone, PartialEq)]
pub struct RowInsert {
    table: String,
    id: RowId,
    entries: Vec<(Key, Value)>,
}

impl RowInsert {
    /// Validate `data` against the table's columns and encode it.
    ///
    /// `data` holds every column except `id`. References are given as
    /// id strings; list references also write one fan-out entry per id.
    pub fn encode(table: &TableDescriptor, id: RowId, data: &Value) -> Result<Self> {
        let Value::Object(data) = data else {
            return Err(Error::invalid_input(format!(
                "{}: insert data must be an object, got {}",
                table.name(),
                data
            )));
        };

        if let Some(unknown) = data
            .keys()
            .find(|name| table.data_columns().all(|c| &c.name != *name))
        {
            return Err(Error::invalid_input(format!(
                "{}: unknown column '{}'",
                table.name(),
                unknown
            )));
        }

        let name = table.name();
        let mut entries = vec![(Key::id(name, id), id.to_json())];
        for column in table.data_columns() {
            encode_column(name, id, column, data, &mut entries)?;
        }

        Ok(Self {
            table: name.to_string(),
            id,
            entries,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn id(&self) -> RowId {
        self.id
    }

    pub fn entries(&self) -> &[(Key, Value)] {
        &self.entries
    }
}

fn encode_column(
    table: &str,
    id: RowId,
    column: &ColumnDescriptor,
    data: &Map<String, Value>,
    entries: &mut Vec<(Key, Value)>,
) -> Result<()> {
    let location = format!("{}.{}", table, column.name);
    let value = match data.get(&column.name) {
        Some(Value::Null) | None if column.nullable => return Ok(()),
        Some(Value::Null) => {
            return Err(Error::invalid_input(format!("{}: must not be null", location)));
        }
        None => return Err(Error::invalid_input(format!("{}: missing", location))),
        Some(value) => value,
    };

    let key = Key::column(table, id, &column.name);
    match &column.kind {
        ColumnKind::Leaf => {
            check_leaf(&location, column, value)?;
            entries.push((key, value.clone()));
        }
        ColumnKind::SingleReference { .. } => {
            let target = parse_reference(&location, value)?;
            entries.push((key, target.to_json()));
        }
        ColumnKind::ReferenceList {
            element_nullable, ..
        } => {
            let Value::Array(items) = value else {
                return Err(Error::invalid_input(format!(
                    "{}: expected a list of ids, got {}",
                    location, value
                )));
            };
            if items.is_empty() && !element_nullable {
                return Err(Error::invalid_input(format!(
                    "{}: needs at least one reference",
                    location
                )));
            }

            let targets = items
                .iter()
                .map(|item| parse_reference(&location, item))
                .collect::<Result<Vec<_>>>()?;

            entries.push((key, Value::Array(targets.iter().map(RowId::to_json).collect())));
            for target in targets {
                entries.push((
                    Key::fan_out(table, id, &column.name, target),
                    target.to_json(),
                ));
            }
        }
    }
    Ok(())
}

fn parse_reference(location: &str, value: &Value) -> Result<RowId> {
    RowId::from_json(value).map_err(|e| Error::invalid_input(format!("{}: {}", location, e)))
}

/// Shape check for built-in scalars; enums and custom scalars pass as is.
fn check_leaf(location: &str, column: &ColumnDescriptor, value: &Value) -> Result<()> {
    let ok = match column.ty.base_name() {
        "String" | "ID" => value.is_string(),
        "Int" => value.is_i64() || value.is_u64(),
        "Float" => value.is_number(),
        "Boolean" => value.is_boolean(),
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(Error::invalid_input(format!(
            "{}: expected {}, got {}",
            location, column.ty, value
        )))
    }
}

/// How a row delete is conditioned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteCondition {
    /// The identifier entry must still be as it was when the row was listed
    Observed,
    /// The identifier entry must carry this versionstamp
    Versionstamp(Versionstamp),
}

/// Removal of every entry of one row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowDelete {
    pub table: String,
    pub id: RowId,
    pub condition: DeleteCondition,
}

/// One row-level write
#[derive(Debug, Clone, PartialEq)]
pub enum RowWrite {
    Insert(RowInsert),
    Delete(RowDelete),
}

/// Row writes plus extra checks committed as one unit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    rows: Vec<RowWrite>,
    guards: Vec<Check>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, row: RowInsert) -> &mut Self {
        self.rows.push(RowWrite::Insert(row));
        self
    }

    pub fn delete(&mut self, table: &str, id: RowId, condition: DeleteCondition) -> &mut Self {
        self.rows.push(RowWrite::Delete(RowDelete {
            table: table.to_string(),
            id,
            condition,
        }));
        self
    }

    /// Additional check that is not tied to a written row.
    pub fn guard(&mut self, key: Key, versionstamp: Option<Versionstamp>) -> &mut Self {
        self.guards.push(Check { key, versionstamp });
        self
    }

    pub fn rows(&self) -> &[RowWrite] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.guards.is_empty()
    }
}

/// Commits a `WriteBatch` against a store
pub struct TransactionExecutor<'a> {
    store: &'a dyn KvStore,
}

impl<'a> TransactionExecutor<'a> {
    pub fn new(store: &'a dyn KvStore) -> Self {
        Self { store }
    }

    /// Commit the batch. A failed check is `CommitResult::Conflict` and
    /// leaves the store untouched.
    pub async fn execute(&self, batch: &WriteBatch) -> Result<CommitResult> {
        let mut listed = Vec::new();
        for row in &batch.rows {
            if let RowWrite::Delete(delete) = row {
                let selector = ListSelector::prefix(Key::row(&delete.table, delete.id));
                listed.push(self.store.list(&selector).await?);
            }
        }

        let mut op = AtomicOperation::new();

        for guard in &batch.guards {
            op.check(guard.key.clone(), guard.versionstamp);
        }

        let mut deleted = listed.iter();
        for row in &batch.rows {
            match row {
                RowWrite::Insert(insert) => {
                    for (key, _) in &insert.entries {
                        op.check(key.clone(), None);
                    }
                }
                RowWrite::Delete(delete) => {
                    let id_key = Key::id(&delete.table, delete.id);
                    let expected = match delete.condition {
                        DeleteCondition::Versionstamp(vs) => Some(vs),
                        DeleteCondition::Observed => deleted
                            .next()
                            .and_then(|entries| entries.iter().find(|e| e.key == id_key))
                            .map(|e| e.versionstamp),
                    };
                    op.check(id_key, expected);
                }
            }
        }

        let mut deleted = listed.into_iter();
        for row in &batch.rows {
            match row {
                RowWrite::Insert(insert) => {
                    for (key, value) in &insert.entries {
                        op.set(key.clone(), value.clone());
                    }
                }
                RowWrite::Delete(_) => {
                    for entry in deleted.next().unwrap_or_default() {
                        op.delete(entry.key);
                    }
                }
            }
        }

        Ok(self.store.commit(op).await?)
    }
}
