//! Mutation operations
//!
//! Every field of the mutation root carries exactly one of:
//!
//! - `@insert(table: "T")`: `(data: TInput!): Success!`
//! - `@delete(table: "T")`: `(id: ID!): Success`
//! - `@transaction`: returns a nullable object type whose fields are
//!   `@insert` / `@delete` sub-mutations, committed together
//!
//! `Success` is the marker object type for write results and must declare
//! a `versionstamp` field.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::Value;

use super::query::{check_id_argument, id_argument};
use super::table::{TableCompiler, TableDescriptor};
use crate::error::{Corruption, Error, Result, SchemaViolation};
use crate::kv::{Key, KvStore, ListSelector, Versionstamp, ID_COLUMN};
use crate::observability::{log_event_with_fields, Event};
use crate::output::{Output, Success};
use crate::row::RowId;
use crate::schema::{FieldDef, Schema, TypeKind, TypeRef};
use crate::txn::{Attempt, DeleteCondition, RetryPolicy, RowInsert, TransactionExecutor, WriteBatch};

/// Marker type returned by writes
pub const SUCCESS_TYPE: &str = "Success";
pub const INSERT_DIRECTIVE: &str = "insert";
pub const DELETE_DIRECTIVE: &str = "delete";
pub const TRANSACTION_DIRECTIVE: &str = "transaction";

const TABLE_ARGUMENT: &str = "table";
const DATA_ARGUMENT: &str = "data";
const VERSIONSTAMP_FIELD: &str = "versionstamp";

/// Insert with a store-assigned monotonic id
#[derive(Debug, Clone)]
pub struct InsertOperation {
    table: Arc<TableDescriptor>,
}

impl InsertOperation {
    pub fn table(&self) -> &Arc<TableDescriptor> {
        &self.table
    }

    /// Insert `args.data` under the next free id.
    ///
    /// The id is one past the table's last key. The commit is conditioned
    /// on that key being unchanged and on the new row being absent; a lost
    /// race re-reads and retries within `policy`.
    pub async fn invoke(
        &self,
        store: &dyn KvStore,
        policy: &RetryPolicy,
        args: &Value,
    ) -> Result<Output> {
        let data = args
            .get(DATA_ARGUMENT)
            .ok_or_else(|| Error::invalid_input("missing argument 'data'"))?;

        let success = policy
            .run(self.table.name(), |_| self.attempt(store, data))
            .await?;
        Ok(Output::Success(success))
    }

    async fn attempt(&self, store: &dyn KvStore, data: &Value) -> Result<Attempt<Success>> {
        let name = self.table.name();
        let selector = ListSelector::prefix(Key::table(name)).reverse().limit(1);
        let last = store.list(&selector).await?.into_iter().next();

        let mut batch = WriteBatch::new();
        let id = match last {
            None => RowId::new(1),
            Some(entry) => {
                let last_id = entry.key.row_id().ok_or_else(|| {
                    Error::corruption(Corruption::MalformedValue {
                        table: name.to_string(),
                        column: ID_COLUMN.to_string(),
                        reason: format!("unexpected key {}", entry.key),
                    })
                })?;
                batch.guard(entry.key, Some(entry.versionstamp));
                last_id.next()
            }
        }
        .ok_or_else(|| Error::invalid_input(format!("{}: row ids exhausted", name)))?;

        batch.insert(RowInsert::encode(&self.table, id, data)?);

        let executor = TransactionExecutor::new(store);
        Ok(match executor.execute(&batch).await?.versionstamp() {
            Some(versionstamp) => Attempt::Done(Success {
                id: Some(id),
                versionstamp,
            }),
            None => Attempt::Conflict,
        })
    }
}

/// Removal of one row and every entry under it
#[derive(Debug, Clone)]
pub struct DeleteOperation {
    table: Arc<TableDescriptor>,
}

impl DeleteOperation {
    pub fn table(&self) -> &Arc<TableDescriptor> {
        &self.table
    }

    /// Delete the row named by `args.id`. Deleting an absent row succeeds.
    pub async fn invoke(
        &self,
        store: &dyn KvStore,
        policy: &RetryPolicy,
        args: &Value,
    ) -> Result<Output> {
        let id = id_argument(args)?;
        let name = self.table.name();

        let success = policy
            .run(name, |_| async move {
                let mut batch = WriteBatch::new();
                batch.delete(name, id, DeleteCondition::Observed);
                let executor = TransactionExecutor::new(store);
                Ok(match executor.execute(&batch).await?.versionstamp() {
                    Some(versionstamp) => Attempt::Done(Success {
                        id: Some(id),
                        versionstamp,
                    }),
                    None => Attempt::Conflict,
                })
            })
            .await?;
        Ok(Output::Success(success))
    }
}

/// A sub-mutation of a transaction
#[derive(Debug, Clone)]
pub enum SubMutation {
    Insert(Arc<TableDescriptor>),
    Delete(Arc<TableDescriptor>),
}

impl SubMutation {
    pub fn table(&self) -> &Arc<TableDescriptor> {
        match self {
            SubMutation::Insert(table) | SubMutation::Delete(table) => table,
        }
    }
}

/// Several row inserts and deletes committed as one unit
#[derive(Debug, Clone)]
pub struct TransactionOperation {
    name: String,
    subs: BTreeMap<String, SubMutation>,
}

impl TransactionOperation {
    pub fn sub_mutations(&self) -> &BTreeMap<String, SubMutation> {
        &self.subs
    }

    /// Run the transaction.
    ///
    /// `args` maps sub-mutation names to row lists. Insert rows are
    /// `{"id", "data"}`; delete rows are `{"id", "versionstamp"}`.
    /// A failed check aborts everything and yields `Output::Null`. Naming
    /// one row twice, in one sub-mutation or across several, is
    /// `InvalidInput` and nothing is written.
    pub async fn invoke(&self, store: &dyn KvStore, args: &Value) -> Result<Output> {
        let batch = self.stage(args)?;

        let executor = TransactionExecutor::new(store);
        match executor.execute(&batch).await?.versionstamp() {
            Some(versionstamp) => Ok(Output::Success(Success {
                id: None,
                versionstamp,
            })),
            None => {
                let rows = batch.rows().len().to_string();
                log_event_with_fields(
                    Event::TransactionConflict,
                    &[("rows", rows.as_str()), ("transaction", self.name.as_str())],
                );
                Ok(Output::Null)
            }
        }
    }

    fn stage(&self, args: &Value) -> Result<WriteBatch> {
        let Value::Object(args) = args else {
            return Err(Error::invalid_input(format!(
                "{}: arguments must be an object",
                self.name
            )));
        };

        let mut batch = WriteBatch::new();
        let mut staged = BTreeSet::new();
        for (name, rows) in args {
            let sub = self.subs.get(name).ok_or_else(|| {
                Error::invalid_input(format!("{}: unknown sub-mutation '{}'", self.name, name))
            })?;
            let Value::Array(rows) = rows else {
                return Err(Error::invalid_input(format!(
                    "{}.{}: expected a list of rows",
                    self.name, name
                )));
            };

            for row in rows {
                let id = id_argument(row)?;
                if !staged.insert((sub.table().name(), id)) {
                    return Err(Error::invalid_input(format!(
                        "{}.{}: row {}({}) staged twice",
                        self.name,
                        name,
                        sub.table().name(),
                        id
                    )));
                }
                match sub {
                    SubMutation::Insert(table) => {
                        let data = row.get(DATA_ARGUMENT).ok_or_else(|| {
                            Error::invalid_input(format!("{}.{}: missing 'data'", self.name, name))
                        })?;
                        batch.insert(RowInsert::encode(table, id, data)?);
                    }
                    SubMutation::Delete(table) => {
                        let versionstamp = versionstamp_argument(&self.name, name, row)?;
                        batch.delete(
                            table.name(),
                            id,
                            DeleteCondition::Versionstamp(versionstamp),
                        );
                    }
                }
            }
        }
        Ok(batch)
    }
}

fn versionstamp_argument(txn: &str, sub: &str, row: &Value) -> Result<Versionstamp> {
    match row.get(VERSIONSTAMP_FIELD) {
        Some(Value::String(s)) => s
            .parse()
            .map_err(|e| Error::invalid_input(format!("{}.{}: {}", txn, sub, e))),
        Some(other) => Err(Error::invalid_input(format!(
            "{}.{}: versionstamp must be a string, got {}",
            txn, sub, other
        ))),
        None => Err(Error::invalid_input(format!(
            "{}.{}: missing 'versionstamp'",
            txn, sub
        ))),
    }
}

/// A compiled root mutation
#[derive(Debug, Clone)]
pub enum MutationOperation {
    Insert(InsertOperation),
    Delete(DeleteOperation),
    Transaction(TransactionOperation),
}

impl MutationOperation {
    pub async fn invoke(
        &self,
        store: &dyn KvStore,
        policy: &RetryPolicy,
        args: &Value,
    ) -> Result<Output> {
        match self {
            MutationOperation::Insert(op) => op.invoke(store, policy, args).await,
            MutationOperation::Delete(op) => op.invoke(store, policy, args).await,
            MutationOperation::Transaction(op) => op.invoke(store, args).await,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            MutationOperation::Insert(_) => INSERT_DIRECTIVE,
            MutationOperation::Delete(_) => DELETE_DIRECTIVE,
            MutationOperation::Transaction(_) => TRANSACTION_DIRECTIVE,
        }
    }
}

/// Which write a field declares
enum Annotation<'f> {
    Insert(&'f str),
    Delete(&'f str),
    Transaction,
}

/// Compiles the fields of the mutation root.
pub struct MutationOperationBuilder;

impl MutationOperationBuilder {
    pub fn build(compiler: &mut TableCompiler<'_>) -> Result<BTreeMap<String, MutationOperation>> {
        let schema = compiler.schema();
        let mut ops = BTreeMap::new();
        let Some(mutation) = schema.mutation_type() else {
            return Ok(ops);
        };

        for field in &mutation.fields {
            let location = format!("{}.{}", mutation.name, field.name);
            let op = match annotation(&location, field)? {
                Annotation::Insert(table) => {
                    MutationOperation::Insert(Self::insert(compiler, &location, field, table)?)
                }
                Annotation::Delete(table) => {
                    MutationOperation::Delete(Self::delete(compiler, &location, field, table)?)
                }
                Annotation::Transaction => {
                    MutationOperation::Transaction(Self::transaction(compiler, &location, field)?)
                }
            };
            ops.insert(field.name.clone(), op);
        }
        Ok(ops)
    }

    fn insert(
        compiler: &mut TableCompiler<'_>,
        location: &str,
        field: &FieldDef,
        table: &str,
    ) -> Result<InsertOperation> {
        let schema = compiler.schema();
        check_success(schema, location, &field.ty, true)?;
        let table = compile_target(compiler, location, table)?;

        let [arg] = field.args.as_slice() else {
            return Err(Error::invalid_schema(SchemaViolation::new(
                location,
                "exactly one argument 'data'",
                format!("{} arguments", field.args.len()),
            )));
        };
        if arg.name != DATA_ARGUMENT {
            return Err(Error::invalid_schema(SchemaViolation::new(
                location,
                "exactly one argument 'data'",
                format!("argument '{}'", arg.name),
            )));
        }

        let input_location = format!("{}({})", location, DATA_ARGUMENT);
        let input = match &arg.ty {
            TypeRef::NonNull(inner) => match inner.as_ref() {
                TypeRef::Named(name) => schema
                    .get(name)
                    .filter(|ty| ty.kind == TypeKind::InputObject),
                _ => None,
            },
            _ => None,
        }
        .ok_or_else(|| {
            Error::invalid_schema(SchemaViolation::new(
                &input_location,
                "a non-null input object",
                arg.ty.to_string(),
            ))
        })?;

        for column in table.data_columns() {
            let field_location = format!("{}.{}", input.name, column.name);
            let expected = column.input_type();
            match input.field(&column.name) {
                Some(f) if f.ty == expected => {}
                Some(f) => {
                    return Err(Error::invalid_schema(SchemaViolation::new(
                        field_location,
                        expected.to_string(),
                        f.ty.to_string(),
                    )));
                }
                None => {
                    return Err(Error::invalid_schema(SchemaViolation::missing(
                        field_location,
                        format!("a field of type {}", expected),
                    )));
                }
            }
        }
        if let Some(extra) = input
            .fields
            .iter()
            .find(|f| table.data_columns().all(|c| c.name != f.name))
        {
            return Err(Error::invalid_schema(SchemaViolation::new(
                format!("{}.{}", input.name, extra.name),
                format!("a column of {} other than 'id'", table.name()),
                "no such column",
            )));
        }

        Ok(InsertOperation { table })
    }

    fn delete(
        compiler: &mut TableCompiler<'_>,
        location: &str,
        field: &FieldDef,
        table: &str,
    ) -> Result<DeleteOperation> {
        check_success(compiler.schema(), location, &field.ty, false)?;
        check_id_argument(location, field)?;
        let table = compile_target(compiler, location, table)?;
        Ok(DeleteOperation { table })
    }

    fn transaction(
        compiler: &mut TableCompiler<'_>,
        location: &str,
        field: &FieldDef,
    ) -> Result<TransactionOperation> {
        let schema = compiler.schema();
        let ty = match &field.ty {
            TypeRef::Named(name) => schema.get(name).filter(|t| t.kind == TypeKind::Object),
            _ => None,
        }
        .ok_or_else(|| {
            Error::invalid_schema(SchemaViolation::new(
                location,
                "a nullable object type",
                field.ty.to_string(),
            ))
        })?;
        if ty.fields.is_empty() {
            return Err(Error::invalid_schema(SchemaViolation::missing(
                ty.name.as_str(),
                "at least one sub-mutation",
            )));
        }

        let mut subs = BTreeMap::new();
        for sub in &ty.fields {
            let sub_location = format!("{}.{}", ty.name, sub.name);
            let op = match annotation(&sub_location, sub)? {
                Annotation::Insert(table) => {
                    SubMutation::Insert(Self::insert(compiler, &sub_location, sub, table)?.table)
                }
                Annotation::Delete(table) => {
                    SubMutation::Delete(Self::delete(compiler, &sub_location, sub, table)?.table)
                }
                Annotation::Transaction => {
                    return Err(Error::invalid_schema(SchemaViolation::new(
                        sub_location,
                        "@insert or @delete",
                        "nested @transaction",
                    )));
                }
            };
            subs.insert(sub.name.clone(), op);
        }

        Ok(TransactionOperation {
            name: field.name.clone(),
            subs,
        })
    }
}

fn annotation<'f>(location: &str, field: &'f FieldDef) -> Result<Annotation<'f>> {
    let found: Vec<_> = field
        .directives
        .iter()
        .filter(|d| {
            [INSERT_DIRECTIVE, DELETE_DIRECTIVE, TRANSACTION_DIRECTIVE].contains(&d.name.as_str())
        })
        .collect();

    let [directive] = found.as_slice() else {
        let names: Vec<String> = found.iter().map(|d| format!("@{}", d.name)).collect();
        return Err(Error::invalid_schema(SchemaViolation::new(
            location,
            "exactly one of @insert, @delete, @transaction",
            if names.is_empty() {
                "none".to_string()
            } else {
                names.join(" ")
            },
        )));
    };
    let directive = *directive;

    if directive.name == TRANSACTION_DIRECTIVE {
        return Ok(Annotation::Transaction);
    }
    let table = directive.argument_str(TABLE_ARGUMENT).ok_or_else(|| {
        Error::invalid_schema(SchemaViolation::missing(
            location,
            format!("@{}(table: \"...\")", directive.name),
        ))
    })?;
    Ok(if directive.name == INSERT_DIRECTIVE {
        Annotation::Insert(table)
    } else {
        Annotation::Delete(table)
    })
}

fn compile_target(
    compiler: &mut TableCompiler<'_>,
    location: &str,
    table: &str,
) -> Result<Arc<TableDescriptor>> {
    if compiler.schema().get(table).is_none() {
        return Err(Error::invalid_schema(SchemaViolation::unknown_type(
            location, table,
        )));
    }
    compiler.compile(table)
}

/// The return type must be the marker type, non-null or nullable as asked.
fn check_success(schema: &Schema, location: &str, ty: &TypeRef, non_null: bool) -> Result<()> {
    let expected = if non_null {
        format!("{}!", SUCCESS_TYPE)
    } else {
        SUCCESS_TYPE.to_string()
    };
    if ty.to_string() != expected {
        return Err(Error::invalid_schema(SchemaViolation::new(
            location,
            expected,
            ty.to_string(),
        )));
    }

    match schema.get(SUCCESS_TYPE) {
        Some(marker) if marker.kind == TypeKind::Object => {
            if marker.field(VERSIONSTAMP_FIELD).is_none() {
                return Err(Error::invalid_schema(SchemaViolation::missing(
                    format!("{}.{}", SUCCESS_TYPE, VERSIONSTAMP_FIELD),
                    "a versionstamp field",
                )));
            }
            Ok(())
        }
        Some(marker) => Err(Error::invalid_schema(SchemaViolation::new(
            SUCCESS_TYPE,
            "an object type",
            marker.kind.kind_name(),
        ))),
        None => Err(Error::invalid_schema(SchemaViolation::unknown_type(
            location,
            SUCCESS_TYPE,
        ))),
    }
}
