//! Schema loader
//!
//! Reads a schema document (JSON) and indexes it by type name. Loading
//! checks only that the graph is well formed:
//! - type names are unique and do not shadow built-in scalars
//! - field names are unique within a type
//! - every type reference names a declared or built-in type
//! - root operation types exist and are object types
//!
//! Table and operation shape is checked later by the compiler.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use serde_json::Value;

use super::types::{SchemaDocument, TypeDef, TypeKind, TypeRef, BUILTIN_SCALARS};
use crate::error::{Error, Result, SchemaViolation};

/// Indexed, validated type graph. Never mutated after loading.
#[derive(Debug, Clone)]
pub struct Schema {
    types: BTreeMap<String, TypeDef>,
    query: Option<String>,
    mutation: Option<String>,
}

impl Schema {
    /// Gets a type by name, including built-in scalars.
    pub fn get(&self, name: &str) -> Option<&TypeDef> {
        self.types.get(name)
    }

    pub fn kind_of(&self, name: &str) -> Option<TypeKind> {
        self.get(name).map(|t| t.kind)
    }

    pub fn query_type(&self) -> Option<&TypeDef> {
        self.query.as_deref().and_then(|name| self.get(name))
    }

    pub fn mutation_type(&self) -> Option<&TypeDef> {
        self.mutation.as_deref().and_then(|name| self.get(name))
    }

    /// Declared (non built-in) types in name order.
    pub fn declared_types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types
            .values()
            .filter(|t| !BUILTIN_SCALARS.contains(&t.name.as_str()))
    }
}

/// Builds `Schema` values from documents.
pub struct SchemaLoader;

impl SchemaLoader {
    /// Loads a schema document from a JSON file.
    pub fn load_file(path: &Path) -> Result<Schema> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::invalid_schema(SchemaViolation::new(
                path.display().to_string(),
                "a readable schema file",
                e.to_string(),
            ))
        })?;
        Self::parse(&content)
    }

    /// Parses a schema document from JSON text.
    pub fn parse(json: &str) -> Result<Schema> {
        let document: SchemaDocument = serde_json::from_str(json).map_err(|e| {
            Error::invalid_schema(SchemaViolation::new("$document", "a schema document", e.to_string()))
        })?;
        Self::from_document(document)
    }

    /// Builds a schema from an already decoded JSON value.
    pub fn from_value(value: Value) -> Result<Schema> {
        let document: SchemaDocument = serde_json::from_value(value).map_err(|e| {
            Error::invalid_schema(SchemaViolation::new("$document", "a schema document", e.to_string()))
        })?;
        Self::from_document(document)
    }

    /// Indexes and validates a document.
    pub fn from_document(document: SchemaDocument) -> Result<Schema> {
        let mut types = BTreeMap::new();
        for name in BUILTIN_SCALARS {
            types.insert(name.to_string(), TypeDef::new(name, TypeKind::Scalar));
        }

        for ty in document.types {
            if BUILTIN_SCALARS.contains(&ty.name.as_str()) {
                return Err(Error::invalid_schema(SchemaViolation::new(
                    &ty.name,
                    "a name that is not a built-in scalar",
                    "redeclared built-in",
                )));
            }
            if types.contains_key(&ty.name) {
                return Err(Error::invalid_schema(SchemaViolation::new(
                    &ty.name,
                    "a unique type name",
                    "duplicate declaration",
                )));
            }
            types.insert(ty.name.clone(), ty);
        }

        for ty in types.values() {
            check_type(ty, &types)?;
        }

        check_root(&types, document.query.as_deref(), "query")?;
        check_root(&types, document.mutation.as_deref(), "mutation")?;

        Ok(Schema {
            types,
            query: document.query,
            mutation: document.mutation,
        })
    }
}

fn check_type(ty: &TypeDef, types: &BTreeMap<String, TypeDef>) -> Result<()> {
    if !ty.kind.has_fields() && !ty.fields.is_empty() {
        return Err(Error::invalid_schema(SchemaViolation::new(
            &ty.name,
            format!("no fields on a {}", ty.kind.kind_name()),
            format!("{} fields", ty.fields.len()),
        )));
    }

    let mut seen = HashSet::new();
    for field in &ty.fields {
        let location = format!("{}.{}", ty.name, field.name);
        if !seen.insert(field.name.as_str()) {
            return Err(Error::invalid_schema(SchemaViolation::new(
                location,
                "a unique field name",
                "duplicate field",
            )));
        }
        check_ref(&location, &field.ty, types)?;
        for arg in &field.args {
            check_ref(&format!("{}({})", location, arg.name), &arg.ty, types)?;
        }
    }
    Ok(())
}

fn check_ref(location: &str, ty: &TypeRef, types: &BTreeMap<String, TypeDef>) -> Result<()> {
    let name = ty.base_name();
    if types.contains_key(name) {
        Ok(())
    } else {
        Err(Error::invalid_schema(SchemaViolation::unknown_type(location, name)))
    }
}

fn check_root(types: &BTreeMap<String, TypeDef>, root: Option<&str>, which: &str) -> Result<()> {
    let Some(name) = root else {
        return Ok(());
    };
    match types.get(name) {
        Some(ty) if ty.kind == TypeKind::Object => Ok(()),
        Some(ty) => Err(Error::invalid_schema(SchemaViolation::new(
            name,
            format!("an object type as {} root", which),
            ty.kind.kind_name(),
        ))),
        None => Err(Error::invalid_schema(SchemaViolation::unknown_type(
            format!("${}", which),
            name,
        ))),
    }
}
