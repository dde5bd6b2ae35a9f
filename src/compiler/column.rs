//! Column classification
//!
//! A column's declared type is classified exactly once into a closed set of
//! kinds; every later stage matches on the kind instead of re-inspecting
//! the type graph.
//!
//! | declared type          | kind                              |
//! |------------------------|-----------------------------------|
//! | scalar / enum          | `Leaf`                            |
//! | object                 | `SingleReference`                 |
//! | list of object         | `ReferenceList`                   |
//! | anything else          | rejected                          |
//!
//! One outer non-null marker decides column nullability. List references
//! track element nullability separately.

use crate::error::{Error, Result, SchemaViolation};
use crate::schema::{FieldDef, Schema, TypeKind, TypeRef};

/// Storage-relevant kind of a column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnKind {
    /// Value stored and returned as is
    Leaf,
    /// Identifier of one row in `table`
    SingleReference { table: String },
    /// Ordered identifiers of rows in `table`
    ReferenceList {
        table: String,
        /// Whether list elements are nullable; a list of non-null elements
        /// must hold at least one reference
        element_nullable: bool,
    },
}

impl ColumnKind {
    /// Referenced table, if the column is a reference
    pub fn target(&self) -> Option<&str> {
        match self {
            ColumnKind::Leaf => None,
            ColumnKind::SingleReference { table } | ColumnKind::ReferenceList { table, .. } => {
                Some(table)
            }
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ColumnKind::Leaf => "leaf",
            ColumnKind::SingleReference { .. } => "reference",
            ColumnKind::ReferenceList { .. } => "reference list",
        }
    }
}

/// A classified column. Never mutated after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub kind: ColumnKind,
    pub nullable: bool,
    /// Declared type, kept for shape checks against mutation inputs
    pub ty: TypeRef,
}

impl ColumnDescriptor {
    pub fn is_reference(&self) -> bool {
        !matches!(self.kind, ColumnKind::Leaf)
    }

    /// Type an insert input field must have for this column.
    ///
    /// Leaves keep their type; references become `ID` with the same
    /// list and non-null wrapping.
    pub fn input_type(&self) -> TypeRef {
        match self.kind {
            ColumnKind::Leaf => self.ty.clone(),
            _ => self.ty.with_base(crate::schema::ID_SCALAR),
        }
    }
}

/// Classify a field of table `owner`.
pub fn classify(schema: &Schema, owner: &str, field: &FieldDef) -> Result<ColumnDescriptor> {
    let location = format!("{}.{}", owner, field.name);
    let (inner, non_null) = field.ty.unwrap_non_null();

    let kind = match inner {
        TypeRef::Named(name) => match kind_of(schema, &location, name)? {
            TypeKind::Scalar | TypeKind::Enum => ColumnKind::Leaf,
            TypeKind::Object => ColumnKind::SingleReference {
                table: name.clone(),
            },
            other => return Err(unsupported(&location, &field.ty, other.kind_name())),
        },
        TypeRef::List(element) => {
            let (element_inner, element_non_null) = element.unwrap_non_null();
            match element_inner {
                TypeRef::Named(name) => match kind_of(schema, &location, name)? {
                    TypeKind::Object => ColumnKind::ReferenceList {
                        table: name.clone(),
                        element_nullable: !element_non_null,
                    },
                    other => {
                        let actual = format!("list of {}", other.kind_name());
                        return Err(unsupported(&location, &field.ty, &actual));
                    }
                },
                _ => return Err(unsupported(&location, &field.ty, "nested list")),
            }
        }
        TypeRef::NonNull(_) => return Err(unsupported(&location, &field.ty, "doubled non-null")),
    };

    Ok(ColumnDescriptor {
        name: field.name.clone(),
        kind,
        nullable: !non_null,
        ty: field.ty.clone(),
    })
}

fn kind_of(schema: &Schema, location: &str, name: &str) -> Result<TypeKind> {
    schema
        .kind_of(name)
        .ok_or_else(|| Error::invalid_schema(SchemaViolation::unknown_type(location, name)))
}

fn unsupported(location: &str, ty: &TypeRef, actual: &str) -> Error {
    Error::invalid_schema(SchemaViolation::new(
        location,
        "a scalar, enum, object or list of objects",
        format!("{} ({})", actual, ty),
    ))
}
