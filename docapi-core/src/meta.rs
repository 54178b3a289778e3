//! Runtime descriptors for document kinds and the metadata lookup contract.
//!
//! Kinds are never compiled types: a [`DocumentKind`] is loaded at runtime from a
//! [`MetadataProvider`] and the services work purely against the descriptor plus a generic
//! field mapping.

use async_trait::async_trait;
use bson::Bson;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::{document::STANDARD_FIELDS, error::DocumentStoreResult};

/// Declared type of a field on a document kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Data,
    Text,
    Int,
    Float,
    Check,
    Date,
    Datetime,
    Link,
    Select,
    Json,
    /// An ordered list of child records of the kind named by the field's `options`.
    Table,
}

impl FieldType {
    /// Returns whether a value is acceptable for a field of this type.
    ///
    /// `Null` is accepted by every type.
    pub fn accepts(&self, value: &Bson) -> bool {
        if matches!(value, Bson::Null) {
            return true;
        }

        match self {
            FieldType::Data
            | FieldType::Text
            | FieldType::Date
            | FieldType::Datetime
            | FieldType::Link
            | FieldType::Select => matches!(value, Bson::String(_)),
            FieldType::Int => matches!(value, Bson::Int32(_) | Bson::Int64(_)),
            FieldType::Float => matches!(value, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_)),
            FieldType::Check => matches!(value, Bson::Boolean(_) | Bson::Int32(0 | 1) | Bson::Int64(0 | 1)),
            FieldType::Json => true,
            FieldType::Table => match value {
                Bson::Array(rows) => rows.iter().all(|row| matches!(row, Bson::Document(_))),
                _ => false,
            },
        }
    }
}

/// A single field definition of a document kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    /// Link target or child kind for `Link`/`Table` fields, choices for `Select`.
    #[serde(default)]
    pub options: Option<String>,
    /// Whether this is a standard/system field rather than a declared one.
    #[serde(default)]
    pub standard: bool,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            options: None,
            standard: false,
        }
    }

    /// Creates a child table field holding records of `child_kind`.
    pub fn table(name: impl Into<String>, child_kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Table,
            options: Some(child_kind.into()),
            standard: false,
        }
    }

    pub fn with_options(mut self, options: impl Into<String>) -> Self {
        self.options = Some(options.into());
        self
    }
}

/// Descriptor of a category of documents (analogous to a table schema).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentKind {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub is_child_table: bool,
    #[serde(default)]
    pub is_single: bool,
    #[serde(default)]
    pub is_submittable: bool,
    #[serde(default)]
    pub allow_rename: bool,
}

impl DocumentKind {
    /// Creates a new builder for a kind with the given name.
    pub fn builder(name: impl Into<String>) -> DocumentKindBuilder {
        DocumentKindBuilder::new(name)
    }

    /// Returns the declared field with the given name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields
            .iter()
            .find(|field| field.name == name)
    }

    /// Returns whether `name` is a declared or standard field of this kind.
    pub fn has_field(&self, name: &str) -> bool {
        STANDARD_FIELDS.contains(&name) || self.field(name).is_some()
    }

    /// Returns the child table fields of this kind.
    pub fn table_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields
            .iter()
            .filter(|field| field.field_type == FieldType::Table)
    }

    /// Returns the table field named `field` if it holds records of `child_kind`.
    pub fn table_field_for(&self, field: &str, child_kind: &str) -> Option<&FieldDef> {
        self.table_fields()
            .find(|def| def.name == field && def.options.as_deref() == Some(child_kind))
    }

    /// Wildcard projection: every standard field followed by every declared non-table field.
    pub fn default_fields(&self) -> Vec<String> {
        STANDARD_FIELDS
            .iter()
            .filter(|name| **name != "doctype")
            .filter(|name| self.is_child_table || !matches!(**name, "parent" | "parentfield" | "parenttype"))
            .map(|name| name.to_string())
            .chain(
                self.fields
                    .iter()
                    .filter(|field| !field.standard && field.field_type != FieldType::Table)
                    .map(|field| field.name.clone()),
            )
            .collect()
    }
}

/// Builder for [`DocumentKind`] descriptors.
#[derive(Debug, Clone)]
pub struct DocumentKindBuilder {
    kind: DocumentKind,
}

impl DocumentKindBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            kind: DocumentKind {
                name: name.into(),
                fields: Vec::new(),
                is_child_table: false,
                is_single: false,
                is_submittable: false,
                allow_rename: false,
            },
        }
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.kind.fields.push(field);
        self
    }

    pub fn child_table(mut self) -> Self {
        self.kind.is_child_table = true;
        self
    }

    pub fn single(mut self) -> Self {
        self.kind.is_single = true;
        self
    }

    pub fn submittable(mut self) -> Self {
        self.kind.is_submittable = true;
        self
    }

    pub fn allow_rename(mut self) -> Self {
        self.kind.allow_rename = true;
        self
    }

    pub fn build(self) -> DocumentKind {
        self.kind
    }
}

/// Read-only lookup of document kind descriptors.
///
/// Implementations own how schema metadata is stored; the services only ever read it.
#[async_trait]
pub trait MetadataProvider: Send + Sync + Debug {
    /// Returns the descriptor of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::KindNotFound`](crate::error::DocumentStoreError::KindNotFound)
    /// when the kind is unknown.
    async fn describe(&self, kind: &str) -> DocumentStoreResult<DocumentKind>;

    async fn is_child_table_kind(&self, kind: &str) -> DocumentStoreResult<bool> {
        Ok(self.describe(kind).await?.is_child_table)
    }

    async fn is_single_kind(&self, kind: &str) -> DocumentStoreResult<bool> {
        Ok(self.describe(kind).await?.is_single)
    }

    /// Names reserved for system use on every kind.
    fn standard_field_names(&self) -> Vec<String> {
        STANDARD_FIELDS
            .iter()
            .map(|name| name.to_string())
            .collect()
    }
}

#[async_trait]
impl<M> MetadataProvider for &M
where
    M: MetadataProvider,
{
    async fn describe(&self, kind: &str) -> DocumentStoreResult<DocumentKind> {
        (*self).describe(kind).await
    }

    async fn is_child_table_kind(&self, kind: &str) -> DocumentStoreResult<bool> {
        (*self).is_child_table_kind(kind).await
    }

    async fn is_single_kind(&self, kind: &str) -> DocumentStoreResult<bool> {
        (*self).is_single_kind(kind).await
    }

    fn standard_field_names(&self) -> Vec<String> {
        (*self).standard_field_names()
    }
}
