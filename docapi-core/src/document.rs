//! The generic document representation shared by every document kind.
//!
//! A [`Document`] is a kind name, an identifier, a lifecycle status, an optional
//! [`ChildLinkage`] and an ordered mapping of field values. There are no per-kind structs:
//! kind-specific behavior comes from the [`DocumentKind`](crate::meta::DocumentKind)
//! descriptor only.

use bson::{Bson, Document as Mapping};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Field names reserved for system use on every document kind.
pub const STANDARD_FIELDS: [&str; 11] = [
    "doctype",
    "name",
    "owner",
    "creation",
    "modified",
    "modified_by",
    "parent",
    "parentfield",
    "parenttype",
    "idx",
    "docstatus",
];

const LINKAGE_FIELDS: [&str; 3] = ["parent", "parenttype", "parentfield"];

/// Lifecycle state of a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum DocStatus {
    #[default]
    Draft,
    Submitted,
    Cancelled,
}

impl DocStatus {
    pub fn as_i32(self) -> i32 {
        match self {
            DocStatus::Draft => 0,
            DocStatus::Submitted => 1,
            DocStatus::Cancelled => 2,
        }
    }

    /// Reads a status from a stored or caller-supplied value. `Null` means draft.
    pub fn from_bson(value: &Bson) -> DocumentStoreResult<Self> {
        let status = match value {
            Bson::Null => 0,
            Bson::Int32(value) => *value,
            Bson::Int64(value) => i32::try_from(*value).unwrap_or(-1),
            Bson::Double(value) if value.fract() == 0.0 => *value as i32,
            other => {
                return Err(DocumentStoreError::validation(format!("Invalid docstatus {other}")));
            }
        };

        DocStatus::try_from(status)
    }

    /// Checks that a save may move a document from `self` to `next`.
    ///
    /// Submitting and cancelling go through their own operations; a plain save only
    /// allows draft edits or a draft being saved straight into the submitted state.
    pub fn check_save_transition(self, next: DocStatus) -> DocumentStoreResult<()> {
        match (self, next) {
            (DocStatus::Draft, DocStatus::Draft) | (DocStatus::Draft, DocStatus::Submitted) => Ok(()),
            (DocStatus::Submitted, _) => Err(DocumentStoreError::validation(
                "Cannot edit a submitted document",
            )),
            (DocStatus::Cancelled, _) => Err(DocumentStoreError::validation(
                "Cannot edit a cancelled document",
            )),
            (DocStatus::Draft, DocStatus::Cancelled) => Err(DocumentStoreError::validation(
                "Cannot cancel a document before submitting it",
            )),
        }
    }
}

impl TryFrom<i32> for DocStatus {
    type Error = DocumentStoreError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DocStatus::Draft),
            1 => Ok(DocStatus::Submitted),
            2 => Ok(DocStatus::Cancelled),
            other => Err(DocumentStoreError::validation(format!("Invalid docstatus {other}"))),
        }
    }
}

impl From<DocStatus> for i32 {
    fn from(status: DocStatus) -> Self {
        status.as_i32()
    }
}

/// Links a child record to the top-level document whose table field holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildLinkage {
    /// Name of the owning document.
    pub parent: String,
    /// Kind of the owning document.
    pub parenttype: String,
    /// Table field on the owning document that holds this record.
    pub parentfield: String,
}

/// An instance of a document kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub kind: String,
    pub name: Option<String>,
    pub docstatus: DocStatus,
    pub linkage: Option<ChildLinkage>,
    pub fields: Mapping,
}

impl Document {
    /// Creates an empty draft document of `kind`.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: None,
            docstatus: DocStatus::Draft,
            linkage: None,
            fields: Mapping::new(),
        }
    }

    /// Parses a caller or store mapping into a document.
    ///
    /// The mapping must carry a `doctype`. A linkage is only recognized when both `parent`
    /// and `parenttype` are set; when only one of them is present the document is
    /// top-level and the stray key is kept as an ordinary field.
    ///
    /// # Errors
    ///
    /// Returns a validation error when `doctype` is missing, `docstatus` is out of range,
    /// or a child record lacks its `parentfield`.
    pub fn from_mapping(mut mapping: Mapping) -> DocumentStoreResult<Self> {
        let kind = match mapping.remove("doctype") {
            Some(Bson::String(kind)) if !kind.is_empty() => kind,
            _ => return Err(DocumentStoreError::validation("doctype is required")),
        };

        let name = mapping
            .remove("name")
            .and_then(|value| identifier_of(&value));

        let docstatus = match mapping.remove("docstatus") {
            Some(value) => DocStatus::from_bson(&value)?,
            None => DocStatus::Draft,
        };

        let linkage = match (non_empty_str(&mapping, "parent"), non_empty_str(&mapping, "parenttype")) {
            (Some(parent), Some(parenttype)) => {
                let parentfield = non_empty_str(&mapping, "parentfield").ok_or_else(|| {
                    DocumentStoreError::validation("parentfield is required for child records")
                })?;

                let linkage = ChildLinkage { parent, parenttype, parentfield };
                for key in LINKAGE_FIELDS {
                    mapping.remove(key);
                }
                Some(linkage)
            }
            _ => None,
        };

        Ok(Self {
            kind,
            name,
            docstatus,
            linkage,
            fields: mapping,
        })
    }

    /// Returns the document's identifier or a not-found style validation error.
    pub fn require_name(&self) -> DocumentStoreResult<&str> {
        self.name
            .as_deref()
            .ok_or_else(|| DocumentStoreError::validation(format!("{} has no name", self.kind)))
    }

    pub fn is_child(&self) -> bool {
        self.linkage.is_some()
    }

    pub fn get(&self, field: &str) -> Option<&Bson> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .and_then(Bson::as_str)
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Bson>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Applies `values` onto this document's fields.
    ///
    /// Identity keys (`doctype`, `name`, `docstatus` and the linkage keys) are ignored;
    /// they only change through dedicated operations.
    pub fn update(&mut self, values: Mapping) {
        for (key, value) in values {
            if matches!(key.as_str(), "doctype" | "name" | "docstatus") || LINKAGE_FIELDS.contains(&key.as_str()) {
                continue;
            }

            self.fields.insert(key, value);
        }
    }

    /// Parses the records held by the table field `field`.
    pub fn child_rows(&self, field: &str) -> DocumentStoreResult<Vec<Document>> {
        match self.fields.get(field) {
            None | Some(Bson::Null) => Ok(Vec::new()),
            Some(Bson::Array(rows)) => rows
                .iter()
                .map(|row| match row {
                    Bson::Document(mapping) => Document::from_mapping(mapping.clone()),
                    _ => Err(DocumentStoreError::validation(format!(
                        "{field} must contain only records"
                    ))),
                })
                .collect(),
            Some(_) => Err(DocumentStoreError::validation(format!(
                "{field} must be a list of records"
            ))),
        }
    }

    /// Replaces the records of the table field `field`.
    pub fn set_child_rows(&mut self, field: &str, rows: Vec<Document>) {
        self.fields.insert(
            field.to_string(),
            Bson::Array(
                rows.iter()
                    .map(|row| Bson::Document(row.as_dict()))
                    .collect(),
            ),
        );
    }

    /// Appends `row` to the table field `field`, keeping submission order.
    pub fn append_child(&mut self, field: &str, row: Document) -> DocumentStoreResult<()> {
        let mut rows = self.child_rows(field)?;
        rows.push(row);
        self.set_child_rows(field, rows);

        Ok(())
    }

    /// Points every row of the table field `field` at this document.
    ///
    /// Rows get the linkage, a 1-based `idx` in list order, this document's `docstatus`
    /// and a generated name when they have none.
    pub fn link_children(&mut self, field: &str) -> DocumentStoreResult<()> {
        let parent = self.require_name()?.to_string();
        let mut rows = self.child_rows(field)?;

        for (position, row) in rows.iter_mut().enumerate() {
            row.linkage = Some(ChildLinkage {
                parent: parent.clone(),
                parenttype: self.kind.clone(),
                parentfield: field.to_string(),
            });
            for key in LINKAGE_FIELDS {
                row.fields.remove(key);
            }
            row.docstatus = self.docstatus;
            row.set("idx", Bson::Int64(position as i64 + 1));

            if row.name.is_none() {
                row.name = Some(generate_name());
            }
        }

        self.set_child_rows(field, rows);

        Ok(())
    }

    /// Stamps creation and ownership fields on a new document.
    pub fn stamp_created(&mut self, user: &str) {
        let now = timestamp();
        self.set("owner", user);
        self.set("creation", now.clone());
        self.set("modified", now);
        self.set("modified_by", user);
    }

    /// Stamps modification fields.
    pub fn stamp_modified(&mut self, user: &str) {
        self.set("modified", timestamp());
        self.set("modified_by", user);
    }

    /// Serializes this document to its flat field-value mapping.
    ///
    /// Keys come in a stable order: `doctype`, `name`, `docstatus`, the linkage keys for
    /// child records, then every field in insertion order.
    pub fn as_dict(&self) -> Mapping {
        let mut dict = Mapping::new();
        dict.insert("doctype", self.kind.clone());
        dict.insert(
            "name",
            self.name
                .clone()
                .map(Bson::String)
                .unwrap_or(Bson::Null),
        );
        dict.insert("docstatus", self.docstatus.as_i32());

        if let Some(linkage) = &self.linkage {
            dict.insert("parent", linkage.parent.clone());
            dict.insert("parenttype", linkage.parenttype.clone());
            dict.insert("parentfield", linkage.parentfield.clone());
        }

        for (key, value) in &self.fields {
            dict.insert(key.clone(), value.clone());
        }

        dict
    }
}

/// Generates a random document name of ten lowercase hex characters.
pub fn generate_name() -> String {
    Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(10)
        .collect()
}

/// Current UTC time in the stored timestamp format.
pub fn timestamp() -> String {
    Utc::now()
        .format("%Y-%m-%d %H:%M:%S%.6f")
        .to_string()
}

/// Reads an identifier from a value, accepting strings and integers.
pub(crate) fn identifier_of(value: &Bson) -> Option<String> {
    match value {
        Bson::String(value) if !value.is_empty() => Some(value.clone()),
        Bson::Int32(value) => Some(value.to_string()),
        Bson::Int64(value) => Some(value.to_string()),
        _ => None,
    }
}

fn non_empty_str(mapping: &Mapping, key: &str) -> Option<String> {
    mapping
        .get(key)
        .and_then(Bson::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn linkage_requires_parent_and_parenttype() {
        let child = Document::from_mapping(doc! {
            "doctype": "Task Item",
            "parent": "P1",
            "parenttype": "Task",
            "parentfield": "items",
            "qty": 2,
        })
        .unwrap();
        assert_eq!(
            child.linkage,
            Some(ChildLinkage {
                parent: "P1".into(),
                parenttype: "Task".into(),
                parentfield: "items".into(),
            })
        );
        assert!(child.get("parent").is_none());

        let stray = Document::from_mapping(doc! { "doctype": "Task", "parent": "P1" }).unwrap();
        assert!(stray.linkage.is_none());
        assert_eq!(stray.get_str("parent"), Some("P1"));
    }

    #[test]
    fn child_without_parentfield_is_rejected() {
        let err = Document::from_mapping(doc! {
            "doctype": "Task Item",
            "parent": "P1",
            "parenttype": "Task",
        })
        .unwrap_err();

        assert!(matches!(err, DocumentStoreError::Validation(_)));
    }

    #[test]
    fn missing_doctype_is_rejected() {
        assert!(Document::from_mapping(doc! { "name": "x" }).is_err());
    }

    #[test]
    fn link_children_numbers_rows_in_order() {
        let mut parent = Document::new("Task");
        parent.name = Some("T1".into());
        parent.append_child("items", Document::new("Task Item")).unwrap();
        parent.append_child("items", Document::new("Task Item")).unwrap();
        parent.link_children("items").unwrap();

        let rows = parent.child_rows("items").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("idx"), Some(&Bson::Int64(2)));
        assert_eq!(rows[0].linkage.as_ref().map(|l| l.parent.as_str()), Some("T1"));
        assert!(rows.iter().all(|row| row.name.is_some()));
    }

    #[test]
    fn save_transitions() {
        assert!(DocStatus::Draft.check_save_transition(DocStatus::Draft).is_ok());
        assert!(DocStatus::Submitted.check_save_transition(DocStatus::Submitted).is_err());
        assert!(DocStatus::Cancelled.check_save_transition(DocStatus::Draft).is_err());
        assert!(DocStatus::Draft.check_save_transition(DocStatus::Cancelled).is_err());
    }

    #[test]
    fn generated_names_are_ten_hex_chars() {
        let name = generate_name();
        assert_eq!(name.len(), 10);
        assert!(name.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
