//! Boundary normalization of caller-supplied filters, field lists and payloads.
//!
//! Callers may hand over filters as bare identifiers, JSON text, mappings or lists of
//! conditions, and field lists as a plain name or JSON text. Everything is resolved here
//! into a [`Filter`] / [`FieldList`] so that no ambiguous input travels further.

use bson::{Bson, Document as Mapping, ser::serialize_to_bson};
use serde_json::Value;
use tracing::debug;

use crate::{
    document::{Document, identifier_of},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Condition, FieldList, FieldOp, Filter},
};

/// A filter exactly as a caller supplied it.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RawFilter {
    /// No constraint.
    #[default]
    None,
    /// A bare value, meaning "name equals this value".
    Scalar(Bson),
    /// Text that may encode a structured filter.
    Text(String),
    /// A decoded mapping or list of conditions.
    Structured(Bson),
    /// An already-normalized filter, passed through.
    Normalized(Filter),
}

impl From<&str> for RawFilter {
    fn from(value: &str) -> Self {
        RawFilter::Text(value.to_string())
    }
}

impl From<String> for RawFilter {
    fn from(value: String) -> Self {
        RawFilter::Text(value)
    }
}

impl From<i32> for RawFilter {
    fn from(value: i32) -> Self {
        RawFilter::Scalar(Bson::Int32(value))
    }
}

impl From<i64> for RawFilter {
    fn from(value: i64) -> Self {
        RawFilter::Scalar(Bson::Int64(value))
    }
}

impl From<f64> for RawFilter {
    fn from(value: f64) -> Self {
        RawFilter::Scalar(Bson::Double(value))
    }
}

impl From<Filter> for RawFilter {
    fn from(filter: Filter) -> Self {
        RawFilter::Normalized(filter)
    }
}

impl From<Mapping> for RawFilter {
    fn from(mapping: Mapping) -> Self {
        RawFilter::Structured(Bson::Document(mapping))
    }
}

impl From<Bson> for RawFilter {
    fn from(value: Bson) -> Self {
        match value {
            Bson::Null => RawFilter::None,
            Bson::String(text) => RawFilter::Text(text),
            Bson::Document(_) | Bson::Array(_) => RawFilter::Structured(value),
            scalar => RawFilter::Scalar(scalar),
        }
    }
}

impl From<Value> for RawFilter {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => RawFilter::None,
            Value::String(text) => RawFilter::Text(text),
            other => match serialize_to_bson(&other) {
                Ok(bson) => RawFilter::from(bson),
                Err(_) => RawFilter::Text(other.to_string()),
            },
        }
    }
}

impl<T: Into<RawFilter>> From<Option<T>> for RawFilter {
    fn from(value: Option<T>) -> Self {
        value
            .map(Into::into)
            .unwrap_or_default()
    }
}

/// A field list exactly as a caller supplied it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RawFields {
    #[default]
    None,
    /// A single field name, or JSON text encoding a list of names.
    Text(String),
    List(Vec<String>),
}

impl From<&str> for RawFields {
    fn from(value: &str) -> Self {
        RawFields::Text(value.to_string())
    }
}

impl From<String> for RawFields {
    fn from(value: String) -> Self {
        RawFields::Text(value)
    }
}

impl From<Vec<String>> for RawFields {
    fn from(value: Vec<String>) -> Self {
        RawFields::List(value)
    }
}

impl From<Vec<&str>> for RawFields {
    fn from(value: Vec<&str>) -> Self {
        RawFields::List(
            value
                .into_iter()
                .map(str::to_string)
                .collect(),
        )
    }
}

impl<T: Into<RawFields>> From<Option<T>> for RawFields {
    fn from(value: Option<T>) -> Self {
        value
            .map(Into::into)
            .unwrap_or_default()
    }
}

/// A document payload: JSON text, a decoded JSON value, or a mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Json(Value),
    Mapping(Mapping),
}

impl Payload {
    /// Decodes the payload into a value.
    ///
    /// # Errors
    ///
    /// Returns a decode error when text is not valid JSON.
    pub fn into_bson(self) -> DocumentStoreResult<Bson> {
        match self {
            Payload::Text(text) => json_to_bson(&serde_json::from_str::<Value>(&text)?),
            Payload::Json(value) => json_to_bson(&value),
            Payload::Mapping(mapping) => Ok(Bson::Document(mapping)),
        }
    }

    /// Decodes the payload into a single mapping.
    pub fn into_mapping(self) -> DocumentStoreResult<Mapping> {
        match self.into_bson()? {
            Bson::Document(mapping) => Ok(mapping),
            other => Err(DocumentStoreError::Decode(format!("Expected a document, got {other}"))),
        }
    }

    /// Decodes the payload into a list of mappings.
    pub fn into_mappings(self) -> DocumentStoreResult<Vec<Mapping>> {
        match self.into_bson()? {
            Bson::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Bson::Document(mapping) => Ok(mapping),
                    other => Err(DocumentStoreError::Decode(format!("Expected a document, got {other}"))),
                })
                .collect(),
            other => Err(DocumentStoreError::Decode(format!("Expected a list of documents, got {other}"))),
        }
    }

    /// Decodes the payload into a [`Document`].
    pub fn into_document(self) -> DocumentStoreResult<Document> {
        Document::from_mapping(self.into_mapping()?)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Text(value.to_string())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Text(value)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

impl From<Mapping> for Payload {
    fn from(mapping: Mapping) -> Self {
        Payload::Mapping(mapping)
    }
}

impl From<Document> for Payload {
    fn from(document: Document) -> Self {
        Payload::Mapping(document.as_dict())
    }
}

/// Converts a decoded JSON value into a field value.
pub fn json_to_bson(value: &Value) -> DocumentStoreResult<Bson> {
    Ok(serialize_to_bson(value)?)
}

/// Normalizes a caller filter, degrading gracefully.
///
/// Text that does not decode as JSON is treated as an identifier match rather than an
/// error. Returns `None` when the filter does not constrain anything.
///
/// # Errors
///
/// Returns a validation error for structured filters with malformed conditions.
pub fn normalize_filter(raw: impl Into<RawFilter>) -> DocumentStoreResult<Option<Filter>> {
    normalize(raw.into(), Decoding::Lenient)
}

/// Normalizes a caller filter, surfacing malformed JSON text as a decode error.
pub fn normalize_filter_strict(raw: impl Into<RawFilter>) -> DocumentStoreResult<Option<Filter>> {
    normalize(raw.into(), Decoding::Strict)
}

/// Best-effort normalization that never fails.
///
/// Malformed conditions are skipped; anything that cannot be salvaged becomes `None`.
pub fn safe_filters(raw: impl Into<RawFilter>) -> Option<Filter> {
    match normalize(raw.into(), Decoding::BestEffort) {
        Ok(filter) => filter,
        Err(err) => {
            debug!(error = %err, "discarding unusable filter");
            None
        }
    }
}

/// Resolves caller field input into an ordered field list.
///
/// Text that does not decode as a JSON list of names is taken as one literal field name.
/// Order and duplicates are preserved; a lone `*` is the wildcard.
pub fn resolve_fields(raw: impl Into<RawFields>) -> FieldList {
    let fields = match raw.into() {
        RawFields::None => return FieldList::All,
        RawFields::List(fields) => fields,
        RawFields::Text(text) => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Array(items)) if items.iter().all(Value::is_string) => items
                .into_iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            Ok(Value::String(field)) => vec![field],
            _ => vec![text],
        },
    };

    if fields.is_empty() || (fields.len() == 1 && fields[0] == "*") {
        FieldList::All
    } else {
        FieldList::Fields(fields)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decoding {
    Lenient,
    Strict,
    BestEffort,
}

fn normalize(raw: RawFilter, decoding: Decoding) -> DocumentStoreResult<Option<Filter>> {
    let filter = match raw {
        RawFilter::None => None,
        RawFilter::Normalized(filter) => Some(filter),
        RawFilter::Scalar(value) => scalar_filter(&value),
        RawFilter::Structured(value) => from_structured(value, decoding)?,
        RawFilter::Text(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                None
            } else {
                match serde_json::from_str::<Value>(trimmed) {
                    Ok(value) => from_structured(json_to_bson(&value)?, decoding)?,
                    Err(err) if decoding == Decoding::Strict => return Err(err.into()),
                    Err(_) => Some(Filter::by_name(trimmed)),
                }
            }
        }
    };

    Ok(filter.filter(|filter| !filter.is_empty()))
}

fn scalar_filter(value: &Bson) -> Option<Filter> {
    match value {
        Bson::Double(number) => Some(Filter::by_name(number.to_string())),
        Bson::Boolean(_) | Bson::Null => None,
        other => identifier_of(other).map(Filter::by_name),
    }
}

fn from_structured(value: Bson, decoding: Decoding) -> DocumentStoreResult<Option<Filter>> {
    match value {
        Bson::Document(mapping) => Ok(Some(from_mapping(mapping, decoding)?)),
        Bson::Array(items) => {
            let mut filter = Filter::new();
            for item in items {
                match condition_from_item(item) {
                    Ok(conditions) => conditions
                        .into_iter()
                        .for_each(|condition| filter.push(condition)),
                    Err(err) if decoding == Decoding::BestEffort => {
                        debug!(error = %err, "skipping malformed filter condition");
                    }
                    Err(err) => return Err(err),
                }
            }
            Ok(Some(filter))
        }
        scalar => Ok(scalar_filter(&scalar)),
    }
}

fn from_mapping(mapping: Mapping, decoding: Decoding) -> DocumentStoreResult<Filter> {
    let mut filter = Filter::new();

    for (field, value) in mapping {
        let condition = match value {
            Bson::Array(pair) => operator_pair(field, pair),
            value => Ok(Condition::new(field, FieldOp::Eq, value)),
        };

        match condition.and_then(|condition| condition.validate().map(|_| condition)) {
            Ok(condition) => filter.push(condition),
            Err(err) if decoding == Decoding::BestEffort => {
                debug!(error = %err, "skipping malformed filter condition");
            }
            Err(err) => return Err(err),
        }
    }

    Ok(filter)
}

/// Parses `{field: [op, value]}`.
fn operator_pair(field: String, pair: Vec<Bson>) -> DocumentStoreResult<Condition> {
    match pair.as_slice() {
        [Bson::String(op), value] => Ok(Condition::new(field, FieldOp::from_token(op)?, value.clone())),
        _ => Err(DocumentStoreError::validation(format!(
            "Filter on {field} must be an [operator, value] pair"
        ))),
    }
}

/// Parses one element of a list-of-conditions filter.
fn condition_from_item(item: Bson) -> DocumentStoreResult<Vec<Condition>> {
    let conditions = match item {
        Bson::Document(mapping) => from_mapping(mapping, Decoding::Strict)?.conditions,
        Bson::Array(parts) => {
            let condition = match parts.as_slice() {
                [Bson::String(field), value] => Condition::new(field.clone(), FieldOp::Eq, value.clone()),
                [Bson::String(field), Bson::String(op), value] => {
                    Condition::new(field.clone(), FieldOp::from_token(op)?, value.clone())
                }
                [Bson::String(_kind), Bson::String(field), Bson::String(op), value] => {
                    Condition::new(field.clone(), FieldOp::from_token(op)?, value.clone())
                }
                _ => {
                    return Err(DocumentStoreError::validation(
                        "Filter conditions must be [field, operator, value] lists",
                    ));
                }
            };
            condition.validate()?;
            vec![condition]
        }
        other => {
            return Err(DocumentStoreError::validation(format!("Invalid filter condition {other}")));
        }
    };

    Ok(conditions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn scalar_text_means_match_by_name() {
        assert_eq!(normalize_filter("T1").unwrap(), Some(Filter::by_name("T1")));
        assert_eq!(
            normalize_filter(json!({ "name": "T1" })).unwrap(),
            Some(Filter::new().with("name", FieldOp::Eq, "T1"))
        );
    }

    #[test]
    fn numeric_scalars_are_stringified() {
        assert_eq!(normalize_filter(42).unwrap(), Some(Filter::by_name("42")));
        assert_eq!(normalize_filter("42").unwrap(), Some(Filter::by_name("42")));
    }

    #[test]
    fn empty_inputs_mean_no_constraint() {
        assert_eq!(normalize_filter(RawFilter::None).unwrap(), None);
        assert_eq!(normalize_filter("  ").unwrap(), None);
        assert_eq!(normalize_filter("{}").unwrap(), None);
        assert_eq!(normalize_filter(json!([])).unwrap(), None);
    }

    #[test]
    fn encoded_text_is_decoded() {
        let filter = normalize_filter(r#"[["status", "=", "Open"], ["Task", "qty", ">", 3]]"#)
            .unwrap()
            .unwrap();

        assert_eq!(
            filter.conditions,
            vec![
                Condition::new("status", FieldOp::Eq, "Open"),
                Condition::new("qty", FieldOp::Gt, Bson::Int64(3)),
            ]
        );
    }

    #[test]
    fn mapping_values_may_carry_operators() {
        let filter = normalize_filter(doc! { "status": ["in", ["Open", "Closed"]], "owner": "a" })
            .unwrap()
            .unwrap();

        assert_eq!(filter.conditions[0].op, FieldOp::In);
        assert_eq!(filter.conditions[1], Condition::new("owner", FieldOp::Eq, "a"));
    }

    #[test]
    fn malformed_text_degrades_or_fails_depending_on_mode() {
        assert_eq!(normalize_filter("{oops").unwrap(), Some(Filter::by_name("{oops")));
        assert!(matches!(
            normalize_filter_strict("{oops"),
            Err(DocumentStoreError::Decode(_))
        ));
    }

    #[test]
    fn unknown_operators_are_rejected_unless_best_effort() {
        let raw = json!([["status", "~", "Open"], ["qty", ">", 1]]);

        assert!(normalize_filter(raw.clone()).is_err());
        assert_eq!(
            safe_filters(raw),
            Some(Filter::new().with("qty", FieldOp::Gt, Bson::Int64(1)))
        );
        assert_eq!(safe_filters(json!([["status", "~", "Open"]])), None);
    }

    #[test]
    fn normalized_filters_pass_through() {
        let filter = Filter::new().with("qty", FieldOp::Lte, 2);
        assert_eq!(normalize_filter(filter.clone()).unwrap(), Some(filter));
    }

    #[test]
    fn field_specs_resolve_in_order() {
        assert_eq!(resolve_fields(RawFields::None), FieldList::All);
        assert_eq!(resolve_fields("status"), FieldList::Fields(vec!["status".into()]));
        assert_eq!(
            resolve_fields(r#"["status", "name", "status"]"#),
            FieldList::Fields(vec!["status".into(), "name".into(), "status".into()])
        );
        assert_eq!(resolve_fields("[not json"), FieldList::Fields(vec!["[not json".into()]));
        assert_eq!(resolve_fields(vec!["*"]), FieldList::All);
    }

    #[test]
    fn payload_text_must_decode() {
        assert!(matches!(
            Payload::from("{bad").into_mapping(),
            Err(DocumentStoreError::Decode(_))
        ));
        assert!(matches!(
            Payload::from("[1, 2]").into_mapping(),
            Err(DocumentStoreError::Decode(_))
        ));

        let mapping = Payload::from(r#"{"doctype": "Task", "subject": "x"}"#)
            .into_mapping()
            .unwrap();
        assert_eq!(mapping.get_str("subject").ok(), Some("x"));
    }
}
