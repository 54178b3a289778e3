//! Filter expression evaluation for in-memory records.
//!
//! This module provides the evaluation engine for filter expressions, enabling matching
//! and ordering of stored field mappings.

use bson::{Bson, Document as Mapping, datetime::DateTime};
use regex::Regex;
use std::cmp::Ordering;

use docapi_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, FieldOp, QueryVisitor, Sort, SortDirection},
};

/// Type-erased, comparable representation of field values.
///
/// It normalizes numeric types to f64 for easy comparison.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    /// All integers and floats normalized to f64.
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(arr) => Comparable::Array(
                arr.iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>(),
            ),
            _ => Comparable::Null,
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Orders two records by a list of sort keys. Missing values sort first ascending.
pub(crate) fn compare_records(left: &Mapping, right: &Mapping, order_by: &[Sort]) -> Ordering {
    for sort in order_by {
        let a = left
            .get(&sort.field)
            .map(Comparable::from)
            .unwrap_or(Comparable::Null);
        let b = right
            .get(&sort.field)
            .map(Comparable::from)
            .unwrap_or(Comparable::Null);

        let ordering = match (&a, &b) {
            (Comparable::Null, Comparable::Null) => Ordering::Equal,
            (Comparable::Null, _) => Ordering::Less,
            (_, Comparable::Null) => Ordering::Greater,
            _ => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        };

        let ordering = match sort.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

pub(crate) struct DocumentEvaluator<'a> {
    record: &'a Mapping,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(record: &'a Mapping) -> Self {
        Self { record }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> DocumentStoreResult<bool> {
        self.visit_expr(expr)
    }

    /// Keeps the records matching `expr`, in their original order.
    pub fn filter_records(records: Vec<Mapping>, expr: &Expr) -> DocumentStoreResult<Vec<Mapping>> {
        let mut matched = Vec::with_capacity(records.len());

        for record in records {
            if DocumentEvaluator::new(&record).evaluate(expr)? {
                matched.push(record);
            }
        }

        Ok(matched)
    }

    fn value(&self, field: &str) -> &'a Bson {
        const NULL: &Bson = &Bson::Null;

        self.record
            .get(field)
            .unwrap_or(NULL)
    }
}

impl<'a> QueryVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// A field is set when it holds anything other than null or an empty string.
    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        let is_set = match self.value(field) {
            Bson::Null => false,
            Bson::String(value) => !value.is_empty(),
            _ => true,
        };

        Ok(is_set == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let field_value = Comparable::from(self.value(field));

        match op {
            FieldOp::Eq => Ok(field_value == Comparable::from(value)),
            FieldOp::Ne => Ok(field_value != Comparable::from(value)),
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => {
                Ok(match field_value.partial_cmp(&Comparable::from(value)) {
                    Some(ordering) => match op {
                        FieldOp::Gt => ordering == Ordering::Greater,
                        FieldOp::Gte => ordering != Ordering::Less,
                        FieldOp::Lt => ordering == Ordering::Less,
                        _ => ordering != Ordering::Greater,
                    },
                    None => false,
                })
            }
            FieldOp::Like | FieldOp::NotLike => {
                let Bson::String(pattern) = value else {
                    return Err(DocumentStoreError::validation(format!("like on {field} needs a text pattern")));
                };
                let matched = match field_value {
                    Comparable::String(text) => like_pattern(pattern)?.is_match(text),
                    _ => false,
                };

                Ok(matched == (*op == FieldOp::Like))
            }
            FieldOp::In | FieldOp::NotIn => {
                let found = match Comparable::from(value) {
                    Comparable::Array(values) => values
                        .iter()
                        .any(|candidate| candidate == &field_value),
                    single => single == field_value,
                };

                Ok(found == (*op == FieldOp::In))
            }
            FieldOp::Is | FieldOp::Between => Err(DocumentStoreError::Backend(format!(
                "operator {op} must be lowered before evaluation"
            ))),
        }
    }
}

/// Translates a `like` pattern (`%` any run, `_` any one character) into a
/// case-insensitive regex.
fn like_pattern(pattern: &str) -> DocumentStoreResult<Regex> {
    let mut translated = String::with_capacity(pattern.len() + 8);
    translated.push_str("(?is)^");

    for ch in pattern.chars() {
        match ch {
            '%' => translated.push_str(".*"),
            '_' => translated.push('.'),
            other => translated.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    translated.push('$');

    Regex::new(&translated).map_err(|err| DocumentStoreError::validation(format!("Invalid like pattern: {err}")))
}
