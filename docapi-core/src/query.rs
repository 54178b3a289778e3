//! Canonical query structures handed to storage backends.
//!
//! Caller input is normalized (see [`crate::normalize`]) into the types in this module
//! before it reaches a backend:
//!
//! - [`Filter`] - an ordered list of `(field, operator, value)` [`Condition`]s
//! - [`FieldList`] - the projection, or the wildcard
//! - [`Sort`] - ordering parsed from an `order_by` clause
//! - [`ListQuery`] - everything a backend needs to run a list query
//!
//! Backends that prefer a tree can lower filters into an [`Expr`] and walk it with a
//! [`QueryVisitor`].
//!
//! # Example
//!
//! ```ignore
//! use docapi::query::{ListQuery, Filter, FieldOp};
//!
//! let query = ListQuery::builder("Task")
//!     .filters(Filter::new().with("status", FieldOp::Eq, "Open"))
//!     .limit_page_length(10)
//!     .build();
//! ```

use bson::Bson;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

/// Sort key for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

impl Sort {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self { field: field.into(), direction }
    }

    /// Parses an `order_by` clause such as `"modified desc, name"`.
    ///
    /// Direction defaults to ascending when omitted.
    pub fn parse_clause(clause: &str) -> DocumentStoreResult<Vec<Sort>> {
        clause
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                let mut tokens = part.split_whitespace();
                let field = tokens
                    .next()
                    .ok_or_else(|| DocumentStoreError::validation("Empty order_by term"))?;
                let direction = match tokens.next().map(str::to_ascii_lowercase).as_deref() {
                    None | Some("asc") => SortDirection::Asc,
                    Some("desc") => SortDirection::Desc,
                    Some(other) => {
                        return Err(DocumentStoreError::validation(format!(
                            "Invalid sort direction {other}"
                        )));
                    }
                };

                if tokens.next().is_some() {
                    return Err(DocumentStoreError::validation(format!("Invalid order_by term {part}")));
                }

                Ok(Sort::new(field, direction))
            })
            .collect()
    }

    /// The ordering used when a list query names none.
    pub fn default_order() -> Vec<Sort> {
        vec![Sort::new("modified", SortDirection::Desc)]
    }
}

/// Comparison operators accepted in filter conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldOp {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `like`, with `%` and `_` wildcards.
    Like,
    /// `not like`
    NotLike,
    /// `in`, value is a list.
    In,
    /// `not in`, value is a list.
    NotIn,
    /// `is`, value is `"set"` or `"not set"`.
    Is,
    /// `between`, value is a two-element list of inclusive bounds.
    Between,
}

impl FieldOp {
    /// Parses an operator token (case-insensitive).
    pub fn from_token(token: &str) -> DocumentStoreResult<Self> {
        let op = match token.trim().to_ascii_lowercase().as_str() {
            "=" | "==" => FieldOp::Eq,
            "!=" | "<>" => FieldOp::Ne,
            ">" => FieldOp::Gt,
            ">=" => FieldOp::Gte,
            "<" => FieldOp::Lt,
            "<=" => FieldOp::Lte,
            "like" => FieldOp::Like,
            "not like" => FieldOp::NotLike,
            "in" => FieldOp::In,
            "not in" => FieldOp::NotIn,
            "is" => FieldOp::Is,
            "between" => FieldOp::Between,
            other => {
                return Err(DocumentStoreError::validation(format!("Invalid filter operator {other}")));
            }
        };

        Ok(op)
    }

    pub fn token(&self) -> &'static str {
        match self {
            FieldOp::Eq => "=",
            FieldOp::Ne => "!=",
            FieldOp::Gt => ">",
            FieldOp::Gte => ">=",
            FieldOp::Lt => "<",
            FieldOp::Lte => "<=",
            FieldOp::Like => "like",
            FieldOp::NotLike => "not like",
            FieldOp::In => "in",
            FieldOp::NotIn => "not in",
            FieldOp::Is => "is",
            FieldOp::Between => "between",
        }
    }
}

impl Display for FieldOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// One `(field, operator, value)` predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub op: FieldOp,
    pub value: Bson,
}

impl Condition {
    pub fn new(field: impl Into<String>, op: FieldOp, value: impl Into<Bson>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Checks that the value has the shape the operator needs.
    pub fn validate(&self) -> DocumentStoreResult<()> {
        match (self.op, &self.value) {
            (FieldOp::In | FieldOp::NotIn, Bson::Array(_)) => Ok(()),
            (FieldOp::Between, Bson::Array(bounds)) if bounds.len() == 2 => Ok(()),
            (FieldOp::Is, Bson::String(value)) if matches!(value.as_str(), "set" | "not set") => Ok(()),
            (FieldOp::Like | FieldOp::NotLike, Bson::String(_)) => Ok(()),
            (FieldOp::In | FieldOp::NotIn | FieldOp::Between | FieldOp::Is | FieldOp::Like | FieldOp::NotLike, value) => {
                Err(DocumentStoreError::validation(format!(
                    "Invalid value {value} for operator {} on {}",
                    self.op, self.field
                )))
            }
            _ => Ok(()),
        }
    }

    /// Lowers this condition into an expression node.
    pub fn to_expr(&self) -> Expr {
        match (self.op, &self.value) {
            (FieldOp::Is, Bson::String(value)) => Expr::Exists(self.field.clone(), value == "set"),
            (FieldOp::Between, Bson::Array(bounds)) if bounds.len() == 2 => Expr::And(vec![
                Expr::field(self.field.clone(), FieldOp::Gte, bounds[0].clone()),
                Expr::field(self.field.clone(), FieldOp::Lte, bounds[1].clone()),
            ]),
            _ => Expr::field(self.field.clone(), self.op, self.value.clone()),
        }
    }
}

/// A normalized filter: conditions combined with AND, in caller order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub conditions: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for `name = <name>`.
    pub fn by_name(name: impl Into<String>) -> Self {
        Filter::new().with("name", FieldOp::Eq, name.into())
    }

    pub fn with(mut self, field: impl Into<String>, op: FieldOp, value: impl Into<Bson>) -> Self {
        self.conditions.push(Condition::new(field, op, value));
        self
    }

    pub fn push(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.conditions
            .iter()
            .map(|condition| condition.field.as_str())
    }

    /// Returns the value of an `name = ...` condition, if any.
    pub fn name_value(&self) -> Option<&Bson> {
        self.conditions
            .iter()
            .find(|condition| condition.field == "name" && condition.op == FieldOp::Eq)
            .map(|condition| &condition.value)
    }

    /// Lowers all conditions into a single AND expression.
    pub fn to_expr(&self) -> Expr {
        Expr::And(
            self.conditions
                .iter()
                .map(Condition::to_expr)
                .collect(),
        )
    }

    /// Lowers all conditions into a single OR expression.
    pub fn to_or_expr(&self) -> Expr {
        Expr::Or(
            self.conditions
                .iter()
                .map(Condition::to_expr)
                .collect(),
        )
    }
}

/// A filter expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match).
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr>),
    /// Checks if a field is set (`true`) or unset (`false`).
    Exists(String, bool),
    /// Field comparison expression.
    Field {
        field: String,
        op: FieldOp,
        value: Bson,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines this expression with another using logical AND.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }
}

/// The fields a list query projects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldList {
    /// Every standard field plus every declared non-table field.
    #[default]
    All,
    /// The named fields, in caller order. Duplicates are kept.
    Fields(Vec<String>),
}

/// A fully normalized list query for one document kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub kind: String,
    /// Concrete field names; the wildcard is expanded before a query reaches a backend.
    pub fields: Vec<String>,
    pub filters: Option<Filter>,
    pub or_filters: Option<Filter>,
    pub order_by: Vec<Sort>,
    pub limit_start: Option<usize>,
    /// `None` or `Some(0)` means unbounded.
    pub limit_page_length: Option<usize>,
}

impl ListQuery {
    pub fn builder(kind: impl Into<String>) -> ListQueryBuilder {
        ListQueryBuilder::new(kind)
    }

    /// Combines the primary filter and the OR-filters into one expression.
    ///
    /// Returns `None` when neither constrains the query.
    pub fn filter_expr(&self) -> Option<Expr> {
        let primary = self
            .filters
            .as_ref()
            .filter(|filter| !filter.is_empty())
            .map(Filter::to_expr);
        let alternate = self
            .or_filters
            .as_ref()
            .filter(|filter| !filter.is_empty())
            .map(Filter::to_or_expr);

        match (primary, alternate) {
            (Some(primary), Some(alternate)) => Some(primary.and(alternate)),
            (primary, alternate) => primary.or(alternate),
        }
    }

    /// Page size with `Some(0)` folded into unbounded.
    pub fn page_length(&self) -> Option<usize> {
        self.limit_page_length
            .filter(|length| *length > 0)
    }
}

#[derive(Debug, Clone)]
pub struct ListQueryBuilder {
    query: ListQuery,
}

impl ListQueryBuilder {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            query: ListQuery {
                kind: kind.into(),
                fields: vec!["name".to_string()],
                filters: None,
                or_filters: None,
                order_by: Sort::default_order(),
                limit_start: None,
                limit_page_length: None,
            },
        }
    }

    pub fn fields(mut self, fields: Vec<String>) -> Self {
        self.query.fields = fields;
        self
    }

    pub fn filters(mut self, filters: Filter) -> Self {
        self.query.filters = Some(filters);
        self
    }

    pub fn or_filters(mut self, or_filters: Filter) -> Self {
        self.query.or_filters = Some(or_filters);
        self
    }

    pub fn order_by(mut self, order_by: Vec<Sort>) -> Self {
        self.query.order_by = order_by;
        self
    }

    pub fn limit_start(mut self, start: usize) -> Self {
        self.query.limit_start = Some(start);
        self
    }

    pub fn limit_page_length(mut self, length: usize) -> Self {
        self.query.limit_page_length = Some(length);
        self
    }

    pub fn build(self) -> ListQuery {
        self.query
    }
}

/// Walks an [`Expr`] tree, producing one output per node.
pub trait QueryVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_by_clause_parses_directions() {
        let sorts = Sort::parse_clause("modified desc, name").unwrap();

        assert_eq!(
            sorts,
            vec![
                Sort::new("modified", SortDirection::Desc),
                Sort::new("name", SortDirection::Asc),
            ]
        );
        assert!(Sort::parse_clause("name sideways").is_err());
        assert!(Sort::parse_clause("name asc; drop").is_err());
    }

    #[test]
    fn operator_tokens_are_case_insensitive() {
        assert_eq!(FieldOp::from_token("NOT IN").unwrap(), FieldOp::NotIn);
        assert_eq!(FieldOp::from_token(" like ").unwrap(), FieldOp::Like);
        assert!(FieldOp::from_token("~=").is_err());
    }

    #[test]
    fn between_and_is_lower_to_range_and_exists() {
        let between = Condition::new("qty", FieldOp::Between, Bson::Array(vec![1.into(), 5.into()]));
        assert!(matches!(between.to_expr(), Expr::And(ref nodes) if nodes.len() == 2));

        let is_set = Condition::new("owner", FieldOp::Is, "not set");
        assert_eq!(is_set.to_expr(), Expr::Exists("owner".into(), false));
    }

    #[test]
    fn operator_value_shapes_are_checked() {
        assert!(Condition::new("qty", FieldOp::In, 3).validate().is_err());
        assert!(Condition::new("qty", FieldOp::Between, Bson::Array(vec![1.into()])).validate().is_err());
        assert!(Condition::new("owner", FieldOp::Is, "maybe").validate().is_err());
        assert!(Condition::new("qty", FieldOp::Gt, 3).validate().is_ok());
    }

    #[test]
    fn or_filters_are_and_ed_with_primary() {
        let query = ListQuery::builder("Task")
            .filters(Filter::new().with("status", FieldOp::Eq, "Open"))
            .or_filters(
                Filter::new()
                    .with("priority", FieldOp::Eq, "High")
                    .with("owner", FieldOp::Eq, "a@example.com"),
            )
            .build();

        match query.filter_expr() {
            Some(Expr::And(nodes)) => {
                assert_eq!(nodes.len(), 2);
                assert!(matches!(nodes[1], Expr::Or(ref alternates) if alternates.len() == 2));
            }
            other => panic!("unexpected expression {other:?}"),
        }
    }

    #[test]
    fn zero_page_length_is_unbounded() {
        let query = ListQuery::builder("Task").limit_page_length(0).build();
        assert_eq!(query.page_length(), None);
    }
}
