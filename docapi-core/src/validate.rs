//! Argument validation for list queries.
//!
//! Runs after normalization and before a query reaches the store: every identifier a
//! caller can inject (projected fields, filter fields, sort fields) must be a plain
//! identifier known to the document kind.

use regex::Regex;
use std::{fmt::Debug, sync::OnceLock};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    meta::DocumentKind,
    query::{Filter, ListQuery},
};

const MAX_IDENTIFIER_LENGTH: usize = 64;

/// Rejects malformed combinations of list arguments.
pub trait ArgumentValidator: Send + Sync + Debug {
    fn validate_list(&self, kind: &DocumentKind, query: &ListQuery) -> DocumentStoreResult<()>;
}

impl<V> ArgumentValidator for &V
where
    V: ArgumentValidator,
{
    fn validate_list(&self, kind: &DocumentKind, query: &ListQuery) -> DocumentStoreResult<()> {
        (*self).validate_list(kind, query)
    }
}

/// The default validator: identifier syntax, field existence and page bounds.
#[derive(Debug, Clone, Default)]
pub struct StandardArgumentValidator {
    max_page_length: Option<usize>,
}

impl StandardArgumentValidator {
    pub fn new(max_page_length: Option<usize>) -> Self {
        Self { max_page_length }
    }

    fn check_field(&self, kind: &DocumentKind, field: &str) -> DocumentStoreResult<()> {
        validate_identifier(field)?;

        if !kind.has_field(field) {
            return Err(DocumentStoreError::validation(format!(
                "Field {field} does not exist on {}",
                kind.name
            )));
        }

        Ok(())
    }

    fn check_filter(&self, kind: &DocumentKind, filter: Option<&Filter>) -> DocumentStoreResult<()> {
        let Some(filter) = filter else {
            return Ok(());
        };

        for condition in &filter.conditions {
            self.check_field(kind, &condition.field)?;
            condition.validate()?;
        }

        Ok(())
    }
}

impl ArgumentValidator for StandardArgumentValidator {
    fn validate_list(&self, kind: &DocumentKind, query: &ListQuery) -> DocumentStoreResult<()> {
        for field in &query.fields {
            self.check_field(kind, field)?;
        }

        self.check_filter(kind, query.filters.as_ref())?;
        self.check_filter(kind, query.or_filters.as_ref())?;

        for sort in &query.order_by {
            self.check_field(kind, &sort.field)?;
        }

        let Some(max) = self.max_page_length else {
            return Ok(());
        };

        match query.page_length() {
            Some(requested) if requested <= max => Ok(()),
            Some(requested) => Err(DocumentStoreError::validation(format!(
                "limit_page_length {requested} exceeds the maximum of {max}"
            ))),
            None => Err(DocumentStoreError::validation(format!(
                "Unbounded limit_page_length is not allowed, the maximum is {max}"
            ))),
        }
    }
}

/// Checks that `name` is a plain identifier safe to hand to a store.
pub fn validate_identifier(name: &str) -> DocumentStoreResult<()> {
    if name.is_empty() || name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(DocumentStoreError::validation(format!(
            "Field name must be 1 to {MAX_IDENTIFIER_LENGTH} characters"
        )));
    }

    if !identifier_pattern()?.is_match(name) {
        return Err(DocumentStoreError::validation(format!("Invalid field name {name}")));
    }

    Ok(())
}

fn identifier_pattern() -> DocumentStoreResult<&'static Regex> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$"))
        .as_ref()
        .map_err(|err| DocumentStoreError::Backend(err.to_string()))
}
