//! The read path: list, count, get, get-value and single values.
//!
//! Every operation checks read access on the kind (and, for child tables, on the parent
//! kind) before the store is asked anything. Caller input is normalized and validated
//! here so that backends only ever see a well-formed [`ListQuery`].

use bson::{Bson, Document as Mapping};
use mea::rwlock::RwLock;
use serde::Serialize;
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};
use tracing::debug;

use crate::{
    backend::StoreBackend,
    config::ApiConfig,
    error::{DocumentStoreError, DocumentStoreResult},
    guard::AccessGuard,
    meta::{DocumentKind, MetadataProvider},
    normalize::{RawFields, RawFilter, normalize_filter, normalize_filter_strict, resolve_fields, safe_filters},
    permission::{AccessMode, CallerContext, PermissionEngine},
    query::{FieldList, Filter, ListQuery, Sort},
    router::ParentChildRouter,
    validate::ArgumentValidator,
};

/// Arguments of a list query, as supplied by a caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ListArgs {
    pub kind: String,
    /// Projected fields. Only `name` when unset.
    pub fields: RawFields,
    pub filters: RawFilter,
    pub or_filters: RawFilter,
    /// An `order_by` clause such as `"modified desc, name"`.
    pub order_by: Option<String>,
    pub limit_start: Option<usize>,
    /// Page size. The configured default when unset, unbounded when `Some(0)`.
    pub limit_page_length: Option<usize>,
    /// Parent kind, required when `kind` is a child table.
    pub parent: Option<String>,
    /// Return rows as mappings rather than positional values.
    pub as_dict: bool,
}

impl ListArgs {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            fields: RawFields::None,
            filters: RawFilter::None,
            or_filters: RawFilter::None,
            order_by: None,
            limit_start: None,
            limit_page_length: None,
            parent: None,
            as_dict: true,
        }
    }

    pub fn builder(kind: impl Into<String>) -> ListArgsBuilder {
        ListArgsBuilder { args: ListArgs::new(kind) }
    }
}

#[derive(Debug, Clone)]
pub struct ListArgsBuilder {
    args: ListArgs,
}

impl ListArgsBuilder {
    pub fn fields(mut self, fields: impl Into<RawFields>) -> Self {
        self.args.fields = fields.into();
        self
    }

    pub fn filters(mut self, filters: impl Into<RawFilter>) -> Self {
        self.args.filters = filters.into();
        self
    }

    pub fn or_filters(mut self, or_filters: impl Into<RawFilter>) -> Self {
        self.args.or_filters = or_filters.into();
        self
    }

    pub fn order_by(mut self, clause: impl Into<String>) -> Self {
        self.args.order_by = Some(clause.into());
        self
    }

    pub fn limit_start(mut self, start: usize) -> Self {
        self.args.limit_start = Some(start);
        self
    }

    pub fn limit_page_length(mut self, length: usize) -> Self {
        self.args.limit_page_length = Some(length);
        self
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.args.parent = Some(parent.into());
        self
    }

    pub fn as_dict(mut self, as_dict: bool) -> Self {
        self.args.as_dict = as_dict;
        self
    }

    pub fn build(self) -> ListArgs {
        self.args
    }
}

/// Arguments of a single-row value lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct GetValueArgs {
    pub kind: String,
    /// One field name, or JSON text listing several.
    pub fieldname: RawFields,
    pub filters: RawFilter,
    pub as_dict: bool,
    pub parent: Option<String>,
}

impl GetValueArgs {
    pub fn new(kind: impl Into<String>, fieldname: impl Into<RawFields>) -> Self {
        Self {
            kind: kind.into(),
            fieldname: fieldname.into(),
            filters: RawFilter::None,
            as_dict: true,
            parent: None,
        }
    }

    pub fn builder(kind: impl Into<String>, fieldname: impl Into<RawFields>) -> GetValueArgsBuilder {
        GetValueArgsBuilder {
            args: GetValueArgs::new(kind, fieldname),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GetValueArgsBuilder {
    args: GetValueArgs,
}

impl GetValueArgsBuilder {
    pub fn filters(mut self, filters: impl Into<RawFilter>) -> Self {
        self.args.filters = filters.into();
        self
    }

    pub fn as_dict(mut self, as_dict: bool) -> Self {
        self.args.as_dict = as_dict;
        self
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.args.parent = Some(parent.into());
        self
    }

    pub fn build(self) -> GetValueArgs {
        self.args
    }
}

/// Rows returned by a list query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Rows {
    /// One field-value mapping per record.
    Dicts(Vec<Mapping>),
    /// One positional value list per record, in projection order.
    Tuples(Vec<Vec<Bson>>),
}

impl Rows {
    pub fn len(&self) -> usize {
        match self {
            Rows::Dicts(rows) => rows.len(),
            Rows::Tuples(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cache of unfiltered per-kind counts.
#[derive(Debug)]
pub struct CountCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, (u64, Instant)>>,
}

impl CountCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, kind: &str) -> Option<u64> {
        let entries = self.entries.read().await;

        entries
            .get(kind)
            .filter(|(_, stored)| stored.elapsed() < self.ttl)
            .map(|(count, _)| *count)
    }

    pub async fn put(&self, kind: &str, count: u64) {
        let mut entries = self.entries.write().await;
        entries.insert(kind.to_string(), (count, Instant::now()));
    }

    pub async fn invalidate(&self, kind: &str) {
        let mut entries = self.entries.write().await;
        entries.remove(kind);
    }
}

/// The document query service.
#[derive(Debug)]
pub struct QueryService<'a, S, M, P, V> {
    pub(crate) store: &'a S,
    pub(crate) meta: &'a M,
    pub(crate) guard: &'a AccessGuard<P>,
    pub(crate) validator: &'a V,
    pub(crate) config: &'a ApiConfig,
    pub(crate) cache: &'a CountCache,
}

impl<'a, S, M, P, V> QueryService<'a, S, M, P, V>
where
    S: StoreBackend,
    M: MetadataProvider,
    P: PermissionEngine,
    V: ArgumentValidator,
{
    fn router(&self) -> ParentChildRouter<'a, S, M, P> {
        ParentChildRouter::new(self.store, self.meta, self.guard)
    }

    /// Lists records of a kind.
    pub async fn list(&self, caller: &CallerContext, args: ListArgs) -> DocumentStoreResult<Rows> {
        debug!(kind = %args.kind, user = %caller.user, "list");

        self.guard
            .ensure(caller, &args.kind, AccessMode::Read)
            .await?;
        self.router()
            .check_parent_permission(caller, args.parent.as_deref(), &args.kind)
            .await?;

        let kind = self.meta.describe(&args.kind).await?;

        let fields = match args.fields {
            RawFields::None => vec!["name".to_string()],
            raw => expand_fields(&kind, resolve_fields(raw)),
        };
        let order_by = match args.order_by.as_deref().map(str::trim) {
            None | Some("") => Sort::default_order(),
            Some(clause) => Sort::parse_clause(clause)?,
        };

        let query = ListQuery {
            kind: kind.name.clone(),
            fields: fields.clone(),
            filters: normalize_filter(args.filters)?,
            or_filters: normalize_filter(args.or_filters)?,
            order_by,
            limit_start: args.limit_start,
            limit_page_length: Some(
                args.limit_page_length
                    .unwrap_or(self.config.default_page_length),
            ),
        };

        self.validator
            .validate_list(&kind, &query)?;

        let rows = self.store.list_query(query).await?;

        if args.as_dict {
            return Ok(Rows::Dicts(rows));
        }

        Ok(Rows::Tuples(
            rows.iter()
                .map(|row| project(row, &fields))
                .collect(),
        ))
    }

    /// Counts records of a kind. Malformed filter conditions are dropped, never raised.
    pub async fn count(
        &self,
        caller: &CallerContext,
        kind: &str,
        filters: RawFilter,
        cache: bool,
    ) -> DocumentStoreResult<u64> {
        debug!(kind, user = %caller.user, cache, "count");

        self.guard
            .ensure(caller, kind, AccessMode::Read)
            .await?;

        let filter = safe_filters(filters);
        let cacheable = cache && filter.is_none();

        if cacheable {
            if let Some(count) = self.cache.get(kind).await {
                return Ok(count);
            }
        }

        let count = self
            .store
            .count_query(kind, filter)
            .await?;

        if cacheable {
            self.cache.put(kind, count).await;
        }

        Ok(count)
    }

    /// Loads one full document, by name or by the first record matching `filters`.
    pub async fn get(
        &self,
        caller: &CallerContext,
        kind: &str,
        name: Option<&str>,
        filters: RawFilter,
        parent: Option<&str>,
    ) -> DocumentStoreResult<Mapping> {
        debug!(kind, name, user = %caller.user, "get");

        self.guard
            .ensure(caller, kind, AccessMode::Read)
            .await?;
        self.router()
            .check_parent_permission(caller, parent, kind)
            .await?;

        let descriptor = self.meta.describe(kind).await?;

        let name = match name.filter(|name| !name.is_empty()) {
            Some(name) => name.to_string(),
            None => match normalize_filter_strict(filters)? {
                Some(filter) => self.first_name(&descriptor, filter).await?,
                None if descriptor.is_single => descriptor.name.clone(),
                None => {
                    return Err(DocumentStoreError::validation(format!(
                        "A name or filters are required to get {kind}"
                    )));
                }
            },
        };

        let document = self
            .store
            .load_document(kind, &name)
            .await?;

        self.guard
            .ensure_instance(caller, &document, AccessMode::Read)
            .await?;

        Ok(document.as_dict())
    }

    /// Reads one or more fields of the first matching record.
    ///
    /// With `as_dict` the result is a mapping (empty when nothing matched). Otherwise it
    /// is `Null` when nothing matched, the bare value when one field was requested, and
    /// the positional values when several were.
    pub async fn get_value(&self, caller: &CallerContext, args: GetValueArgs) -> DocumentStoreResult<Bson> {
        debug!(kind = %args.kind, user = %caller.user, "get_value");

        self.router()
            .check_parent_permission(caller, args.parent.as_deref(), &args.kind)
            .await?;
        self.guard
            .ensure(caller, &args.kind, AccessMode::Read)
            .await?;

        let kind = self.meta.describe(&args.kind).await?;
        let filter = normalize_filter(args.filters)?;
        let fields = expand_fields(&kind, resolve_fields(args.fieldname));

        let row = if kind.is_single {
            check_single_filter(&kind, filter.as_ref())?;
            if let Some(unknown) = fields.iter().find(|field| !kind.has_field(field)) {
                return Err(DocumentStoreError::validation(format!(
                    "Field {unknown} does not exist on {}",
                    kind.name
                )));
            }
            Some(
                self.store
                    .get_values_from_single(&kind.name, &fields)
                    .await?,
            )
        } else {
            let mut list = ListArgs::builder(kind.name.clone())
                .fields(fields.clone())
                .limit_page_length(1);
            if let Some(filter) = filter {
                list = list.filters(filter);
            }
            if let Some(parent) = args.parent {
                list = list.parent(parent);
            }

            match self.list(caller, list.build()).await? {
                Rows::Dicts(rows) => rows.into_iter().next(),
                Rows::Tuples(_) => None,
            }
        };

        if args.as_dict {
            return Ok(Bson::Document(row.unwrap_or_default()));
        }

        let Some(row) = row else {
            return Ok(Bson::Null);
        };

        let mut values = project(&row, &fields);
        if values.len() == 1 {
            return Ok(values.remove(0));
        }

        Ok(Bson::Array(values))
    }

    /// Reads one field of a Single kind.
    pub async fn get_single_value(&self, caller: &CallerContext, kind: &str, field: &str) -> DocumentStoreResult<Bson> {
        debug!(kind, field, user = %caller.user, "get_single_value");

        self.guard
            .ensure(caller, kind, AccessMode::Read)
            .await?;

        let descriptor = self.meta.describe(kind).await?;
        if !descriptor.is_single {
            return Err(DocumentStoreError::validation(format!("{kind} is not a Single kind")));
        }
        if !descriptor.has_field(field) {
            return Err(DocumentStoreError::validation(format!("Field {field} does not exist on {kind}")));
        }

        self.store
            .get_single_value(kind, field)
            .await
    }

    async fn first_name(&self, kind: &DocumentKind, filter: Filter) -> DocumentStoreResult<String> {
        let query = ListQuery::builder(kind.name.clone())
            .filters(filter)
            .limit_page_length(1)
            .build();

        self.validator
            .validate_list(kind, &query)?;

        self.store
            .list_query(query)
            .await?
            .first()
            .and_then(|row| row.get_str("name").ok())
            .map(str::to_string)
            .ok_or_else(|| DocumentStoreError::NotFound("No document found for given filters".to_string()))
    }
}

/// Expands wildcard entries into the kind's default projection.
fn expand_fields(kind: &DocumentKind, fields: FieldList) -> Vec<String> {
    match fields {
        FieldList::All => kind.default_fields(),
        FieldList::Fields(fields) => fields
            .into_iter()
            .flat_map(|field| match field.as_str() {
                "*" => kind.default_fields(),
                _ => vec![field],
            })
            .collect(),
    }
}

fn project(row: &Mapping, fields: &[String]) -> Vec<Bson> {
    fields
        .iter()
        .map(|field| row.get(field).cloned().unwrap_or(Bson::Null))
        .collect()
}

/// Single kinds have one implicit record, so the only meaningful filter names it.
fn check_single_filter(kind: &DocumentKind, filter: Option<&Filter>) -> DocumentStoreResult<()> {
    let Some(filter) = filter else {
        return Ok(());
    };

    let names_kind = filter.conditions.len() == 1
        && filter
            .name_value()
            .and_then(Bson::as_str)
            == Some(kind.name.as_str());

    if names_kind {
        Ok(())
    } else {
        Err(DocumentStoreError::validation(format!(
            "{} is a Single kind and cannot be filtered",
            kind.name
        )))
    }
}
