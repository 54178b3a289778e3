//! The write path: set-value, insert, save, rename, submit, cancel and delete.
//!
//! Every mutation goes through the same steps. The payload is validated against the kind
//! descriptor and the caller's instance permission, system fields are stamped and child
//! rows linked, the store persists the top-level document, and the stored state is
//! reloaded and returned. Mutations addressed at child records are applied to the parent
//! container and the parent is saved instead.

use bson::{Bson, Document as Mapping};
use tracing::{debug, info};

use crate::{
    backend::StoreBackend,
    config::ApiConfig,
    document::{ChildLinkage, DocStatus, Document, STANDARD_FIELDS, generate_name},
    error::{DocumentStoreError, DocumentStoreResult},
    guard::AccessGuard,
    meta::{DocumentKind, MetadataProvider},
    normalize::json_to_bson,
    permission::{AccessMode, CallerContext, PermissionEngine},
    read::CountCache,
    router::{Existing, ParentChildRouter, Route, remove_child, replace_child, route_payload},
};

/// The document mutation service.
#[derive(Debug)]
pub struct MutationService<'a, S, M, P> {
    pub(crate) store: &'a S,
    pub(crate) meta: &'a M,
    pub(crate) guard: &'a AccessGuard<P>,
    pub(crate) config: &'a ApiConfig,
    pub(crate) cache: &'a CountCache,
}

impl<'a, S, M, P> MutationService<'a, S, M, P>
where
    S: StoreBackend,
    M: MetadataProvider,
    P: PermissionEngine,
{
    fn router(&self) -> ParentChildRouter<'a, S, M, P> {
        ParentChildRouter::new(self.store, self.meta, self.guard)
    }

    /// Updates fields of a stored record.
    ///
    /// Without a `value`, `fieldname` is read as a JSON mapping of updates, or as a single
    /// field to clear when it does not decode. Standard fields other than `idx` cannot be
    /// written. Child records are updated inside their parent, and the parent is returned.
    pub async fn set_value(
        &self,
        caller: &CallerContext,
        kind: &str,
        name: &str,
        fieldname: &str,
        value: Option<Bson>,
    ) -> DocumentStoreResult<Mapping> {
        debug!(kind, name, fieldname, user = %caller.user, "set_value");

        let values = update_values(fieldname, value)?;
        check_reserved(&values, &self.meta.standard_field_names())?;

        self.guard
            .ensure(caller, kind, AccessMode::Write)
            .await?;

        let saved = match self
            .router()
            .route_existing(kind, name)
            .await?
        {
            Existing::TopLevel(mut document) => {
                self.guard
                    .ensure_instance(caller, &document, AccessMode::Write)
                    .await?;

                let previous = document.docstatus;
                document.update(values);
                self.save_existing(caller, document, previous)
                    .await?
            }
            Existing::Child { mut parent, linkage, mut record } => {
                self.guard
                    .ensure(caller, &linkage.parenttype, AccessMode::Write)
                    .await?;

                record.update(values);
                replace_child(&mut parent, &linkage, record)?;

                let previous = parent.docstatus;
                self.save_existing(caller, parent, previous)
                    .await?
            }
        };

        Ok(saved.as_dict())
    }

    /// Inserts a document, or appends a child record to its parent.
    ///
    /// Returns the new document, or the re-saved parent for child records.
    pub async fn insert(&self, caller: &CallerContext, document: Document) -> DocumentStoreResult<Document> {
        debug!(kind = %document.kind, user = %caller.user, "insert");

        match route_payload(&document) {
            Route::Child(linkage) => {
                self.guard
                    .ensure(caller, &linkage.parenttype, AccessMode::Write)
                    .await?;

                let mut parent = self.router().load_parent(&linkage).await?;
                let previous = parent.docstatus;
                self.router()
                    .attach_child(&mut parent, &linkage, document)
                    .await?;

                self.save_existing(caller, parent, previous)
                    .await
            }
            Route::TopLevel => self.insert_new(caller, document).await,
        }
    }

    /// Inserts each document in order, stopping at the first failure.
    ///
    /// The batch is not atomic: documents inserted before a failure stay inserted.
    pub async fn insert_many(&self, caller: &CallerContext, documents: Vec<Mapping>) -> DocumentStoreResult<Vec<String>> {
        debug!(count = documents.len(), user = %caller.user, "insert_many");

        if documents.len() > self.config.max_batch_insert {
            return Err(DocumentStoreError::validation(format!(
                "Only {} inserts allowed in one request",
                self.config.max_batch_insert
            )));
        }

        let mut names = Vec::with_capacity(documents.len());
        for mapping in documents {
            let document = Document::from_mapping(mapping)?;
            let inserted = self.insert(caller, document).await?;
            names.push(inserted.require_name()?.to_string());
        }

        Ok(names)
    }

    /// Saves a document, inserting it when it is not stored yet.
    ///
    /// Provided fields are applied over the stored state. A `modified` timestamp in the
    /// payload that no longer matches the stored one is a conflict.
    pub async fn save(&self, caller: &CallerContext, document: Document) -> DocumentStoreResult<Document> {
        debug!(kind = %document.kind, name = ?document.name, user = %caller.user, "save");

        if let Route::Child(linkage) = route_payload(&document) {
            return self.save_child(caller, document, linkage).await;
        }

        let kind = self.meta.describe(&document.kind).await?;
        if document.name.is_none() && !kind.is_single {
            return self.insert_new(caller, document).await;
        }

        self.guard
            .ensure(caller, &kind.name, AccessMode::Write)
            .await?;
        let Some(stored) = self.stored_counterpart(&kind, &document).await? else {
            return self.insert_new(caller, document).await;
        };

        self.guard
            .ensure_instance(caller, &stored, AccessMode::Write)
            .await?;
        check_not_stale(&stored, &document)?;

        let previous = stored.docstatus;
        let merged = merge_into(stored, document);
        self.save_existing(caller, merged, previous)
            .await
    }

    /// Moves a document from draft to submitted, inserting it first when it is new.
    pub async fn submit(&self, caller: &CallerContext, mut document: Document) -> DocumentStoreResult<Document> {
        debug!(kind = %document.kind, name = ?document.name, user = %caller.user, "submit");

        let kind = self.meta.describe(&document.kind).await?;
        self.ensure_submittable(caller, &kind).await?;

        let submitted = match self.stored_counterpart(&kind, &document).await? {
            None => {
                document.docstatus = DocStatus::Submitted;
                self.insert_new(caller, document).await?
            }
            Some(stored) => {
                self.guard
                    .ensure_instance(caller, &stored, AccessMode::Submit)
                    .await?;
                check_not_stale(&stored, &document)?;

                if stored.docstatus != DocStatus::Draft {
                    return Err(DocumentStoreError::validation(format!(
                        "Cannot submit {} {}: it is not a draft",
                        kind.name,
                        stored.name.as_deref().unwrap_or_default()
                    )));
                }

                let mut merged = merge_into(stored, document);
                merged.docstatus = DocStatus::Submitted;
                self.commit_update(caller, &kind, merged)
                    .await?
            }
        };

        info!(kind = %kind.name, name = ?submitted.name, user = %caller.user, "document submitted");
        Ok(submitted)
    }

    /// Moves a submitted document to cancelled.
    pub async fn cancel(&self, caller: &CallerContext, kind: &str, name: &str) -> DocumentStoreResult<Document> {
        debug!(kind, name, user = %caller.user, "cancel");

        self.guard
            .ensure(caller, kind, AccessMode::Cancel)
            .await?;

        let descriptor = self.meta.describe(kind).await?;
        let mut document = self
            .store
            .load_document(kind, name)
            .await?;

        self.guard
            .ensure_instance(caller, &document, AccessMode::Cancel)
            .await?;

        if document.docstatus != DocStatus::Submitted {
            return Err(DocumentStoreError::validation(format!(
                "Cannot cancel {kind} {name}: it has not been submitted"
            )));
        }

        document.docstatus = DocStatus::Cancelled;
        let cancelled = self
            .commit_update(caller, &descriptor, document)
            .await?;

        info!(kind, name, user = %caller.user, "document cancelled");
        Ok(cancelled)
    }

    /// Deletes a stored document. A missing document is an error.
    ///
    /// Child records are removed from their parent, which is then saved.
    pub async fn delete(&self, caller: &CallerContext, kind: &str, name: &str) -> DocumentStoreResult<()> {
        debug!(kind, name, user = %caller.user, "delete");

        self.guard
            .ensure(caller, kind, AccessMode::Delete)
            .await?;

        match self
            .router()
            .route_existing(kind, name)
            .await?
        {
            Existing::TopLevel(document) => {
                self.guard
                    .ensure_instance(caller, &document, AccessMode::Delete)
                    .await?;

                if document.docstatus == DocStatus::Submitted {
                    return Err(DocumentStoreError::validation(format!(
                        "Cannot delete submitted {kind} {name}; cancel it first"
                    )));
                }

                self.store
                    .delete_document(kind, name, false)
                    .await?;
                self.invalidate(&self.meta.describe(kind).await?)
                    .await;
            }
            Existing::Child { mut parent, linkage, .. } => {
                self.guard
                    .ensure(caller, &linkage.parenttype, AccessMode::Write)
                    .await?;

                remove_child(&mut parent, &linkage, kind, name)?;
                let previous = parent.docstatus;
                self.save_existing(caller, parent, previous)
                    .await?;
            }
        }

        info!(kind, name, user = %caller.user, "document deleted");
        Ok(())
    }

    /// Renames a document, optionally merging it into an existing one.
    pub async fn rename(
        &self,
        caller: &CallerContext,
        kind: &str,
        old_name: &str,
        new_name: &str,
        merge: bool,
    ) -> DocumentStoreResult<String> {
        debug!(kind, old_name, new_name, merge, user = %caller.user, "rename");

        self.guard
            .ensure(caller, kind, AccessMode::Write)
            .await?;

        let descriptor = self.meta.describe(kind).await?;
        if !descriptor.allow_rename || descriptor.is_single || descriptor.is_child_table {
            return Err(DocumentStoreError::validation(format!("{kind} documents cannot be renamed")));
        }

        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(DocumentStoreError::validation("New name is required"));
        }

        let document = self
            .store
            .load_document(kind, old_name)
            .await?;
        self.guard
            .ensure_instance(caller, &document, AccessMode::Write)
            .await?;

        if old_name == new_name {
            return Ok(new_name.to_string());
        }

        if merge {
            if let Ok(target) = self.store.load_document(kind, new_name).await {
                self.guard
                    .ensure_instance(caller, &target, AccessMode::Write)
                    .await?;
            }
        }

        let renamed = self
            .store
            .rename_document(kind, old_name, new_name, merge)
            .await?;
        self.invalidate(&descriptor).await;

        info!(kind, old_name, new_name = %renamed, merge, user = %caller.user, "document renamed");
        Ok(renamed)
    }

    /// Upserts a child record inside its parent and returns the stored record.
    async fn save_child(
        &self,
        caller: &CallerContext,
        mut row: Document,
        linkage: ChildLinkage,
    ) -> DocumentStoreResult<Document> {
        self.guard
            .ensure(caller, &linkage.parenttype, AccessMode::Write)
            .await?;

        let mut parent = self.router().load_parent(&linkage).await?;
        let previous = parent.docstatus;

        if row.name.is_none() {
            row.name = Some(generate_name());
        }
        let (kind, name) = (row.kind.clone(), row.require_name()?.to_string());

        let merged = match parent
            .child_rows(&linkage.parentfield)?
            .into_iter()
            .find(|existing| existing.name.as_deref() == Some(name.as_str()))
        {
            Some(existing) => {
                check_not_stale(&existing, &row)?;
                merge_into(existing, row)
            }
            None => row,
        };

        self.router()
            .upsert_child(&mut parent, &linkage, merged)
            .await?;
        self.save_existing(caller, parent, previous)
            .await?;

        self.store
            .load_document(&kind, &name)
            .await
    }

    /// Saves a loaded and modified top-level document after checking its status change.
    async fn save_existing(
        &self,
        caller: &CallerContext,
        document: Document,
        previous: DocStatus,
    ) -> DocumentStoreResult<Document> {
        let kind = self.meta.describe(&document.kind).await?;

        previous.check_save_transition(document.docstatus)?;
        if document.docstatus == DocStatus::Submitted {
            self.ensure_submittable(caller, &kind).await?;
        }

        self.guard
            .ensure_instance(caller, &document, AccessMode::Write)
            .await?;

        self.commit_update(caller, &kind, document)
            .await
    }

    async fn insert_new(&self, caller: &CallerContext, mut document: Document) -> DocumentStoreResult<Document> {
        self.guard
            .ensure(caller, &document.kind, AccessMode::Create)
            .await?;

        let kind = self.meta.describe(&document.kind).await?;
        match document.docstatus {
            DocStatus::Draft => {}
            DocStatus::Submitted => self.ensure_submittable(caller, &kind).await?,
            DocStatus::Cancelled => {
                return Err(DocumentStoreError::validation("Cannot insert a cancelled document"));
            }
        }

        if kind.is_single {
            document.name = Some(kind.name.clone());
        } else if document.name.is_none() {
            document.name = Some(generate_name());
        }

        document.stamp_created(&caller.user);
        self.prepare(&kind, &mut document).await?;

        self.guard
            .ensure_instance(caller, &document, AccessMode::Create)
            .await?;

        let name = document.require_name()?.to_string();
        self.store
            .insert_document(document)
            .await?;
        self.invalidate(&kind).await;

        self.store
            .load_document(&kind.name, &name)
            .await
    }

    async fn commit_update(
        &self,
        caller: &CallerContext,
        kind: &DocumentKind,
        mut document: Document,
    ) -> DocumentStoreResult<Document> {
        document.stamp_modified(&caller.user);
        self.prepare(kind, &mut document).await?;

        let name = document.require_name()?.to_string();
        self.store
            .update_document(document)
            .await?;
        self.invalidate(kind).await;

        self.store
            .load_document(&kind.name, &name)
            .await
    }

    /// Checks field names and types, then normalizes and links every table field's rows.
    async fn prepare(&self, kind: &DocumentKind, document: &mut Document) -> DocumentStoreResult<()> {
        check_fields(kind, &document.fields)?;

        for table in kind.table_fields() {
            let Some(child_kind) = table.options.as_deref() else {
                continue;
            };
            if document.get(&table.name).is_none() {
                continue;
            }

            let child = self.meta.describe(child_kind).await?;
            fill_row_kinds(document, &table.name, child_kind);

            let mut rows = document.child_rows(&table.name)?;
            for row in &rows {
                if row.kind != child_kind {
                    return Err(DocumentStoreError::validation(format!(
                        "{} rows must be {child_kind}, got {}",
                        table.name, row.kind
                    )));
                }
                check_fields(&child, &row.fields)?;
            }

            rows.sort_by_key(position_of);
            document.set_child_rows(&table.name, rows);
            document.link_children(&table.name)?;
        }

        Ok(())
    }

    async fn ensure_submittable(&self, caller: &CallerContext, kind: &DocumentKind) -> DocumentStoreResult<()> {
        if !kind.is_submittable {
            return Err(DocumentStoreError::validation(format!("{} is not submittable", kind.name)));
        }

        self.guard
            .ensure(caller, &kind.name, AccessMode::Submit)
            .await
    }

    async fn stored_counterpart(&self, kind: &DocumentKind, document: &Document) -> DocumentStoreResult<Option<Document>> {
        let name = if kind.is_single {
            kind.name.as_str()
        } else {
            match document.name.as_deref() {
                Some(name) => name,
                None => return Ok(None),
            }
        };

        if !self.store.exists(&kind.name, name).await? {
            return Ok(None);
        }

        self.store
            .load_document(&kind.name, name)
            .await
            .map(Some)
    }

    async fn invalidate(&self, kind: &DocumentKind) {
        self.cache.invalidate(&kind.name).await;
        for table in kind.table_fields() {
            if let Some(child_kind) = table.options.as_deref() {
                self.cache.invalidate(child_kind).await;
            }
        }
    }
}

/// Builds the update mapping of a set-value call.
fn update_values(fieldname: &str, value: Option<Bson>) -> DocumentStoreResult<Mapping> {
    match value {
        Some(value) if value != Bson::Null => {
            let mut values = Mapping::new();
            values.insert(fieldname, value);
            Ok(values)
        }
        _ => match serde_json::from_str::<serde_json::Value>(fieldname) {
            Ok(decoded @ serde_json::Value::Object(_)) => match json_to_bson(&decoded)? {
                Bson::Document(values) => Ok(values),
                other => Err(DocumentStoreError::Decode(format!("Expected a mapping of values, got {other}"))),
            },
            _ => {
                let mut values = Mapping::new();
                values.insert(fieldname, "");
                Ok(values)
            }
        },
    }
}

fn check_reserved(values: &Mapping, reserved: &[String]) -> DocumentStoreResult<()> {
    match values
        .keys()
        .find(|key| key.as_str() != "idx" && reserved.contains(key))
    {
        Some(key) => Err(DocumentStoreError::validation(format!("Cannot edit standard field {key}"))),
        None => Ok(()),
    }
}

fn check_fields(kind: &DocumentKind, fields: &Mapping) -> DocumentStoreResult<()> {
    for (field, value) in fields {
        if STANDARD_FIELDS.contains(&field.as_str()) {
            continue;
        }

        let Some(def) = kind.field(field) else {
            return Err(DocumentStoreError::validation(format!(
                "Field {field} does not exist on {}",
                kind.name
            )));
        };

        if !def.field_type.accepts(value) {
            return Err(DocumentStoreError::validation(format!(
                "Invalid value {value} for {:?} field {field} on {}",
                def.field_type, kind.name
            )));
        }
    }

    Ok(())
}

/// Payload rows may leave out their kind; it is implied by the table field.
fn fill_row_kinds(document: &mut Document, field: &str, child_kind: &str) {
    if let Some(Bson::Array(rows)) = document.fields.get_mut(field) {
        for row in rows.iter_mut() {
            if let Bson::Document(mapping) = row {
                if !mapping.contains_key("doctype") {
                    mapping.insert("doctype", child_kind);
                }
            }
        }
    }
}

/// Sort key of a child row: its `idx`, with unnumbered rows last.
fn position_of(row: &Document) -> i64 {
    match row.get("idx") {
        Some(Bson::Int32(idx)) => i64::from(*idx),
        Some(Bson::Int64(idx)) => *idx,
        Some(Bson::Double(idx)) => *idx as i64,
        _ => i64::MAX,
    }
}

fn check_not_stale(stored: &Document, payload: &Document) -> DocumentStoreResult<()> {
    match (payload.get_str("modified"), stored.get_str("modified")) {
        (Some(seen), Some(current)) if seen != current => Err(DocumentStoreError::Conflict(format!(
            "{} {} has been modified after you opened it",
            stored.kind,
            stored.name.as_deref().unwrap_or_default()
        ))),
        _ => Ok(()),
    }
}

/// Applies a payload over the stored state, keeping creation metadata.
fn merge_into(mut stored: Document, payload: Document) -> Document {
    let docstatus = payload.docstatus;
    let mut fields = payload.fields;
    for key in ["owner", "creation", "modified", "modified_by"] {
        fields.remove(key);
    }

    stored.update(fields);
    stored.docstatus = docstatus;
    stored
}
