//! Routing between top-level documents and child records held in a parent's table field.
//!
//! Child records are never written directly. A mutation addressed at a child is applied
//! to the parent's table field and the parent is saved as a whole; a read of a child kind
//! must be authorized through a parent kind that actually declares such a table.

use tracing::debug;

use crate::{
    backend::StoreBackend,
    document::{ChildLinkage, Document},
    error::{DocumentStoreError, DocumentStoreResult},
    guard::AccessGuard,
    meta::MetadataProvider,
    permission::{AccessMode, CallerContext, PermissionEngine},
};

/// Where a mutation payload has to be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Directly against the store.
    TopLevel,
    /// Through the parent container described by the linkage.
    Child(ChildLinkage),
}

/// A stored record, together with its parent when it is a child record.
#[derive(Debug, Clone)]
pub enum Existing {
    TopLevel(Document),
    Child {
        parent: Document,
        linkage: ChildLinkage,
        record: Document,
    },
}

#[derive(Debug)]
pub struct ParentChildRouter<'a, S, M, P> {
    store: &'a S,
    meta: &'a M,
    guard: &'a AccessGuard<P>,
}

impl<'a, S, M, P> ParentChildRouter<'a, S, M, P>
where
    S: StoreBackend,
    M: MetadataProvider,
    P: PermissionEngine,
{
    pub fn new(store: &'a S, meta: &'a M, guard: &'a AccessGuard<P>) -> Self {
        Self { store, meta, guard }
    }

    /// Authorizes a read of `child_kind` through `parent_kind`.
    ///
    /// Does nothing for kinds that are not child tables. For child tables the parent kind
    /// must be given, must declare a table field holding `child_kind`, and must be
    /// readable by the caller.
    pub async fn check_parent_permission(
        &self,
        caller: &CallerContext,
        parent_kind: Option<&str>,
        child_kind: &str,
    ) -> DocumentStoreResult<()> {
        if !self
            .meta
            .is_child_table_kind(child_kind)
            .await?
        {
            return Ok(());
        }

        let Some(parent_kind) = parent_kind.filter(|kind| !kind.is_empty()) else {
            return Err(DocumentStoreError::Permission(format!(
                "Parent document kind required to read {child_kind}"
            )));
        };

        let parent = self.meta.describe(parent_kind).await?;
        let declares_child = parent
            .table_fields()
            .any(|field| field.options.as_deref() == Some(child_kind));

        if !declares_child {
            debug!(parent_kind, child_kind, "parent kind does not hold child kind");
            return Err(DocumentStoreError::Permission(format!(
                "{parent_kind} is not a valid parent for {child_kind}"
            )));
        }

        self.guard
            .ensure(caller, parent_kind, AccessMode::Read)
            .await
    }

    /// Loads a stored record and, for child records, its parent.
    pub async fn route_existing(&self, kind: &str, name: &str) -> DocumentStoreResult<Existing> {
        let record = self
            .store
            .load_document(kind, name)
            .await?;

        match record.linkage.clone() {
            Some(linkage) => {
                let parent = self.load_parent(&linkage).await?;
                Ok(Existing::Child { parent, linkage, record })
            }
            None => Ok(Existing::TopLevel(record)),
        }
    }

    pub async fn load_parent(&self, linkage: &ChildLinkage) -> DocumentStoreResult<Document> {
        self.store
            .load_document(&linkage.parenttype, &linkage.parent)
            .await
    }

    /// Appends `row` to the parent's table field named by the linkage.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the parent kind has no table field of that name
    /// holding records of the row's kind, and a conflict when a record of the row's kind
    /// already carries its name.
    pub async fn attach_child(
        &self,
        parent: &mut Document,
        linkage: &ChildLinkage,
        row: Document,
    ) -> DocumentStoreResult<()> {
        self.check_table_field(parent, linkage, &row.kind)
            .await?;

        if let Some(name) = row.name.as_deref() {
            let held = parent
                .child_rows(&linkage.parentfield)?
                .iter()
                .any(|existing| existing.name.as_deref() == Some(name));

            if held || self.store.exists(&row.kind, name).await? {
                return Err(DocumentStoreError::Conflict(format!("{} {name} already exists", row.kind)));
            }
        }

        parent.append_child(&linkage.parentfield, row)
    }

    /// Replaces the row with the same name as `row`, or appends it when there is none.
    pub async fn upsert_child(
        &self,
        parent: &mut Document,
        linkage: &ChildLinkage,
        row: Document,
    ) -> DocumentStoreResult<()> {
        self.check_table_field(parent, linkage, &row.kind)
            .await?;

        let mut rows = parent.child_rows(&linkage.parentfield)?;
        match rows
            .iter()
            .position(|existing| existing.name.is_some() && existing.name == row.name)
        {
            Some(position) => rows[position] = row,
            None => rows.push(row),
        }
        parent.set_child_rows(&linkage.parentfield, rows);

        Ok(())
    }

    async fn check_table_field(
        &self,
        parent: &Document,
        linkage: &ChildLinkage,
        child_kind: &str,
    ) -> DocumentStoreResult<()> {
        let kind = self.meta.describe(&parent.kind).await?;

        if kind
            .table_field_for(&linkage.parentfield, child_kind)
            .is_none()
        {
            return Err(DocumentStoreError::validation(format!(
                "{} is not a table of {child_kind} on {}",
                linkage.parentfield, parent.kind
            )));
        }

        Ok(())
    }
}

/// Decides whether a payload document is a child record.
pub fn route_payload(document: &Document) -> Route {
    match &document.linkage {
        Some(linkage) => Route::Child(linkage.clone()),
        None => Route::TopLevel,
    }
}

/// Removes the row named `name` from the parent's table field named by the linkage.
pub fn remove_child(parent: &mut Document, linkage: &ChildLinkage, kind: &str, name: &str) -> DocumentStoreResult<()> {
    let mut rows = parent.child_rows(&linkage.parentfield)?;
    let before = rows.len();
    rows.retain(|row| row.name.as_deref() != Some(name));

    if rows.len() == before {
        return Err(DocumentStoreError::document_not_found(kind, name));
    }

    parent.set_child_rows(&linkage.parentfield, rows);

    Ok(())
}

/// Replaces the row named like `row` in the parent's table field named by the linkage.
pub fn replace_child(parent: &mut Document, linkage: &ChildLinkage, row: Document) -> DocumentStoreResult<()> {
    let name = row.require_name()?.to_string();
    let mut rows = parent.child_rows(&linkage.parentfield)?;

    let Some(slot) = rows
        .iter_mut()
        .find(|existing| existing.name.as_deref() == Some(name.as_str()))
    else {
        return Err(DocumentStoreError::document_not_found(&row.kind, &name));
    };

    *slot = row;
    parent.set_child_rows(&linkage.parentfield, rows);

    Ok(())
}
