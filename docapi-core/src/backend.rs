//! Storage backend abstraction consumed by the document services.
//!
//! This module defines the narrow store contract the query and mutation services rely on.
//! Row-level persistence, value counting and single-value storage all live behind
//! [`StoreBackend`]; the services never execute queries themselves.
//!
//! # Child records
//!
//! Child records are persisted inside their parent's table field, but a backend must still
//! make them addressable by their own kind and name: [`StoreBackend::load_document`] on a
//! child kind returns the record with its [`ChildLinkage`](crate::document::ChildLinkage)
//! set, and [`StoreBackend::list_query`] on a child kind lists child records.
//!
//! # Examples
//!
//! ```ignore
//! use docapi::backend::StoreBackend;
//! use docapi::query::ListQuery;
//!
//! let backend = MyBackendImpl::new();
//! let rows = backend.list_query(ListQuery::builder("Task").build()).await?;
//! ```

use async_trait::async_trait;
use bson::{Bson, Document as Mapping};
use std::fmt::Debug;

use crate::{
    document::Document,
    error::DocumentStoreResult,
    query::{Filter, ListQuery},
};

/// Abstract interface for document storage backends.
///
/// # Thread Safety
///
/// All implementations must be thread-safe and support concurrent access from multiple
/// async tasks. Each method is expected to be atomic for the single document it touches;
/// the services do not add transactions, locks or retries on top.
///
/// # Error Handling
///
/// Operations return [`DocumentStoreResult<T>`](crate::error::DocumentStoreResult).
/// Backends report missing documents as
/// [`DocumentNotFound`](crate::error::DocumentStoreError::DocumentNotFound) and identity
/// collisions as [`Conflict`](crate::error::DocumentStoreError::Conflict).
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Runs a normalized list query.
    ///
    /// Returns one mapping per matching record, holding exactly the query's fields in the
    /// query's order. Fields a record does not carry are returned as `Null`.
    async fn list_query(&self, query: ListQuery) -> DocumentStoreResult<Vec<Mapping>>;

    /// Counts the records of `kind` matching `filter` (all records when `None`).
    async fn count_query(&self, kind: &str, filter: Option<Filter>) -> DocumentStoreResult<u64>;

    /// Reads one field of a Single kind. Returns `Null` when it was never set.
    async fn get_single_value(&self, kind: &str, field: &str) -> DocumentStoreResult<Bson>;

    /// Reads several fields of a Single kind, in the requested order.
    async fn get_values_from_single(
        &self,
        kind: &str,
        fields: &[String],
    ) -> DocumentStoreResult<Mapping>;

    /// Loads a full document, including the records of its table fields.
    async fn load_document(&self, kind: &str, name: &str) -> DocumentStoreResult<Document>;

    /// Returns whether a document of `kind` named `name` exists.
    async fn exists(&self, kind: &str, name: &str) -> DocumentStoreResult<bool>;

    /// Persists a new top-level document. The document must already be named.
    async fn insert_document(&self, document: Document) -> DocumentStoreResult<()>;

    /// Replaces an existing top-level document, including its child records.
    async fn update_document(&self, document: Document) -> DocumentStoreResult<()>;

    /// Removes a top-level document and its child records.
    ///
    /// With `ignore_missing` unset a missing document is an error.
    async fn delete_document(
        &self,
        kind: &str,
        name: &str,
        ignore_missing: bool,
    ) -> DocumentStoreResult<()>;

    /// Atomically changes a document's name, returning the resulting name.
    ///
    /// When `new` already exists the rename fails with a conflict unless `merge` is set,
    /// in which case `old` is folded into the existing document.
    async fn rename_document(
        &self,
        kind: &str,
        old: &str,
        new: &str,
        merge: bool,
    ) -> DocumentStoreResult<String>;

    /// Cleanly shuts down the backend, releasing all resources.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for &B
where
    B: StoreBackend,
{
    async fn list_query(&self, query: ListQuery) -> DocumentStoreResult<Vec<Mapping>> {
        (*self).list_query(query).await
    }

    async fn count_query(&self, kind: &str, filter: Option<Filter>) -> DocumentStoreResult<u64> {
        (*self)
            .count_query(kind, filter)
            .await
    }

    async fn get_single_value(&self, kind: &str, field: &str) -> DocumentStoreResult<Bson> {
        (*self)
            .get_single_value(kind, field)
            .await
    }

    async fn get_values_from_single(
        &self,
        kind: &str,
        fields: &[String],
    ) -> DocumentStoreResult<Mapping> {
        (*self)
            .get_values_from_single(kind, fields)
            .await
    }

    async fn load_document(&self, kind: &str, name: &str) -> DocumentStoreResult<Document> {
        (*self)
            .load_document(kind, name)
            .await
    }

    async fn exists(&self, kind: &str, name: &str) -> DocumentStoreResult<bool> {
        (*self).exists(kind, name).await
    }

    async fn insert_document(&self, document: Document) -> DocumentStoreResult<()> {
        (*self).insert_document(document).await
    }

    async fn update_document(&self, document: Document) -> DocumentStoreResult<()> {
        (*self).update_document(document).await
    }

    async fn delete_document(
        &self,
        kind: &str,
        name: &str,
        ignore_missing: bool,
    ) -> DocumentStoreResult<()> {
        (*self)
            .delete_document(kind, name, ignore_missing)
            .await
    }

    async fn rename_document(
        &self,
        kind: &str,
        old: &str,
        new: &str,
        merge: bool,
    ) -> DocumentStoreResult<String> {
        (*self)
            .rename_document(kind, old, new, merge)
            .await
    }
}

/// Factory trait for creating backend instances.
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
