//! The public operation surface.
//!
//! [`DocumentApi`] owns the external collaborators (store, metadata, permission engine and
//! argument validator) together with the configuration, and exposes one method per
//! operation. Every method returns a [`Response`]: errors never escape as `Err`, they are
//! converted into a failure envelope at this boundary.
//!
//! # Example
//!
//! ```ignore
//! use docapi::prelude::*;
//!
//! let api = DocumentApi::new(store, metadata, permissions);
//! let caller = CallerContext::new("a@example.com");
//!
//! let inserted = api
//!     .insert_document(&caller, r#"{"doctype": "Task", "subject": "Write docs"}"#)
//!     .await;
//! let rows = api
//!     .list_documents(&caller, ListArgs::builder("Task").fields(r#"["name", "subject"]"#).build())
//!     .await;
//! ```

use bson::{Bson, Document as Mapping};

use crate::{
    backend::StoreBackend,
    config::ApiConfig,
    envelope::Response,
    error::DocumentStoreResult,
    guard::AccessGuard,
    meta::MetadataProvider,
    normalize::{Payload, RawFilter},
    permission::{CallerContext, PermissionEngine},
    read::{CountCache, GetValueArgs, ListArgs, QueryService, Rows},
    validate::{ArgumentValidator, StandardArgumentValidator},
    write::MutationService,
};

/// Generic document access over a store, a metadata provider and a permission engine.
#[derive(Debug)]
pub struct DocumentApi<S, M, P, V = StandardArgumentValidator> {
    store: S,
    meta: M,
    guard: AccessGuard<P>,
    validator: V,
    config: ApiConfig,
    cache: CountCache,
}

impl<S, M, P> DocumentApi<S, M, P>
where
    S: StoreBackend,
    M: MetadataProvider,
    P: PermissionEngine,
{
    /// Creates an API with the default configuration and argument validator.
    pub fn new(store: S, meta: M, permissions: P) -> Self {
        let config = ApiConfig::default();

        Self {
            store,
            meta,
            guard: AccessGuard::new(permissions),
            validator: StandardArgumentValidator::new(config.max_page_length),
            cache: CountCache::new(config.count_cache_ttl()),
            config,
        }
    }

    /// Replaces the configuration. The count cache is reset.
    pub fn with_config(self, config: ApiConfig) -> Self {
        Self {
            validator: StandardArgumentValidator::new(config.max_page_length),
            cache: CountCache::new(config.count_cache_ttl()),
            config,
            ..self
        }
    }
}

impl<S, M, P, V> DocumentApi<S, M, P, V>
where
    S: StoreBackend,
    M: MetadataProvider,
    P: PermissionEngine,
    V: ArgumentValidator,
{
    /// Replaces the argument validator.
    pub fn with_validator<W: ArgumentValidator>(self, validator: W) -> DocumentApi<S, M, P, W> {
        DocumentApi {
            store: self.store,
            meta: self.meta,
            guard: self.guard,
            validator,
            config: self.config,
            cache: self.cache,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Shuts down the underlying store.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        self.store.shutdown().await
    }

    fn query(&self) -> QueryService<'_, S, M, P, V> {
        QueryService {
            store: &self.store,
            meta: &self.meta,
            guard: &self.guard,
            validator: &self.validator,
            config: &self.config,
            cache: &self.cache,
        }
    }

    fn mutation(&self) -> MutationService<'_, S, M, P> {
        MutationService {
            store: &self.store,
            meta: &self.meta,
            guard: &self.guard,
            config: &self.config,
            cache: &self.cache,
        }
    }

    fn respond<T>(&self, result: DocumentStoreResult<T>) -> Response<T> {
        Response::from_result(result, &self.config)
    }

    /// Lists records of a kind as mappings or positional rows.
    pub async fn list_documents(&self, caller: &CallerContext, args: ListArgs) -> Response<Rows> {
        self.respond(self.query().list(caller, args).await)
    }

    /// Counts records of a kind, optionally from the count cache when unfiltered.
    pub async fn count_documents(
        &self,
        caller: &CallerContext,
        kind: &str,
        filters: impl Into<RawFilter>,
        cache: bool,
    ) -> Response<u64> {
        self.respond(
            self.query()
                .count(caller, kind, filters.into(), cache)
                .await,
        )
    }

    /// Loads a full document by name, or by the first record matching `filters`.
    pub async fn get_document(
        &self,
        caller: &CallerContext,
        kind: &str,
        name: Option<&str>,
        filters: impl Into<RawFilter>,
        parent: Option<&str>,
    ) -> Response<Mapping> {
        self.respond(
            self.query()
                .get(caller, kind, name, filters.into(), parent)
                .await,
        )
    }

    pub async fn get_field_value(&self, caller: &CallerContext, args: GetValueArgs) -> Response<Bson> {
        self.respond(self.query().get_value(caller, args).await)
    }

    pub async fn get_single_value(&self, caller: &CallerContext, kind: &str, field: &str) -> Response<Bson> {
        self.respond(
            self.query()
                .get_single_value(caller, kind, field)
                .await,
        )
    }

    /// Sets one field, or several when `value` is `None` and `fieldname` is a JSON mapping.
    pub async fn set_field_value(
        &self,
        caller: &CallerContext,
        kind: &str,
        name: &str,
        fieldname: &str,
        value: Option<Bson>,
    ) -> Response<Mapping> {
        self.respond(
            self.mutation()
                .set_value(caller, kind, name, fieldname, value)
                .await,
        )
    }

    /// Inserts a document; child records are appended to their parent, which is returned.
    pub async fn insert_document(&self, caller: &CallerContext, document: impl Into<Payload>) -> Response<Mapping> {
        let result = async {
            let document = document.into().into_document()?;
            self.mutation()
                .insert(caller, document)
                .await
                .map(|inserted| inserted.as_dict())
        }
        .await;

        self.respond(result)
    }

    /// Inserts a list of documents in order and returns the resulting names.
    pub async fn insert_many_documents(
        &self,
        caller: &CallerContext,
        documents: impl Into<Payload>,
    ) -> Response<Vec<String>> {
        let result = async {
            let documents = documents.into().into_mappings()?;
            self.mutation()
                .insert_many(caller, documents)
                .await
        }
        .await;

        self.respond(result)
    }

    pub async fn save_document(&self, caller: &CallerContext, document: impl Into<Payload>) -> Response<Mapping> {
        let result = async {
            let document = document.into().into_document()?;
            self.mutation()
                .save(caller, document)
                .await
                .map(|saved| saved.as_dict())
        }
        .await;

        self.respond(result)
    }

    /// Renames a document and returns its resulting name.
    pub async fn rename_document(
        &self,
        caller: &CallerContext,
        kind: &str,
        old_name: &str,
        new_name: &str,
        merge: bool,
    ) -> Response<String> {
        self.respond(
            self.mutation()
                .rename(caller, kind, old_name, new_name, merge)
                .await,
        )
    }

    pub async fn submit_document(&self, caller: &CallerContext, document: impl Into<Payload>) -> Response<Mapping> {
        let result = async {
            let document = document.into().into_document()?;
            self.mutation()
                .submit(caller, document)
                .await
                .map(|submitted| submitted.as_dict())
        }
        .await;

        self.respond(result)
    }

    pub async fn cancel_document(&self, caller: &CallerContext, kind: &str, name: &str) -> Response<Mapping> {
        self.respond(
            self.mutation()
                .cancel(caller, kind, name)
                .await
                .map(|cancelled| cancelled.as_dict()),
        )
    }

    /// Permanently deletes a document. Deleting a missing document fails.
    pub async fn delete_document(&self, caller: &CallerContext, kind: &str, name: &str) -> Response<()> {
        self.respond(
            self.mutation()
                .delete(caller, kind, name)
                .await,
        )
    }
}
