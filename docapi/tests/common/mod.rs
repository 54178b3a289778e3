#![allow(dead_code)]

use async_trait::async_trait;
use docapi::{
    bson::{Bson, Document as Mapping},
    memory::{InMemoryMetadata, InMemoryStore, StaticPermissionEngine},
    prelude::*,
};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

pub type MemoryApi = DocumentApi<InMemoryStore, InMemoryMetadata, StaticPermissionEngine>;

pub fn metadata() -> InMemoryMetadata {
    InMemoryMetadata::builder()
        .kind(
            DocumentKind::builder("Task")
                .field(FieldDef::new("subject", FieldType::Data))
                .field(FieldDef::new("status", FieldType::Select).with_options("Open\nClosed"))
                .field(FieldDef::new("qty", FieldType::Int))
                .field(FieldDef::table("items", "Task Item"))
                .submittable()
                .allow_rename()
                .build(),
        )
        .kind(
            DocumentKind::builder("Task Item")
                .field(FieldDef::new("item", FieldType::Data))
                .field(FieldDef::new("qty", FieldType::Int))
                .child_table()
                .build(),
        )
        .kind(
            DocumentKind::builder("Settings")
                .field(FieldDef::new("currency", FieldType::Data))
                .single()
                .build(),
        )
        .kind(
            DocumentKind::builder("Note")
                .field(FieldDef::new("subject", FieldType::Data))
                .build(),
        )
        .build()
}

pub fn caller() -> CallerContext {
    CallerContext::new("a@example.com")
}

pub fn api() -> MemoryApi {
    DocumentApi::new(InMemoryStore::new(), metadata(), StaticPermissionEngine::allow_all())
}

pub fn api_with(permissions: StaticPermissionEngine) -> MemoryApi {
    DocumentApi::new(InMemoryStore::new(), metadata(), permissions)
}

/// Unwraps a successful response, failing the test with the envelope otherwise.
pub fn success<T>(response: Response<T>) -> T {
    match response.into_result() {
        Ok(value) => value,
        Err(envelope) => panic!("operation failed: {}", envelope.exception),
    }
}

/// Returns the error kind of a failed response.
pub fn failure<T: std::fmt::Debug>(response: Response<T>) -> ErrorKind {
    match response.into_result() {
        Ok(value) => panic!("operation unexpectedly succeeded: {value:?}"),
        Err(envelope) => envelope.kind,
    }
}

pub async fn insert_task(api: &MemoryApi, name: &str, qty: i64) -> Mapping {
    success(
        api.insert_document(
            &caller(),
            serde_json::json!({ "doctype": "Task", "name": name, "subject": format!("Task {name}"), "qty": qty }),
        )
        .await,
    )
}

pub fn child_payload(parent: &str, item: &str) -> serde_json::Value {
    serde_json::json!({
        "doctype": "Task Item",
        "parent": parent,
        "parenttype": "Task",
        "parentfield": "items",
        "item": item,
    })
}

pub fn rows_of(parent: &Mapping, field: &str) -> Vec<Mapping> {
    match parent.get(field) {
        Some(Bson::Array(rows)) => rows
            .iter()
            .filter_map(|row| row.as_document().cloned())
            .collect(),
        _ => Vec::new(),
    }
}

/// Store wrapper counting every call that reaches the backend.
#[derive(Debug, Clone, Default)]
pub struct RecordingStore {
    inner: InMemoryStore,
    calls: Arc<AtomicUsize>,
}

impl RecordingStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl StoreBackend for RecordingStore {
    async fn list_query(&self, query: ListQuery) -> DocumentStoreResult<Vec<Mapping>> {
        self.record();
        self.inner.list_query(query).await
    }

    async fn count_query(&self, kind: &str, filter: Option<Filter>) -> DocumentStoreResult<u64> {
        self.record();
        self.inner.count_query(kind, filter).await
    }

    async fn get_single_value(&self, kind: &str, field: &str) -> DocumentStoreResult<Bson> {
        self.record();
        self.inner.get_single_value(kind, field).await
    }

    async fn get_values_from_single(&self, kind: &str, fields: &[String]) -> DocumentStoreResult<Mapping> {
        self.record();
        self.inner.get_values_from_single(kind, fields).await
    }

    async fn load_document(&self, kind: &str, name: &str) -> DocumentStoreResult<Document> {
        self.record();
        self.inner.load_document(kind, name).await
    }

    async fn exists(&self, kind: &str, name: &str) -> DocumentStoreResult<bool> {
        self.record();
        self.inner.exists(kind, name).await
    }

    async fn insert_document(&self, document: Document) -> DocumentStoreResult<()> {
        self.record();
        self.inner.insert_document(document).await
    }

    async fn update_document(&self, document: Document) -> DocumentStoreResult<()> {
        self.record();
        self.inner.update_document(document).await
    }

    async fn delete_document(&self, kind: &str, name: &str, ignore_missing: bool) -> DocumentStoreResult<()> {
        self.record();
        self.inner
            .delete_document(kind, name, ignore_missing)
            .await
    }

    async fn rename_document(&self, kind: &str, old: &str, new: &str, merge: bool) -> DocumentStoreResult<String> {
        self.record();
        self.inner
            .rename_document(kind, old, new, merge)
            .await
    }
}
