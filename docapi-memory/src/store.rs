//! In-memory storage implementation of the store backend.
//!
//! Top-level documents are kept as flat field mappings per kind, with child records
//! embedded in their parent's table fields exactly as the services write them. Child
//! records stay addressable by their own kind and name through a scan of those fields.

use async_trait::async_trait;
use bson::{Bson, Document as Mapping};
use mea::rwlock::RwLock;
use std::{collections::HashMap, sync::Arc};
use tracing::debug;

use docapi_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    document::Document,
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Filter, ListQuery},
};

use crate::evaluator::{DocumentEvaluator, compare_records};

type KindMap = HashMap<String, Mapping>;
type StoreMap = HashMap<String, KindMap>;

/// Thread-safe in-memory document storage backend.
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing it to
/// be shared across async tasks. Clones share the same underlying data.
///
/// Queries scan every record of a kind (no indexing), so this backend is meant for
/// development and tests.
///
/// # Example
///
/// ```ignore
/// use docapi_memory::InMemoryStore;
/// use docapi::backend::StoreBackend;
///
/// let store = InMemoryStore::new();
/// store.insert_document(document).await?;
/// let loaded = store.load_document("Task", "T1").await?;
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// kind -> (name -> stored mapping)
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Number of top-level documents stored for `kind`.
    pub async fn len(&self, kind: &str) -> usize {
        self.store
            .read()
            .await
            .get(kind)
            .map(KindMap::len)
            .unwrap_or(0)
    }

    pub async fn is_empty(&self, kind: &str) -> bool {
        self.len(kind).await == 0
    }
}

/// Every record of `kind`: top-level documents plus child rows embedded anywhere.
fn records_of(store: &StoreMap, kind: &str) -> Vec<Mapping> {
    let mut records: Vec<Mapping> = store
        .get(kind)
        .map(|documents| documents.values().cloned().collect())
        .unwrap_or_default();

    for documents in store.values() {
        for document in documents.values() {
            records.extend(
                child_rows(document)
                    .filter(|row| row.get_str("doctype").ok() == Some(kind))
                    .cloned(),
            );
        }
    }

    records
}

/// Rows embedded in the table fields of a stored mapping.
fn child_rows(document: &Mapping) -> impl Iterator<Item = &Mapping> {
    document
        .values()
        .filter_map(|value| match value {
            Bson::Array(rows) => Some(rows),
            _ => None,
        })
        .flatten()
        .filter_map(|row| match row {
            Bson::Document(row) if row.contains_key("parentfield") => Some(row),
            _ => None,
        })
}

fn find_record(store: &StoreMap, kind: &str, name: &str) -> Option<Mapping> {
    if let Some(document) = store
        .get(kind)
        .and_then(|documents| documents.get(name))
    {
        return Some(document.clone());
    }

    records_of(store, kind)
        .into_iter()
        .find(|record| record.get_str("name").ok() == Some(name))
}

fn matching(store: &StoreMap, kind: &str, filter: Option<&Filter>) -> DocumentStoreResult<Vec<Mapping>> {
    let records = records_of(store, kind);

    match filter.filter(|filter| !filter.is_empty()) {
        Some(filter) => DocumentEvaluator::filter_records(records, &filter.to_expr()),
        None => Ok(records),
    }
}

/// Points the rows of a renamed document at its new name.
fn reparent_rows(document: &mut Mapping, new_name: &str) {
    for (_, value) in document.iter_mut() {
        if let Bson::Array(rows) = value {
            for row in rows.iter_mut() {
                if let Bson::Document(row) = row {
                    if row.contains_key("parentfield") {
                        row.insert("parent", new_name);
                    }
                }
            }
        }
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn list_query(&self, query: ListQuery) -> DocumentStoreResult<Vec<Mapping>> {
        let store = self.store.read().await;

        let mut records = match query.filter_expr() {
            Some(expr) => DocumentEvaluator::filter_records(records_of(&store, &query.kind), &expr)?,
            None => records_of(&store, &query.kind),
        };

        records.sort_by(|a, b| {
            compare_records(a, b, &query.order_by)
                .then_with(|| a.get_str("name").ok().cmp(&b.get_str("name").ok()))
        });

        Ok(records
            .into_iter()
            .skip(query.limit_start.unwrap_or(0))
            .take(query.page_length().unwrap_or(usize::MAX))
            .map(|record| {
                let mut row = Mapping::new();
                for field in &query.fields {
                    row.insert(field.clone(), record.get(field).cloned().unwrap_or(Bson::Null));
                }
                row
            })
            .collect())
    }

    async fn count_query(&self, kind: &str, filter: Option<Filter>) -> DocumentStoreResult<u64> {
        let store = self.store.read().await;

        Ok(matching(&store, kind, filter.as_ref())?.len() as u64)
    }

    async fn get_single_value(&self, kind: &str, field: &str) -> DocumentStoreResult<Bson> {
        let store = self.store.read().await;

        Ok(store
            .get(kind)
            .and_then(|documents| documents.get(kind))
            .and_then(|single| single.get(field))
            .cloned()
            .unwrap_or(Bson::Null))
    }

    async fn get_values_from_single(&self, kind: &str, fields: &[String]) -> DocumentStoreResult<Mapping> {
        let store = self.store.read().await;
        let single = store
            .get(kind)
            .and_then(|documents| documents.get(kind));

        let mut values = Mapping::new();
        for field in fields {
            values.insert(
                field.clone(),
                single
                    .and_then(|single| single.get(field))
                    .cloned()
                    .unwrap_or(Bson::Null),
            );
        }

        Ok(values)
    }

    async fn load_document(&self, kind: &str, name: &str) -> DocumentStoreResult<Document> {
        let store = self.store.read().await;

        match find_record(&store, kind, name) {
            Some(record) => Document::from_mapping(record),
            None => Err(DocumentStoreError::document_not_found(kind, name)),
        }
    }

    async fn exists(&self, kind: &str, name: &str) -> DocumentStoreResult<bool> {
        let store = self.store.read().await;

        Ok(find_record(&store, kind, name).is_some())
    }

    async fn insert_document(&self, document: Document) -> DocumentStoreResult<()> {
        if document.is_child() {
            return Err(DocumentStoreError::validation(format!(
                "{} records are stored through their parent",
                document.kind
            )));
        }

        let name = document.require_name()?.to_string();
        let mut store = self.store.write().await;
        let documents = store
            .entry(document.kind.clone())
            .or_default();

        if documents.contains_key(&name) {
            return Err(DocumentStoreError::Conflict(format!("{} {name} already exists", document.kind)));
        }

        debug!(kind = %document.kind, name = %name, "stored document");
        documents.insert(name, document.as_dict());

        Ok(())
    }

    async fn update_document(&self, document: Document) -> DocumentStoreResult<()> {
        let name = document.require_name()?.to_string();
        let mut store = self.store.write().await;

        match store
            .get_mut(&document.kind)
            .and_then(|documents| documents.get_mut(&name))
        {
            Some(stored) => {
                *stored = document.as_dict();
                Ok(())
            }
            None => Err(DocumentStoreError::document_not_found(&document.kind, &name)),
        }
    }

    async fn delete_document(&self, kind: &str, name: &str, ignore_missing: bool) -> DocumentStoreResult<()> {
        let mut store = self.store.write().await;

        let removed = store
            .get_mut(kind)
            .and_then(|documents| documents.remove(name));

        match removed {
            Some(_) => Ok(()),
            None if ignore_missing => Ok(()),
            None => Err(DocumentStoreError::document_not_found(kind, name)),
        }
    }

    async fn rename_document(&self, kind: &str, old: &str, new: &str, merge: bool) -> DocumentStoreResult<String> {
        let mut store = self.store.write().await;
        let documents = store
            .get_mut(kind)
            .ok_or_else(|| DocumentStoreError::document_not_found(kind, old))?;

        if !documents.contains_key(old) {
            return Err(DocumentStoreError::document_not_found(kind, old));
        }

        if documents.contains_key(new) {
            if !merge {
                return Err(DocumentStoreError::Conflict(format!("{kind} {new} already exists")));
            }

            documents.remove(old);
            return Ok(new.to_string());
        }

        if let Some(mut document) = documents.remove(old) {
            document.insert("name", new);
            reparent_rows(&mut document, new);
            documents.insert(new.to_string(), document);
        }

        Ok(new.to_string())
    }
}

/// Builder for constructing [`InMemoryStore`] instances, optionally pre-seeded with
/// top-level documents.
///
/// # Example
///
/// ```ignore
/// use docapi_memory::InMemoryStore;
/// use docapi::backend::StoreBackendBuilder;
///
/// let store = InMemoryStore::builder()
///     .document(settings)
///     .build()
///     .await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStoreBuilder {
    documents: Vec<Document>,
}

impl InMemoryStoreBuilder {
    pub fn document(mut self, document: Document) -> Self {
        self.documents.push(document);
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Builds the store and inserts the seed documents.
    ///
    /// Fails when two seed documents share a kind and name.
    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let store = InMemoryStore::new();

        for document in self.documents {
            store.insert_document(document).await?;
        }

        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docapi_core::query::{FieldOp, Sort, SortDirection};

    fn task(name: &str, qty: i64) -> Document {
        let mut document = Document::new("Task");
        document.name = Some(name.into());
        document.set("qty", qty);
        document
    }

    fn with_items(name: &str) -> Document {
        let mut parent = task(name, 0);
        parent
            .append_child("items", Document::from_mapping(doc! { "doctype": "Task Item", "item": "a" }).unwrap())
            .unwrap();
        parent.link_children("items").unwrap();
        parent
    }

    #[tokio::test]
    async fn duplicate_names_conflict() {
        let store = InMemoryStore::new();
        store.insert_document(task("T1", 1)).await.unwrap();

        assert!(matches!(
            store.insert_document(task("T1", 2)).await,
            Err(DocumentStoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn list_filters_sorts_and_projects() {
        let store = InMemoryStore::new();
        for (name, qty) in [("T1", 5), ("T2", 1), ("T3", 3)] {
            store.insert_document(task(name, qty)).await.unwrap();
        }

        let rows = store
            .list_query(
                ListQuery::builder("Task")
                    .fields(vec!["name".into(), "qty".into()])
                    .filters(Filter::new().with("qty", FieldOp::Gte, 2))
                    .order_by(vec![Sort::new("qty", SortDirection::Asc)])
                    .build(),
            )
            .await
            .unwrap();

        assert_eq!(rows, vec![doc! { "name": "T3", "qty": 3_i64 }, doc! { "name": "T1", "qty": 5_i64 }]);
    }

    #[tokio::test]
    async fn child_rows_are_addressable() {
        let store = InMemoryStore::new();
        let parent = with_items("T1");
        let row_name = parent.child_rows("items").unwrap()[0].name.clone().unwrap();
        store.insert_document(parent).await.unwrap();

        let row = store.load_document("Task Item", &row_name).await.unwrap();
        assert_eq!(row.linkage.map(|linkage| linkage.parent), Some("T1".to_string()));
        assert_eq!(store.count_query("Task Item", None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn rename_moves_rows_and_respects_merge() {
        let store = InMemoryStore::new();
        store.insert_document(with_items("T1")).await.unwrap();
        store.insert_document(task("T2", 0)).await.unwrap();

        assert!(store.rename_document("Task", "T1", "T2", false).await.is_err());
        assert_eq!(store.rename_document("Task", "T1", "T9", false).await.unwrap(), "T9");

        let renamed = store.load_document("Task", "T9").await.unwrap();
        let rows = renamed.child_rows("items").unwrap();
        assert_eq!(rows[0].linkage.as_ref().map(|l| l.parent.as_str()), Some("T9"));

        assert_eq!(store.rename_document("Task", "T9", "T2", true).await.unwrap(), "T2");
        assert!(!store.exists("Task", "T9").await.unwrap());
    }

    #[tokio::test]
    async fn deleting_missing_documents_fails_unless_ignored() {
        let store = InMemoryStore::new();

        assert!(store.delete_document("Task", "nope", false).await.is_err());
        assert!(store.delete_document("Task", "nope", true).await.is_ok());
    }
}
