//! In-memory registry of document kind descriptors.

use async_trait::async_trait;
use mea::rwlock::RwLock;
use std::{collections::HashMap, sync::Arc};

use docapi_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    meta::{DocumentKind, MetadataProvider},
};

/// Metadata provider backed by a shared map of kind descriptors.
///
/// Clones share the same registry, so kinds registered after construction are visible
/// to every holder.
///
/// # Example
///
/// ```ignore
/// use docapi_memory::InMemoryMetadata;
/// use docapi::meta::{DocumentKind, FieldDef, FieldType};
///
/// let metadata = InMemoryMetadata::builder()
///     .kind(
///         DocumentKind::builder("Task")
///             .field(FieldDef::new("subject", FieldType::Data))
///             .build(),
///     )
///     .build();
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryMetadata {
    kinds: Arc<RwLock<HashMap<String, DocumentKind>>>,
}

impl InMemoryMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> InMemoryMetadataBuilder {
        InMemoryMetadataBuilder::default()
    }

    /// Adds or replaces a kind descriptor.
    pub async fn register(&self, kind: DocumentKind) {
        self.kinds
            .write()
            .await
            .insert(kind.name.clone(), kind);
    }

    /// Names of every registered kind, sorted.
    pub async fn kind_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .kinds
            .read()
            .await
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

#[async_trait]
impl MetadataProvider for InMemoryMetadata {
    async fn describe(&self, kind: &str) -> DocumentStoreResult<DocumentKind> {
        self.kinds
            .read()
            .await
            .get(kind)
            .cloned()
            .ok_or_else(|| DocumentStoreError::KindNotFound(kind.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryMetadataBuilder {
    kinds: HashMap<String, DocumentKind>,
}

impl InMemoryMetadataBuilder {
    pub fn kind(mut self, kind: DocumentKind) -> Self {
        self.kinds.insert(kind.name.clone(), kind);
        self
    }

    pub fn build(self) -> InMemoryMetadata {
        InMemoryMetadata {
            kinds: Arc::new(RwLock::new(self.kinds)),
        }
    }
}
