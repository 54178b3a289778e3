//! Main docapi crate providing a generic, schema-agnostic document API.
//!
//! This crate is the primary entry point for users of docapi. It re-exports the core
//! types and services and provides in-memory implementations of the collaborators the
//! API consumes.
//!
//! # Features
//!
//! - **One method per operation** - list, count, get, get_value, get_single_value,
//!   set_value, insert, insert_many, save, rename, submit, cancel and delete
//! - **Lenient input** - filters, field lists and payloads accepted as JSON text, scalars,
//!   lists or mappings and normalized before they reach the store
//! - **Permission checks first** - every operation asks the permission engine before the
//!   store is touched
//! - **Parent/child routing** - child table records are read and written through their parent
//! - **Uniform responses** - failures come back as a flat error envelope, never as a panic
//!
//! # Quick Start
//!
//! ```ignore
//! use docapi::{prelude::*, memory::{InMemoryMetadata, InMemoryStore, StaticPermissionEngine}};
//!
//! #[tokio::main]
//! async fn main() {
//!     let metadata = InMemoryMetadata::builder()
//!         .kind(
//!             DocumentKind::builder("Task")
//!                 .field(FieldDef::new("subject", FieldType::Data))
//!                 .field(FieldDef::new("status", FieldType::Select))
//!                 .build(),
//!         )
//!         .build();
//!     let store = InMemoryStore::builder().build().await.unwrap();
//!     let api = DocumentApi::new(store, metadata, StaticPermissionEngine::allow_all());
//!     let caller = CallerContext::new("a@example.com");
//!
//!     // Insert a document from JSON text
//!     let task = api
//!         .insert_document(&caller, r#"{"doctype": "Task", "subject": "Write docs", "status": "Open"}"#)
//!         .await
//!         .ok()
//!         .unwrap();
//!
//!     // List open tasks as mappings
//!     let rows = api
//!         .list_documents(
//!             &caller,
//!             ListArgs::builder("Task")
//!                 .fields(vec!["name", "subject"])
//!                 .filters(r#"{"status": "Open"}"#)
//!                 .build(),
//!         )
//!         .await;
//!
//!     println!("Open tasks: {:?}", rows);
//!
//!     api.shutdown().await.unwrap();
//! }
//! ```
//!
//! # Configuration
//!
//! [`config::ApiConfig`] controls the default page size, the optional page and batch
//! bounds, the count cache lifetime and the shape of error envelopes. It can be built in
//! code or read from JSON:
//!
//! ```ignore
//! let config = ApiConfig::from_json_str(r#"{"max_batch_insert": 50, "distinct_response_codes": true}"#)?;
//! let api = DocumentApi::new(store, metadata, permissions).with_config(config);
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory store, metadata registry and permission engine

pub mod prelude;

pub use docapi_core::{
    api, backend, config, document, envelope, error, guard, meta, normalize, permission, query, read, router,
    validate, write,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory collaborator implementations.
pub mod memory {
    pub use docapi_memory::{
        InMemoryMetadata, InMemoryMetadataBuilder, InMemoryStore, InMemoryStoreBuilder, StaticPermissionEngine,
        StaticPermissionEngineBuilder,
    };
}
