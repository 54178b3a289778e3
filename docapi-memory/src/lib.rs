//! In-memory collaborators for docapi.
//!
//! This crate provides thread-safe, in-memory implementations of the three external
//! contracts the document services consume. They use async-aware read-write locks for
//! concurrent access and are meant for development, testing and embedding.
//!
//! - [`InMemoryStore`] - A `StoreBackend` keeping documents as field mappings, with child
//!   records embedded in their parent and addressable by their own kind
//! - [`InMemoryMetadata`] - A `MetadataProvider` over registered kind descriptors
//! - [`StaticPermissionEngine`] - A `PermissionEngine` answering from user and role grants
//!
//! # Quick Start
//!
//! ```ignore
//! use docapi::{prelude::*, memory::{InMemoryMetadata, InMemoryStore, StaticPermissionEngine}};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let metadata = InMemoryMetadata::builder()
//!         .kind(DocumentKind::builder("Task").field(FieldDef::new("subject", FieldType::Data)).build())
//!         .build();
//!     let store = InMemoryStore::builder().build().await?;
//!     let api = DocumentApi::new(store, metadata, StaticPermissionEngine::allow_all());
//!
//!     let caller = CallerContext::new("a@example.com");
//!     let task = api
//!         .insert_document(&caller, r#"{"doctype": "Task", "subject": "Write docs"}"#)
//!         .await;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docapi_memory;

mod evaluator;
pub mod metadata;
pub mod permission;
pub mod store;

pub use metadata::{InMemoryMetadata, InMemoryMetadataBuilder};
pub use permission::{StaticPermissionEngine, StaticPermissionEngineBuilder};
pub use store::{InMemoryStore, InMemoryStoreBuilder};
