//! A generic, schema-agnostic document access layer.
//!
//! This crate is the core of the docapi project and provides:
//!
//! - **Documents** ([`document`]) - The generic document representation and child linkage
//! - **Kind metadata** ([`meta`]) - Runtime document kind descriptors and their provider trait
//! - **Permissions** ([`permission`], [`guard`]) - Caller context, engine trait and access checks
//! - **Store backend abstraction** ([`backend`]) - The storage contract the services consume
//! - **Queries** ([`query`], [`normalize`], [`validate`]) - Canonical filters and the
//!   normalization and validation of caller input
//! - **Parent/child routing** ([`router`]) - Mutations of child records through their parent
//! - **Services** ([`read`], [`write`]) - The query and mutation paths
//! - **Public surface** ([`api`], [`envelope`]) - One method per operation, uniform responses
//! - **Configuration** ([`config`]) and **errors** ([`error`])
//!
//! # Example
//!
//! ```ignore
//! use docapi_core::{api::DocumentApi, permission::CallerContext, read::ListArgs};
//!
//! let api = DocumentApi::new(store, metadata, permissions);
//! let caller = CallerContext::new("a@example.com");
//!
//! let response = api
//!     .list_documents(&caller, ListArgs::builder("Task").filters("T1").build())
//!     .await;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docapi_core;

pub mod api;
pub mod backend;
pub mod config;
pub mod document;
pub mod envelope;
pub mod error;
pub mod guard;
pub mod meta;
pub mod normalize;
pub mod permission;
pub mod query;
pub mod read;
pub mod router;
pub mod validate;
pub mod write;
