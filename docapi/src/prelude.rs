//! Convenient re-exports of commonly used types from docapi.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use docapi::prelude::*;
//! ```

pub use docapi_core::{
    api::DocumentApi,
    backend::{StoreBackend, StoreBackendBuilder},
    config::{ApiConfig, ApiConfigBuilder},
    document::{ChildLinkage, DocStatus, Document},
    envelope::{ErrorEnvelope, Response},
    error::{DocumentStoreError, DocumentStoreResult, ErrorKind},
    meta::{DocumentKind, DocumentKindBuilder, FieldDef, FieldType, MetadataProvider},
    normalize::{Payload, RawFields, RawFilter},
    permission::{AccessMode, CallerContext, PermissionEngine},
    query::{Condition, FieldOp, Filter, ListQuery, Sort, SortDirection},
    read::{GetValueArgs, ListArgs, Rows},
    validate::{ArgumentValidator, StandardArgumentValidator},
};
