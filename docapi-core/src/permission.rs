//! Caller context and the permission engine contract.
//!
//! The services never evaluate permission rules themselves. They ask a [`PermissionEngine`]
//! at kind level before touching the store, and again at instance level once a document
//! has been loaded.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display};

use crate::{document::Document, error::DocumentStoreResult};

/// The kind of access requested on a document kind or instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    Read,
    Write,
    Create,
    Submit,
    Cancel,
    Delete,
}

impl Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::Read => write!(f, "read"),
            AccessMode::Write => write!(f, "write"),
            AccessMode::Create => write!(f, "create"),
            AccessMode::Submit => write!(f, "submit"),
            AccessMode::Cancel => write!(f, "cancel"),
            AccessMode::Delete => write!(f, "delete"),
        }
    }
}

/// Identity of the caller on whose behalf an operation runs.
///
/// Passed explicitly into every operation; nothing reads an ambient session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerContext {
    pub user: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl CallerContext {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            roles: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles
            .iter()
            .any(|r| r == role)
    }
}

/// External authorization engine consulted before every store access.
#[async_trait]
pub trait PermissionEngine: Send + Sync + Debug {
    /// Returns whether `caller` may access documents of `kind` in `mode`.
    async fn has_permission(
        &self,
        caller: &CallerContext,
        kind: &str,
        mode: AccessMode,
    ) -> DocumentStoreResult<bool>;

    /// Returns whether `caller` may access this particular document in `mode`.
    ///
    /// Document-level rules may be narrower than the kind-level answer.
    async fn has_instance_permission(
        &self,
        caller: &CallerContext,
        document: &Document,
        mode: AccessMode,
    ) -> DocumentStoreResult<bool>;
}

#[async_trait]
impl<P> PermissionEngine for &P
where
    P: PermissionEngine,
{
    async fn has_permission(
        &self,
        caller: &CallerContext,
        kind: &str,
        mode: AccessMode,
    ) -> DocumentStoreResult<bool> {
        (*self)
            .has_permission(caller, kind, mode)
            .await
    }

    async fn has_instance_permission(
        &self,
        caller: &CallerContext,
        document: &Document,
        mode: AccessMode,
    ) -> DocumentStoreResult<bool> {
        (*self)
            .has_instance_permission(caller, document, mode)
            .await
    }
}
