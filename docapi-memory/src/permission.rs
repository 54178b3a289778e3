//! A static, rule-table permission engine.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

use docapi_core::{
    document::Document,
    error::DocumentStoreResult,
    permission::{AccessMode, CallerContext, PermissionEngine},
};

/// Grants every kind when used in place of a kind name.
pub const ANY_KIND: &str = "*";

type Grants = HashSet<(String, AccessMode)>;

/// Permission engine answering from fixed user and role grants.
///
/// Kind-level access is allowed when the caller's user or one of its roles holds a grant
/// for the kind (or [`ANY_KIND`]) in the requested mode. Kinds marked owner-only further
/// restrict instance access to the document's `owner`; documents without an owner yet
/// are allowed.
///
/// # Example
///
/// ```ignore
/// use docapi_memory::StaticPermissionEngine;
/// use docapi::permission::AccessMode;
///
/// let permissions = StaticPermissionEngine::builder()
///     .grant_role("System Manager", "*", &[AccessMode::Read, AccessMode::Write])
///     .grant_user("a@example.com", "Task", &[AccessMode::Create])
///     .owner_only("Note")
///     .build();
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticPermissionEngine {
    allow_all: bool,
    users: HashMap<String, Grants>,
    roles: HashMap<String, Grants>,
    owner_only: HashSet<String>,
}

impl StaticPermissionEngine {
    pub fn builder() -> StaticPermissionEngineBuilder {
        StaticPermissionEngineBuilder::default()
    }

    /// An engine that allows every access.
    pub fn allow_all() -> Self {
        Self {
            allow_all: true,
            ..Self::default()
        }
    }

    /// An engine that denies every access.
    pub fn deny_all() -> Self {
        Self::default()
    }

    fn granted(grants: Option<&Grants>, kind: &str, mode: AccessMode) -> bool {
        grants.is_some_and(|grants| {
            grants.contains(&(kind.to_string(), mode)) || grants.contains(&(ANY_KIND.to_string(), mode))
        })
    }

    fn allows(&self, caller: &CallerContext, kind: &str, mode: AccessMode) -> bool {
        self.allow_all
            || Self::granted(self.users.get(&caller.user), kind, mode)
            || caller
                .roles
                .iter()
                .any(|role| Self::granted(self.roles.get(role), kind, mode))
    }
}

#[async_trait]
impl PermissionEngine for StaticPermissionEngine {
    async fn has_permission(
        &self,
        caller: &CallerContext,
        kind: &str,
        mode: AccessMode,
    ) -> DocumentStoreResult<bool> {
        Ok(self.allows(caller, kind, mode))
    }

    async fn has_instance_permission(
        &self,
        caller: &CallerContext,
        document: &Document,
        mode: AccessMode,
    ) -> DocumentStoreResult<bool> {
        if !self.allows(caller, &document.kind, mode) {
            return Ok(false);
        }

        if !self.owner_only.contains(&document.kind) {
            return Ok(true);
        }

        Ok(match document.get_str("owner") {
            Some(owner) if !owner.is_empty() => owner == caller.user,
            _ => true,
        })
    }
}

#[derive(Debug, Default)]
pub struct StaticPermissionEngineBuilder {
    engine: StaticPermissionEngine,
}

impl StaticPermissionEngineBuilder {
    /// Allows every access regardless of the other grants.
    pub fn allow_all(mut self) -> Self {
        self.engine.allow_all = true;
        self
    }

    pub fn grant_user(mut self, user: impl Into<String>, kind: impl Into<String>, modes: &[AccessMode]) -> Self {
        let kind = kind.into();
        self.engine
            .users
            .entry(user.into())
            .or_default()
            .extend(modes.iter().map(|mode| (kind.clone(), *mode)));
        self
    }

    pub fn grant_role(mut self, role: impl Into<String>, kind: impl Into<String>, modes: &[AccessMode]) -> Self {
        let kind = kind.into();
        self.engine
            .roles
            .entry(role.into())
            .or_default()
            .extend(modes.iter().map(|mode| (kind.clone(), *mode)));
        self
    }

    /// Restricts instance access on `kind` to each document's owner.
    pub fn owner_only(mut self, kind: impl Into<String>) -> Self {
        self.engine.owner_only.insert(kind.into());
        self
    }

    pub fn build(self) -> StaticPermissionEngine {
        self.engine
    }
}
