//! Permission checks wrapped around every operation.

use tracing::debug;

use crate::{
    document::Document,
    error::{DocumentStoreError, DocumentStoreResult},
    permission::{AccessMode, CallerContext, PermissionEngine},
};

/// Turns permission engine answers into typed errors.
///
/// Every public operation calls [`AccessGuard::ensure`] before touching the store, and
/// [`AccessGuard::ensure_instance`] once a concrete document has been loaded or built.
#[derive(Debug, Clone)]
pub struct AccessGuard<P> {
    engine: P,
}

impl<P> AccessGuard<P>
where
    P: PermissionEngine,
{
    pub fn new(engine: P) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &P {
        &self.engine
    }

    /// Fails with a permission error unless `caller` may access `kind` in `mode`.
    pub async fn ensure(&self, caller: &CallerContext, kind: &str, mode: AccessMode) -> DocumentStoreResult<()> {
        if self
            .engine
            .has_permission(caller, kind, mode)
            .await?
        {
            return Ok(());
        }

        debug!(user = %caller.user, kind, %mode, "kind access denied");
        Err(denied(kind))
    }

    /// Fails with a permission error unless `caller` may access `document` in `mode`.
    pub async fn ensure_instance(
        &self,
        caller: &CallerContext,
        document: &Document,
        mode: AccessMode,
    ) -> DocumentStoreResult<()> {
        if self
            .engine
            .has_instance_permission(caller, document, mode)
            .await?
        {
            return Ok(());
        }

        debug!(
            user = %caller.user,
            kind = %document.kind,
            name = document.name.as_deref().unwrap_or_default(),
            %mode,
            "document access denied"
        );
        Err(denied(&document.kind))
    }
}

fn denied(kind: &str) -> DocumentStoreError {
    DocumentStoreError::Permission(format!("No permission for {kind}"))
}
