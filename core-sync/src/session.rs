//! Login-flow integration: the auth layer drives the engine through
//! [`SessionSync`].

use crate::engine::{SyncEngine, SyncResult};
use async_trait::async_trait;
use core_auth::{AuthError, SessionSync};
use core_runtime::CancellationToken;
use tracing::warn;

/// Collapse per-file failures into the error the login flow reacts to.
///
/// A permission failure on any file wins, since it triggers the consent retry.
fn outcome(result: SyncResult) -> core_auth::Result<()> {
    if let Some(err) = result.permission_error() {
        return Err(AuthError::RemoteQuotaOrPermission(format!(
            "{}: {}",
            err.file_name, err.message
        )));
    }
    if result.is_success() {
        return Ok(());
    }
    let summary = result
        .errors
        .iter()
        .map(|e| format!("{}: {}", e.file_name, e.message))
        .collect::<Vec<_>>()
        .join("; ");
    Err(AuthError::NetworkFailure(summary))
}

#[async_trait]
impl SessionSync for SyncEngine {
    async fn attach(&self, access_token: &str) -> core_auth::Result<()> {
        SyncEngine::attach(self, access_token).await;
        Ok(())
    }

    async fn initial_sync(&self, cancel: &CancellationToken) -> core_auth::Result<()> {
        outcome(self.sync_now(cancel).await?)
    }

    async fn final_upload(&self, cancel: &CancellationToken) -> core_auth::Result<()> {
        let result = self.upload_changed(cancel).await?;
        if !result.is_success() {
            warn!(errors = result.errors.len(), "Final upload incomplete");
        }
        outcome(result)
    }

    async fn detach(&self) {
        SyncEngine::detach(self).await;
    }
}
