//! Token Lifecycle
//!
//! Decides whether the stored credential may be used without asking the user
//! again. [`TokenLifecycleManager::try_reuse`] walks a fixed pipeline and
//! stops at the first failure:
//!
//! ```text
//! load ─> scope metadata ⊇ required ─> fresh? ─(no)─> refresh + save
//!                                         │                 │
//!                                         └──────┬──────────┘
//!                                                v
//!                           introspection (cached 5 min) ─> validate
//! ```
//!
//! Every rejection except cancellation wipes the credential directory before
//! returning, so a half-valid credential never survives a failed attempt.

use crate::credential_store::CredentialStore;
use crate::error::{AuthError, Result};
use crate::identity::IdentityProvider;
use crate::types::{Credential, ReuseRejection, ReuseResult, ScopeMetadata};
use bridge_traits::Clock;
use chrono::{DateTime, Utc};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use core_runtime::{guard, CancellationToken, Interrupted, TokenPolicy};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Last introspection outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct VerificationCache {
    result: bool,
    expires_at: DateTime<Utc>,
}

pub struct TokenLifecycleManager {
    store: CredentialStore,
    identity: Arc<dyn IdentityProvider>,
    clock: Arc<dyn Clock>,
    policy: TokenPolicy,
    request_timeout: Duration,
    events: EventBus,
    verification: Mutex<Option<VerificationCache>>,
}

impl TokenLifecycleManager {
    pub fn new(
        store: CredentialStore,
        identity: Arc<dyn IdentityProvider>,
        clock: Arc<dyn Clock>,
        policy: TokenPolicy,
        request_timeout: Duration,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            identity,
            clock,
            policy,
            request_timeout,
            events,
            verification: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Return the stored credential if it can be used for `required` scopes.
    ///
    /// Never fails: every problem becomes a [`ReuseRejection`]. Cancellation
    /// leaves storage untouched; any other rejection clears it first.
    #[instrument(skip(self, cancel), fields(required = required.len()))]
    pub async fn try_reuse(&self, required: &[String], cancel: &CancellationToken) -> ReuseResult {
        match self.evaluate(required, cancel).await {
            Ok(credential) => {
                debug!("Stored credential is reusable");
                ReuseResult::reusable(credential)
            }
            Err(ReuseRejection::Cancelled) => {
                debug!("Credential reuse cancelled");
                ReuseResult::rejected(ReuseRejection::Cancelled)
            }
            Err(reason) => {
                info!(%reason, "Stored credential rejected");
                if let Err(e) = self.clear_all().await {
                    warn!(error = %e, "Failed to clear credentials after rejection");
                }
                let _ = self.events.emit(CoreEvent::Auth(AuthEvent::CredentialsCleared {
                    reason: reason.to_string(),
                }));
                ReuseResult::rejected(reason)
            }
        }
    }

    async fn evaluate(
        &self,
        required: &[String],
        cancel: &CancellationToken,
    ) -> std::result::Result<Credential, ReuseRejection> {
        let credential = self
            .store
            .load()
            .await
            .map_err(|e| ReuseRejection::Storage(e.to_string()))?
            .ok_or(ReuseRejection::NoToken)?;

        let metadata = self
            .store
            .load_scopes()
            .await
            .map_err(|e| ReuseRejection::Storage(e.to_string()))?
            .ok_or(ReuseRejection::MissingScopeMetadata)?;

        let missing = metadata.missing(required);
        if !missing.is_empty() {
            return Err(ReuseRejection::ScopeMismatch { missing });
        }

        let credential = if self.needs_refresh(&credential) {
            self.refresh(&credential, cancel).await.map_err(|e| match e {
                AuthError::Cancelled => ReuseRejection::Cancelled,
                AuthError::CredentialExpiredUnrefreshable(msg) if !credential.can_refresh() => {
                    debug!(%msg, "No refresh token stored");
                    ReuseRejection::RefreshUnavailable
                }
                AuthError::LocalIoFailure(msg) => ReuseRejection::Storage(msg),
                other => ReuseRejection::RefreshFailed(other.to_string()),
            })?
        } else {
            credential
        };

        if !self.verify(&credential, required, cancel).await? {
            return Err(ReuseRejection::ScopesNotGranted);
        }

        credential
            .validate()
            .map_err(|e| ReuseRejection::InvalidCredential(e.to_string()))?;

        Ok(credential)
    }

    fn needs_refresh(&self, credential: &Credential) -> bool {
        let buffer = chrono::Duration::from_std(self.policy.refresh_buffer)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        credential.needs_refresh(self.clock.now(), buffer)
    }

    /// Refresh `credential` and persist the result.
    ///
    /// Exactly one call to the identity provider is made.
    pub async fn refresh(
        &self,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<Credential> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                AuthError::CredentialExpiredUnrefreshable("no refresh token stored".to_string())
            })?;

        let mut refreshed = guard(
            cancel,
            Some(self.request_timeout),
            self.identity.refresh_token(refresh_token),
        )
        .await??;

        if refreshed.scope.is_none() {
            refreshed.scope = credential.scope.clone();
        }

        self.store.save(&refreshed).await?;
        let _ = self.events.emit(CoreEvent::Auth(AuthEvent::TokenRefreshed {
            expires_at: refreshed.expires_at().timestamp(),
        }));
        Ok(refreshed)
    }

    /// Introspect granted scopes unless a recent result is cached.
    async fn verify(
        &self,
        credential: &Credential,
        required: &[String],
        cancel: &CancellationToken,
    ) -> std::result::Result<bool, ReuseRejection> {
        let now = self.clock.now();
        let cached = *self.cache();
        if let Some(cached) = cached {
            if cached.expires_at > now {
                debug!(result = cached.result, "Using cached scope verification");
                return Ok(cached.result);
            }
        }

        let granted = match guard(
            cancel,
            Some(self.request_timeout),
            self.identity.introspect_token(&credential.access_token),
        )
        .await
        {
            Err(Interrupted::Cancelled) => return Err(ReuseRejection::Cancelled),
            Err(timed_out) => return Err(ReuseRejection::VerificationFailed(timed_out.to_string())),
            Ok(Err(e)) => return Err(ReuseRejection::VerificationFailed(e.to_string())),
            Ok(Ok(granted)) => granted,
        };

        let result = required.iter().all(|scope| granted.contains(scope));
        let ttl = chrono::Duration::from_std(self.policy.verification_ttl)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        *self.cache() = Some(VerificationCache {
            result,
            expires_at: now + ttl,
        });

        Ok(result)
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, Option<VerificationCache>> {
        self.verification.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Persist a freshly issued credential.
    pub async fn store_credential(&self, credential: &Credential) -> Result<()> {
        credential.validate()?;
        *self.cache() = None;
        self.store.save(credential).await
    }

    /// Record `scopes` as proven. Call only after a remote operation
    /// authenticated with them succeeded.
    pub async fn save_scopes(&self, scopes: &[String]) -> Result<()> {
        let metadata = ScopeMetadata::new(scopes.iter().cloned(), self.clock.now());
        self.store.save_scopes(&metadata).await
    }

    /// Wipe persisted credentials and forget the verification result.
    pub async fn clear_all(&self) -> Result<()> {
        *self.cache() = None;
        self.store.clear_all().await
    }
}
