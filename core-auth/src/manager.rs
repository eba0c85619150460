//! # Authentication Session
//!
//! Orchestrates interactive login, silent login and logout, and owns the
//! in-memory credential and [`UserSession`].
//!
//! ## Login
//!
//! 1. Reuse the stored credential when [`TokenLifecycleManager::try_reuse`] allows it
//! 2. Otherwise run the consent flow
//! 3. Fetch the user profile
//! 4. Attach sync and run the initial download; only then persist scopes
//! 5. If that download fails with a scope or permission error, clear everything
//!    and start over once
//!
//! ## Logout
//!
//! In-memory state is dropped and `SignedOut` emitted before any I/O.
//! Revocation and a final upload then run side by side, each bounded by its
//! own timeout. Clearing the credential directory comes last and is the only
//! step whose failure reaches the caller.
//!
//! ## Usage
//!
//! ```no_run
//! use core_auth::AuthSession;
//! use core_runtime::CancellationToken;
//! # async fn example(session: AuthSession) -> core_auth::Result<()> {
//! let cancel = CancellationToken::new();
//!
//! if !session.try_silent_login(&cancel).await {
//!     let result = session.login(&cancel).await;
//!     if !result.success {
//!         eprintln!("{}", result.error_message.unwrap_or_default());
//!     }
//! }
//!
//! let credential = session.credential(&cancel).await?;
//! # let _ = credential;
//! session.logout().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::identity::IdentityProvider;
use crate::lifecycle::TokenLifecycleManager;
use crate::types::{AuthState, Credential, LoginResult, UserProfile, UserSession};
use async_trait::async_trait;
use bridge_traits::Clock;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use core_runtime::{guard, CancellationToken, Interrupted, Timeouts, TokenPolicy};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

const ACCESS_DENIED_MESSAGE: &str =
    "Access denied: the app was not granted permission to your cloud storage";

/// How many times a scope or permission failure restarts login.
const SCOPE_RETRY_BUDGET: u32 = 1;

/// What the session needs from synchronization.
///
/// Implemented by the sync layer; keeping the seam here lets auth run
/// without a sync engine in tests.
#[async_trait]
pub trait SessionSync: Send + Sync {
    /// Bind the remote store to `access_token`.
    async fn attach(&self, access_token: &str) -> Result<()>;

    /// Full download (and merge) right after login.
    async fn initial_sync(&self, cancel: &CancellationToken) -> Result<()>;

    /// Push pending local changes before the session ends.
    async fn final_upload(&self, cancel: &CancellationToken) -> Result<()>;

    /// Drop the remote binding.
    async fn detach(&self);
}

/// Where a login attempt failed. Only the initial download may restart consent.
#[derive(Debug)]
enum LoginFailure {
    InitialSync(AuthError),
    Step(AuthError),
}

impl From<AuthError> for LoginFailure {
    fn from(err: AuthError) -> Self {
        LoginFailure::Step(err)
    }
}

impl From<Interrupted> for LoginFailure {
    fn from(err: Interrupted) -> Self {
        LoginFailure::Step(err.into())
    }
}

#[derive(Debug, Default)]
struct SessionState {
    auth_state: AuthState,
    credential: Option<Credential>,
    user: Option<UserSession>,
}

pub struct AuthSession {
    lifecycle: Arc<TokenLifecycleManager>,
    identity: Arc<dyn IdentityProvider>,
    sync: Arc<dyn SessionSync>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    required_scopes: Vec<String>,
    timeouts: Timeouts,
    refresh_buffer: chrono::Duration,
    state: RwLock<SessionState>,
    /// Serializes login attempts
    login_lock: Mutex<()>,
}

impl AuthSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        lifecycle: Arc<TokenLifecycleManager>,
        identity: Arc<dyn IdentityProvider>,
        sync: Arc<dyn SessionSync>,
        events: EventBus,
        clock: Arc<dyn Clock>,
        required_scopes: Vec<String>,
        timeouts: Timeouts,
        policy: TokenPolicy,
    ) -> Self {
        Self {
            lifecycle,
            identity,
            sync,
            events,
            clock,
            required_scopes,
            timeouts,
            refresh_buffer: chrono::Duration::from_std(policy.refresh_buffer)
                .unwrap_or_else(|_| chrono::Duration::minutes(5)),
            state: RwLock::new(SessionState::default()),
            login_lock: Mutex::new(()),
        }
    }

    pub async fn state(&self) -> AuthState {
        self.state.read().await.auth_state
    }

    pub async fn current_session(&self) -> Option<UserSession> {
        self.state.read().await.user.clone()
    }

    pub fn required_scopes(&self) -> &[String] {
        &self.required_scopes
    }

    /// Interactive login. Never returns an error; failures are reported in
    /// the [`LoginResult`].
    #[instrument(skip(self, cancel))]
    pub async fn login(&self, cancel: &CancellationToken) -> LoginResult {
        let _guard = self.login_lock.lock().await;
        let previous = self.set_auth_state(AuthState::Authorizing).await;
        let _ = self
            .events
            .emit(CoreEvent::Auth(AuthEvent::SigningIn { silent: false }));

        let mut retries_left = SCOPE_RETRY_BUDGET;
        loop {
            let e = match self.login_once(cancel).await {
                Ok(()) => return LoginResult::succeeded(),
                Err(LoginFailure::InitialSync(e)) if e.is_scope_or_permission() => {
                    if retries_left > 0 {
                        retries_left -= 1;
                        warn!(error = %e, "Initial download hit a permission error, clearing credentials and retrying");
                        if let Err(clear_err) = self.lifecycle.clear_all().await {
                            warn!(error = %clear_err, "Failed to clear credentials before retry");
                        }
                        continue;
                    }
                    error!(error = %e, "Login failed");
                    return self.fail_login(previous, ACCESS_DENIED_MESSAGE.to_string(), false).await;
                }
                Err(LoginFailure::InitialSync(e)) | Err(LoginFailure::Step(e)) => e,
            };
            error!(error = %e, "Login failed");
            return self.fail_login(previous, e.to_string(), e.is_recoverable()).await;
        }
    }

    async fn fail_login(&self, previous: AuthState, message: String, recoverable: bool) -> LoginResult {
        self.set_auth_state(previous).await;
        let _ = self.events.emit(CoreEvent::Auth(AuthEvent::AuthError {
            message: message.clone(),
            recoverable,
        }));
        LoginResult::failed(message)
    }

    async fn login_once(&self, cancel: &CancellationToken) -> std::result::Result<(), LoginFailure> {
        let reuse = self.lifecycle.try_reuse(&self.required_scopes, cancel).await;

        let credential = match reuse.credential {
            Some(credential) if reuse.can_reuse => credential,
            _ => {
                if cancel.is_cancelled() {
                    return Err(AuthError::Cancelled.into());
                }
                debug!(reason = %reuse.reason_text(), "Starting interactive authorization");
                let credential = guard(
                    cancel,
                    Some(self.timeouts.authorization),
                    self.identity.authorize_interactive(&self.required_scopes),
                )
                .await??;
                self.lifecycle.store_credential(&credential).await?;
                credential
            }
        };

        let profile = self.fetch_profile(&credential, cancel).await?;

        self.sync.attach(&credential.access_token).await?;
        if let Err(e) = self.sync.initial_sync(cancel).await {
            self.sync.detach().await;
            return Err(LoginFailure::InitialSync(e));
        }

        // Scopes are proven only now
        self.lifecycle.save_scopes(&self.required_scopes).await?;

        self.commit(credential, profile).await;
        Ok(())
    }

    /// Log in from stored credentials only. `false` on any failure.
    #[instrument(skip(self, cancel))]
    pub async fn try_silent_login(&self, cancel: &CancellationToken) -> bool {
        let _guard = self.login_lock.lock().await;
        let _ = self
            .events
            .emit(CoreEvent::Auth(AuthEvent::SigningIn { silent: true }));

        let reuse = self.lifecycle.try_reuse(&self.required_scopes, cancel).await;
        let credential = match reuse.credential {
            Some(credential) if reuse.can_reuse => credential,
            _ => {
                debug!(reason = %reuse.reason_text(), "Silent login not possible");
                return false;
            }
        };

        let profile = match self.fetch_profile(&credential, cancel).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(error = %e, "Silent login could not fetch the profile");
                return false;
            }
        };

        if let Err(e) = self.sync.attach(&credential.access_token).await {
            warn!(error = %e, "Silent login could not attach sync");
            return false;
        }

        self.commit(credential, profile).await;
        true
    }

    /// End the session.
    ///
    /// # Errors
    ///
    /// Only a failure to clear the credential directory is returned; the
    /// revocation and final upload are best effort.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<()> {
        let (credential, user_id) = {
            let mut state = self.state.write().await;
            state.auth_state = AuthState::LoggedOut;
            (
                state.credential.take(),
                state.user.take().map(|user| user.user_id),
            )
        };
        let _ = self.events.emit(CoreEvent::Auth(AuthEvent::SignedOut {
            user_id: user_id.clone(),
        }));

        let revoke = async {
            let Some(credential) = credential.as_ref() else {
                return;
            };
            let token = credential
                .refresh_token
                .as_deref()
                .unwrap_or(&credential.access_token);
            let cancel = CancellationToken::new();
            match guard(&cancel, Some(self.timeouts.revoke), self.identity.revoke_token(token)).await {
                Ok(Ok(())) => debug!("Token revoked on logout"),
                Ok(Err(e)) => warn!(error = %e, "Token revocation failed on logout"),
                Err(e) => warn!(error = %e, "Token revocation abandoned on logout"),
            }
        };

        let upload = async {
            if user_id.is_none() {
                return;
            }
            let cancel = CancellationToken::new();
            match guard(
                &cancel,
                Some(self.timeouts.final_upload),
                self.sync.final_upload(&cancel),
            )
            .await
            {
                Ok(Ok(())) => debug!("Final upload completed"),
                Ok(Err(e)) => warn!(error = %e, "Final upload failed on logout"),
                Err(e) => warn!(error = %e, "Final upload abandoned on logout"),
            }
        };

        tokio::join!(revoke, upload);
        self.sync.detach().await;

        if let Err(e) = self.lifecycle.clear_all().await {
            error!(error = %e, "Stale credentials may remain after logout");
            let _ = self.events.emit(CoreEvent::Auth(AuthEvent::AuthError {
                message: format!("Failed to remove stored credentials: {}", e),
                recoverable: false,
            }));
            return Err(match e {
                AuthError::LocalIoFailure(_) => e,
                other => AuthError::LocalIoFailure(other.to_string()),
            });
        }

        info!("Logged out");
        Ok(())
    }

    /// A ready-to-use credential for the logged-in user, refreshed if it is
    /// close to expiry.
    pub async fn credential(&self, cancel: &CancellationToken) -> Result<Credential> {
        let current = self
            .state
            .read()
            .await
            .credential
            .clone()
            .ok_or(AuthError::CredentialMissing)?;

        if !current.needs_refresh(self.clock.now(), self.refresh_buffer) {
            return Ok(current);
        }

        let refreshed = self.lifecycle.refresh(&current, cancel).await?;
        self.sync.attach(&refreshed.access_token).await?;

        let mut state = self.state.write().await;
        if state.auth_state.is_logged_in() {
            state.credential = Some(refreshed.clone());
        }
        Ok(refreshed)
    }

    async fn fetch_profile(
        &self,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> Result<UserProfile> {
        guard(
            cancel,
            Some(self.timeouts.request),
            self.identity.get_profile(&credential.access_token),
        )
        .await?
    }

    async fn commit(&self, credential: Credential, profile: UserProfile) {
        let session = UserSession::from_profile(profile, self.clock.now());
        let event = AuthEvent::SignedIn {
            user_id: session.user_id.clone(),
            display_name: session.display_name.clone(),
        };

        {
            let mut state = self.state.write().await;
            state.auth_state = AuthState::LoggedIn;
            state.credential = Some(credential);
            state.user = Some(session);
        }

        info!("Logged in");
        let _ = self.events.emit(CoreEvent::Auth(event));
    }

    async fn set_auth_state(&self, next: AuthState) -> AuthState {
        let mut state = self.state.write().await;
        std::mem::replace(&mut state.auth_state, next)
    }
}
