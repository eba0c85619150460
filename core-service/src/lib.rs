//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, filesystem,
//! authorization prompt, remote store) into the credential and sync layers.
//! Desktop apps typically enable the `desktop-shims` feature, which lets
//! [`CoreConfig::builder`] fall back to the `bridge-desktop` adapters.
//!
//! ```no_run
//! # async fn example() -> core_service::Result<()> {
//! use core_runtime::{CancellationToken, CoreConfig, OAuthSettings};
//! use core_service::CoreService;
//!
//! let config = CoreConfig::builder()
//!     .credential_dir("/home/ada/.local/share/lexicon/credentials")
//!     .data_dir("/home/ada/.local/share/lexicon/data")
//!     .oauth(OAuthSettings::from_env()?)
//!     .build()?;
//! let core = CoreService::new(config)?;
//!
//! let cancel = CancellationToken::new();
//! if !core.try_silent_login(&cancel).await {
//!     let result = core.login(&cancel).await;
//!     assert!(result.success, "{:?}", result.error_message);
//! }
//! core.sync_now(&cancel).await?;
//! core.logout().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_traits::RemoteStoreFactory;
use core_auth::{
    AuthSession, AuthState, CredentialStore, HttpIdentityProvider, IdentityProvider, LoginResult,
    TokenLifecycleManager, UserSession,
};
use core_runtime::events::{CoreEvent, EventBus};
use core_runtime::{CancellationToken, CoreConfig};
use core_sync::{SyncEngine, SyncResult};
use provider_google_drive::GoogleDriveConnectorFactory;
use tokio::sync::broadcast::Receiver;
use tracing::info;

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    session: Arc<AuthSession>,
    lifecycle: Arc<TokenLifecycleManager>,
    engine: Arc<SyncEngine>,
    events: EventBus,
}

impl CoreService {
    /// Wire the service against Google's identity endpoints.
    ///
    /// Uses Google Drive as the remote store unless the configuration
    /// supplies a factory.
    pub fn new(config: CoreConfig) -> Result<Self> {
        let identity: Arc<dyn IdentityProvider> = Arc::new(HttpIdentityProvider::google(
            &config.oauth,
            config.http_client.clone(),
            config.authorization_prompt.clone(),
            config.clock.clone(),
        ));
        Self::with_identity(config, identity)
    }

    /// Wire the service with a custom identity provider.
    pub fn with_identity(config: CoreConfig, identity: Arc<dyn IdentityProvider>) -> Result<Self> {
        config.validate()?;
        info!(?config, "Initializing core service");

        let events = EventBus::default();
        let factory: Arc<dyn RemoteStoreFactory> = match &config.remote_store_factory {
            Some(factory) => factory.clone(),
            None => Arc::new(GoogleDriveConnectorFactory::new(config.http_client.clone())),
        };

        let store = CredentialStore::new(config.file_system.clone(), config.credential_dir.clone());
        let lifecycle = Arc::new(TokenLifecycleManager::new(
            store,
            identity.clone(),
            config.clock.clone(),
            config.token_policy,
            config.timeouts.request,
            events.clone(),
        ));
        let engine = Arc::new(SyncEngine::new(
            config.file_system.clone(),
            config.data_dir.clone(),
            config.remote_folder.clone(),
            factory,
            events.clone(),
            config.clock.clone(),
            config.timeouts.request,
        ));
        let session = Arc::new(AuthSession::new(
            lifecycle.clone(),
            identity,
            engine.clone(),
            events.clone(),
            config.clock.clone(),
            config.oauth.scopes.clone(),
            config.timeouts,
            config.token_policy,
        ));

        Ok(Self {
            session,
            lifecycle,
            engine,
            events,
        })
    }

    pub fn session(&self) -> Arc<AuthSession> {
        Arc::clone(&self.session)
    }

    pub fn sync_engine(&self) -> Arc<SyncEngine> {
        Arc::clone(&self.engine)
    }

    pub fn token_lifecycle(&self) -> Arc<TokenLifecycleManager> {
        Arc::clone(&self.lifecycle)
    }

    /// Subscribe to auth and sync events. Past events are not replayed.
    pub fn subscribe_events(&self) -> Receiver<CoreEvent> {
        self.events.subscribe()
    }

    pub async fn login(&self, cancel: &CancellationToken) -> LoginResult {
        self.session.login(cancel).await
    }

    pub async fn try_silent_login(&self, cancel: &CancellationToken) -> bool {
        self.session.try_silent_login(cancel).await
    }

    pub async fn logout(&self) -> Result<()> {
        Ok(self.session.logout().await?)
    }

    pub async fn state(&self) -> AuthState {
        self.session.state().await
    }

    pub async fn current_session(&self) -> Option<UserSession> {
        self.session.current_session().await
    }

    /// Reconcile local documents with the remote store.
    ///
    /// Refreshes the access token first if it is close to expiry.
    pub async fn sync_now(&self, cancel: &CancellationToken) -> Result<SyncResult> {
        self.session.credential(cancel).await?;
        Ok(self.engine.sync_now(cancel).await?)
    }

    pub async fn download_all(&self, cancel: &CancellationToken) -> Result<SyncResult> {
        self.session.credential(cancel).await?;
        Ok(self.engine.download_all(cancel).await?)
    }

    pub async fn upload_all(&self, cancel: &CancellationToken) -> Result<SyncResult> {
        self.session.credential(cancel).await?;
        Ok(self.engine.upload_all(cancel).await?)
    }

    pub async fn has_local_changes(&self, file_name: &str) -> Result<bool> {
        Ok(self.engine.has_local_changes(file_name).await?)
    }
}
