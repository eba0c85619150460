//! # Core Configuration Module
//!
//! Builder-based configuration for the credential and sync core.
//!
//! ## Overview
//!
//! [`CoreConfig`] carries everything the auth and sync layers need: storage
//! locations, OAuth client settings, timeouts for every network-bound step,
//! and the host bridges. [`CoreConfigBuilder::build`] validates eagerly so a
//! misconfigured host fails at startup instead of at first login.
//!
//! ## Required Dependencies
//!
//! - `HttpClient` - identity provider and remote store transport
//! - `FileSystemAccess` - credential directory and synchronized documents
//! - `AuthorizationPrompt` - interactive consent
//!
//! When the `desktop-shims` feature is enabled, desktop implementations of all
//! three are injected if not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, OAuthSettings};
//!
//! let config = CoreConfig::builder()
//!     .credential_dir("/home/ada/.local/share/lexicon/credentials")
//!     .data_dir("/home/ada/.local/share/lexicon")
//!     .oauth(OAuthSettings::from_env()?)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{
    AuthorizationPrompt, Clock, FileSystemAccess, HttpClient, RemoteStoreFactory, SystemClock,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const DRIVE_FILE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";
pub const USERINFO_PROFILE_SCOPE: &str = "https://www.googleapis.com/auth/userinfo.profile";
pub const USERINFO_EMAIL_SCOPE: &str = "https://www.googleapis.com/auth/userinfo.email";

const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8765/callback";
const DEFAULT_REMOTE_FOLDER: &str = "LexiconSync";

/// OAuth client registration.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthSettings {
    pub client_id: String,
    /// Installed-app clients may omit the secret when PKCE is used.
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    /// Scopes requested at consent and required for credential reuse.
    pub scopes: Vec<String>,
}

impl OAuthSettings {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            scopes: vec![
                DRIVE_FILE_SCOPE.to_string(),
                USERINFO_PROFILE_SCOPE.to_string(),
                USERINFO_EMAIL_SCOPE.to_string(),
            ],
        }
    }

    /// Read `GOOGLE_CLIENT_ID` and, if present, `GOOGLE_CLIENT_SECRET`.
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var("GOOGLE_CLIENT_ID").map_err(|_| {
            Error::Config("GOOGLE_CLIENT_ID environment variable not set".to_string())
        })?;

        let mut settings = Self::new(client_id);
        settings.client_secret = std::env::var("GOOGLE_CLIENT_SECRET").ok();
        Ok(settings)
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = uri.into();
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::Config("OAuth client id cannot be empty".to_string()));
        }
        if self.scopes.is_empty() {
            return Err(Error::Config(
                "At least one OAuth scope is required".to_string(),
            ));
        }
        if !self.redirect_uri.starts_with("http://") && !self.redirect_uri.starts_with("https://")
        {
            return Err(Error::Config(format!(
                "Redirect URI must be an http(s) URL, got '{}'",
                self.redirect_uri
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for OAuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Time bounds for network-bound steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Interactive consent, from opening the prompt to code exchange.
    pub authorization: Duration,
    /// Any single identity or remote store request.
    pub request: Duration,
    /// Best-effort token revocation on logout.
    pub revoke: Duration,
    /// Best-effort final upload on logout.
    pub final_upload: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            authorization: Duration::from_secs(120),
            request: Duration::from_secs(30),
            revoke: Duration::from_secs(2),
            final_upload: Duration::from_secs(3),
        }
    }
}

/// Credential reuse policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPolicy {
    /// Refresh when fewer than this many seconds of validity remain.
    pub refresh_buffer: Duration,
    /// How long a scope verification result is trusted.
    pub verification_ttl: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            refresh_buffer: Duration::from_secs(5 * 60),
            verification_ttl: Duration::from_secs(5 * 60),
        }
    }
}

/// Core configuration.
///
/// Use [`CoreConfig::builder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Holds `token.json` and `scopes.json` and nothing else
    pub credential_dir: PathBuf,
    /// Holds the synchronized documents and `sync_metadata.json`
    pub data_dir: PathBuf,
    /// Name of the app folder in the remote store
    pub remote_folder: String,
    pub oauth: OAuthSettings,
    pub timeouts: Timeouts,
    pub token_policy: TokenPolicy,
    pub http_client: Arc<dyn HttpClient>,
    pub file_system: Arc<dyn FileSystemAccess>,
    pub authorization_prompt: Arc<dyn AuthorizationPrompt>,
    /// Binds the remote store to a token; the service layer supplies a
    /// default backend when absent.
    pub remote_store_factory: Option<Arc<dyn RemoteStoreFactory>>,
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("credential_dir", &self.credential_dir)
            .field("data_dir", &self.data_dir)
            .field("remote_folder", &self.remote_folder)
            .field("oauth", &self.oauth)
            .field("timeouts", &self.timeouts)
            .field("token_policy", &self.token_policy)
            .field("http_client", &"HttpClient { ... }")
            .field("file_system", &"FileSystemAccess { ... }")
            .field("authorization_prompt", &"AuthorizationPrompt { ... }")
            .field(
                "remote_store_factory",
                &self
                    .remote_store_factory
                    .as_ref()
                    .map(|_| "RemoteStoreFactory { ... }"),
            )
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates paths, OAuth settings and timeouts.
    pub fn validate(&self) -> Result<()> {
        if self.credential_dir.as_os_str().is_empty() {
            return Err(Error::Config(
                "Credential directory cannot be empty".to_string(),
            ));
        }

        if self.data_dir.as_os_str().is_empty() {
            return Err(Error::Config("Data directory cannot be empty".to_string()));
        }

        // clear_all wipes the credential directory wholesale
        if self.data_dir.starts_with(&self.credential_dir) {
            return Err(Error::Config(
                "Data directory must not live inside the credential directory".to_string(),
            ));
        }

        if self.remote_folder.trim().is_empty() {
            return Err(Error::Config(
                "Remote folder name cannot be empty".to_string(),
            ));
        }

        self.oauth.validate()?;

        let t = &self.timeouts;
        if [t.authorization, t.request, t.revoke, t.final_upload]
            .iter()
            .any(Duration::is_zero)
        {
            return Err(Error::Config("Timeouts must be non-zero".to_string()));
        }

        if self.token_policy.refresh_buffer > Duration::from_secs(3600) {
            return Err(Error::Config(
                "Refresh buffer exceeds the one hour token lifetime".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn capability_missing(capability: &str, what: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: format!(
            "{} implementation is required for {}. \
             Desktop: enable the 'desktop-shims' feature. \
             Other hosts: inject a platform-native adapter.",
            capability, what
        ),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(timeouts: &Timeouts) -> Result<Arc<dyn HttpClient>> {
    Ok(Arc::new(bridge_desktop::ReqwestHttpClient::with_timeout(
        timeouts.request,
    )))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_timeouts: &Timeouts) -> Result<Arc<dyn HttpClient>> {
    Err(capability_missing("HttpClient", "identity and remote store requests"))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    Ok(Arc::new(bridge_desktop::TokioFileSystem::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    Err(capability_missing("FileSystemAccess", "credential and document storage"))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_prompt() -> Result<Arc<dyn AuthorizationPrompt>> {
    Ok(Arc::new(bridge_desktop::LoopbackAuthorizationPrompt::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_prompt() -> Result<Arc<dyn AuthorizationPrompt>> {
    Err(capability_missing("AuthorizationPrompt", "interactive login"))
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    credential_dir: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    remote_folder: Option<String>,
    oauth: Option<OAuthSettings>,
    timeouts: Option<Timeouts>,
    token_policy: Option<TokenPolicy>,
    http_client: Option<Arc<dyn HttpClient>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    authorization_prompt: Option<Arc<dyn AuthorizationPrompt>>,
    remote_store_factory: Option<Arc<dyn RemoteStoreFactory>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CoreConfigBuilder {
    /// Directory for `token.json` / `scopes.json`.
    pub fn credential_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.credential_dir = Some(path.into());
        self
    }

    /// Directory for the synchronized documents.
    pub fn data_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.data_dir = Some(path.into());
        self
    }

    /// Default: `LexiconSync`
    pub fn remote_folder(mut self, name: impl Into<String>) -> Self {
        self.remote_folder = Some(name.into());
        self
    }

    pub fn oauth(mut self, settings: OAuthSettings) -> Self {
        self.oauth = Some(settings);
        self
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    pub fn token_policy(mut self, policy: TokenPolicy) -> Self {
        self.token_policy = Some(policy);
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    pub fn authorization_prompt(mut self, prompt: Arc<dyn AuthorizationPrompt>) -> Self {
        self.authorization_prompt = Some(prompt);
        self
    }

    pub fn remote_store_factory(mut self, factory: Arc<dyn RemoteStoreFactory>) -> Self {
        self.remote_store_factory = Some(factory);
        self
    }

    /// Default: [`SystemClock`]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] for missing or invalid settings
    /// - [`Error::CapabilityMissing`] when a bridge is absent and no desktop
    ///   default is available
    pub fn build(self) -> Result<CoreConfig> {
        let credential_dir = self.credential_dir.ok_or_else(|| {
            Error::Config(
                "Credential directory is required. Use .credential_dir() to set it.".to_string(),
            )
        })?;

        let data_dir = self.data_dir.ok_or_else(|| {
            Error::Config("Data directory is required. Use .data_dir() to set it.".to_string())
        })?;

        let oauth = self.oauth.ok_or_else(|| {
            Error::Config(
                "OAuth settings are required. Use .oauth() or OAuthSettings::from_env()."
                    .to_string(),
            )
        })?;

        let timeouts = self.timeouts.unwrap_or_default();

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(&timeouts)?,
        };

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system()?,
        };

        let authorization_prompt = match self.authorization_prompt {
            Some(prompt) => prompt,
            None => provide_default_prompt()?,
        };

        let config = CoreConfig {
            credential_dir,
            data_dir,
            remote_folder: self
                .remote_folder
                .unwrap_or_else(|| DEFAULT_REMOTE_FOLDER.to_string()),
            oauth,
            timeouts,
            token_policy: self.token_policy.unwrap_or_default(),
            http_client,
            file_system,
            authorization_prompt,
            remote_store_factory: self.remote_store_factory,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{
        AuthorizationRequest, AuthorizationResponse, BridgeError, FileMetadata, HttpRequest,
        HttpResponse,
    };
    use bytes::Bytes;
    use std::path::Path;

    struct NullHttp;

    #[async_trait]
    impl HttpClient for NullHttp {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            Err(BridgeError::NotAvailable("offline".to_string()))
        }
    }

    struct NullFs;

    #[async_trait]
    impl FileSystemAccess for NullFs {
        async fn exists(&self, _path: &Path) -> BridgeResult<bool> {
            Ok(false)
        }
        async fn metadata(&self, _path: &Path) -> BridgeResult<FileMetadata> {
            Err(BridgeError::NotFound("metadata".to_string()))
        }
        async fn create_dir_all(&self, _path: &Path) -> BridgeResult<()> {
            Ok(())
        }
        async fn read_file(&self, _path: &Path) -> BridgeResult<Bytes> {
            Ok(Bytes::new())
        }
        async fn write_file(&self, _path: &Path, _data: Bytes) -> BridgeResult<()> {
            Ok(())
        }
        async fn rename(&self, _from: &Path, _to: &Path) -> BridgeResult<()> {
            Ok(())
        }
        async fn delete_file(&self, _path: &Path) -> BridgeResult<()> {
            Ok(())
        }
        async fn delete_dir_all(&self, _path: &Path) -> BridgeResult<()> {
            Ok(())
        }
    }

    struct NullPrompt;

    #[async_trait]
    impl AuthorizationPrompt for NullPrompt {
        async fn authorize(
            &self,
            _request: AuthorizationRequest,
        ) -> BridgeResult<AuthorizationResponse> {
            Err(BridgeError::Cancelled)
        }
    }

    fn with_bridges(builder: CoreConfigBuilder) -> CoreConfigBuilder {
        builder
            .http_client(Arc::new(NullHttp))
            .file_system(Arc::new(NullFs))
            .authorization_prompt(Arc::new(NullPrompt))
    }

    fn base() -> CoreConfigBuilder {
        with_bridges(CoreConfig::builder())
            .credential_dir("/data/credentials")
            .data_dir("/data/documents")
            .oauth(OAuthSettings::new("client-123.apps.googleusercontent.com"))
    }

    #[test]
    fn test_builder_applies_defaults() {
        let config = base().build().unwrap();

        assert_eq!(config.remote_folder, "LexiconSync");
        assert_eq!(config.timeouts.revoke, Duration::from_secs(2));
        assert_eq!(config.timeouts.final_upload, Duration::from_secs(3));
        assert_eq!(config.token_policy.refresh_buffer, Duration::from_secs(300));
        assert_eq!(config.token_policy.verification_ttl, Duration::from_secs(300));
        assert_eq!(config.oauth.scopes.len(), 3);
        assert!(config.remote_store_factory.is_none());
    }

    #[test]
    fn test_missing_credential_dir() {
        let result = with_bridges(CoreConfig::builder())
            .data_dir("/data/documents")
            .oauth(OAuthSettings::new("client"))
            .build();

        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("credential_dir")));
    }

    #[test]
    fn test_missing_oauth_settings() {
        let result = with_bridges(CoreConfig::builder())
            .credential_dir("/data/credentials")
            .data_dir("/data/documents")
            .build();

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_data_dir_inside_credential_dir_rejected() {
        let result = base().data_dir("/data/credentials/docs").build();
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("inside")));
    }

    #[test]
    fn test_empty_scopes_rejected() {
        let result = base()
            .oauth(OAuthSettings::new("client").with_scopes(Vec::<String>::new()))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = base()
            .timeouts(Timeouts {
                revoke: Duration::ZERO,
                ..Timeouts::default()
            })
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_oauth_debug_redacts_secret() {
        let settings = OAuthSettings::new("client").with_client_secret("hunter2");
        let debug = format!("{:?}", settings);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_missing_http_client_without_shims() {
        let result = CoreConfig::builder()
            .credential_dir("/data/credentials")
            .data_dir("/data/documents")
            .oauth(OAuthSettings::new("client"))
            .build();

        assert!(matches!(
            result,
            Err(Error::CapabilityMissing { capability, .. }) if capability == "HttpClient"
        ));
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_desktop_defaults_injected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = CoreConfig::builder()
            .credential_dir(tmp.path().join("credentials"))
            .data_dir(tmp.path().join("documents"))
            .oauth(OAuthSettings::new("client"))
            .build();

        assert!(config.is_ok());
    }
}
