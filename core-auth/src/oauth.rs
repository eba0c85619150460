//! OAuth 2.0 Authorization Code Flow with PKCE
//!
//! Implements RFC 6749 and RFC 7636 against the provider's authorization and
//! token endpoints.
//!
//! # Overview
//!
//! The flow manager handles:
//! - Building the consent URL with a PKCE challenge and CSRF `state`
//! - Exchanging the returned code for a [`Credential`]
//! - Refreshing an access token with a bounded retry
//!
//! # Security
//!
//! - Code verifier and state come from a CSPRNG
//! - The callback `state` is compared before any code is exchanged
//! - Tokens, codes and verifiers are never logged
//!
//! # Example
//!
//! ```no_run
//! use core_auth::oauth::{OAuthConfig, OAuthFlowManager};
//! use core_runtime::OAuthSettings;
//! use std::sync::Arc;
//!
//! # use bridge_traits::{Clock, HttpClient};
//! # fn example(http: Arc<dyn HttpClient>, clock: Arc<dyn Clock>) -> core_auth::Result<()> {
//! let config = OAuthConfig::google(&OAuthSettings::new("client-id.apps.googleusercontent.com"));
//! let flow = OAuthFlowManager::new(config, http, clock);
//!
//! let (auth_url, verifier) = flow.build_auth_url()?;
//! // Send the user to auth_url, keep verifier for exchange_code
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::Credential;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bridge_traits::{Clock, HttpClient, HttpMethod, HttpRequest, HttpResponse};
use core_runtime::OAuthSettings;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, warn};
use url::Url;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

const MAX_REFRESH_ATTEMPTS: u32 = 3;

/// OAuth 2.0 client and endpoint configuration.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    /// Optional for installed-app clients
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub auth_url: String,
    pub token_url: String,
}

impl OAuthConfig {
    /// Google endpoints with the host's client registration.
    pub fn google(settings: &OAuthSettings) -> Self {
        Self {
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            redirect_uri: settings.redirect_uri.clone(),
            scopes: settings.scopes.clone(),
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
        }
    }
}

/// PKCE (Proof Key for Code Exchange) verifier.
///
/// Only the challenge derived from the verifier leaves the process before
/// the code exchange.
#[derive(Clone)]
pub struct PkceVerifier {
    verifier: String,
    state: String,
}

impl PkceVerifier {
    /// Generate a 32-byte verifier and a 16-byte state, both base64url without padding.
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();

        let mut verifier_bytes = [0u8; 32];
        rng.fill(&mut verifier_bytes);
        let verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);

        let mut state_bytes = [0u8; 16];
        rng.fill(&mut state_bytes);
        let state = URL_SAFE_NO_PAD.encode(state_bytes);

        Self { verifier, state }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    /// S256: BASE64URL(SHA256(code_verifier))
    pub fn challenge(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }
}

impl Default for PkceVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PkceVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceVerifier")
            .field("verifier", &"[REDACTED]")
            .field("state", &self.state)
            .finish()
    }
}

/// OAuth 2.0 flow manager.
pub struct OAuthFlowManager {
    config: OAuthConfig,
    http_client: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
}

impl OAuthFlowManager {
    pub fn new(config: OAuthConfig, http_client: Arc<dyn HttpClient>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            http_client,
            clock,
        }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Build the consent URL.
    ///
    /// Returns the URL and the verifier that [`exchange_code`](Self::exchange_code)
    /// needs. `prompt=consent` forces the provider to show the scope screen
    /// again, which is how a narrower earlier grant gets widened.
    pub fn build_auth_url(&self) -> Result<(String, PkceVerifier)> {
        self.build_auth_url_for(&self.config.scopes)
    }

    /// Like [`build_auth_url`](Self::build_auth_url) with an explicit scope set.
    #[instrument(skip(self))]
    pub fn build_auth_url_for(&self, scopes: &[String]) -> Result<(String, PkceVerifier)> {
        let verifier = PkceVerifier::new();
        let challenge = verifier.challenge();

        let mut url = Url::parse(&self.config.auth_url)
            .map_err(|e| AuthError::AuthorizationFailed(format!("Invalid auth URL: {}", e)))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.config.client_id);
            query.append_pair("redirect_uri", &self.config.redirect_uri);
            query.append_pair("response_type", "code");
            query.append_pair("scope", &scopes.join(" "));
            query.append_pair("state", verifier.state());
            query.append_pair("code_challenge", &challenge);
            query.append_pair("code_challenge_method", "S256");
            query.append_pair("access_type", "offline");
            query.append_pair("prompt", "consent");
        }

        tracing::debug!(scopes = scopes.len(), "Built authorization URL");

        Ok((url.to_string(), verifier))
    }

    /// Exchange an authorization code for a credential.
    ///
    /// # Errors
    ///
    /// - [`AuthError::StateMismatch`] when `state` is not the one issued
    /// - [`AuthError::AuthorizationFailed`] when the token endpoint rejects the code
    /// - Network errors from the transport
    #[instrument(skip(self, code, verifier))]
    pub async fn exchange_code(
        &self,
        code: &str,
        state: &str,
        verifier: &PkceVerifier,
    ) -> Result<Credential> {
        if state != verifier.state() {
            warn!("OAuth state mismatch on callback");
            return Err(AuthError::StateMismatch {
                expected: verifier.state().to_string(),
                actual: state.to_string(),
            });
        }

        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("code", code);
        params.insert("redirect_uri", &self.config.redirect_uri);
        params.insert("client_id", &self.config.client_id);
        params.insert("code_verifier", verifier.verifier());
        if let Some(ref client_secret) = self.config.client_secret {
            params.insert("client_secret", client_secret);
        }

        tracing::debug!("Exchanging authorization code for tokens");

        let response = self.post_form(&params).await?;

        if !response.is_success() {
            let status = response.status;
            let error_body = error_text(&response);
            warn!(status, error = %error_body, "Token exchange failed");

            return Err(if response.is_client_error() {
                AuthError::AuthorizationFailed(format!(
                    "Token endpoint returned {}: {}",
                    status, error_body
                ))
            } else {
                AuthError::NetworkFailure(format!("Token endpoint returned {}", status))
            });
        }

        let token_response: TokenResponse = parse_token_response(&response)?;
        tracing::info!(
            expires_in = token_response.expires_in,
            "Exchanged authorization code for tokens"
        );

        Ok(token_response.into_credential(None, self.clock.now()))
    }

    /// Obtain a fresh access token.
    ///
    /// Server errors and transient transport failures are retried up to
    /// three attempts with exponential backoff (100ms, 200ms). Client errors fail immediately: the refresh
    /// token was revoked or expired.
    ///
    /// The returned credential keeps `refresh_token` when the provider does
    /// not rotate it.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<Credential> {
        let mut params = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("refresh_token", refresh_token);
        params.insert("client_id", &self.config.client_id);
        if let Some(ref client_secret) = self.config.client_secret {
            params.insert("client_secret", client_secret);
        }

        tracing::debug!("Refreshing access token");

        let request = self.form_request(&params)?;
        let mut attempts = 0;
        loop {
            attempts += 1;

            let failure = match self.http_client.execute(request.clone()).await {
                Ok(response) if response.is_success() => {
                    let token_response = parse_token_response(&response)?;
                    tracing::info!(
                        expires_in = token_response.expires_in,
                        "Refreshed access token"
                    );
                    return Ok(token_response.into_credential(Some(refresh_token), self.clock.now()));
                }
                Ok(response) if response.is_client_error() => {
                    let status = response.status;
                    let error_body = error_text(&response);
                    warn!(status, error = %error_body, "Token refresh rejected");
                    return Err(AuthError::CredentialExpiredUnrefreshable(format!(
                        "Token endpoint returned {}: {}",
                        status, error_body
                    )));
                }
                Ok(response) => format!("status {}", response.status),
                Err(e) if e.is_transient() && attempts < MAX_REFRESH_ATTEMPTS => e.to_string(),
                Err(e) => return Err(e.into()),
            };

            if attempts >= MAX_REFRESH_ATTEMPTS {
                return Err(AuthError::NetworkFailure(format!(
                    "Token refresh failed after {} attempts, last {}",
                    attempts, failure
                )));
            }

            let delay = Duration::from_millis(100 * 2u64.pow(attempts - 1));
            warn!(
                attempts,
                failure = %failure,
                delay_ms = delay.as_millis() as u64,
                "Token refresh failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn post_form(&self, params: &HashMap<&str, &str>) -> Result<HttpResponse> {
        let request = self.form_request(params)?;
        Ok(self.http_client.execute(request).await?)
    }

    fn form_request(&self, params: &HashMap<&str, &str>) -> Result<HttpRequest> {
        let encoded = serde_urlencoded::to_string(params).map_err(|e| {
            AuthError::Serialization(format!("Failed to encode token request: {}", e))
        })?;

        Ok(HttpRequest::new(HttpMethod::Post, self.config.token_url.clone()).form(encoded))
    }
}

fn error_text(response: &HttpResponse) -> String {
    response
        .text()
        .unwrap_or_else(|_| "Unable to read error response".to_string())
}

fn parse_token_response(response: &HttpResponse) -> Result<TokenResponse> {
    response
        .json()
        .map_err(|e| AuthError::Serialization(format!("Failed to parse token response: {}", e)))
}

/// JSON body of the token endpoint.
#[derive(Debug, Deserialize, Serialize)]
struct TokenResponse {
    access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    token_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
}

impl TokenResponse {
    fn into_credential(
        self,
        previous_refresh_token: Option<&str>,
        issued_at: chrono::DateTime<chrono::Utc>,
    ) -> Credential {
        Credential {
            access_token: self.access_token,
            refresh_token: self
                .refresh_token
                .or_else(|| previous_refresh_token.map(str::to_string)),
            expires_in: self.expires_in,
            scope: self.scope,
            token_type: self.token_type,
            issued_at,
        }
    }
}

fn default_expires_in() -> i64 {
    3600
}
