//! Identity Provider
//!
//! Everything the credential lifecycle needs from the OAuth provider besides
//! storage: consent, refresh, introspection, revocation and the user profile.
//! [`HttpIdentityProvider`] talks to Google's endpoints; tests substitute
//! their own implementation of [`IdentityProvider`].

use crate::error::{AuthError, Result};
use crate::oauth::{OAuthConfig, OAuthFlowManager};
use crate::types::{parse_scopes, Credential, UserProfile};
use async_trait::async_trait;
use bridge_traits::{
    AuthorizationPrompt, AuthorizationRequest, BridgeError, Clock, HttpClient, HttpMethod,
    HttpRequest, HttpResponse,
};
use core_runtime::OAuthSettings;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;

pub const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";
pub const GOOGLE_REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";
pub const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Run the consent flow for `scopes` and return the issued credential.
    async fn authorize_interactive(&self, scopes: &[String]) -> Result<Credential>;

    async fn refresh_token(&self, refresh_token: &str) -> Result<Credential>;

    /// Scopes the provider currently associates with `access_token`.
    async fn introspect_token(&self, access_token: &str) -> Result<BTreeSet<String>>;

    /// Revoke a refresh or access token. Revoking one revokes the grant.
    async fn revoke_token(&self, token: &str) -> Result<()>;

    async fn get_profile(&self, access_token: &str) -> Result<UserProfile>;
}

/// Provider endpoints besides the OAuth authorize and token URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityEndpoints {
    pub tokeninfo_url: String,
    pub revoke_url: String,
    pub userinfo_url: String,
}

impl Default for IdentityEndpoints {
    fn default() -> Self {
        Self {
            tokeninfo_url: GOOGLE_TOKENINFO_URL.to_string(),
            revoke_url: GOOGLE_REVOKE_URL.to_string(),
            userinfo_url: GOOGLE_USERINFO_URL.to_string(),
        }
    }
}

pub struct HttpIdentityProvider {
    flow: OAuthFlowManager,
    endpoints: IdentityEndpoints,
    http_client: Arc<dyn HttpClient>,
    prompt: Arc<dyn AuthorizationPrompt>,
}

impl HttpIdentityProvider {
    pub fn google(
        settings: &OAuthSettings,
        http_client: Arc<dyn HttpClient>,
        prompt: Arc<dyn AuthorizationPrompt>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(
            OAuthConfig::google(settings),
            IdentityEndpoints::default(),
            http_client,
            prompt,
            clock,
        )
    }

    pub fn new(
        config: OAuthConfig,
        endpoints: IdentityEndpoints,
        http_client: Arc<dyn HttpClient>,
        prompt: Arc<dyn AuthorizationPrompt>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            flow: OAuthFlowManager::new(config, http_client.clone(), clock),
            endpoints,
            http_client,
            prompt,
        }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    #[instrument(skip(self))]
    async fn authorize_interactive(&self, scopes: &[String]) -> Result<Credential> {
        let (url, verifier) = self.flow.build_auth_url_for(scopes)?;
        let request = AuthorizationRequest {
            url,
            redirect_uri: self.flow.config().redirect_uri.clone(),
            state: verifier.state().to_string(),
        };

        info!("Waiting for user consent");
        let response = self
            .prompt
            .authorize(request)
            .await
            .map_err(|e| match e {
                BridgeError::Cancelled => AuthError::AuthorizationCancelled,
                BridgeError::OperationFailed(msg) => AuthError::AuthorizationFailed(msg),
                other => other.into(),
            })?;

        self.flow
            .exchange_code(&response.code, &response.state, &verifier)
            .await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<Credential> {
        self.flow.refresh_access_token(refresh_token).await
    }

    #[instrument(skip_all)]
    async fn introspect_token(&self, access_token: &str) -> Result<BTreeSet<String>> {
        let url = Url::parse_with_params(&self.endpoints.tokeninfo_url, &[("access_token", access_token)])
            .map_err(|e| AuthError::NetworkFailure(format!("Invalid tokeninfo URL: {}", e)))?;

        let response = self
            .http_client
            .execute(HttpRequest::new(HttpMethod::Get, url.to_string()))
            .await?;
        ensure_success(&response, "tokeninfo")?;

        let info: TokenInfo = response
            .json()
            .map_err(|e| AuthError::Serialization(format!("Failed to parse tokeninfo: {}", e)))?;
        let scopes = info.scope.as_deref().map(parse_scopes).unwrap_or_default();
        debug!(granted = scopes.len(), "Introspected access token");
        Ok(scopes)
    }

    #[instrument(skip_all)]
    async fn revoke_token(&self, token: &str) -> Result<()> {
        let body = serde_urlencoded::to_string([("token", token)])
            .map_err(|e| AuthError::Serialization(format!("Failed to encode revoke request: {}", e)))?;
        let request = HttpRequest::new(HttpMethod::Post, self.endpoints.revoke_url.clone()).form(body);

        let response = self.http_client.execute(request).await?;

        // 400 invalid_token: already revoked or expired
        if response.status == 400 {
            debug!("Token was already invalid at revocation");
            return Ok(());
        }
        ensure_success(&response, "revoke")?;
        info!("Token revoked");
        Ok(())
    }

    #[instrument(skip_all)]
    async fn get_profile(&self, access_token: &str) -> Result<UserProfile> {
        let request = HttpRequest::new(HttpMethod::Get, self.endpoints.userinfo_url.clone())
            .bearer_token(access_token);

        let response = self.http_client.execute(request).await?;
        ensure_success(&response, "userinfo")?;

        let info: UserInfo = response
            .json()
            .map_err(|e| AuthError::Serialization(format!("Failed to parse userinfo: {}", e)))?;
        Ok(info.into_profile())
    }
}

/// Map a non-2xx identity response onto the error taxonomy.
pub(crate) fn ensure_success(response: &HttpResponse, endpoint: &str) -> Result<()> {
    if response.is_success() {
        return Ok(());
    }

    let status = response.status;
    let body = response.text().unwrap_or_default();
    warn!(status, endpoint, "Identity endpoint returned an error");

    let message = format!("{} returned {}: {}", endpoint, status, body);
    Err(match status {
        400 | 401 => AuthError::InvalidCredential(message),
        403 => AuthError::RemoteQuotaOrPermission(message),
        408 | 504 => AuthError::NetworkTimeout(message),
        _ => AuthError::NetworkFailure(message),
    })
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

impl UserInfo {
    fn into_profile(self) -> UserProfile {
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .or_else(|| self.email.clone())
            .unwrap_or_else(|| self.sub.clone());

        UserProfile {
            id: self.sub,
            name,
            email: self.email,
            avatar_url: self.picture,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{AuthorizationResponse, ManualClock};
    use bytes::Bytes;
    use chrono::Utc;
    use mockall::mock;
    use std::collections::HashMap;
    use std::sync::Mutex;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    /// Echoes the issued state, or fails with a fixed error.
    struct ScriptedPrompt {
        outcome: Mutex<Option<BridgeError>>,
        seen: Mutex<Option<AuthorizationRequest>>,
    }

    impl ScriptedPrompt {
        fn approving() -> Self {
            Self {
                outcome: Mutex::new(None),
                seen: Mutex::new(None),
            }
        }

        fn failing(err: BridgeError) -> Self {
            Self {
                outcome: Mutex::new(Some(err)),
                seen: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl AuthorizationPrompt for ScriptedPrompt {
        async fn authorize(&self, request: AuthorizationRequest) -> BridgeResult<AuthorizationResponse> {
            *self.seen.lock().unwrap() = Some(request.clone());
            if let Some(err) = self.outcome.lock().unwrap().take() {
                return Err(err);
            }
            Ok(AuthorizationResponse {
                code: "4/0Ad".to_string(),
                state: request.state,
            })
        }
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    fn provider(mock: MockHttpClient, prompt: Arc<ScriptedPrompt>) -> HttpIdentityProvider {
        HttpIdentityProvider::google(
            &OAuthSettings::new("client"),
            Arc::new(mock),
            prompt,
            Arc::new(ManualClock::new(Utc::now())),
        )
    }

    #[tokio::test]
    async fn test_authorize_interactive_exchanges_code() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(1)
            .withf(|req| req.url == crate::oauth::GOOGLE_TOKEN_URL)
            .returning(|_| Ok(response(200, r#"{"access_token":"ya29","refresh_token":"1//r"}"#)));
        let prompt = Arc::new(ScriptedPrompt::approving());
        let provider = provider(mock, prompt.clone());

        let scopes = vec!["https://www.googleapis.com/auth/drive.file".to_string()];
        let credential = provider.authorize_interactive(&scopes).await.unwrap();

        assert_eq!(credential.access_token, "ya29");
        let seen = prompt.seen.lock().unwrap().clone().unwrap();
        assert!(seen.url.contains("drive.file"));
        assert!(seen.url.contains(&seen.state));
    }

    #[tokio::test]
    async fn test_declined_consent_is_authorization_cancelled() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute().never();
        let provider = provider(mock, Arc::new(ScriptedPrompt::failing(BridgeError::Cancelled)));

        let result = provider.authorize_interactive(&["scope".to_string()]).await;

        assert!(matches!(result, Err(AuthError::AuthorizationCancelled)));
    }

    #[tokio::test]
    async fn test_introspect_parses_scopes() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(1)
            .withf(|req| req.url.starts_with(GOOGLE_TOKENINFO_URL) && req.url.contains("access_token=ya29"))
            .returning(|_| {
                Ok(response(
                    200,
                    r#"{"azp":"client","scope":"openid https://www.googleapis.com/auth/drive.file","expires_in":"3599"}"#,
                ))
            });
        let provider = provider(mock, Arc::new(ScriptedPrompt::approving()));

        let scopes = provider.introspect_token("ya29").await.unwrap();

        assert!(scopes.contains("openid"));
        assert!(scopes.contains("https://www.googleapis.com/auth/drive.file"));
    }

    #[tokio::test]
    async fn test_introspect_invalid_token() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(1)
            .returning(|_| Ok(response(400, r#"{"error":"invalid_token"}"#)));
        let provider = provider(mock, Arc::new(ScriptedPrompt::approving()));

        assert!(matches!(
            provider.introspect_token("stale").await,
            Err(AuthError::InvalidCredential(_))
        ));
    }

    #[tokio::test]
    async fn test_revoke_treats_invalid_token_as_done() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(1)
            .withf(|req| req.method == HttpMethod::Post && req.url == GOOGLE_REVOKE_URL)
            .returning(|_| Ok(response(400, r#"{"error":"invalid_token"}"#)));
        let provider = provider(mock, Arc::new(ScriptedPrompt::approving()));

        assert!(provider.revoke_token("1//r").await.is_ok());
    }

    #[tokio::test]
    async fn test_get_profile_maps_userinfo() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(1)
            .withf(|req| {
                req.headers.get("Authorization").map(String::as_str) == Some("Bearer ya29")
            })
            .returning(|_| {
                Ok(response(
                    200,
                    r#"{"sub":"1081","name":"Ada Lovelace","email":"ada@example.com","picture":"https://lh3/photo.jpg"}"#,
                ))
            });
        let provider = provider(mock, Arc::new(ScriptedPrompt::approving()));

        let profile = provider.get_profile("ya29").await.unwrap();

        assert_eq!(profile.id, "1081");
        assert_eq!(profile.name, "Ada Lovelace");
        assert_eq!(profile.avatar_url.as_deref(), Some("https://lh3/photo.jpg"));
    }

    #[tokio::test]
    async fn test_get_profile_forbidden_is_permission_error() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(1)
            .returning(|_| Ok(response(403, "insufficient scope")));
        let provider = provider(mock, Arc::new(ScriptedPrompt::approving()));

        let err = provider.get_profile("ya29").await.unwrap_err();
        assert!(err.is_scope_or_permission());
    }

    #[tokio::test]
    async fn test_get_profile_rate_limited_is_network_failure() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(1)
            .returning(|_| Ok(response(429, "rate limited")));
        let provider = provider(mock, Arc::new(ScriptedPrompt::approving()));

        let err = provider.get_profile("ya29").await.unwrap_err();
        assert!(matches!(err, AuthError::NetworkFailure(_)));
        assert!(!err.is_scope_or_permission());
    }

    #[test]
    fn test_profile_name_falls_back_to_email() {
        let info = UserInfo {
            sub: "1".into(),
            name: None,
            email: Some("ada@example.com".into()),
            picture: None,
        };
        assert_eq!(info.into_profile().name, "ada@example.com");
    }
}
