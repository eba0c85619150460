//! Interactive Authorization Prompt
//!
//! Hosts present the provider's consent page to the user and hand back
//! whatever the provider redirected with. Desktop does this with a loopback
//! listener and the system browser; mobile hosts use their own web views.

use async_trait::async_trait;

use crate::error::Result;

/// What the host must show the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    /// Full consent URL, including `state` and PKCE challenge.
    pub url: String,
    /// Where the provider will send the user back to.
    pub redirect_uri: String,
    /// CSRF token the callback must echo.
    pub state: String,
}

/// The provider's redirect parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationResponse {
    pub code: String,
    pub state: String,
}

#[async_trait]
pub trait AuthorizationPrompt: Send + Sync {
    /// Show the consent page and wait for the redirect.
    ///
    /// Blocks until the user completes or abandons the flow. Returns
    /// [`BridgeError::Cancelled`](crate::BridgeError::Cancelled) when the user
    /// declines, and `OperationFailed` when the provider returned an error.
    async fn authorize(&self, request: AuthorizationRequest) -> Result<AuthorizationResponse>;
}
