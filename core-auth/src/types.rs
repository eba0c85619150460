use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{AuthError, Result};

/// An OAuth credential as persisted in `token.json`.
///
/// The on-disk shape is the provider's token response plus `issued_utc`,
/// so a file written by another client of the same provider stays readable.
///
/// # Examples
///
/// ```
/// use core_auth::Credential;
/// use chrono::{Duration, Utc};
///
/// let credential = Credential::new("ya29.a0...", Some("1//0g...".to_string()), Utc::now(), 3600);
///
/// assert!(!credential.needs_refresh(Utc::now(), Duration::minutes(5)));
/// assert!(credential.needs_refresh(Utc::now() + Duration::minutes(56), Duration::minutes(5)));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds, counted from `issued_at`.
    pub expires_in: i64,
    /// Space-separated scopes the provider reported at issue time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(rename = "issued_utc")]
    pub issued_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        issued_at: DateTime<Utc>,
        expires_in: i64,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_in,
            scope: None,
            token_type: Some("Bearer".to_string()),
            issued_at,
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issued_at + Duration::seconds(self.expires_in)
    }

    /// `true` unless the token stays valid for more than `buffer` past `now`.
    pub fn needs_refresh(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        self.expires_at() <= now + buffer
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token
            .as_deref()
            .is_some_and(|token| !token.is_empty())
    }

    /// Scopes listed in the token response, if any.
    pub fn granted_scopes(&self) -> BTreeSet<String> {
        self.scope
            .as_deref()
            .map(parse_scopes)
            .unwrap_or_default()
    }

    /// Reject credentials that must never reach a caller.
    pub fn validate(&self) -> Result<()> {
        if self.access_token.trim().is_empty() {
            return Err(AuthError::InvalidCredential(
                "access token is empty".to_string(),
            ));
        }
        if self.expires_in <= 0 {
            return Err(AuthError::InvalidCredential(format!(
                "non-positive lifetime {}s",
                self.expires_in
            )));
        }
        Ok(())
    }
}

// Tokens never reach logs
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at())
            .field("scope", &self.scope)
            .finish()
    }
}

/// Split a space-separated OAuth scope string.
pub fn parse_scopes(raw: &str) -> BTreeSet<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

/// Scopes recorded in `scopes.json` after a successful remote operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeMetadata {
    pub scopes: Vec<String>,
    pub saved_at: DateTime<Utc>,
}

impl ScopeMetadata {
    pub fn new<I, S>(scopes: I, saved_at: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scopes: scopes.into_iter().map(Into::into).collect(),
            saved_at,
        }
    }

    /// Required scopes absent from the persisted set, in sorted order.
    pub fn missing<S: AsRef<str>>(&self, required: &[S]) -> Vec<String> {
        let persisted: BTreeSet<&str> = self.scopes.iter().map(String::as_str).collect();
        required
            .iter()
            .map(AsRef::as_ref)
            .filter(|scope| !persisted.contains(scope))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Order-independent superset check: every required scope was persisted.
    pub fn covers<S: AsRef<str>>(&self, required: &[S]) -> bool {
        self.missing(required).is_empty()
    }
}

/// Identity returned by the provider's userinfo endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// The logged-in user, owned by [`AuthSession`](crate::AuthSession).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSession {
    pub user_id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub logged_in_at: DateTime<Utc>,
}

impl UserSession {
    pub fn from_profile(profile: UserProfile, logged_in_at: DateTime<Utc>) -> Self {
        Self {
            user_id: profile.id,
            display_name: profile.name,
            email: profile.email,
            avatar_url: profile.avatar_url,
            logged_in_at,
        }
    }
}

/// Session state machine.
///
/// ```text
/// LoggedOut -> Authorizing -> LoggedIn
///     ^             ^  |          |
///     |             +--+ (retry)  |
///     +---------------------------+ (logout)
/// ```
///
/// # Examples
///
/// ```
/// use core_auth::AuthState;
///
/// assert!(!AuthState::default().is_logged_in());
/// assert!(AuthState::LoggedIn.is_logged_in());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    LoggedOut,
    Authorizing,
    LoggedIn,
}

impl AuthState {
    pub fn is_logged_in(&self) -> bool {
        matches!(self, AuthState::LoggedIn)
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthState::LoggedOut => write!(f, "logged out"),
            AuthState::Authorizing => write!(f, "authorizing"),
            AuthState::LoggedIn => write!(f, "logged in"),
        }
    }
}

/// Why a stored credential was not reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReuseRejection {
    NoToken,
    MissingScopeMetadata,
    ScopeMismatch { missing: Vec<String> },
    RefreshUnavailable,
    RefreshFailed(String),
    VerificationFailed(String),
    ScopesNotGranted,
    InvalidCredential(String),
    Storage(String),
    Cancelled,
}

impl ReuseRejection {
    /// The taxonomy error a caller would surface for this rejection.
    pub fn to_error(&self) -> AuthError {
        match self {
            ReuseRejection::NoToken => AuthError::CredentialMissing,
            ReuseRejection::MissingScopeMetadata => AuthError::ScopeMismatch {
                required: Vec::new(),
                granted: Vec::new(),
            },
            ReuseRejection::ScopeMismatch { missing } => AuthError::ScopeMismatch {
                required: missing.clone(),
                granted: Vec::new(),
            },
            ReuseRejection::ScopesNotGranted => AuthError::ScopeMismatch {
                required: Vec::new(),
                granted: Vec::new(),
            },
            ReuseRejection::RefreshUnavailable => AuthError::CredentialExpiredUnrefreshable(
                "no refresh token stored".to_string(),
            ),
            ReuseRejection::RefreshFailed(msg) => {
                AuthError::CredentialExpiredUnrefreshable(msg.clone())
            }
            ReuseRejection::VerificationFailed(msg) => AuthError::NetworkFailure(msg.clone()),
            ReuseRejection::InvalidCredential(msg) => AuthError::InvalidCredential(msg.clone()),
            ReuseRejection::Storage(msg) => AuthError::LocalIoFailure(msg.clone()),
            ReuseRejection::Cancelled => AuthError::Cancelled,
        }
    }
}

impl fmt::Display for ReuseRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReuseRejection::NoToken => write!(f, "no token"),
            ReuseRejection::MissingScopeMetadata => {
                write!(f, "scope mismatch: no scope metadata persisted")
            }
            ReuseRejection::ScopeMismatch { missing } => {
                write!(f, "scope mismatch: missing {}", missing.join(", "))
            }
            ReuseRejection::RefreshUnavailable => {
                write!(f, "token expired and no refresh token is stored")
            }
            ReuseRejection::RefreshFailed(msg) => write!(f, "token refresh failed: {}", msg),
            ReuseRejection::VerificationFailed(msg) => {
                write!(f, "scope verification failed: {}", msg)
            }
            ReuseRejection::ScopesNotGranted => {
                write!(f, "scope mismatch: provider does not grant the required scopes")
            }
            ReuseRejection::InvalidCredential(msg) => write!(f, "invalid credential: {}", msg),
            ReuseRejection::Storage(msg) => write!(f, "credential storage failure: {}", msg),
            ReuseRejection::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Outcome of [`TokenLifecycleManager::try_reuse`](crate::TokenLifecycleManager::try_reuse).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReuseResult {
    pub can_reuse: bool,
    pub credential: Option<Credential>,
    pub reason: Option<ReuseRejection>,
}

impl ReuseResult {
    pub fn reusable(credential: Credential) -> Self {
        Self {
            can_reuse: true,
            credential: Some(credential),
            reason: None,
        }
    }

    pub fn rejected(reason: ReuseRejection) -> Self {
        Self {
            can_reuse: false,
            credential: None,
            reason: Some(reason),
        }
    }

    /// Human-readable reason, empty when reusable.
    pub fn reason_text(&self) -> String {
        self.reason
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default()
    }
}

/// What [`AuthSession::login`](crate::AuthSession::login) reports to the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginResult {
    pub success: bool,
    pub error_message: Option<String>,
}

impl LoginResult {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            error_message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(message.into()),
        }
    }
}
