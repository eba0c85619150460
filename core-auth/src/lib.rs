//! # Authentication Module
//!
//! Credential lifecycle for the sync engine: acquiring an OAuth credential,
//! deciding whether a stored one may be reused, refreshing it near expiry,
//! and tearing everything down on logout.
//!
//! ## Overview
//!
//! - [`CredentialStore`] persists `token.json` and `scopes.json` with atomic replace
//! - [`TokenLifecycleManager`] validates, refreshes and verifies stored credentials
//! - [`AuthSession`] drives login, silent login and logout and owns the user session
//! - [`IdentityProvider`] abstracts the OAuth provider; [`HttpIdentityProvider`]
//!   speaks to Google with PKCE
//!
//! ## Features
//!
//! - OAuth 2.0 authorization code flow with PKCE and CSRF state check
//! - Refresh five minutes before expiry
//! - Scope verification cached for five minutes
//! - Bounded retry when a stored grant lacks a scope the app now needs
//! - Login-state events on the core event bus

pub mod credential_store;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod manager;
pub mod oauth;
pub mod types;

pub use credential_store::CredentialStore;
pub use error::{AuthError, Result};
pub use identity::{HttpIdentityProvider, IdentityEndpoints, IdentityProvider};
pub use lifecycle::TokenLifecycleManager;
pub use manager::{AuthSession, SessionSync};
pub use oauth::{OAuthConfig, OAuthFlowManager, PkceVerifier};
pub use types::{
    AuthState, Credential, LoginResult, ReuseRejection, ReuseResult, ScopeMetadata, UserProfile,
    UserSession,
};
