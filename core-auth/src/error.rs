use bridge_traits::BridgeError;
use core_runtime::Interrupted;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("No stored credential")]
    CredentialMissing,

    #[error("Credential expired and cannot be refreshed: {0}")]
    CredentialExpiredUnrefreshable(String),

    #[error("Scope mismatch: required {required:?}, granted {granted:?}")]
    ScopeMismatch {
        required: Vec<String>,
        granted: Vec<String>,
    },

    #[error("Network timeout: {0}")]
    NetworkTimeout(String),

    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("Access denied or quota exceeded: {0}")]
    RemoteQuotaOrPermission(String),

    #[error("Local storage failure: {0}")]
    LocalIoFailure(String),

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("OAuth state mismatch (expected {expected}, got {actual})")]
    StateMismatch { expected: String, actual: String },

    #[error("Authorization was cancelled by the user")]
    AuthorizationCancelled,

    #[error("Authorization failed: {0}")]
    AuthorizationFailed(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AuthError {
    /// Errors that a fresh consent with the right scopes could fix.
    pub fn is_scope_or_permission(&self) -> bool {
        matches!(
            self,
            AuthError::ScopeMismatch { .. } | AuthError::RemoteQuotaOrPermission(_)
        )
    }

    /// Whether retrying the same operation later could succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AuthError::NetworkTimeout(_) | AuthError::NetworkFailure(_) | AuthError::Cancelled
        )
    }
}

impl From<BridgeError> for AuthError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Timeout(msg) => AuthError::NetworkTimeout(msg),
            BridgeError::Network(msg) => AuthError::NetworkFailure(msg),
            BridgeError::PermissionDenied(msg) => AuthError::RemoteQuotaOrPermission(msg),
            BridgeError::Cancelled => AuthError::Cancelled,
            BridgeError::Io(e) => AuthError::LocalIoFailure(e.to_string()),
            BridgeError::NotFound(msg) => AuthError::NetworkFailure(format!("not found: {}", msg)),
            BridgeError::NotAvailable(msg) | BridgeError::OperationFailed(msg) => {
                AuthError::NetworkFailure(msg)
            }
        }
    }
}

impl From<Interrupted> for AuthError {
    fn from(err: Interrupted) -> Self {
        match err {
            Interrupted::Cancelled => AuthError::Cancelled,
            Interrupted::TimedOut(limit) => {
                AuthError::NetworkTimeout(format!("no response within {:?}", limit))
            }
        }
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        AuthError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
