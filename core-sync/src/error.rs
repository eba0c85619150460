use bridge_traits::BridgeError;
use core_auth::AuthError;
use core_runtime::Interrupted;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Sync engine has no remote store attached")]
    NotAttached,

    #[error("Remote store timed out: {0}")]
    NetworkTimeout(String),

    #[error("Remote store unreachable: {0}")]
    NetworkFailure(String),

    #[error("Remote store denied access: {0}")]
    PermissionDenied(String),

    #[error("Local storage failure: {0}")]
    LocalIo(String),

    #[error("Malformed document {file}: {message}")]
    Serialization { file: String, message: String },

    #[error("Sync cancelled")]
    Cancelled,
}

impl SyncError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, SyncError::PermissionDenied(_))
    }

    /// Classify a failure of the local file system.
    pub fn local(err: BridgeError) -> Self {
        match err {
            BridgeError::Cancelled => SyncError::Cancelled,
            other => SyncError::LocalIo(other.to_string()),
        }
    }
}

impl From<BridgeError> for SyncError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Timeout(msg) => SyncError::NetworkTimeout(msg),
            BridgeError::Network(msg) => SyncError::NetworkFailure(msg),
            BridgeError::PermissionDenied(msg) => SyncError::PermissionDenied(msg),
            BridgeError::Cancelled => SyncError::Cancelled,
            BridgeError::Io(e) => SyncError::LocalIo(e.to_string()),
            BridgeError::NotFound(msg) => SyncError::NetworkFailure(format!("not found: {}", msg)),
            BridgeError::NotAvailable(msg) | BridgeError::OperationFailed(msg) => {
                SyncError::NetworkFailure(msg)
            }
        }
    }
}

impl From<Interrupted> for SyncError {
    fn from(err: Interrupted) -> Self {
        match err {
            Interrupted::Cancelled => SyncError::Cancelled,
            Interrupted::TimedOut(limit) => {
                SyncError::NetworkTimeout(format!("no response within {:?}", limit))
            }
        }
    }
}

/// Sync failures seen by the login flow.
impl From<SyncError> for AuthError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::NotAttached => AuthError::CredentialMissing,
            SyncError::NetworkTimeout(msg) => AuthError::NetworkTimeout(msg),
            SyncError::NetworkFailure(msg) => AuthError::NetworkFailure(msg),
            SyncError::PermissionDenied(msg) => AuthError::RemoteQuotaOrPermission(msg),
            SyncError::LocalIo(msg) => AuthError::LocalIoFailure(msg),
            SyncError::Serialization { file, message } => {
                AuthError::Serialization(format!("{}: {}", file, message))
            }
            SyncError::Cancelled => AuthError::Cancelled,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_reaches_auth_as_scope_error() {
        let auth: AuthError = SyncError::from(BridgeError::PermissionDenied("403".into())).into();
        assert!(auth.is_scope_or_permission());
    }

    #[test]
    fn test_cancellation_is_preserved() {
        assert!(matches!(
            SyncError::from(Interrupted::Cancelled),
            SyncError::Cancelled
        ));
        assert!(matches!(
            AuthError::from(SyncError::Cancelled),
            AuthError::Cancelled
        ));
    }

    #[test]
    fn test_local_not_found_is_io() {
        let err = SyncError::local(BridgeError::NotFound("tags.json".into()));
        assert!(matches!(err, SyncError::LocalIo(_)));
    }

    #[test]
    fn test_io_error_is_local() {
        let err = SyncError::from(BridgeError::Io(std::io::Error::other("disk full")));
        assert!(matches!(err, SyncError::LocalIo(_)));
        assert!(!err.is_permission_denied());
    }
}
