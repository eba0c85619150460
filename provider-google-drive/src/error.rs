//! Error types for Google Drive provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Google Drive provider errors
#[derive(Error, Debug)]
pub enum GoogleDriveError {
    /// Access token rejected (HTTP 401)
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Missing scope, file permission or storage quota (HTTP 403)
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// API request returned an error
    #[error("Google Drive API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Rate limit still exceeded after retrying
    #[error("Rate limit exceeded after {attempts} attempts")]
    RateLimitExceeded { attempts: u32 },

    /// File not found
    #[error("File not found: {file_id}")]
    FileNotFound { file_id: String },

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Bridge error
    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for Google Drive operations
pub type Result<T> = std::result::Result<T, GoogleDriveError>;

/// `error.errors[].reason` values Drive sends with a 403 when throttling.
const RATE_LIMIT_REASONS: &[&str] = &["rateLimitExceeded", "userRateLimitExceeded"];

impl GoogleDriveError {
    /// Classify a non-success response.
    pub fn from_status(status: u16, body: &[u8]) -> Self {
        if is_rate_limited(status, body) {
            return GoogleDriveError::RateLimitExceeded { attempts: 1 };
        }
        let message = api_message(body);
        match status {
            401 => GoogleDriveError::AuthenticationFailed(message),
            403 => GoogleDriveError::AccessDenied(message),
            _ => GoogleDriveError::ApiError {
                status_code: status,
                message,
            },
        }
    }
}

/// HTTP 429, or a 403 whose first error reason is a rate limit.
pub fn is_rate_limited(status: u16, body: &[u8]) -> bool {
    match status {
        429 => true,
        403 => serde_json::from_slice::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v["error"]["errors"][0]["reason"].as_str().map(str::to_string))
            .is_some_and(|reason| RATE_LIMIT_REASONS.contains(&reason.as_str())),
        _ => false,
    }
}

/// Pull `error.message` out of a Drive error body, falling back to the raw text.
fn api_message(body: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned())
}

impl From<GoogleDriveError> for BridgeError {
    fn from(error: GoogleDriveError) -> Self {
        match error {
            GoogleDriveError::AuthenticationFailed(msg) => {
                BridgeError::OperationFailed(format!("Authentication failed: {}", msg))
            }
            GoogleDriveError::AccessDenied(msg) => BridgeError::PermissionDenied(msg),
            GoogleDriveError::ApiError {
                status_code,
                message,
            } if status_code >= 500 => {
                BridgeError::Network(format!("API error (status {}): {}", status_code, message))
            }
            GoogleDriveError::ApiError {
                status_code,
                message,
            } => BridgeError::OperationFailed(format!(
                "API error (status {}): {}",
                status_code, message
            )),
            GoogleDriveError::RateLimitExceeded { attempts } => BridgeError::Network(format!(
                "Rate limit exceeded after {} attempts",
                attempts
            )),
            GoogleDriveError::FileNotFound { file_id } => BridgeError::NotFound(file_id),
            GoogleDriveError::ParseError(msg) => {
                BridgeError::OperationFailed(format!("Parse error: {}", msg))
            }
            GoogleDriveError::BridgeError(e) => e,
        }
    }
}
