//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the credential/sync core and
//! platform-specific implementations. Each trait represents a capability the
//! core requires but that is provided differently per host.
//!
//! ## Traits
//!
//! ### Networking & I/O
//! - [`HttpClient`](http::HttpClient) - Async HTTP transport
//! - [`FileSystemAccess`](storage::FileSystemAccess) - File I/O with atomic replace
//! - [`RemoteFileStore`](remote::RemoteFileStore) - Cloud object storage used by sync
//!
//! ### Authorization
//! - [`AuthorizationPrompt`](prompt::AuthorizationPrompt) - Interactive consent UI
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Platform
//! implementations should:
//!
//! - Convert platform-specific errors to `BridgeError`
//! - Distinguish timeouts, transport failures and permission errors
//! - Report absence as `Ok(None)` rather than an error where the trait allows it
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds to support safe concurrent usage
//! across async tasks.

pub mod error;
pub mod http;
pub mod prompt;
pub mod remote;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use prompt::{AuthorizationPrompt, AuthorizationRequest, AuthorizationResponse};
pub use remote::{NewRemoteFile, RemoteFileStore, RemoteStoreFactory};
pub use storage::{FileMetadata, FileSystemAccess};
pub use time::{Clock, ManualClock, SystemClock};
