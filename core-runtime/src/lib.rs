//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the auth and sync layers:
//! - Logging and tracing initialization
//! - Configuration and bridge injection
//! - Event bus for login-state and sync notifications
//! - Cancellation and deadline guards for network-bound work

pub mod cancel;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use cancel::{guard, Interrupted};
pub use config::{CoreConfig, OAuthSettings, Timeouts, TokenPolicy};
pub use error::{Error, Result};
pub use tokio_util::sync::CancellationToken;
