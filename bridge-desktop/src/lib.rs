//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest` (rustls)
//! - `FileSystemAccess` using `tokio::fs`
//! - `AuthorizationPrompt` using an `axum` loopback server and the system browser
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{LoopbackAuthorizationPrompt, ReqwestHttpClient, TokioFileSystem};
//!
//! #[tokio::main]
//! async fn main() {
//!     let http_client = ReqwestHttpClient::new();
//!     let fs = TokioFileSystem::new();
//!     let prompt = LoopbackAuthorizationPrompt::new();
//!
//!     // Hand these to `CoreConfig::builder()`
//! }
//! ```

mod filesystem;
mod http;
mod loopback;

pub use filesystem::TokioFileSystem;
pub use http::{ConnectRetryPolicy, ReqwestHttpClient};
pub use loopback::LoopbackAuthorizationPrompt;
