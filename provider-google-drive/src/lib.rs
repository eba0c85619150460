//! # Google Drive Provider
//!
//! Implements `RemoteFileStore` for Google Drive API v3.
//!
//! ## Overview
//!
//! This module provides:
//! - Exact-name file lookup inside the app folder
//! - Multipart file creation and in-place content updates
//! - Folder get-or-create at the top level of the drive
//! - Rate limiting and exponential backoff

pub mod connector;
pub mod error;
pub mod types;

pub use connector::{GoogleDriveConnector, GoogleDriveConnectorFactory};
pub use error::{GoogleDriveError, Result};
