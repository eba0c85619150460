//! Integration tests for logging initialization
//!
//! The global subscriber can only be installed once per process, so the whole
//! lifecycle lives in a single test.

use core_runtime::logging::{init_logging, redact_if_sensitive, LogFormat, LogLevel, LoggingConfig};
use core_runtime::Error;

#[test]
fn test_logging_initializes_once() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_filter("core_runtime=debug");

    init_logging(config.clone()).expect("first initialization succeeds");
    tracing::info!(file = "vocabulary.json", "logging ready");

    let second = init_logging(config);
    assert!(matches!(second, Err(Error::Config(_))));
}

#[test]
fn test_token_fields_never_leak() {
    for field in ["access_token", "refresh_token", "Authorization", "code_verifier"] {
        assert_eq!(redact_if_sensitive(field, "value"), "[REDACTED]");
    }
}
