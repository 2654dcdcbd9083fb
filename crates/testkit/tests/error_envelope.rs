//! Integration tests for shared error propagation.

use stratus_shared::{ErrorClass, ErrorCode, ErrorEnvelope, UnexpectedError, normalize_unexpected_error};
use stratus_testkit::errors::{cancelled_error, fatal_job_error, timeout_error};

#[test]
fn error_envelope_crosses_crates() {
    let timeout = timeout_error();
    assert_eq!(timeout.code, ErrorCode::timeout());
    assert!(timeout.class.is_retriable());

    let boxed: Box<dyn std::error::Error> = Box::new(timeout);
    assert!(boxed.to_string().contains("timeout"));

    assert!(cancelled_error().is_cancelled());
    assert_eq!(fatal_job_error().class, ErrorClass::NonRetriable);
}

#[test]
fn normalize_unexpected_error_is_available() {
    let envelope = normalize_unexpected_error(UnexpectedError::message("boom"));
    assert_eq!(envelope.code, ErrorCode::internal());

    let io_error = std::io::Error::new(std::io::ErrorKind::TimedOut, "timeout");
    let envelope = normalize_unexpected_error(UnexpectedError::error(io_error));
    assert_eq!(envelope.code, ErrorCode::timeout());
}

#[test]
fn metadata_is_attached() {
    let envelope = ErrorEnvelope::expected(ErrorCode::job("unknown_kind"), "no such job")
        .with_metadata("kind", "owm-fetch");
    assert_eq!(envelope.metadata.get("kind").map(String::as_str), Some("owm-fetch"));
}
