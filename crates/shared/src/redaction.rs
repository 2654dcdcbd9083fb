//! Secret detection for log fields.
//!
//! Weather provider credentials travel as query parameters (`appid`, `apiKey`,
//! station passwords), so any structured field whose key looks like one is
//! replaced before it reaches a sink.

/// The redacted placeholder string.
pub const REDACTED: &str = "[REDACTED]";

/// Checks if a key/variable name likely refers to a secret.
///
/// # Examples
///
/// ```
/// use stratus_shared::is_secret_key;
///
/// assert!(is_secret_key("apiKey"));
/// assert!(is_secret_key("APPID"));
/// assert!(is_secret_key("station_password"));
/// assert!(!is_secret_key("service"));
/// ```
pub fn is_secret_key(key: &str) -> bool {
    let key = key.to_ascii_uppercase();
    key.contains("KEY")
        || key.contains("TOKEN")
        || key.contains("SECRET")
        || key.contains("PASSWORD")
        || key.contains("APPID")
        || key.contains("AUTH")
}
