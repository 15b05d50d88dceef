//! Secret detection and redaction utilities.
//!
//! DSNs carry credentials in their userinfo section; error metadata and log
//! lines must never echo them. These helpers keep the scrubbing logic in one
//! place.

/// Checks if a key/variable name likely refers to a secret.
///
/// Uses case-insensitive pattern matching to detect common secret-related
/// naming conventions.
pub fn is_secret_key(key: &str) -> bool {
    let key = key.to_ascii_uppercase();
    key.contains("KEY")
        || key.contains("TOKEN")
        || key.contains("SECRET")
        || key.contains("PASSWORD")
        || key.contains("PASSPHRASE")
        || key.contains("CREDENTIAL")
        || key.contains("AUTH")
}

/// Redacts a value if the key is likely a secret.
///
/// Returns `"[REDACTED]"` for secret keys, or the original value otherwise.
pub fn redact_if_secret(key: &str, value: &str) -> String {
    if is_secret_key(key) {
        REDACTED.to_string()
    } else {
        value.to_string()
    }
}

/// The redacted placeholder string.
pub const REDACTED: &str = "[REDACTED]";

/// A secret string wrapper that redacts on Display/Debug.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SecretString(Box<str>);

impl SecretString {
    /// Wrap a secret value.
    pub fn new(value: impl Into<Box<str>>) -> Self {
        Self(value.into())
    }

    /// Borrow the underlying secret.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Consume and return the underlying secret.
    #[must_use]
    pub fn into_inner(self) -> Box<str> {
        self.0
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(REDACTED)
    }
}

impl std::fmt::Display for SecretString {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(REDACTED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_keys_are_detected() {
        assert!(is_secret_key("password"));
        assert!(is_secret_key("privateKeyPassphrase"));
        assert!(is_secret_key("AWS_SECRET_ACCESS_KEY"));
        assert!(!is_secret_key("watchInterval"));
    }

    #[test]
    fn redact_if_secret_preserves_plain_values() {
        assert_eq!(redact_if_secret("password", "hunter2"), REDACTED);
        assert_eq!(redact_if_secret("bucket", "documents"), "documents");
    }

    #[test]
    fn secret_string_never_prints_its_value() {
        let secret = SecretString::new("hunter2");
        assert_eq!(format!("{secret}"), REDACTED);
        assert_eq!(format!("{secret:?}"), REDACTED);
        assert_eq!(secret.expose(), "hunter2");
    }
}
