//! Credential wrappers.
//!
//! Store tokens travel from a credentials source into request headers; they
//! must never reach logs and are zeroed once dropped.

use std::fmt;

use serde::{Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Credential text that prints and serializes as `[REDACTED]`.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Credential bytes as read from a file, env var or secret key.
    ///
    /// Surrounding whitespace is dropped. `None` for empty or non-UTF-8 input.
    pub fn from_credential_bytes(bytes: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(bytes).ok()?.trim();
        (!text.is_empty()).then(|| Self::new(text))
    }

    /// The raw credential. Only for request headers.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for SecretString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[REDACTED]")
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString([REDACTED])")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_never_printed() {
        let token = SecretString::new("s.vault-token");
        assert_eq!(format!("{:?}", token), "SecretString([REDACTED])");
        assert_eq!(token.to_string(), "[REDACTED]");
        assert_eq!(serde_json::to_string(&token).unwrap(), "\"[REDACTED]\"");
        assert_eq!(token.expose_secret(), "s.vault-token");
    }

    #[test]
    fn test_from_credential_bytes_trims() {
        let token = SecretString::from_credential_bytes(b"s.abc\n").unwrap();
        assert_eq!(token.expose_secret(), "s.abc");
        assert!(SecretString::from_credential_bytes(b"  \n").is_none());
        assert!(SecretString::from_credential_bytes(&[0xff, 0xfe]).is_none());
    }
}
