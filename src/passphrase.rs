//! Passphrase normalization and validation
//!
//! A passphrase is a shared `verb-noun` secret two players use to find each
//! other. It is only ever used as a lookup key and never parsed further.

use crate::error::{RelayError, INVALID_PASSPHRASE_FORMAT, PASSPHRASE_REQUIRED};
use sha2::{Digest, Sha256};
use std::fmt;

/// Character splitting the two halves of a passphrase
pub const SEPARATOR: char = '-';

/// Length of the hex fingerprint used in logs
const FINGERPRINT_LEN: usize = 8;

/// Trim surrounding whitespace and lowercase.
pub fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// A normalized, shape-checked passphrase
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Passphrase(String);

impl Passphrase {
    /// Normalize `raw` and require exactly two non-empty parts around a
    /// single separator.
    pub fn parse(raw: &str) -> Result<Self, RelayError> {
        let normalized = normalize(raw);

        if normalized.is_empty() {
            return Err(RelayError::InvalidPassphrase {
                reason: PASSPHRASE_REQUIRED.to_string(),
            });
        }

        let mut parts = normalized.split(SEPARATOR);
        let well_formed = match (parts.next(), parts.next(), parts.next()) {
            (Some(verb), Some(noun), None) => !verb.is_empty() && !noun.is_empty(),
            _ => false,
        };

        if !well_formed {
            return Err(RelayError::InvalidPassphrase {
                reason: INVALID_PASSPHRASE_FORMAT.to_string(),
            });
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short SHA-256 prefix so logs can correlate lobbies without
    /// recording the shared secret.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        let mut encoded = hex::encode(digest);
        encoded.truncate(FINGERPRINT_LEN);
        encoded
    }
}

// Debug output goes to logs; keep the secret out of it.
impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Passphrase").field(&self.fingerprint()).finish()
    }
}

impl fmt::Display for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fingerprint())
    }
}

impl AsRef<str> for Passphrase {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
