use serde::{Deserialize, Deserializer, Serialize};

/// Errors raised when a digest or revision string is malformed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    /// The hex portion has the wrong number of characters.
    #[error("Invalid {kind}: expected {expected} hex characters, got {actual} in '{input}'")]
    Length {
        /// What was being parsed (`SHA256 digest`, `git revision`).
        kind: &'static str,
        /// Required length.
        expected: usize,
        /// Observed length.
        actual: usize,
        /// Offending input.
        input: String,
    },

    /// The input contains characters outside `[0-9a-fA-F]`.
    #[error("Invalid {kind}: contains non-hex characters in '{input}'")]
    NotHex {
        /// What was being parsed.
        kind: &'static str,
        /// Offending input.
        input: String,
    },
}

fn validate_hex(kind: &'static str, input: &str, hex: &str, len: usize) -> Result<(), HashError> {
    if hex.len() != len {
        return Err(HashError::Length {
            kind,
            expected: len,
            actual: hex.len(),
            input: input.to_string(),
        });
    }
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(HashError::NotHex {
            kind,
            input: input.to_string(),
        });
    }
    Ok(())
}

/// A validated SHA256 digest (64 hex characters)
///
/// This newtype ensures that every checksum in a recipe is validated at
/// deserialization time, so a typo in a recipe fails when the recipe is
/// loaded rather than after a multi-gigabyte download.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Sha256Digest(String);

impl Sha256Digest {
    /// Create a new `Sha256Digest`, validating the input.
    ///
    /// Accepts strings with or without a `sha256:` prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the hex portion is not exactly 64 ASCII hex characters.
    pub fn new(s: impl Into<String>) -> Result<Self, HashError> {
        let s = s.into();
        let hex = s.strip_prefix("sha256:").unwrap_or(&s);
        validate_hex("SHA256 digest", &s, hex, 64)?;
        Ok(Self(hex.to_lowercase()))
    }

    /// Get the digest as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison against a freshly computed hex digest.
    pub fn matches(&self, actual_hex: &str) -> bool {
        self.0.eq_ignore_ascii_case(actual_hex)
    }
}

impl<'de> Deserialize<'de> for Sha256Digest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Sha256Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for Sha256Digest {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// A full git commit id (40 hex characters) used to pin a resource.
///
/// Abbreviated ids are rejected: a pin must identify exactly one commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct GitRevision(String);

impl GitRevision {
    /// Create a validated revision.
    ///
    /// # Errors
    ///
    /// Returns an error unless the input is exactly 40 hex characters.
    pub fn new(s: impl Into<String>) -> Result<Self, HashError> {
        let s = s.into();
        validate_hex("git revision", &s, &s, 40)?;
        Ok(Self(s.to_lowercase()))
    }

    /// Get the revision as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for display (first 12 characters).
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl<'de> Deserialize<'de> for GitRevision {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for GitRevision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for GitRevision {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "b14a19965ef7cd0324e07001ad8699276e42c1a2d2ee42c3a08b09df70f1683e";

    #[test]
    fn sha256_accepts_prefix_and_normalises_case() {
        let upper = DIGEST.to_uppercase();
        let digest = Sha256Digest::new(format!("sha256:{upper}")).unwrap();
        assert_eq!(digest.as_str(), DIGEST);
        assert!(digest.matches(&upper));
    }

    #[test]
    fn sha256_rejects_short_and_non_hex() {
        assert!(matches!(
            Sha256Digest::new("abc123"),
            Err(HashError::Length { actual: 6, .. })
        ));
        let bad = "z".repeat(64);
        assert!(matches!(
            Sha256Digest::new(bad),
            Err(HashError::NotHex { .. })
        ));
    }

    #[test]
    fn git_revision_requires_full_sha() {
        let rev = GitRevision::new("f124a11ca3a40c87ab6aa4498037449584689be9").unwrap();
        assert_eq!(rev.short(), "f124a11ca3a4");
        assert!(GitRevision::new("f124a11").is_err());
        assert!(GitRevision::new("main").is_err());
    }
}
