//! IO modules - side effects (network, filesystem, git)

pub mod download;
pub mod extract;
pub mod git;

use thiserror::Error;

/// A fetched artifact did not match its declared identity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("Checksum mismatch for {url}: expected {expected}, got {actual}")]
    Checksum {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("Revision mismatch for {url}: expected {expected}, checked out {actual}")]
    Revision {
        url: String,
        expected: String,
        actual: String,
    },
}
