//! Depot File Storage
//!
//! This crate provides the content-addressed object store behind Depot.
//!
//! ## Design Principles
//!
//! - Objects are addressed by a cryptographic digest of their bytes
//! - Objects are immutable once written (new content creates a new object)
//! - Writing identical content twice is a no-op that returns the same fingerprint
//! - Readers never observe a partially written object
//! - Caller-supplied paths never escape the storage root
//!
//! ## Storage Layout
//!
//! With per-owner namespacing (the default):
//!
//! ```text
//! <storage_root>/
//! ├── .staging/              # in-flight writes, renamed into place when complete
//! └── owners/
//!     └── <owner_id>/
//!         └── v<version>/
//!             └── sha256/
//!                 └── ab/
//!                     └── cd/
//!                         └── abcd3f9e…
//! ```
//!
//! With global namespacing the `owners/<owner_id>/v<version>/` prefix is dropped and identical
//! content is stored once for all owners.
//!
//! ## Example Usage
//!
//! ```no_run
//! use depot_files::{ContentStore, OwnerId, StoreConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = ContentStore::open(&StoreConfig::new("Files".into())).await?;
//! let owner = OwnerId::parse("alice")?;
//!
//! let fingerprint = store.put(b"hello", &owner, 1).await?;
//! let bytes = store.get_by_fingerprint(&owner, &fingerprint, 1).await?;
//! assert_eq!(bytes, b"hello");
//! # Ok(())
//! # }
//! ```

mod config;
mod constants;
mod files;
mod fingerprint;
mod paths;

use std::time::Duration;

pub use config::{
    flag_from_env_value, hash_algorithm_from_env_value, namespacing_from_env_value,
    timeout_from_env_value, Namespacing, StoreConfig,
};
pub use constants::{DEFAULT_STORAGE_ROOT, STALE_STAGING_AGE};
pub use depot_types::{NonEmptyText, OwnerId, TextError};
pub use files::{ContentStore, ObjectMetadata};
pub use fingerprint::{Fingerprint, HashAlgorithm};

/// Errors that can occur during content store operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// Storage root does not exist, is not a directory, or cannot be created
    #[error("Invalid root directory: {0}")]
    InvalidRootDirectory(String),

    /// A configuration value could not be parsed
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No object or file exists at the requested location
    #[error("Not found: {0}")]
    NotFound(String),

    /// Path traversal attempt or malformed identifier
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Computed digest disagrees with the expected fingerprint
    #[error("Hash mismatch: expected {expected}, computed {actual}")]
    HashMismatch { expected: String, actual: String },

    /// The operation did not complete within its time bound
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FilesError {
    /// Returns true when retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FilesError::Timeout(_) => true,
            FilesError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

/// Result type for content store operations.
pub type FilesResult<T> = Result<T, FilesError>;
