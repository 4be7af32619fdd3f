//! Store configuration.
//!
//! Configuration is resolved once at process startup and passed into [`crate::ContentStore::open`].
//! The `*_from_env_value` helpers parse raw environment values without reading the environment
//! themselves, so binaries decide where values come from and tests stay hermetic.

use crate::constants::DEFAULT_STORAGE_ROOT;
use crate::{FilesError, FilesResult, HashAlgorithm};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// How stored objects are grouped on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Namespacing {
    /// `owners/<owner>/v<version>/<algo>/..`: each owner and version is isolated.
    #[default]
    PerOwner,
    /// `<algo>/..`: one copy of any content regardless of owner or version.
    Global,
}

impl FromStr for Namespacing {
    type Err = FilesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per-owner" | "per_owner" | "owner" => Ok(Namespacing::PerOwner),
            "global" => Ok(Namespacing::Global),
            other => Err(FilesError::InvalidConfig(format!(
                "unsupported namespacing '{}' (expected per-owner or global)",
                other
            ))),
        }
    }
}

/// Content store configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    storage_root: PathBuf,
    hash_algorithm: HashAlgorithm,
    namespacing: Namespacing,
    verify_on_read: bool,
    operation_timeout: Option<Duration>,
    create_root: bool,
}

impl StoreConfig {
    /// Create a config for `storage_root` with SHA-256, per-owner namespacing, no read
    /// verification, no timeout, and root creation enabled.
    pub fn new(storage_root: PathBuf) -> Self {
        Self {
            storage_root,
            hash_algorithm: HashAlgorithm::default(),
            namespacing: Namespacing::default(),
            verify_on_read: false,
            operation_timeout: None,
            create_root: true,
        }
    }

    pub fn with_hash_algorithm(mut self, hash_algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = hash_algorithm;
        self
    }

    pub fn with_namespacing(mut self, namespacing: Namespacing) -> Self {
        self.namespacing = namespacing;
        self
    }

    pub fn with_verify_on_read(mut self, verify_on_read: bool) -> Self {
        self.verify_on_read = verify_on_read;
        self
    }

    pub fn with_operation_timeout(mut self, operation_timeout: Option<Duration>) -> Self {
        self.operation_timeout = operation_timeout;
        self
    }

    /// When false, [`crate::ContentStore::open`] fails if the storage root is missing.
    pub fn with_create_root(mut self, create_root: bool) -> Self {
        self.create_root = create_root;
        self
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    pub fn namespacing(&self) -> Namespacing {
        self.namespacing
    }

    pub fn verify_on_read(&self) -> bool {
        self.verify_on_read
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout
    }

    pub fn create_root(&self) -> bool {
        self.create_root
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(PathBuf::from(DEFAULT_STORAGE_ROOT))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse the hash algorithm from an optional string value; `None` or blank means SHA-256.
pub fn hash_algorithm_from_env_value(value: Option<String>) -> FilesResult<HashAlgorithm> {
    Ok(non_blank(value)
        .map(|v| v.parse::<HashAlgorithm>())
        .transpose()?
        .unwrap_or_default())
}

/// Parse the namespacing mode from an optional string value; `None` or blank means per-owner.
pub fn namespacing_from_env_value(value: Option<String>) -> FilesResult<Namespacing> {
    Ok(non_blank(value)
        .map(|v| v.parse::<Namespacing>())
        .transpose()?
        .unwrap_or_default())
}

/// Parse an operation timeout in milliseconds. `None`, blank or `0` disables the timeout.
pub fn timeout_from_env_value(value: Option<String>) -> FilesResult<Option<Duration>> {
    let Some(value) = non_blank(value) else {
        return Ok(None);
    };

    let millis = value.parse::<u64>().map_err(|e| {
        FilesError::InvalidConfig(format!("invalid timeout '{}' (milliseconds): {}", value, e))
    })?;

    Ok((millis > 0).then(|| Duration::from_millis(millis)))
}

/// Parse a boolean flag; `None` or blank means false.
pub fn flag_from_env_value(value: Option<String>) -> FilesResult<bool> {
    match non_blank(value).map(|v| v.to_ascii_lowercase()).as_deref() {
        None | Some("0") | Some("false") | Some("no") | Some("off") => Ok(false),
        Some("1") | Some("true") | Some("yes") | Some("on") => Ok(true),
        Some(other) => Err(FilesError::InvalidConfig(format!(
            "invalid boolean '{}'",
            other
        ))),
    }
}
