//! Content-addressed object store implementation
//!
//! This module provides [`ContentStore`], the only component in Depot that owns I/O. It
//! persists byte payloads under a path derived from their digest and reads them back either
//! by fingerprint or by an explicit path under the storage root.
//!
//! # Writes
//!
//! Every write goes to a uniquely named file in the staging directory, is flushed to disk,
//! and is then renamed onto its final path. The staging directory lives inside the storage
//! root so the rename never crosses a filesystem. Consequences:
//!
//! - A reader sees either no object or the complete object, never a prefix of it
//! - Concurrent writers of identical content each rename identical bytes onto the same path,
//!   leaving a single well-formed object
//! - Writers of different content never share a path
//!
//! A write that is cancelled (for example by a timeout) removes its staging file on drop. A
//! staging file orphaned by a crashed process is removed by the next [`ContentStore::open`]
//! once it is older than [`STALE_STAGING_AGE`].
//!
//! # Reads
//!
//! All file I/O is awaited through `tokio::fs`. Nothing in a read or write path blocks on a
//! pending asynchronous result.

use crate::constants::{
    INLINE_DIGEST_LIMIT, MEDIA_SNIFF_LEN, OWNERS_DIR_NAME, STAGING_DIR_NAME,
    STAGING_FILE_EXTENSION, STALE_STAGING_AGE,
};
use crate::{
    paths, FilesError, FilesResult, Fingerprint, HashAlgorithm, Namespacing, StoreConfig,
};
use chrono::{DateTime, Utc};
use depot_types::{NonEmptyText, OwnerId};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

/// Metadata for a stored object
///
/// Derived from the stored file on demand; it is never persisted separately.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Hashing algorithm used
    pub hash_algorithm: HashAlgorithm,

    /// Hexadecimal digest of the object content
    pub fingerprint: Fingerprint,

    /// Path relative to the storage root, suitable for [`ContentStore::get_by_path`]
    pub relative_path: NonEmptyText,

    /// Size of the object in bytes
    pub size_bytes: u64,

    /// Detected media type (MIME type), if available
    ///
    /// This is a best-effort detection from the leading bytes and should not be considered
    /// authoritative.
    pub media_type: Option<NonEmptyText>,

    /// UTC timestamp of the stored file's last modification, i.e. when it was renamed into place
    pub stored_at: DateTime<Utc>,
}

/// Handle to an opened content store
///
/// Cheap to clone; clones share nothing but the directory on disk.
#[derive(Debug, Clone)]
pub struct ContentStore {
    /// Canonicalised storage root
    root: PathBuf,
    algorithm: HashAlgorithm,
    namespacing: Namespacing,
    verify_on_read: bool,
    timeout: Option<Duration>,
}

impl ContentStore {
    /// Opens the store described by `config`
    ///
    /// This is the store's explicit initialisation step. It creates the storage root if the
    /// config allows it, canonicalises it, creates the staging directory and removes staging
    /// files older than [`STALE_STAGING_AGE`].
    ///
    /// # Errors
    ///
    /// Returns `FilesError` if:
    /// - The root does not exist and may not be created, or cannot be created
    /// - The root exists but is not a directory
    /// - The staging directory cannot be created or swept (I/O)
    pub async fn open(config: &StoreConfig) -> FilesResult<Self> {
        let root = config.storage_root();

        if config.create_root() {
            fs::create_dir_all(root).await.map_err(|e| {
                FilesError::InvalidRootDirectory(format!(
                    "Cannot create directory {}: {}",
                    root.display(),
                    e
                ))
            })?;
        }

        let metadata = match fs::metadata(root).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(FilesError::InvalidRootDirectory(format!(
                    "Directory does not exist: {}",
                    root.display()
                )))
            }
            Err(e) => return Err(io_context(e, format!("Cannot inspect {}", root.display()))),
        };

        if !metadata.is_dir() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Path is not a directory: {}",
                root.display()
            )));
        }

        let root = fs::canonicalize(root).await.map_err(|e| {
            FilesError::InvalidRootDirectory(format!(
                "Cannot canonicalize path {}: {}",
                root.display(),
                e
            ))
        })?;

        let store = Self {
            root,
            algorithm: config.hash_algorithm(),
            namespacing: config.namespacing(),
            verify_on_read: config.verify_on_read(),
            timeout: config.operation_timeout(),
        };

        let staging = store.staging_directory();
        fs::create_dir_all(&staging).await.map_err(|e| {
            io_context(
                e,
                format!("Failed to create staging directory {}", staging.display()),
            )
        })?;

        let removed = store.sweep_staging(STALE_STAGING_AGE).await?;
        if removed > 0 {
            tracing::warn!(removed, "removed abandoned staging files");
        }

        tracing::info!(
            root = %store.root.display(),
            algorithm = %store.algorithm,
            namespacing = ?store.namespacing,
            "content store opened"
        );

        Ok(store)
    }

    /// Returns a handle whose operations are each bounded by `timeout`.
    ///
    /// An operation that runs past its bound fails with [`FilesError::Timeout`], which is
    /// retryable. A write cut short this way leaves no object and no staging file behind.
    ///
    /// Large payloads are hashed on the blocking pool, so the bound also covers hashing. The
    /// hashing itself still runs to completion in the background after a timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn root_directory(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    #[must_use]
    pub fn namespacing(&self) -> Namespacing {
        self.namespacing
    }

    /// Parses an externally supplied fingerprint and checks it matches this store's algorithm.
    pub fn parse_fingerprint(&self, input: &str) -> FilesResult<Fingerprint> {
        let fingerprint = Fingerprint::parse(input)?;
        self.check_algorithm(&fingerprint)?;
        Ok(fingerprint)
    }

    /// Stores `content` for `owner` at `version` and returns its fingerprint
    ///
    /// Idempotent: if the object already exists it is not rewritten and the same fingerprint
    /// is returned.
    ///
    /// # Errors
    ///
    /// Returns `FilesError` if:
    /// - Directory creation, the staged write or the rename fails (I/O)
    /// - The operation exceeds the handle's timeout
    pub async fn put(
        &self,
        content: &[u8],
        owner: &OwnerId,
        version: u32,
    ) -> FilesResult<Fingerprint> {
        self.bounded(self.write_object(content, owner, version, None))
            .await
    }

    /// Stores `content` only if its digest equals `expected`
    ///
    /// # Errors
    ///
    /// As [`Self::put`], plus [`FilesError::HashMismatch`] when the computed digest differs from
    /// `expected`. Nothing is written in that case.
    pub async fn put_verified(
        &self,
        content: &[u8],
        owner: &OwnerId,
        version: u32,
        expected: &Fingerprint,
    ) -> FilesResult<Fingerprint> {
        self.bounded(self.write_object(content, owner, version, Some(expected)))
            .await
    }

    /// Reads the object addressed by `(owner, fingerprint, version)`
    ///
    /// # Errors
    ///
    /// Returns `FilesError` if:
    /// - The fingerprint was produced by a different algorithm than this store's
    /// - No such object exists (`NotFound`)
    /// - Read verification is enabled and the stored bytes no longer match (`HashMismatch`)
    /// - The file cannot be read (I/O)
    pub async fn get_by_fingerprint(
        &self,
        owner: &OwnerId,
        fingerprint: &Fingerprint,
        version: u32,
    ) -> FilesResult<Vec<u8>> {
        self.check_algorithm(fingerprint)?;
        let relative = self.relative_path(owner, fingerprint, version);

        self.bounded(async {
            let content = read_file(&self.root.join(&relative), &relative).await?;

            if self.verify_on_read {
                let actual = digest(self.algorithm, &content).await?;
                if &actual != fingerprint {
                    tracing::warn!(
                        expected = %fingerprint,
                        actual = %actual,
                        path = %relative.display(),
                        "stored object failed verification"
                    );
                    return Err(FilesError::HashMismatch {
                        expected: fingerprint.to_string(),
                        actual: actual.to_string(),
                    });
                }
            }

            Ok(content)
        })
        .await
    }

    /// Reads the file at `path`, which must lie under the storage root
    ///
    /// `path` is normally relative to the root (as returned by [`Self::relative_path`]); an
    /// absolute path is accepted when it points inside the root.
    ///
    /// # Errors
    ///
    /// Returns `FilesError` if:
    /// - The path uses `..`, names the staging area, or resolves outside the root through a
    ///   symlink (`InvalidPath`)
    /// - The path names a directory (`InvalidPath`)
    /// - Nothing exists at the path (`NotFound`)
    /// - The file cannot be read (I/O)
    pub async fn get_by_path(&self, path: impl AsRef<Path>) -> FilesResult<Vec<u8>> {
        let relative = paths::confine(&self.root, path.as_ref())?;

        self.bounded(async {
            let resolved = match fs::canonicalize(self.root.join(&relative)).await {
                Ok(resolved) => resolved,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(FilesError::NotFound(relative.display().to_string()))
                }
                Err(e) => {
                    return Err(io_context(
                        e,
                        format!("Failed to resolve {}", relative.display()),
                    ))
                }
            };

            if !resolved.starts_with(&self.root) || resolved.starts_with(self.staging_directory())
            {
                tracing::warn!(
                    requested = %relative.display(),
                    "rejected path resolving outside the readable storage area"
                );
                return Err(FilesError::InvalidPath(format!(
                    "{} resolves outside the storage root",
                    relative.display()
                )));
            }

            let metadata = fs::metadata(&resolved)
                .await
                .map_err(|e| not_found_or_io(e, &relative))?;
            if !metadata.is_file() {
                return Err(FilesError::InvalidPath(format!(
                    "{} is not a file",
                    relative.display()
                )));
            }

            read_file(&resolved, &relative).await
        })
        .await
    }

    /// Returns true if the object addressed by `(owner, fingerprint, version)` exists.
    pub async fn contains(
        &self,
        owner: &OwnerId,
        fingerprint: &Fingerprint,
        version: u32,
    ) -> FilesResult<bool> {
        self.check_algorithm(fingerprint)?;
        let path = self.object_path(owner, fingerprint, version);

        self.bounded(async {
            fs::try_exists(&path)
                .await
                .map_err(|e| io_context(e, format!("Failed to inspect {}", path.display())))
        })
        .await
    }

    /// Describes the object addressed by `(owner, fingerprint, version)`
    ///
    /// # Errors
    ///
    /// Returns `FilesError` if the object does not exist (`NotFound`) or cannot be inspected.
    pub async fn stat(
        &self,
        owner: &OwnerId,
        fingerprint: &Fingerprint,
        version: u32,
    ) -> FilesResult<ObjectMetadata> {
        self.check_algorithm(fingerprint)?;
        let relative = self.relative_path(owner, fingerprint, version);
        let path = self.root.join(&relative);

        self.bounded(async {
            let metadata = fs::metadata(&path)
                .await
                .map_err(|e| not_found_or_io(e, &relative))?;
            let modified = metadata
                .modified()
                .map_err(|e| io_context(e, format!("No modification time for {}", relative.display())))?;

            Ok(ObjectMetadata {
                hash_algorithm: fingerprint.algorithm(),
                fingerprint: fingerprint.clone(),
                relative_path: relative_text(&relative)?,
                size_bytes: metadata.len(),
                media_type: sniff_media_type(&path, &relative).await?,
                stored_at: DateTime::<Utc>::from(modified),
            })
        })
        .await
    }

    /// Computes the path, relative to the storage root, at which an object is stored
    ///
    /// # Returns
    ///
    /// - Per-owner: `owners/<owner>/v<version>/<algo>/<shard1>/<shard2>/<fingerprint>`
    /// - Global: `<algo>/<shard1>/<shard2>/<fingerprint>`
    ///
    /// Example: SHA-256 fingerprint `abcdef12…` for owner `alice` at version 3 is stored at
    /// `owners/alice/v3/sha256/ab/cd/abcdef12…`
    #[must_use]
    pub fn relative_path(&self, owner: &OwnerId, fingerprint: &Fingerprint, version: u32) -> PathBuf {
        let (shard1, shard2) = fingerprint.shards();
        let object = PathBuf::from(fingerprint.algorithm().name())
            .join(shard1)
            .join(shard2)
            .join(fingerprint.as_str());

        match self.namespacing {
            Namespacing::PerOwner => PathBuf::from(OWNERS_DIR_NAME)
                .join(owner.as_str())
                .join(format!("v{}", version))
                .join(object),
            Namespacing::Global => object,
        }
    }

    /// Removes staging files at least `older_than` old and returns how many were removed.
    ///
    /// Staging files belonging to writes still in progress are younger than any sensible
    /// threshold, so this is safe to run while the store is in use.
    pub async fn sweep_staging(&self, older_than: Duration) -> FilesResult<usize> {
        let staging = self.staging_directory();
        let mut entries = match fs::read_dir(&staging).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(io_context(
                    e,
                    format!("Failed to list staging directory {}", staging.display()),
                ))
            }
        };

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_context(e, "Failed to list staging directory"))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(STAGING_FILE_EXTENSION) {
                continue;
            }

            let stale = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => modified
                    .elapsed()
                    .map(|age| age >= older_than)
                    .unwrap_or(false),
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(io_context(e, format!("Failed to inspect {}", path.display()))),
            };

            if stale {
                match fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => {
                        return Err(io_context(e, format!("Failed to remove {}", path.display())))
                    }
                }
            }
        }

        Ok(removed)
    }

    async fn write_object(
        &self,
        content: &[u8],
        owner: &OwnerId,
        version: u32,
        expected: Option<&Fingerprint>,
    ) -> FilesResult<Fingerprint> {
        let fingerprint = digest(self.algorithm, content).await?;

        if let Some(expected) = expected {
            if expected != &fingerprint {
                return Err(FilesError::HashMismatch {
                    expected: expected.to_string(),
                    actual: fingerprint.to_string(),
                });
            }
        }

        let target = self.object_path(owner, &fingerprint, version);

        // Content addressing: an existing object already holds exactly these bytes
        if fs::try_exists(&target)
            .await
            .map_err(|e| io_context(e, format!("Failed to inspect {}", target.display())))?
        {
            tracing::debug!(%fingerprint, %owner, version, "object already stored");
            return Ok(fingerprint);
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                io_context(
                    e,
                    format!("Failed to create storage directory {}", parent.display()),
                )
            })?;
        }

        let staged = StagedFile::write(&self.staging_directory(), content).await?;
        staged.commit(&target).await?;

        tracing::info!(
            %fingerprint,
            %owner,
            version,
            size_bytes = content.len(),
            "stored object"
        );

        Ok(fingerprint)
    }

    async fn bounded<T>(
        &self,
        operation: impl Future<Output = FilesResult<T>>,
    ) -> FilesResult<T> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, operation)
                .await
                .map_err(|_| FilesError::Timeout(limit))?,
            None => operation.await,
        }
    }

    fn check_algorithm(&self, fingerprint: &Fingerprint) -> FilesResult<()> {
        if fingerprint.algorithm() != self.algorithm {
            return Err(FilesError::InvalidPath(format!(
                "fingerprint is {} but this store uses {}",
                fingerprint.algorithm(),
                self.algorithm
            )));
        }
        Ok(())
    }

    fn object_path(&self, owner: &OwnerId, fingerprint: &Fingerprint, version: u32) -> PathBuf {
        self.root.join(self.relative_path(owner, fingerprint, version))
    }

    fn staging_directory(&self) -> PathBuf {
        self.root.join(STAGING_DIR_NAME)
    }
}

/// A fully written, flushed file in the staging directory
///
/// Dropping it without calling [`StagedFile::commit`] removes the file.
struct StagedFile {
    path: PathBuf,
    committed: bool,
}

impl StagedFile {
    async fn write(staging_directory: &Path, content: &[u8]) -> FilesResult<Self> {
        let staged = Self {
            path: staging_directory.join(format!(
                "{}.{}",
                Uuid::new_v4().simple(),
                STAGING_FILE_EXTENSION
            )),
            committed: false,
        };

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&staged.path)
            .await
            .map_err(|e| {
                io_context(
                    e,
                    format!("Failed to create staging file {}", staged.path.display()),
                )
            })?;

        file.write_all(content).await.map_err(|e| {
            io_context(
                e,
                format!("Failed to write staging file {}", staged.path.display()),
            )
        })?;

        file.sync_all().await.map_err(|e| {
            io_context(
                e,
                format!("Failed to flush staging file {}", staged.path.display()),
            )
        })?;

        Ok(staged)
    }

    async fn commit(mut self, target: &Path) -> FilesResult<()> {
        fs::rename(&self.path, target).await.map_err(|e| {
            io_context(e, format!("Failed to move object into {}", target.display()))
        })?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }

        let path = std::mem::take(&mut self.path);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = fs::remove_file(&path).await {
                        if e.kind() != ErrorKind::NotFound {
                            tracing::warn!(path = %path.display(), error = %e, "failed to remove staging file");
                        }
                    }
                });
            }
            // Outside a runtime the file is left for the next sweep
            Err(_) => tracing::warn!(path = %path.display(), "staging file left behind"),
        }
    }
}

async fn digest(algorithm: HashAlgorithm, content: &[u8]) -> FilesResult<Fingerprint> {
    if content.len() <= INLINE_DIGEST_LIMIT {
        return Ok(algorithm.digest(content));
    }

    let owned = content.to_vec();
    tokio::task::spawn_blocking(move || algorithm.digest(&owned))
        .await
        .map_err(|e| FilesError::Io(std::io::Error::other(format!("Digest task failed: {}", e))))
}

async fn read_file(path: &Path, relative: &Path) -> FilesResult<Vec<u8>> {
    fs::read(path)
        .await
        .map_err(|e| not_found_or_io(e, relative))
}

async fn sniff_media_type(path: &Path, relative: &Path) -> FilesResult<Option<NonEmptyText>> {
    let file = fs::File::open(path)
        .await
        .map_err(|e| not_found_or_io(e, relative))?;

    let mut head = Vec::new();
    file.take(MEDIA_SNIFF_LEN)
        .read_to_end(&mut head)
        .await
        .map_err(|e| io_context(e, format!("Failed to read {}", relative.display())))?;

    Ok(infer::get(&head).and_then(|kind| NonEmptyText::new(kind.mime_type()).ok()))
}

fn relative_text(relative: &Path) -> FilesResult<NonEmptyText> {
    NonEmptyText::new(relative.to_string_lossy()).map_err(|_| {
        FilesError::InvalidPath("computed object path is empty".into())
    })
}

fn not_found_or_io(e: std::io::Error, relative: &Path) -> FilesError {
    if e.kind() == ErrorKind::NotFound {
        FilesError::NotFound(relative.display().to_string())
    } else {
        io_context(e, format!("Failed to access {}", relative.display()))
    }
}

fn io_context(e: std::io::Error, context: impl std::fmt::Display) -> FilesError {
    FilesError::Io(std::io::Error::new(e.kind(), format!("{}: {}", context, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::TempDir;

    const HELLO_SHA256: &str = "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f";

    fn owner(name: &str) -> OwnerId {
        OwnerId::parse(name).unwrap()
    }

    async fn open_store(temp: &TempDir) -> ContentStore {
        open_with(temp, |config| config).await
    }

    async fn open_with(
        temp: &TempDir,
        configure: impl FnOnce(StoreConfig) -> StoreConfig,
    ) -> ContentStore {
        let config = configure(StoreConfig::new(temp.path().join("Files")));
        ContentStore::open(&config).await.unwrap()
    }

    /// Collects every regular file under `dir`, recursively
    fn files_under(dir: &Path) -> Vec<PathBuf> {
        let mut found = Vec::new();
        if let Ok(entries) = std::fs::read_dir(dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    found.extend(files_under(&path));
                } else {
                    found.push(path);
                }
            }
        }
        found
    }

    fn stored_objects(store: &ContentStore) -> Vec<PathBuf> {
        files_under(store.root_directory())
            .into_iter()
            .filter(|p| !p.starts_with(store.staging_directory()))
            .collect()
    }

    #[tokio::test]
    async fn test_open_creates_missing_root() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp).await;

        assert!(store.root_directory().is_dir());
        assert!(store.staging_directory().is_dir());
        assert!(store.root_directory().ends_with("Files"));
    }

    #[tokio::test]
    async fn test_open_without_create_requires_root() {
        let temp = TempDir::new().unwrap();
        let config = StoreConfig::new(temp.path().join("absent")).with_create_root(false);

        let result = ContentStore::open(&config).await;

        assert!(matches!(result, Err(FilesError::InvalidRootDirectory(_))));
    }

    #[tokio::test]
    async fn test_open_root_not_directory() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("file.txt");
        std::fs::write(&root, "not a directory").unwrap();

        let result = ContentStore::open(&StoreConfig::new(root).with_create_root(false)).await;

        assert!(matches!(result, Err(FilesError::InvalidRootDirectory(_))));
    }

    #[tokio::test]
    async fn test_put_stores_at_sharded_path() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp).await;

        let fingerprint = store.put(b"Hello, World!", &owner("alice"), 3).await.unwrap();

        assert_eq!(fingerprint.as_str(), HELLO_SHA256);
        let relative = store.relative_path(&owner("alice"), &fingerprint, 3);
        assert_eq!(
            relative,
            PathBuf::from(format!("owners/alice/v3/sha256/df/fd/{}", HELLO_SHA256))
        );
        let stored = std::fs::read(store.root_directory().join(&relative)).unwrap();
        assert_eq!(stored, b"Hello, World!");
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp).await;
        let alice = owner("alice");

        let first = store.put(b"Same content", &alice, 1).await.unwrap();
        let path = store.object_path(&alice, &first, 1);
        let written_at = std::fs::metadata(&path).unwrap().modified().unwrap();

        let second = store.put(b"Same content", &alice, 1).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(stored_objects(&store), vec![path.clone()]);
        // Not rewritten
        assert_eq!(
            std::fs::metadata(&path).unwrap().modified().unwrap(),
            written_at
        );
    }

    #[tokio::test]
    async fn test_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp).await;
        let alice = owner("alice");

        let test_cases: Vec<Vec<u8>> = vec![
            b"Plain text content".to_vec(),
            vec![],
            (0..=255).collect(),
            vec![0xAB; 1024 * 1024],
        ];

        for content in test_cases {
            let fingerprint = store.put(&content, &alice, 7).await.unwrap();
            let retrieved = store.get_by_fingerprint(&alice, &fingerprint, 7).await.unwrap();
            assert_eq!(retrieved, content, "round-trip failed for {} bytes", content.len());
        }
    }

    #[tokio::test]
    async fn test_distinct_content_never_overwrites() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp).await;
        let alice = owner("alice");

        let first = store.put(b"first", &alice, 1).await.unwrap();
        let second = store.put(b"second", &alice, 1).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(store.get_by_fingerprint(&alice, &first, 1).await.unwrap(), b"first");
        assert_eq!(store.get_by_fingerprint(&alice, &second, 1).await.unwrap(), b"second");
        assert_eq!(stored_objects(&store).len(), 2);
    }

    #[tokio::test]
    async fn test_get_missing_object_is_not_found() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp).await;

        let fingerprint = store.parse_fingerprint(HELLO_SHA256).unwrap();
        let result = store.get_by_fingerprint(&owner("alice"), &fingerprint, 1).await;

        assert!(matches!(result, Err(FilesError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_per_owner_namespacing_isolates_owners_and_versions() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp).await;
        let alice = owner("alice");
        let bob = owner("bob");

        let fingerprint = store.put(b"shared", &alice, 1).await.unwrap();

        assert!(matches!(
            store.get_by_fingerprint(&bob, &fingerprint, 1).await,
            Err(FilesError::NotFound(_))
        ));
        assert!(matches!(
            store.get_by_fingerprint(&alice, &fingerprint, 2).await,
            Err(FilesError::NotFound(_))
        ));

        store.put(b"shared", &bob, 1).await.unwrap();
        assert_ne!(
            store.relative_path(&alice, &fingerprint, 1),
            store.relative_path(&bob, &fingerprint, 1)
        );
        assert_eq!(stored_objects(&store).len(), 2);
    }

    #[tokio::test]
    async fn test_global_namespacing_deduplicates_across_owners() {
        let temp = TempDir::new().unwrap();
        let store = open_with(&temp, |c| c.with_namespacing(Namespacing::Global)).await;

        let from_alice = store.put(b"shared", &owner("alice"), 1).await.unwrap();
        let from_bob = store.put(b"shared", &owner("bob"), 9).await.unwrap();

        assert_eq!(from_alice, from_bob);
        assert_eq!(stored_objects(&store).len(), 1);
        assert_eq!(
            store.relative_path(&owner("bob"), &from_bob, 9),
            PathBuf::from(format!(
                "sha256/{}/{}/{}",
                &from_bob.as_str()[0..2],
                &from_bob.as_str()[2..4],
                from_bob
            ))
        );
        assert_eq!(
            store.get_by_fingerprint(&owner("carol"), &from_alice, 4).await.unwrap(),
            b"shared"
        );
    }

    #[tokio::test]
    async fn test_sha512_store() {
        let temp = TempDir::new().unwrap();
        let store = open_with(&temp, |c| c.with_hash_algorithm(HashAlgorithm::Sha512)).await;
        let alice = owner("alice");

        let fingerprint = store.put(b"wide", &alice, 1).await.unwrap();

        assert_eq!(fingerprint.as_str().len(), 128);
        assert!(store
            .relative_path(&alice, &fingerprint, 1)
            .starts_with("owners/alice/v1/sha512"));
        assert!(matches!(
            store.parse_fingerprint(HELLO_SHA256),
            Err(FilesError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn test_put_verified_accepts_matching_fingerprint() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp).await;
        let expected = Fingerprint::parse(HELLO_SHA256).unwrap();

        let fingerprint = store
            .put_verified(b"Hello, World!", &owner("alice"), 1, &expected)
            .await
            .unwrap();

        assert_eq!(fingerprint, expected);
    }

    #[tokio::test]
    async fn test_put_verified_mismatch_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp).await;
        let wrong = HashAlgorithm::Sha256.digest(b"something else");

        let result = store
            .put_verified(b"Hello, World!", &owner("alice"), 1, &wrong)
            .await;

        assert!(matches!(result, Err(FilesError::HashMismatch { .. })));
        assert!(stored_objects(&store).is_empty());
    }

    #[tokio::test]
    async fn test_verify_on_read_detects_corruption() {
        let temp = TempDir::new().unwrap();
        let store = open_with(&temp, |c| c.with_verify_on_read(true)).await;
        let alice = owner("alice");

        let fingerprint = store.put(b"original", &alice, 1).await.unwrap();
        std::fs::write(store.object_path(&alice, &fingerprint, 1), b"tampered").unwrap();

        let result = store.get_by_fingerprint(&alice, &fingerprint, 1).await;

        assert!(matches!(result, Err(FilesError::HashMismatch { .. })));
    }

    #[tokio::test]
    async fn test_get_by_path_reads_relative_and_absolute() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp).await;
        let alice = owner("alice");

        let fingerprint = store.put(b"by path", &alice, 2).await.unwrap();
        let relative = store.relative_path(&alice, &fingerprint, 2);

        assert_eq!(store.get_by_path(&relative).await.unwrap(), b"by path");
        assert_eq!(
            store
                .get_by_path(store.root_directory().join(&relative))
                .await
                .unwrap(),
            b"by path"
        );
    }

    #[tokio::test]
    async fn test_get_by_path_rejects_traversal() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp).await;
        std::fs::write(temp.path().join("secret.txt"), b"secret").unwrap();

        for input in ["../../etc/passwd", "../secret.txt", "/etc/passwd", "owners/../../secret.txt"] {
            let result = store.get_by_path(input).await;
            assert!(
                matches!(result, Err(FilesError::InvalidPath(_))),
                "{} was not rejected: {:?}",
                input,
                result
            );
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_get_by_path_rejects_symlink_escape() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp).await;
        std::fs::write(temp.path().join("secret.txt"), b"secret").unwrap();
        std::os::unix::fs::symlink(
            temp.path().join("secret.txt"),
            store.root_directory().join("link.txt"),
        )
        .unwrap();

        let result = store.get_by_path("link.txt").await;

        assert!(matches!(result, Err(FilesError::InvalidPath(_))));
    }

    #[tokio::test]
    async fn test_get_by_path_rejects_staging_and_directories() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp).await;
        std::fs::write(store.staging_directory().join("abc.part"), b"partial").unwrap();
        store.put(b"x", &owner("alice"), 1).await.unwrap();

        assert!(matches!(
            store.get_by_path(".staging/abc.part").await,
            Err(FilesError::InvalidPath(_))
        ));
        assert!(matches!(
            store.get_by_path("owners/alice").await,
            Err(FilesError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn test_get_by_path_missing_is_not_found() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp).await;

        let result = store.get_by_path("owners/nobody/v1/sha256/aa/bb/missing").await;

        assert!(matches!(result, Err(FilesError::NotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_identical_puts_leave_one_object() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(open_store(&temp).await);
        let content: Arc<Vec<u8>> = Arc::new((0..200_000u32).map(|i| (i % 251) as u8).collect());

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            let content = Arc::clone(&content);
            handles.push(tokio::spawn(async move {
                store.put(&content, &OwnerId::parse("alice").unwrap(), 1).await
            }));
        }

        let mut fingerprints = HashSet::new();
        for handle in handles {
            fingerprints.insert(handle.await.unwrap().unwrap());
        }

        assert_eq!(fingerprints.len(), 1);
        let fingerprint = fingerprints.into_iter().next().unwrap();
        let objects = stored_objects(&store);
        assert_eq!(objects.len(), 1);
        assert_eq!(std::fs::read(&objects[0]).unwrap(), *content);
        assert_eq!(
            store
                .get_by_fingerprint(&owner("alice"), &fingerprint, 1)
                .await
                .unwrap(),
            *content
        );
        assert!(files_under(&store.staging_directory()).is_empty());
    }

    #[tokio::test]
    async fn test_contains_and_stat() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp).await;
        let alice = owner("alice");
        let png = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

        let fingerprint = store.put(&png, &alice, 1).await.unwrap();

        assert!(store.contains(&alice, &fingerprint, 1).await.unwrap());
        assert!(!store.contains(&alice, &fingerprint, 2).await.unwrap());

        let metadata = store.stat(&alice, &fingerprint, 1).await.unwrap();
        assert_eq!(metadata.hash_algorithm, HashAlgorithm::Sha256);
        assert_eq!(metadata.fingerprint, fingerprint);
        assert_eq!(metadata.size_bytes, 8);
        assert_eq!(
            metadata.media_type.as_ref().map(|t| t.as_str()),
            Some("image/png")
        );
        assert_eq!(
            metadata.relative_path.as_str(),
            store.relative_path(&alice, &fingerprint, 1).to_string_lossy()
        );

        assert!(matches!(
            store.stat(&alice, &fingerprint, 2).await,
            Err(FilesError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_sweep_staging_removes_only_stale_part_files() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp).await;
        let staging = store.staging_directory();
        std::fs::write(staging.join("abandoned.part"), b"partial").unwrap();
        std::fs::write(staging.join("notes.txt"), b"keep").unwrap();

        assert_eq!(store.sweep_staging(STALE_STAGING_AGE).await.unwrap(), 0);
        assert_eq!(store.sweep_staging(Duration::ZERO).await.unwrap(), 1);

        assert!(!staging.join("abandoned.part").exists());
        assert!(staging.join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_timeout_is_reported_as_retryable() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp)
            .await
            .with_timeout(Duration::from_millis(10));

        let result: FilesResult<()> = store.bounded(std::future::pending()).await;

        match result {
            Err(err @ FilesError::Timeout(limit)) => {
                assert_eq!(limit, Duration::from_millis(10));
                assert!(err.is_retryable());
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    /// Waits for drop guards to finish removing staging files
    async fn settled_staging(store: &ContentStore) -> Vec<PathBuf> {
        for _ in 0..100 {
            let leftovers = files_under(&store.staging_directory());
            if leftovers.is_empty() {
                return leftovers;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        files_under(&store.staging_directory())
    }

    #[tokio::test]
    async fn test_zero_timeout_put_fails_without_leftovers() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp).await.with_timeout(Duration::ZERO);
        let content = vec![0x5a_u8; 4 * 1024 * 1024];

        match store.put(&content, &owner("alice"), 1).await {
            Err(err @ FilesError::Timeout(limit)) => {
                assert_eq!(limit, Duration::ZERO);
                assert!(err.is_retryable());
            }
            other => panic!("expected timeout, got {:?}", other),
        }

        assert!(settled_staging(&store).await.is_empty());
        assert!(stored_objects(&store).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_timed_out_large_put_leaves_nothing_behind() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp)
            .await
            .with_timeout(Duration::from_millis(1));
        let content = vec![0xa5_u8; 32 * 1024 * 1024];

        let err = store.put(&content, &owner("alice"), 1).await.unwrap_err();
        assert!(matches!(err, FilesError::Timeout(_)));

        assert!(settled_staging(&store).await.is_empty());
        assert!(stored_objects(&store).is_empty());
    }

    #[tokio::test]
    async fn test_uncommitted_staging_file_is_removed_on_drop() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp).await;

        let staged = StagedFile::write(&store.staging_directory(), b"partial")
            .await
            .unwrap();
        assert!(staged.path.exists());
        drop(staged);

        assert!(settled_staging(&store).await.is_empty());
        assert!(stored_objects(&store).is_empty());
    }

    #[tokio::test]
    async fn test_large_payload_fingerprint_matches_inline_digest() {
        let temp = TempDir::new().unwrap();
        let store = open_store(&temp).await;
        let alice = owner("alice");
        let content = vec![7_u8; INLINE_DIGEST_LIMIT * 4];

        let fingerprint = store.put(&content, &alice, 1).await.unwrap();

        assert_eq!(fingerprint, HashAlgorithm::Sha256.digest(&content));
        assert_eq!(store.get_by_fingerprint(&alice, &fingerprint, 1).await.unwrap(), content);
    }

    #[tokio::test]
    async fn test_metadata_serialization() {
        let metadata = ObjectMetadata {
            hash_algorithm: HashAlgorithm::Sha256,
            fingerprint: Fingerprint::parse(HELLO_SHA256).unwrap(),
            relative_path: NonEmptyText::new(format!("sha256/df/fd/{}", HELLO_SHA256)).unwrap(),
            size_bytes: 13,
            media_type: None,
            stored_at: "2024-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap(),
        };

        let json = serde_json::to_string(&metadata).unwrap();
        assert!(json.contains("\"hash_algorithm\":\"sha256\""));
        assert!(json.contains(HELLO_SHA256));

        let back: ObjectMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, metadata);
    }
}
