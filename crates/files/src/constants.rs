//! Path and naming constants for the content store.

use std::time::Duration;

/// Storage root used when none is configured.
pub const DEFAULT_STORAGE_ROOT: &str = "Files";

/// Directory under the storage root holding per-owner namespaces.
pub const OWNERS_DIR_NAME: &str = "owners";

/// Directory under the storage root holding in-flight writes.
///
/// Starts with a dot so it can never collide with an owner id or an algorithm directory.
pub const STAGING_DIR_NAME: &str = ".staging";

/// Extension given to staging files.
pub const STAGING_FILE_EXTENSION: &str = "part";

/// Staging files older than this are treated as abandoned when a store is opened.
pub const STALE_STAGING_AGE: Duration = Duration::from_secs(60 * 60);

/// Payloads larger than this are hashed on the blocking pool instead of the async worker.
pub const INLINE_DIGEST_LIMIT: usize = 64 * 1024;

/// Number of leading bytes inspected for media type detection.
pub const MEDIA_SNIFF_LEN: u64 = 8 * 1024;
