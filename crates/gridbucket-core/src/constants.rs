//! Defaults shared across engines.

/// Bucket name used when none is configured.
pub const DEFAULT_BUCKET_NAME: &str = "fs";

/// Default chunk size: 255 KiB, so a chunk plus its document overhead stays under 256 KiB.
pub const DEFAULT_CHUNK_SIZE_BYTES: u32 = 255 * 1024;

/// Revision selecting the most recent upload of a filename.
pub const LATEST_REVISION: i32 = -1;
