//! Typed failure taxonomy for the container and metadata layers.
//!
//! Most read paths in this crate degrade to `None` rather than erroring
//! (a missing member or a corrupt container is an expected condition when
//! browsing arbitrary files), so these types only cover the cases where a
//! caller needs to distinguish *why* something was rejected: structural
//! header problems, metadata schema problems, and commit failures.

use std::path::PathBuf;
use thiserror::Error;

/// Structural problems with the fixed 16-byte header that prefixes the
/// ZIP payload of an archive container.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    /// Fewer than 16 bytes were available.
    #[error("truncated header: got {0} bytes, need {1}")]
    Truncated(usize, usize),

    /// The magic value at offset 0 was not the tilt sentinel.
    #[error("invalid sentinel: 0x{0:08x}")]
    InvalidSentinel(u32),

    /// The header version is one this crate does not understand.
    #[error("unsupported header version: {0}")]
    UnsupportedVersion(u16),

    /// The declared header size is smaller than the fixed struct.
    #[error("corrupt header: declared size {0}")]
    CorruptHeader(u16),

    /// The bytes following the header were not a ZIP local file header.
    #[error("zip sentinel not found after header")]
    MissingZipSentinel,
}

/// Problems with the versioned metadata document.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The document claims a schema version newer than this build knows.
    /// Proceeding would silently drop data, so the caller must decide.
    #[error("metadata schema version {found} is newer than supported version {latest}")]
    FutureVersion { found: i32, latest: i32 },

    /// The document could not be deserialized at all.
    #[error("metadata parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failures from the atomic commit protocol.
#[derive(Debug, Error)]
pub enum CommitError {
    /// I/O failure before the destination was touched. The previous
    /// container (if any) is intact and the commit is safe to retry.
    #[error("commit failed before touching {path}: {source}")]
    BeforeRename {
        path: PathBuf,
        source: std::io::Error,
    },

    /// I/O failure during or after the rename sequence. Destination
    /// state is undefined and must be inspected before retrying.
    #[error("commit failed mid-rename for {path}: {source}")]
    MidRename {
        path: PathBuf,
        source: std::io::Error,
    },
}
