//! Storage layer error types.

use thiserror::Error;

/// Errors that can occur in the storage layer.
///
/// Open-time validation failures (`InvalidMagic`, `UnsupportedVersion`,
/// `PageSizeMismatch`) are fatal; everything else is recoverable by the
/// caller.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("invalid magic number: {0:#010x}")]
    InvalidMagic(u32),

    #[error("unsupported database version: {0}")]
    UnsupportedVersion(u32),

    #[error("page size mismatch: expected {expected}, got {found}")]
    PageSizeMismatch { expected: u32, found: u32 },

    #[error("invalid page ID: {0:#x}")]
    InvalidPageId(u32),

    #[error("invalid page type: {0:#04x}")]
    InvalidPageType(u8),

    #[error("page {0} is not resident in the buffer pool")]
    PageNotResident(u32),

    #[error("page {0} is pinned")]
    PagePinned(u32),

    #[error("buffer pool is full: no evictable frame")]
    BufferPoolFull,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
