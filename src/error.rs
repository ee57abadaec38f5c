//! Filesystem error types.

use std::io;
use thiserror::Error;

/// Filesystem error type.
///
/// Every operation returns one of these kinds; failures are deterministic
/// given the same filesystem state and inputs, so callers branch on kind
/// rather than retrying.
#[derive(Debug, Error)]
pub enum FsError {
    /// Path component, symlink target, or handle target does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Name already exists in the target directory.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Permission bits deny the requested access.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Operation is nonsensical for the target (non-directory in an
    /// interior path position, hardlink to a directory, use after close,
    /// seek to a negative position, ...).
    #[error("invalid operation: {0}")]
    Invalid(String),

    /// Symlink expansion exceeded the hop bound.
    #[error("too many levels of symbolic links")]
    TooManyLinks,

    /// Host filesystem I/O error (pass-through adapter only).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    /// Create a PermissionDenied error.
    pub fn permission_denied(path: impl Into<String>) -> Self {
        Self::PermissionDenied(path.into())
    }

    /// Create an Invalid error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    /// Returns true if this is a NotFound error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true if this is an AlreadyExists error.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    /// Returns true if this is a PermissionDenied error.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }

    /// Returns true if this is an Invalid error.
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid(_))
    }
}

/// Convert FsError to std::io::Error for compatibility.
impl From<FsError> for io::Error {
    fn from(e: FsError) -> Self {
        match e {
            FsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            FsError::AlreadyExists(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            FsError::PermissionDenied(msg) => {
                io::Error::new(io::ErrorKind::PermissionDenied, msg)
            }
            FsError::Invalid(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            FsError::TooManyLinks => {
                io::Error::other("too many levels of symbolic links")
            }
            FsError::Io(e) => e,
        }
    }
}

/// Filesystem result type.
pub type FsResult<T> = Result<T, FsError>;
