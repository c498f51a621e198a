//! Error type shared by every crate of the workspace.
//!
//! Absence is never an error: lookups return `Option`, listings return empty
//! vectors. `VfsError` is reserved for failures a caller has to act on.

use std::fmt;
use std::io;

use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VfsErrorKind {
    /// The target of a content operation does not exist.
    NotFound,
    /// The provider cannot perform the operation (read-only providers).
    NotSupported,
    /// The caller's cancellation token fired.
    Cancelled,
    InvalidInput,
    AlreadyExists,
    NotDir,
    IsDir,
    Io,
    Internal,
}

impl VfsErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "entity not found",
            Self::NotSupported => "operation not supported",
            Self::Cancelled => "operation cancelled",
            Self::InvalidInput => "invalid input",
            Self::AlreadyExists => "entity already exists",
            Self::NotDir => "not a directory",
            Self::IsDir => "is a directory",
            Self::Io => "io error",
            Self::Internal => "internal error",
        }
    }
}

impl fmt::Display for VfsErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("{context}: {kind}")]
pub struct VfsError {
    kind: VfsErrorKind,
    context: &'static str,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl VfsError {
    pub fn new(kind: VfsErrorKind, context: &'static str) -> Self {
        Self {
            kind,
            context,
            source: None,
        }
    }

    pub fn with_source(
        kind: VfsErrorKind,
        context: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            context,
            source: Some(Box::new(source)),
        }
    }

    pub fn not_supported(context: &'static str) -> Self {
        Self::new(VfsErrorKind::NotSupported, context)
    }

    pub fn cancelled(context: &'static str) -> Self {
        Self::new(VfsErrorKind::Cancelled, context)
    }

    pub fn kind(&self) -> VfsErrorKind {
        self.kind
    }

    pub fn context(&self) -> &'static str {
        self.context
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == VfsErrorKind::Cancelled
    }
}

impl From<io::Error> for VfsError {
    fn from(err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::NotFound => VfsErrorKind::NotFound,
            io::ErrorKind::AlreadyExists => VfsErrorKind::AlreadyExists,
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => {
                VfsErrorKind::InvalidInput
            }
            io::ErrorKind::Unsupported => VfsErrorKind::NotSupported,
            io::ErrorKind::Interrupted => VfsErrorKind::Cancelled,
            _ => VfsErrorKind::Io,
        };
        Self::with_source(kind, "io", err)
    }
}

pub type VfsResult<T> = Result<T, VfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context_and_kind() {
        let err = VfsError::new(VfsErrorKind::NotSupported, "archive.delete");
        assert_eq!(err.to_string(), "archive.delete: operation not supported");
    }

    #[test]
    fn io_errors_keep_their_source() {
        let err: VfsError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.kind(), VfsErrorKind::NotFound);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn cancellation_is_distinguishable() {
        assert!(VfsError::cancelled("refresh").is_cancelled());
        assert!(!VfsError::new(VfsErrorKind::Io, "read").is_cancelled());
    }
}
