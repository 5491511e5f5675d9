//! The closed error enum shared by every public operation in this crate.
//!
//! Mirrors the `FwupdError` domain from `libfwupd/fwupd-error.h`: a small,
//! fixed set of kinds rather than one variant per failure site, so callers can
//! match on `kind()` without needing to know which module raised the error.

use std::fmt;

/// The closed set of error kinds, per spec.md section 7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Internal,
    InvalidData,
    NotFound,
    NotSupported,
    PermissionDenied,
    Read,
    Write,
    TimedOut,
    Busy,
    AuthFailed,
    NothingToDo,
    InvalidFile,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Internal => "internal",
            ErrorKind::InvalidData => "invalid-data",
            ErrorKind::NotFound => "not-found",
            ErrorKind::NotSupported => "not-supported",
            ErrorKind::PermissionDenied => "permission-denied",
            ErrorKind::Read => "read",
            ErrorKind::Write => "write",
            ErrorKind::TimedOut => "timed-out",
            ErrorKind::Busy => "busy",
            ErrorKind::AuthFailed => "auth-failed",
            ErrorKind::NothingToDo => "nothing-to-do",
            ErrorKind::InvalidFile => "invalid-file",
        };
        f.write_str(s)
    }
}

/// An error that may occur in any device/plugin/transport/config operation.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error { kind, message: message.into(), cause: None }
    }

    pub fn with_cause(
        kind: ErrorKind,
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error { kind, message: message.into(), cause: Some(Box::new(cause)) }
    }

    pub fn kind(&self) -> ErrorKind { self.kind }

    pub fn internal(message: impl Into<String>) -> Self { Error::new(ErrorKind::Internal, message) }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::InvalidData, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self { Error::new(ErrorKind::NotFound, message) }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::NotSupported, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::PermissionDenied, message)
    }

    pub fn read(message: impl Into<String>) -> Self { Error::new(ErrorKind::Read, message) }

    pub fn write(message: impl Into<String>) -> Self { Error::new(ErrorKind::Write, message) }

    pub fn timed_out(message: impl Into<String>) -> Self { Error::new(ErrorKind::TimedOut, message) }

    pub fn busy(message: impl Into<String>) -> Self { Error::new(ErrorKind::Busy, message) }

    pub fn invalid_file(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::InvalidFile, message)
    }

    pub fn auth_failed(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::AuthFailed, message)
    }

    pub fn nothing_to_do(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::NothingToDo, message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
