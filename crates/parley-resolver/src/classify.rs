use std::fmt;

use rusqlite::ErrorCode;
use rusqlite::ffi;
use thiserror::Error;

use crate::guard::DeadlineElapsed;
use crate::store::AccessDenied;

/// Closed taxonomy every layer above the store reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Not authenticated, or rejected by the membership policy. Never retried.
    Auth,
    /// Uniqueness violation from a concurrent creation. Absorbed internally.
    Conflict,
    /// Timeout, busy database, network. The caller may choose to retry.
    Transient,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Conflict => "conflict",
            Self::Transient => "transient",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {message}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    /// Full `{:#}` rendering of the original error chain.
    pub message: String,
    pub code: Option<String>,
    pub retryable: bool,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, code: Option<&str>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: code.map(str::to_owned),
            retryable: kind == ErrorKind::Transient,
        }
    }
}

/// Normalize a raw store error into the [`ErrorKind`] taxonomy.
///
/// The whole chain is inspected, so context layered on top of a backend error
/// does not hide it.
pub fn classify(err: &anyhow::Error) -> ClassifiedError {
    let message = format!("{:#}", err);

    for cause in err.chain() {
        if cause.downcast_ref::<AccessDenied>().is_some() {
            return ClassifiedError::new(ErrorKind::Auth, message, Some("ACCESS_DENIED"));
        }
        if cause.downcast_ref::<DeadlineElapsed>().is_some() {
            return ClassifiedError::new(ErrorKind::Transient, message, Some("DEADLINE_EXCEEDED"));
        }
        if let Some(sqlite) = cause.downcast_ref::<rusqlite::Error>() {
            if let Some((kind, code)) = classify_sqlite(sqlite) {
                return ClassifiedError::new(kind, message, Some(code));
            }
        }
        if cause.downcast_ref::<std::io::Error>().is_some() {
            return ClassifiedError::new(ErrorKind::Transient, message, Some("IO"));
        }
    }

    ClassifiedError::new(ErrorKind::Unknown, message, None)
}

fn classify_sqlite(err: &rusqlite::Error) -> Option<(ErrorKind, &'static str)> {
    let rusqlite::Error::SqliteFailure(failure, _) = err else {
        return None;
    };

    let classified = match failure.code {
        ErrorCode::ConstraintViolation => match failure.extended_code {
            ffi::SQLITE_CONSTRAINT_UNIQUE => (ErrorKind::Conflict, "SQLITE_CONSTRAINT_UNIQUE"),
            ffi::SQLITE_CONSTRAINT_PRIMARYKEY => (ErrorKind::Conflict, "SQLITE_CONSTRAINT_PRIMARYKEY"),
            ffi::SQLITE_CONSTRAINT_FOREIGNKEY => (ErrorKind::Unknown, "SQLITE_CONSTRAINT_FOREIGNKEY"),
            _ => (ErrorKind::Unknown, "SQLITE_CONSTRAINT"),
        },
        ErrorCode::DatabaseBusy => (ErrorKind::Transient, "SQLITE_BUSY"),
        ErrorCode::DatabaseLocked => (ErrorKind::Transient, "SQLITE_LOCKED"),
        _ => return None,
    };

    Some(classified)
}
