//! Error reporting for all wrapper operations.
//!
//! Every fallible operation returns [`SqliteError`], carrying the engine
//! status code and a formatted message that always includes the status name,
//! the numeric code, and the original detail text.

use crate::ffi;
use std::ffi::{CStr, c_int};
use std::fmt;

/// Status code used for errors raised by this library rather than the
/// engine: invalid indexes, released handles, malformed encoded input.
/// Deliberately outside the engine's result-code range.
pub const KIT_ERROR: c_int = 1000;

/// Detail text used when an engine-heap allocation fails.
pub(crate) const ALLOCATION_ERROR_MESSAGE: &str = "Cannot allocate memory";

/// A failure from the SQLite engine or from the wrapper layer itself.
///
/// The message is always owned and formatted as
/// `"<STATUS_NAME>[<code>]: <detail>"`, e.g.
/// `"SQLITE_BUSY[5]: database is locked"`.
#[derive(Debug, Clone)]
pub struct SqliteError {
    code: c_int,
    message: String,
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SqliteError>;

impl SqliteError {
    /// Build an error from an engine status code plus detail text.
    pub fn new(code: c_int, detail: &str) -> Self {
        Self {
            code,
            message: format!("{}[{}]: {}", code_name(code), code, detail),
        }
    }

    /// Build an error from an engine status code, reading the detail text
    /// from the connection's `sqlite3_errmsg`. Falls back to the static
    /// result-code string when no connection is available.
    pub(crate) fn from_handle(db: *mut ffi::sqlite3, code: c_int) -> Self {
        let detail = if db.is_null() {
            ffi::error_string(code).to_string()
        } else {
            // SAFETY: db is a live connection handle; errmsg returns a valid
            // C string owned by the connection.
            unsafe {
                let ptr = ffi::sqlite3_errmsg(db);
                if ptr.is_null() {
                    ffi::error_string(code).to_string()
                } else {
                    CStr::from_ptr(ptr).to_string_lossy().into_owned()
                }
            }
        };
        Self::new(code, &detail)
    }

    /// A library-usage error: invalid index or name, released handle,
    /// malformed encoded input.
    pub fn misuse(detail: &str) -> Self {
        Self::new(KIT_ERROR, detail)
    }

    /// An engine-heap allocation failure.
    pub fn alloc() -> Self {
        Self::new(KIT_ERROR, ALLOCATION_ERROR_MESSAGE)
    }

    /// The engine status code (or [`KIT_ERROR`] for library errors).
    pub fn code(&self) -> c_int {
        self.code
    }

    /// The formatted message, including status name and code.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for SqliteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SqliteError {}

/// The symbolic name of an engine status code.
pub fn code_name(code: c_int) -> &'static str {
    match code {
        ffi::SQLITE_OK => "SQLITE_OK",
        ffi::SQLITE_ERROR => "SQLITE_ERROR",
        ffi::SQLITE_INTERNAL => "SQLITE_INTERNAL",
        ffi::SQLITE_PERM => "SQLITE_PERM",
        ffi::SQLITE_ABORT => "SQLITE_ABORT",
        ffi::SQLITE_BUSY => "SQLITE_BUSY",
        ffi::SQLITE_LOCKED => "SQLITE_LOCKED",
        ffi::SQLITE_NOMEM => "SQLITE_NOMEM",
        ffi::SQLITE_READONLY => "SQLITE_READONLY",
        ffi::SQLITE_INTERRUPT => "SQLITE_INTERRUPT",
        ffi::SQLITE_IOERR => "SQLITE_IOERR",
        ffi::SQLITE_CORRUPT => "SQLITE_CORRUPT",
        ffi::SQLITE_NOTFOUND => "SQLITE_NOTFOUND",
        ffi::SQLITE_FULL => "SQLITE_FULL",
        ffi::SQLITE_CANTOPEN => "SQLITE_CANTOPEN",
        ffi::SQLITE_PROTOCOL => "SQLITE_PROTOCOL",
        ffi::SQLITE_EMPTY => "SQLITE_EMPTY",
        ffi::SQLITE_SCHEMA => "SQLITE_SCHEMA",
        ffi::SQLITE_TOOBIG => "SQLITE_TOOBIG",
        ffi::SQLITE_CONSTRAINT => "SQLITE_CONSTRAINT",
        ffi::SQLITE_MISMATCH => "SQLITE_MISMATCH",
        ffi::SQLITE_MISUSE => "SQLITE_MISUSE",
        ffi::SQLITE_NOLFS => "SQLITE_NOLFS",
        ffi::SQLITE_AUTH => "SQLITE_AUTH",
        ffi::SQLITE_FORMAT => "SQLITE_FORMAT",
        ffi::SQLITE_RANGE => "SQLITE_RANGE",
        ffi::SQLITE_NOTADB => "SQLITE_NOTADB",
        ffi::SQLITE_ROW => "SQLITE_ROW",
        ffi::SQLITE_DONE => "SQLITE_DONE",
        KIT_ERROR => "SQLITEKIT_ERROR",
        _ => "UNKNOWN_ERROR",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_format() {
        let err = SqliteError::new(ffi::SQLITE_BUSY, "database is locked");
        assert_eq!(err.code(), 5);
        assert_eq!(err.message(), "SQLITE_BUSY[5]: database is locked");
        assert_eq!(err.to_string(), "SQLITE_BUSY[5]: database is locked");
    }

    #[test]
    fn test_misuse_code_is_distinct() {
        let err = SqliteError::misuse("Invalid field index");
        assert_eq!(err.code(), KIT_ERROR);
        assert!(err.message().starts_with("SQLITEKIT_ERROR[1000]:"));
    }

    #[test]
    fn test_alloc_error() {
        let err = SqliteError::alloc();
        assert_eq!(err.message(), "SQLITEKIT_ERROR[1000]: Cannot allocate memory");
    }

    #[test]
    fn test_code_names() {
        assert_eq!(code_name(ffi::SQLITE_OK), "SQLITE_OK");
        assert_eq!(code_name(ffi::SQLITE_DONE), "SQLITE_DONE");
        assert_eq!(code_name(-42), "UNKNOWN_ERROR");
    }

    #[test]
    fn test_from_null_handle_uses_static_string() {
        let err = SqliteError::from_handle(std::ptr::null_mut(), ffi::SQLITE_BUSY);
        assert_eq!(err.message(), "SQLITE_BUSY[5]: database is locked");
    }
}
