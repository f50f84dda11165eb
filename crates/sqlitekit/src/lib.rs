//! Safe resource ownership and binary text encoding over the SQLite C API.
//!
// FFI bindings require unsafe code - this is expected for database wrappers
#![allow(unsafe_code)]
//!
//! This crate wraps SQLite's raw handle API in move-only owner types with
//! `Result`-based error reporting, and provides a reversible encoding for
//! embedding arbitrary binary data inside SQL text literals.
//!
//! # Ownership model
//!
//! Every engine resource (connection, prepared statement, iteration handle,
//! buffered result table, formatted buffer) has exactly one live owner at
//! any time. Owners are move-only; moving transfers the handle, and the
//! handle is released exactly once, either through an explicit `finalize`/
//! `close` (which propagates engine errors) or on drop (best-effort, errors
//! are logged and suppressed). Borrowing views — a cursor produced by
//! [`Statement::exec_query`] — are pinned by lifetime and never release the
//! handle they reference.
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlitekit::Database;
//!
//! let db = Database::open_memory()?;
//! db.exec_dml("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")?;
//!
//! let mut stmt = db.compile_statement("INSERT INTO users (name) VALUES (?)")?;
//! stmt.bind_text(1, "Alice")?;
//! stmt.exec_dml()?;
//!
//! let mut q = db.exec_query("SELECT id, name FROM users ORDER BY id")?;
//! while !q.eof()? {
//!     println!("{}: {}", q.int_field("id", 0)?, q.string_field("name", "")?);
//!     q.next_row()?;
//! }
//! # Ok::<(), sqlitekit::SqliteError>(())
//! ```
//!
//! # Binary embedding
//!
//! [`BinaryValue`] and the [`codec`] functions convert byte buffers to a
//! quote-free, NUL-free text form (and back) so binary payloads can live
//! inside single-quoted SQL literals. Worst-case expansion is about 1.2%.
//!
//! # Thread model
//!
//! Single-threaded per connection: no internal locking, no `Send`/`Sync`.
//! Cross-connection lock contention is handled by the engine's busy-timeout
//! retry (60 s default, configurable per connection).

pub mod binary;
pub mod codec;
pub mod connection;
pub mod cursor;
pub mod error;
pub mod ffi;
pub mod mem;
pub mod statement;
pub mod table;

// Link against the bundled SQLite static library that libsqlite3-sys builds;
// the declarations in `ffi` resolve against it.
use libsqlite3_sys as _;

pub use binary::BinaryValue;
pub use connection::{DEFAULT_BUSY_TIMEOUT_MS, Database, OpenFlags};
pub use cursor::{Cursor, Field};
pub use error::{KIT_ERROR, Result, SqliteError, code_name};
pub use mem::{SqlBuffer, SqliteMemory};
pub use statement::Statement;
pub use table::ResultTable;

// Column storage classes reported by `Cursor::field_data_type`.
pub use ffi::{SQLITE_BLOB, SQLITE_FLOAT, SQLITE_INTEGER, SQLITE_NULL, SQLITE_TEXT};

/// The SQLite library version string.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}

/// The SQLite library version number.
pub fn sqlite_version_number() -> i32 {
    ffi::version_number()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_version() {
        let version = sqlite_version();
        assert!(
            version.starts_with('3'),
            "Expected SQLite 3.x, got {}",
            version
        );
    }

    #[test]
    fn test_sqlite_version_number() {
        let num = sqlite_version_number();
        assert!(
            num >= 3_000_000,
            "Expected SQLite 3.x.x (>= 3000000), got {}",
            num
        );
    }
}
