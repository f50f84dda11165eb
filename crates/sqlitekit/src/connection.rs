//! Database connection ownership and one-shot execution helpers.

use crate::cursor::Cursor;
use crate::error::{Result, SqliteError};
use crate::ffi;
use crate::mem::SqlBuffer;
use crate::statement::Statement;
use crate::table::ResultTable;
use std::ffi::{CStr, CString, c_char, c_int};
use std::ptr;

/// Busy timeout applied to every freshly opened connection.
pub const DEFAULT_BUSY_TIMEOUT_MS: c_int = 60_000;

/// Flags controlling how the database is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenFlags {
    /// Open for reading only.
    pub read_only: bool,
    /// Open for reading and writing.
    pub read_write: bool,
    /// Create the database if it doesn't exist.
    pub create: bool,
    /// Enable URI filename interpretation.
    pub uri: bool,
    /// Open in multi-thread mode (connections not shared between threads).
    pub no_mutex: bool,
    /// Open in serialized mode (connections can be shared).
    pub full_mutex: bool,
    /// Enable shared cache mode.
    pub shared_cache: bool,
    /// Disable shared cache mode.
    pub private_cache: bool,
}

impl OpenFlags {
    /// Create flags for read-only access.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access (database must exist).
    pub fn read_write() -> Self {
        Self {
            read_write: true,
            ..Default::default()
        }
    }

    /// Create flags for read-write access with creation if needed.
    pub fn create_read_write() -> Self {
        Self {
            read_write: true,
            create: true,
            ..Default::default()
        }
    }

    fn to_c_flags(self) -> c_int {
        let mut flags = 0;

        if self.read_only {
            flags |= ffi::SQLITE_OPEN_READONLY;
        }
        if self.read_write {
            flags |= ffi::SQLITE_OPEN_READWRITE;
        }
        if self.create {
            flags |= ffi::SQLITE_OPEN_CREATE;
        }
        if self.uri {
            flags |= ffi::SQLITE_OPEN_URI;
        }
        if self.no_mutex {
            flags |= ffi::SQLITE_OPEN_NOMUTEX;
        }
        if self.full_mutex {
            flags |= ffi::SQLITE_OPEN_FULLMUTEX;
        }
        if self.shared_cache {
            flags |= ffi::SQLITE_OPEN_SHAREDCACHE;
        }
        if self.private_cache {
            flags |= ffi::SQLITE_OPEN_PRIVATECACHE;
        }

        // Default to read-write if no mode specified
        if flags & (ffi::SQLITE_OPEN_READONLY | ffi::SQLITE_OPEN_READWRITE) == 0 {
            flags |= ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE;
        }

        flags
    }
}

/// Exclusive owner of an open database connection.
///
/// Everything derived from a connection (statements, cursors, tables) is
/// confined with it to one logical thread of control; the type is neither
/// `Send` nor `Sync` on purpose. Lock contention against other connections
/// is retried by the engine for up to the configured busy timeout.
#[derive(Debug)]
pub struct Database {
    db: *mut ffi::sqlite3,
    busy_timeout_ms: c_int,
}

impl Database {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &str) -> Result<Self> {
        let c_path = CString::new(path)
            .map_err(|_| SqliteError::misuse("Database path contains a NUL byte"))?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        // SAFETY: both pointers are valid; the return value is checked
        let rc = unsafe { ffi::sqlite3_open(c_path.as_ptr(), &mut db) };
        Self::finish_open(db, rc, path)
    }

    /// Open with explicit flags and, optionally, a named VFS.
    pub fn open_with_flags(path: &str, flags: OpenFlags, vfs: Option<&str>) -> Result<Self> {
        let c_path = CString::new(path)
            .map_err(|_| SqliteError::misuse("Database path contains a NUL byte"))?;
        let c_vfs = match vfs {
            Some(name) => Some(
                CString::new(name)
                    .map_err(|_| SqliteError::misuse("VFS name contains a NUL byte"))?,
            ),
            None => None,
        };

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        // SAFETY: all pointers are valid; the return value is checked
        let rc = unsafe {
            ffi::sqlite3_open_v2(
                c_path.as_ptr(),
                &mut db,
                flags.to_c_flags(),
                c_vfs.as_ref().map_or(ptr::null(), |v| v.as_ptr()),
            )
        };
        Self::finish_open(db, rc, path)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    fn finish_open(db: *mut ffi::sqlite3, rc: c_int, path: &str) -> Result<Self> {
        if rc != ffi::SQLITE_OK {
            let err = SqliteError::from_handle(db, rc);
            if !db.is_null() {
                // SAFETY: a failed open can still return a handle that must
                // be closed to avoid a leak.
                unsafe { ffi::sqlite3_close(db) };
            }
            return Err(err);
        }

        let mut conn = Self {
            db,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        };
        conn.set_busy_timeout(DEFAULT_BUSY_TIMEOUT_MS)?;
        tracing::debug!(path = %path, "opened database");
        Ok(conn)
    }

    /// Whether the connection is open.
    pub fn is_open(&self) -> bool {
        !self.db.is_null()
    }

    /// Close the connection. Safe to call on an already-closed connection.
    pub fn close(&mut self) -> Result<()> {
        if !self.db.is_null() {
            // SAFETY: db is live; close_v2 defers teardown until any
            // remaining engine-side resources are released. The pointer is
            // cleared first so release happens exactly once.
            let rc = unsafe { ffi::sqlite3_close_v2(self.db) };
            self.db = ptr::null_mut();
            tracing::trace!("closed database");
            if rc != ffi::SQLITE_OK {
                return Err(SqliteError::new(rc, ffi::error_string(rc)));
            }
        }
        Ok(())
    }

    /// Compile SQL text into an owning [`Statement`].
    pub fn compile_statement(&self, sql: &str) -> Result<Statement<'_>> {
        let stmt = self.compile(sql)?;
        Ok(Statement::new(self.db, stmt))
    }

    /// Run non-query SQL to completion and return the affected-row count.
    pub fn exec_dml(&self, sql: &str) -> Result<c_int> {
        self.check_db()?;
        let c_sql =
            CString::new(sql).map_err(|_| SqliteError::misuse("SQL contains a NUL byte"))?;

        let mut errmsg: *mut c_char = ptr::null_mut();
        // SAFETY: all pointers are valid; errmsg is freed after copying
        let rc =
            unsafe { ffi::sqlite3_exec(self.db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg) };

        if rc == ffi::SQLITE_OK {
            // SAFETY: db is live
            let changed = unsafe { ffi::sqlite3_changes(self.db) };
            tracing::trace!(changed, "executed DML");
            Ok(changed)
        } else {
            let detail = if errmsg.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: errmsg is a valid engine-allocated C string; it is
                // freed exactly once after the copy.
                unsafe {
                    let msg = CStr::from_ptr(errmsg).to_string_lossy().into_owned();
                    ffi::sqlite3_free(errmsg.cast());
                    msg
                }
            };
            Err(SqliteError::new(rc, &detail))
        }
    }

    /// Compile and step once, returning an owning [`Cursor`] that is either
    /// on its first row or already exhausted. Compile and first-step
    /// failures release the handle and are returned as errors.
    pub fn exec_query(&self, sql: &str) -> Result<Cursor<'_>> {
        let stmt = self.compile(sql)?;

        // SAFETY: stmt is live; on error it is finalized exactly once here
        unsafe {
            let rc = ffi::sqlite3_step(stmt);
            match rc {
                ffi::SQLITE_DONE => Ok(Cursor::new(self.db, stmt, true, true)),
                ffi::SQLITE_ROW => Ok(Cursor::new(self.db, stmt, false, true)),
                _ => {
                    let rc = ffi::sqlite3_finalize(stmt);
                    Err(SqliteError::from_handle(self.db, rc))
                }
            }
        }
    }

    /// Run a query expected to produce at least one row and one column and
    /// return the first cell as an integer, substituting `null_value` when
    /// the cell is SQL NULL.
    pub fn exec_scalar(&self, sql: &str, null_value: i64) -> Result<i64> {
        let q = self.exec_query(sql)?;
        if q.eof()? || q.num_fields()? < 1 {
            return Err(SqliteError::misuse("Invalid scalar query"));
        }
        q.int64_field(0, null_value)
    }

    /// Eagerly materialize the full result of `sql` as a [`ResultTable`].
    pub fn get_table(&self, sql: &str) -> Result<ResultTable> {
        self.check_db()?;
        let c_sql =
            CString::new(sql).map_err(|_| SqliteError::misuse("SQL contains a NUL byte"))?;

        let mut results: *mut *mut c_char = ptr::null_mut();
        let mut rows: c_int = 0;
        let mut cols: c_int = 0;
        let mut errmsg: *mut c_char = ptr::null_mut();

        // SAFETY: all pointers are valid; on success the result array is
        // owned by the returned table, on failure errmsg is freed after
        // copying
        let rc = unsafe {
            ffi::sqlite3_get_table(
                self.db,
                c_sql.as_ptr(),
                &mut results,
                &mut rows,
                &mut cols,
                &mut errmsg,
            )
        };

        if rc == ffi::SQLITE_OK {
            Ok(ResultTable::new(results, rows, cols))
        } else {
            let detail = if errmsg.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: errmsg is a valid engine-allocated C string; it is
                // freed exactly once after the copy.
                unsafe {
                    let msg = CStr::from_ptr(errmsg).to_string_lossy().into_owned();
                    ffi::sqlite3_free(errmsg.cast());
                    msg
                }
            };
            Err(SqliteError::new(rc, &detail))
        }
    }

    /// Whether a table with the given name exists.
    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let mut sql = SqlBuffer::new();
        sql.format_quoted(
            "select count(*) from sqlite_master where type='table' and name=%Q",
            table,
        )?;
        Ok(self.exec_scalar(sql.as_str(), 0)? > 0)
    }

    /// Whether the given table has a column with the given name. The column
    /// comparison is case-insensitive, matching the engine's own treatment
    /// of identifiers.
    pub fn column_exists(&self, table: &str, column: &str) -> Result<bool> {
        let mut sql = SqlBuffer::new();
        sql.format_quoted("PRAGMA table_info(%Q)", table)?;

        let mut record = self.exec_query(sql.as_str())?;
        while !record.eof()? {
            if record
                .string_field("name", "")?
                .eq_ignore_ascii_case(column)
            {
                return Ok(true);
            }
            record.next_row()?;
        }
        Ok(false)
    }

    /// Rowid of the most recent successful insert on this connection.
    pub fn last_row_id(&self) -> Result<i64> {
        self.check_db()?;
        // SAFETY: db is live
        Ok(unsafe { ffi::sqlite3_last_insert_rowid(self.db) })
    }

    /// Rows changed by the most recent statement.
    pub fn changes(&self) -> Result<c_int> {
        self.check_db()?;
        // SAFETY: db is live
        Ok(unsafe { ffi::sqlite3_changes(self.db) })
    }

    /// Rows changed since the connection was opened.
    pub fn total_changes(&self) -> Result<c_int> {
        self.check_db()?;
        // SAFETY: db is live
        Ok(unsafe { ffi::sqlite3_total_changes(self.db) })
    }

    /// Set the lock-wait budget for this connection. Affects every
    /// subsequent statement execution on the connection.
    pub fn set_busy_timeout(&mut self, ms: c_int) -> Result<()> {
        self.busy_timeout_ms = ms;
        if !self.db.is_null() {
            // SAFETY: db is live
            let rc = unsafe { ffi::sqlite3_busy_timeout(self.db, ms) };
            if rc != ffi::SQLITE_OK {
                return Err(SqliteError::from_handle(self.db, rc));
            }
        }
        Ok(())
    }

    /// The currently configured busy timeout in milliseconds.
    pub fn busy_timeout_ms(&self) -> c_int {
        self.busy_timeout_ms
    }

    /// Ask the engine to abort the statement currently running on this
    /// connection. The interrupted statement fails with an interrupt
    /// status.
    pub fn interrupt(&self) -> Result<()> {
        self.check_db()?;
        // SAFETY: db is live
        unsafe { ffi::sqlite3_interrupt(self.db) };
        Ok(())
    }

    fn check_db(&self) -> Result<()> {
        if self.db.is_null() {
            return Err(SqliteError::misuse("Database is not open"));
        }
        Ok(())
    }

    fn compile(&self, sql: &str) -> Result<*mut ffi::sqlite3_stmt> {
        self.check_db()?;
        let c_sql =
            CString::new(sql).map_err(|_| SqliteError::misuse("SQL contains a NUL byte"))?;

        let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
        // SAFETY: all pointers are valid; the return value is checked
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(
                self.db,
                c_sql.as_ptr(),
                c_sql.as_bytes().len() as c_int,
                &mut stmt,
                ptr::null_mut(),
            )
        };

        if rc != ffi::SQLITE_OK {
            return Err(SqliteError::from_handle(self.db, rc));
        }
        Ok(stmt)
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if !self.db.is_null() {
            // SAFETY: db is live and owned by this wrapper
            let rc = unsafe { ffi::sqlite3_close_v2(self.db) };
            if rc != ffi::SQLITE_OK {
                tracing::debug!(code = rc, "connection release failed during drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KIT_ERROR;

    #[test]
    fn test_open_memory_applies_default_timeout() {
        let conn = Database::open_memory().unwrap();
        assert!(conn.is_open());
        assert_eq!(conn.busy_timeout_ms(), DEFAULT_BUSY_TIMEOUT_MS);
    }

    #[test]
    fn test_exec_dml_and_metadata() {
        let conn = Database::open_memory().unwrap();
        conn.exec_dml("CREATE TABLE test (id INTEGER PRIMARY KEY, name TEXT)")
            .unwrap();
        let changed = conn
            .exec_dml("INSERT INTO test (name) VALUES ('Alice'), ('Bob')")
            .unwrap();
        assert_eq!(changed, 2);
        assert_eq!(conn.changes().unwrap(), 2);
        assert_eq!(conn.total_changes().unwrap(), 2);
        assert_eq!(conn.last_row_id().unwrap(), 2);
    }

    #[test]
    fn test_exec_dml_reports_engine_error() {
        let conn = Database::open_memory().unwrap();
        let err = conn.exec_dml("NOT VALID SQL").unwrap_err();
        assert_eq!(err.code(), ffi::SQLITE_ERROR);
        assert!(err.message().starts_with("SQLITE_ERROR[1]:"));
    }

    #[test]
    fn test_compile_error_frees_nothing_and_reports() {
        let conn = Database::open_memory().unwrap();
        let err = conn.compile_statement("SELECT * FROM missing").unwrap_err();
        assert_eq!(err.code(), ffi::SQLITE_ERROR);
        assert!(err.message().contains("missing"));
    }

    #[test]
    fn test_exec_scalar_and_null_sentinel() {
        let conn = Database::open_memory().unwrap();
        conn.exec_dml("CREATE TABLE t (v INTEGER)").unwrap();
        conn.exec_dml("INSERT INTO t VALUES (41)").unwrap();

        assert_eq!(conn.exec_scalar("SELECT v FROM t", 0).unwrap(), 41);
        assert_eq!(conn.exec_scalar("SELECT NULL", -5).unwrap(), -5);

        let err = conn.exec_scalar("SELECT v FROM t WHERE 0", 0).unwrap_err();
        assert_eq!(err.code(), KIT_ERROR);
        assert!(err.message().contains("Invalid scalar query"));
    }

    #[test]
    fn test_table_and_column_exists() {
        let conn = Database::open_memory().unwrap();
        conn.exec_dml("CREATE TABLE emp (id INTEGER, Name TEXT)").unwrap();

        assert!(conn.table_exists("emp").unwrap());
        assert!(!conn.table_exists("emp2").unwrap());
        // Quoting keeps hostile names inert.
        assert!(!conn.table_exists("emp' OR '1'='1").unwrap());

        assert!(conn.column_exists("emp", "id").unwrap());
        // Column comparison is case-insensitive.
        assert!(conn.column_exists("emp", "name").unwrap());
        assert!(conn.column_exists("emp", "NAME").unwrap());
        assert!(!conn.column_exists("emp", "salary").unwrap());
    }

    #[test]
    fn test_close_is_idempotent_and_blocks_use() {
        let mut conn = Database::open_memory().unwrap();
        conn.close().unwrap();
        assert!(!conn.is_open());
        conn.close().unwrap();

        let err = conn.exec_dml("SELECT 1").unwrap_err();
        assert_eq!(err.code(), KIT_ERROR);
        assert!(conn.last_row_id().is_err());
        assert!(conn.exec_query("SELECT 1").is_err());
    }

    #[test]
    fn test_set_busy_timeout_updates_field() {
        let mut conn = Database::open_memory().unwrap();
        conn.set_busy_timeout(250).unwrap();
        assert_eq!(conn.busy_timeout_ms(), 250);
    }

    #[test]
    fn test_open_with_flags_read_only() {
        let tmp = std::env::temp_dir().join("sqlitekit_flags_test.db");
        let _ = std::fs::remove_file(&tmp);
        let path = tmp.to_string_lossy().into_owned();

        {
            let conn =
                Database::open_with_flags(&path, OpenFlags::create_read_write(), None).unwrap();
            conn.exec_dml("CREATE TABLE t (id INTEGER)").unwrap();
        }

        let conn = Database::open_with_flags(&path, OpenFlags::read_only(), None).unwrap();
        assert_eq!(conn.exec_scalar("SELECT count(*) FROM t", 0).unwrap(), 0);
        let err = conn.exec_dml("INSERT INTO t VALUES (1)").unwrap_err();
        assert_eq!(err.code(), ffi::SQLITE_READONLY);

        drop(conn);
        let _ = std::fs::remove_file(&tmp);
    }

    #[test]
    fn test_open_failure_reports_error() {
        let err =
            Database::open_with_flags("/no/such/dir/db.sqlite", OpenFlags::read_write(), None)
                .unwrap_err();
        assert_eq!(err.code(), ffi::SQLITE_CANTOPEN);
    }

    #[test]
    fn test_get_table_error_surface() {
        let conn = Database::open_memory().unwrap();
        let err = conn.get_table("SELECT * FROM nothing").unwrap_err();
        assert_eq!(err.code(), ffi::SQLITE_ERROR);
    }
}
