//! Prepared-statement ownership, parameter binding, and execution.

use crate::connection::Database;
use crate::cursor::Cursor;
use crate::error::{Result, SqliteError};
use crate::ffi;
use std::ffi::c_int;
use std::marker::PhantomData;

/// Exclusive owner of a compiled statement handle.
///
/// Created by [`Database::compile_statement`]. The handle is released
/// exactly once: by [`finalize`](Statement::finalize) or on drop, whichever
/// comes first. Parameters are bound by 1-based index; the engine copies
/// every bound value immediately, so callers keep ownership of their
/// buffers.
#[derive(Debug)]
pub struct Statement<'db> {
    db: *mut ffi::sqlite3,
    stmt: *mut ffi::sqlite3_stmt,
    _conn: PhantomData<&'db Database>,
}

impl<'db> Statement<'db> {
    pub(crate) fn new(db: *mut ffi::sqlite3, stmt: *mut ffi::sqlite3_stmt) -> Self {
        Self {
            db,
            stmt,
            _conn: PhantomData,
        }
    }

    /// Bind a text parameter.
    pub fn bind_text(&mut self, index: c_int, value: &str) -> Result<()> {
        self.check_stmt()?;
        let bytes = value.as_bytes();
        // SAFETY: stmt is live; SQLITE_TRANSIENT makes the engine copy the
        // buffer before returning.
        let rc = unsafe {
            ffi::sqlite3_bind_text(
                self.stmt,
                index,
                bytes.as_ptr().cast(),
                bytes.len() as c_int,
                ffi::SQLITE_TRANSIENT,
            )
        };
        self.check_bind(rc)
    }

    /// Bind a 32-bit integer parameter.
    pub fn bind_int(&mut self, index: c_int, value: i32) -> Result<()> {
        self.check_stmt()?;
        // SAFETY: stmt is live
        let rc = unsafe { ffi::sqlite3_bind_int(self.stmt, index, value) };
        self.check_bind(rc)
    }

    /// Bind a 64-bit integer parameter.
    pub fn bind_int64(&mut self, index: c_int, value: i64) -> Result<()> {
        self.check_stmt()?;
        // SAFETY: stmt is live
        let rc = unsafe { ffi::sqlite3_bind_int64(self.stmt, index, value) };
        self.check_bind(rc)
    }

    /// Bind a floating-point parameter.
    pub fn bind_double(&mut self, index: c_int, value: f64) -> Result<()> {
        self.check_stmt()?;
        // SAFETY: stmt is live
        let rc = unsafe { ffi::sqlite3_bind_double(self.stmt, index, value) };
        self.check_bind(rc)
    }

    /// Bind a blob parameter.
    pub fn bind_blob(&mut self, index: c_int, value: &[u8]) -> Result<()> {
        self.check_stmt()?;
        // SAFETY: stmt is live; SQLITE_TRANSIENT makes the engine copy the
        // buffer before returning.
        let rc = unsafe {
            ffi::sqlite3_bind_blob(
                self.stmt,
                index,
                value.as_ptr().cast(),
                value.len() as c_int,
                ffi::SQLITE_TRANSIENT,
            )
        };
        self.check_bind(rc)
    }

    /// Bind an explicit SQL NULL.
    pub fn bind_null(&mut self, index: c_int) -> Result<()> {
        self.check_stmt()?;
        // SAFETY: stmt is live
        let rc = unsafe { ffi::sqlite3_bind_null(self.stmt, index) };
        self.check_bind(rc)
    }

    /// Number of parameter slots in the compiled statement.
    pub fn parameter_count(&self) -> Result<c_int> {
        self.check_stmt()?;
        // SAFETY: stmt is live
        Ok(unsafe { ffi::sqlite3_bind_parameter_count(self.stmt) })
    }

    /// Step the statement to completion and return the affected-row count.
    /// The statement is reset on both success and failure, so it can be
    /// re-executed with fresh bindings.
    pub fn exec_dml(&mut self) -> Result<c_int> {
        self.check_stmt()?;
        // SAFETY: stmt is live throughout; reset leaves the handle valid
        unsafe {
            let rc = ffi::sqlite3_step(self.stmt);
            if rc == ffi::SQLITE_DONE {
                let changed = ffi::sqlite3_changes(self.db);
                let rc = ffi::sqlite3_reset(self.stmt);
                if rc != ffi::SQLITE_OK {
                    return Err(SqliteError::from_handle(self.db, rc));
                }
                tracing::trace!(changed, "statement executed");
                Ok(changed)
            } else {
                let rc = ffi::sqlite3_reset(self.stmt);
                Err(SqliteError::from_handle(self.db, rc))
            }
        }
    }

    /// Step once and hand the pending rows to a borrowing [`Cursor`]. The
    /// statement keeps ownership of the handle; the cursor is pinned to this
    /// borrow and never releases it. A failed first step resets the
    /// statement and leaves it usable.
    pub fn exec_query(&mut self) -> Result<Cursor<'_>> {
        self.check_stmt()?;
        // SAFETY: stmt is live throughout
        unsafe {
            let rc = ffi::sqlite3_step(self.stmt);
            match rc {
                ffi::SQLITE_DONE => Ok(Cursor::new(self.db, self.stmt, true, false)),
                ffi::SQLITE_ROW => Ok(Cursor::new(self.db, self.stmt, false, false)),
                _ => {
                    let rc = ffi::sqlite3_reset(self.stmt);
                    Err(SqliteError::from_handle(self.db, rc))
                }
            }
        }
    }

    /// Clear execution state without destroying the compiled form.
    pub fn reset(&mut self) -> Result<()> {
        if !self.stmt.is_null() {
            // SAFETY: stmt is live
            let rc = unsafe { ffi::sqlite3_reset(self.stmt) };
            if rc != ffi::SQLITE_OK {
                return Err(SqliteError::from_handle(self.db, rc));
            }
        }
        Ok(())
    }

    /// Reset all parameter slots to NULL.
    pub fn clear_bindings(&mut self) -> Result<()> {
        if !self.stmt.is_null() {
            // SAFETY: stmt is live
            let rc = unsafe { ffi::sqlite3_clear_bindings(self.stmt) };
            if rc != ffi::SQLITE_OK {
                return Err(SqliteError::from_handle(self.db, rc));
            }
        }
        Ok(())
    }

    /// Release the handle now instead of at drop. Safe to call repeatedly.
    pub fn finalize(&mut self) -> Result<()> {
        if !self.stmt.is_null() {
            // SAFETY: stmt is live; the pointer is cleared before the error
            // check so release happens exactly once.
            let rc = unsafe { ffi::sqlite3_finalize(self.stmt) };
            self.stmt = std::ptr::null_mut();
            if rc != ffi::SQLITE_OK {
                return Err(SqliteError::from_handle(self.db, rc));
            }
        }
        Ok(())
    }

    /// Whether the statement still holds its handle.
    pub fn is_valid(&self) -> bool {
        !self.stmt.is_null()
    }

    fn check_stmt(&self) -> Result<()> {
        if self.stmt.is_null() {
            return Err(SqliteError::misuse("Statement has been finalized"));
        }
        Ok(())
    }

    fn check_bind(&self, rc: c_int) -> Result<()> {
        if rc != ffi::SQLITE_OK {
            return Err(SqliteError::from_handle(self.db, rc));
        }
        Ok(())
    }
}

impl Drop for Statement<'_> {
    fn drop(&mut self) {
        if !self.stmt.is_null() {
            // SAFETY: stmt is live and owned by this wrapper
            let rc = unsafe { ffi::sqlite3_finalize(self.stmt) };
            if rc != ffi::SQLITE_OK {
                tracing::debug!(code = rc, "statement release failed during drop");
            }
        }
    }
}
