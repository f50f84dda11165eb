//! Forward-only iteration over a statement's result rows.
//!
//! A [`Cursor`] either owns its statement handle (produced by
//! [`Database::exec_query`](crate::Database::exec_query)) or borrows one
//! that a [`Statement`](crate::Statement) still owns (produced by
//! [`Statement::exec_query`](crate::Statement::exec_query)). Only an owning
//! cursor releases the handle; the borrow case is pinned by lifetime so the
//! two owners can never coexist.

use crate::error::{Result, SqliteError};
use crate::ffi;
use std::ffi::{CStr, c_int};
use std::marker::PhantomData;

/// Selects a result column by 0-based index or by name.
///
/// Name resolution is a case-sensitive linear scan over the column names.
#[derive(Debug, Clone, Copy)]
pub enum Field<'a> {
    /// 0-based column index.
    Index(c_int),
    /// Column name, matched exactly.
    Name(&'a str),
}

impl From<c_int> for Field<'static> {
    fn from(index: c_int) -> Self {
        Field::Index(index)
    }
}

impl<'a> From<&'a str> for Field<'a> {
    fn from(name: &'a str) -> Self {
        Field::Name(name)
    }
}

/// An active iteration handle over a statement's pending rows.
pub struct Cursor<'a> {
    db: *mut ffi::sqlite3,
    stmt: *mut ffi::sqlite3_stmt,
    owns_stmt: bool,
    eof: bool,
    cols: c_int,
    _source: PhantomData<&'a ()>,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(
        db: *mut ffi::sqlite3,
        stmt: *mut ffi::sqlite3_stmt,
        eof: bool,
        owns_stmt: bool,
    ) -> Self {
        // SAFETY: stmt is a live prepared statement; the column count is
        // fixed for the statement's lifetime.
        let cols = unsafe { ffi::sqlite3_column_count(stmt) };
        Self {
            db,
            stmt,
            owns_stmt,
            eof,
            cols,
            _source: PhantomData,
        }
    }

    /// Whether the cursor still references a handle. A cursor becomes
    /// invalid after a step failure or an owning `finalize`.
    pub fn is_valid(&self) -> bool {
        !self.stmt.is_null()
    }

    /// Whether all rows have been consumed.
    pub fn eof(&self) -> Result<bool> {
        self.check_stmt()?;
        Ok(self.eof)
    }

    /// Number of result columns, fixed at construction.
    pub fn num_fields(&self) -> Result<c_int> {
        self.check_stmt()?;
        Ok(self.cols)
    }

    /// Advance to the next row. On any engine status other than
    /// row-available or done, the handle is released (owning) or reset
    /// (borrowing), the cursor becomes invalid, and the engine error is
    /// returned.
    pub fn next_row(&mut self) -> Result<()> {
        self.check_stmt()?;
        // SAFETY: stmt is live, checked above
        let rc = unsafe { ffi::sqlite3_step(self.stmt) };
        match rc {
            ffi::SQLITE_DONE => {
                self.eof = true;
                Ok(())
            }
            ffi::SQLITE_ROW => Ok(()),
            _ => {
                // SAFETY: stmt is live; it is released or reset exactly once
                // here and the pointer is cleared so no later use can occur.
                let rc = unsafe {
                    if self.owns_stmt {
                        ffi::sqlite3_finalize(self.stmt)
                    } else {
                        ffi::sqlite3_reset(self.stmt)
                    }
                };
                self.stmt = std::ptr::null_mut();
                Err(SqliteError::from_handle(self.db, rc))
            }
        }
    }

    /// Resolve a column name to its index. Case-sensitive.
    pub fn field_index(&self, name: &str) -> Result<c_int> {
        self.check_stmt()?;
        for i in 0..self.cols {
            // SAFETY: stmt is live and i is in range
            let col = unsafe { ffi::sqlite3_column_name(self.stmt, i) };
            if !col.is_null() {
                // SAFETY: column_name returns a valid C string
                let col = unsafe { CStr::from_ptr(col) };
                if col.to_bytes() == name.as_bytes() {
                    return Ok(i);
                }
            }
        }
        Err(SqliteError::misuse("Invalid field name requested"))
    }

    /// Name of the column at `index`.
    pub fn field_name(&self, index: c_int) -> Result<&str> {
        let index = self.check_index(index)?;
        // SAFETY: stmt is live and index is in range
        let ptr = unsafe { ffi::sqlite3_column_name(self.stmt, index) };
        if ptr.is_null() {
            return Err(SqliteError::misuse("Invalid field index requested"));
        }
        // SAFETY: column_name returns a valid C string owned by the statement
        unsafe { CStr::from_ptr(ptr) }
            .to_str()
            .map_err(|_| SqliteError::misuse("Field name is not valid UTF-8"))
    }

    /// Declared type of the column at `index`, if the column has one.
    pub fn field_decl_type(&self, index: c_int) -> Result<Option<&str>> {
        let index = self.check_index(index)?;
        // SAFETY: stmt is live and index is in range
        let ptr = unsafe { ffi::sqlite3_column_decltype(self.stmt, index) };
        if ptr.is_null() {
            return Ok(None);
        }
        // SAFETY: column_decltype returns a valid C string
        unsafe { CStr::from_ptr(ptr) }
            .to_str()
            .map(Some)
            .map_err(|_| SqliteError::misuse("Declared type is not valid UTF-8"))
    }

    /// Engine-reported storage class of the field in the current row
    /// (`SQLITE_INTEGER`, `SQLITE_FLOAT`, `SQLITE_TEXT`, `SQLITE_BLOB`, or
    /// `SQLITE_NULL`).
    pub fn field_data_type<'f>(&self, field: impl Into<Field<'f>>) -> Result<c_int> {
        let index = self.resolve(field.into())?;
        // SAFETY: stmt is live and index is in range
        Ok(unsafe { ffi::sqlite3_column_type(self.stmt, index) })
    }

    /// Whether the field in the current row is SQL NULL.
    pub fn field_is_null<'f>(&self, field: impl Into<Field<'f>>) -> Result<bool> {
        Ok(self.field_data_type(field)? == ffi::SQLITE_NULL)
    }

    /// The field as text, or `None` when it is SQL NULL.
    pub fn field_value<'f>(&self, field: impl Into<Field<'f>>) -> Result<Option<&str>> {
        let index = self.resolve(field.into())?;
        // SAFETY: stmt is live and index is in range
        if unsafe { ffi::sqlite3_column_type(self.stmt, index) } == ffi::SQLITE_NULL {
            return Ok(None);
        }
        self.text_at(index).map(Some)
    }

    /// Integer field with null substitution.
    pub fn int_field<'f>(&self, field: impl Into<Field<'f>>, null_value: c_int) -> Result<c_int> {
        let index = self.resolve(field.into())?;
        // SAFETY: stmt is live and index is in range
        unsafe {
            if ffi::sqlite3_column_type(self.stmt, index) == ffi::SQLITE_NULL {
                Ok(null_value)
            } else {
                Ok(ffi::sqlite3_column_int(self.stmt, index))
            }
        }
    }

    /// 64-bit integer field with null substitution.
    pub fn int64_field<'f>(&self, field: impl Into<Field<'f>>, null_value: i64) -> Result<i64> {
        let index = self.resolve(field.into())?;
        // SAFETY: stmt is live and index is in range
        unsafe {
            if ffi::sqlite3_column_type(self.stmt, index) == ffi::SQLITE_NULL {
                Ok(null_value)
            } else {
                Ok(ffi::sqlite3_column_int64(self.stmt, index))
            }
        }
    }

    /// Floating-point field with null substitution.
    pub fn double_field<'f>(&self, field: impl Into<Field<'f>>, null_value: f64) -> Result<f64> {
        let index = self.resolve(field.into())?;
        // SAFETY: stmt is live and index is in range
        unsafe {
            if ffi::sqlite3_column_type(self.stmt, index) == ffi::SQLITE_NULL {
                Ok(null_value)
            } else {
                Ok(ffi::sqlite3_column_double(self.stmt, index))
            }
        }
    }

    /// Text field with null substitution.
    pub fn string_field<'f, 's>(
        &'s self,
        field: impl Into<Field<'f>>,
        null_value: &'s str,
    ) -> Result<&'s str> {
        let index = self.resolve(field.into())?;
        // SAFETY: stmt is live and index is in range
        if unsafe { ffi::sqlite3_column_type(self.stmt, index) } == ffi::SQLITE_NULL {
            Ok(null_value)
        } else {
            self.text_at(index)
        }
    }

    /// Blob field contents; a NULL or empty blob is an empty slice.
    pub fn blob_field<'f>(&self, field: impl Into<Field<'f>>) -> Result<&[u8]> {
        let index = self.resolve(field.into())?;
        // SAFETY: stmt is live and index is in range; the blob pointer stays
        // valid until the next step or finalize, which both need &mut self.
        unsafe {
            let ptr = ffi::sqlite3_column_blob(self.stmt, index);
            let len = ffi::sqlite3_column_bytes(self.stmt, index);
            if ptr.is_null() || len <= 0 {
                Ok(&[])
            } else {
                Ok(std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize))
            }
        }
    }

    /// Release the handle early if this cursor owns it. A no-op for
    /// borrowing cursors and on repeated calls.
    pub fn finalize(&mut self) -> Result<()> {
        if !self.stmt.is_null() && self.owns_stmt {
            // SAFETY: stmt is live and owned; the pointer is cleared before
            // the error check so release happens exactly once.
            let rc = unsafe { ffi::sqlite3_finalize(self.stmt) };
            self.stmt = std::ptr::null_mut();
            if rc != ffi::SQLITE_OK {
                return Err(SqliteError::from_handle(self.db, rc));
            }
        }
        Ok(())
    }

    fn check_stmt(&self) -> Result<()> {
        if self.stmt.is_null() {
            return Err(SqliteError::misuse("Cursor is no longer valid"));
        }
        Ok(())
    }

    fn check_index(&self, index: c_int) -> Result<c_int> {
        self.check_stmt()?;
        if index < 0 || index >= self.cols {
            return Err(SqliteError::misuse("Invalid field index requested"));
        }
        Ok(index)
    }

    fn resolve(&self, field: Field<'_>) -> Result<c_int> {
        match field {
            Field::Index(index) => self.check_index(index),
            Field::Name(name) => self.field_index(name),
        }
    }

    fn text_at(&self, index: c_int) -> Result<&str> {
        // SAFETY: stmt is live and index is in range; column_bytes reports
        // the text length so embedded NULs survive.
        unsafe {
            let ptr = ffi::sqlite3_column_text(self.stmt, index);
            if ptr.is_null() {
                return Ok("");
            }
            let len = ffi::sqlite3_column_bytes(self.stmt, index);
            let bytes = std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize);
            std::str::from_utf8(bytes)
                .map_err(|_| SqliteError::misuse("Field text is not valid UTF-8"))
        }
    }
}

impl Drop for Cursor<'_> {
    fn drop(&mut self) {
        if self.owns_stmt && !self.stmt.is_null() {
            // SAFETY: stmt is live and owned by this cursor
            let rc = unsafe { ffi::sqlite3_finalize(self.stmt) };
            if rc != ffi::SQLITE_OK {
                tracing::debug!(code = rc, "statement release failed during cursor drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Database;

    fn seeded_db() -> Database {
        let db = Database::open_memory().unwrap();
        db.exec_dml("CREATE TABLE people (id INTEGER, name TEXT, score REAL, photo BLOB)")
            .unwrap();
        db.exec_dml("INSERT INTO people VALUES (1, 'ada', 9.5, x'0102')")
            .unwrap();
        db.exec_dml("INSERT INTO people VALUES (2, NULL, NULL, NULL)")
            .unwrap();
        db
    }

    #[test]
    fn test_iteration_and_typed_access() {
        let db = seeded_db();
        let mut q = db.exec_query("SELECT * FROM people ORDER BY id").unwrap();

        assert!(!q.eof().unwrap());
        assert_eq!(q.num_fields().unwrap(), 4);
        assert_eq!(q.int_field(0, -1).unwrap(), 1);
        assert_eq!(q.string_field("name", "<null>").unwrap(), "ada");
        assert!((q.double_field("score", 0.0).unwrap() - 9.5).abs() < f64::EPSILON);
        assert_eq!(q.blob_field("photo").unwrap(), &[0x01, 0x02]);

        q.next_row().unwrap();
        assert!(!q.eof().unwrap());
        assert!(q.field_is_null("name").unwrap());
        assert_eq!(q.string_field("name", "<null>").unwrap(), "<null>");
        assert_eq!(q.int_field("id", -1).unwrap(), 2);
        assert_eq!(q.int64_field("score", -7).unwrap(), -7);
        assert_eq!(q.field_value("name").unwrap(), None);

        q.next_row().unwrap();
        assert!(q.eof().unwrap());
    }

    #[test]
    fn test_empty_result_starts_exhausted_with_column_count() {
        let db = seeded_db();
        let q = db.exec_query("SELECT * FROM people WHERE 0").unwrap();
        assert!(q.eof().unwrap());
        assert_eq!(q.num_fields().unwrap(), 4);
    }

    #[test]
    fn test_field_lookup_is_case_sensitive() {
        let db = seeded_db();
        let q = db.exec_query("SELECT * FROM people").unwrap();
        assert_eq!(q.field_index("name").unwrap(), 1);
        let err = q.field_index("NAME").unwrap_err();
        assert_eq!(err.code(), crate::error::KIT_ERROR);
    }

    #[test]
    fn test_index_out_of_range() {
        let db = seeded_db();
        let q = db.exec_query("SELECT id FROM people").unwrap();
        assert!(q.int_field(1, 0).is_err());
        assert!(q.field_name(-1).is_err());
        assert!(q.field_name(0).is_ok());
    }

    #[test]
    fn test_metadata_accessors() {
        let db = seeded_db();
        let q = db.exec_query("SELECT id, name, id + 1 FROM people").unwrap();
        assert_eq!(q.field_name(0).unwrap(), "id");
        assert_eq!(q.field_decl_type(0).unwrap(), Some("INTEGER"));
        assert_eq!(q.field_decl_type(2).unwrap(), None);
        assert_eq!(q.field_data_type("id").unwrap(), ffi::SQLITE_INTEGER);
        assert_eq!(q.field_data_type(1).unwrap(), ffi::SQLITE_TEXT);
    }

    #[test]
    fn test_finalize_is_idempotent_and_invalidates() {
        let db = seeded_db();
        let mut q = db.exec_query("SELECT * FROM people").unwrap();
        q.finalize().unwrap();
        assert!(!q.is_valid());
        q.finalize().unwrap();
        assert!(q.eof().is_err());
        assert!(q.int_field(0, 0).is_err());
    }
}
