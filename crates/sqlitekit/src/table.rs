//! Eagerly materialized query results with random row access.
//!
//! A [`ResultTable`] owns the string array produced by
//! `sqlite3_get_table`: row 0 holds the column names and data rows follow,
//! each cell either a text value or a null pointer for SQL NULL. Rows are
//! exposed 0-based; internally the header row keeps the array 1-based for
//! data, and field lookup uses the `(row * cols) + cols + field` offset
//! that convention implies.

use crate::cursor::Field;
use crate::error::{Result, SqliteError};
use crate::ffi;
use std::ffi::{CStr, c_char, c_int};

/// Exclusive owner of a fully fetched result snapshot.
#[derive(Debug)]
pub struct ResultTable {
    results: *mut *mut c_char,
    rows: c_int,
    cols: c_int,
    current_row: c_int,
}

impl ResultTable {
    pub(crate) fn new(results: *mut *mut c_char, rows: c_int, cols: c_int) -> Self {
        Self {
            results,
            rows,
            cols,
            current_row: 0,
        }
    }

    /// Number of data rows (the header row is not counted).
    pub fn num_rows(&self) -> Result<c_int> {
        self.check_results()?;
        Ok(self.rows)
    }

    /// Number of columns.
    pub fn num_fields(&self) -> Result<c_int> {
        self.check_results()?;
        Ok(self.cols)
    }

    /// Position on a data row, 0-based. Fails when out of range.
    pub fn set_row(&mut self, row: c_int) -> Result<()> {
        self.check_results()?;
        if row < 0 || row >= self.rows {
            return Err(SqliteError::misuse("Invalid row index requested"));
        }
        self.current_row = row;
        Ok(())
    }

    /// Name of the column at `index`, from the header row.
    pub fn field_name(&self, index: c_int) -> Result<&str> {
        self.check_results()?;
        if index < 0 || index >= self.cols {
            return Err(SqliteError::misuse("Invalid field index requested"));
        }
        // Header entries are never null.
        self.entry_str(index as usize)?
            .ok_or_else(|| SqliteError::misuse("Invalid field index requested"))
    }

    /// The field in the current row as text, or `None` for SQL NULL.
    pub fn field_value<'f>(&self, field: impl Into<Field<'f>>) -> Result<Option<&str>> {
        let index = self.resolve(field.into())?;
        let offset = (self.current_row as usize * self.cols as usize)
            + self.cols as usize
            + index as usize;
        self.entry_str(offset)
    }

    /// Whether the field in the current row is SQL NULL.
    pub fn field_is_null<'f>(&self, field: impl Into<Field<'f>>) -> Result<bool> {
        Ok(self.field_value(field)?.is_none())
    }

    /// Integer field with null substitution.
    pub fn int_field<'f>(&self, field: impl Into<Field<'f>>, null_value: c_int) -> Result<c_int> {
        match self.field_value(field)? {
            None => Ok(null_value),
            Some(text) => Ok(text.trim().parse().unwrap_or(0)),
        }
    }

    /// 64-bit integer field with null substitution.
    pub fn int64_field<'f>(&self, field: impl Into<Field<'f>>, null_value: i64) -> Result<i64> {
        match self.field_value(field)? {
            None => Ok(null_value),
            Some(text) => Ok(text.trim().parse().unwrap_or(0)),
        }
    }

    /// Floating-point field with null substitution.
    pub fn double_field<'f>(&self, field: impl Into<Field<'f>>, null_value: f64) -> Result<f64> {
        match self.field_value(field)? {
            None => Ok(null_value),
            Some(text) => Ok(text.trim().parse().unwrap_or(0.0)),
        }
    }

    /// Text field with null substitution.
    pub fn string_field<'f, 's>(
        &'s self,
        field: impl Into<Field<'f>>,
        null_value: &'s str,
    ) -> Result<&'s str> {
        Ok(self.field_value(field)?.unwrap_or(null_value))
    }

    /// Release the snapshot now instead of at drop. Safe to call repeatedly.
    pub fn finalize(&mut self) -> Result<()> {
        if !self.results.is_null() {
            // SAFETY: results came from sqlite3_get_table and is owned here;
            // the pointer is cleared so release happens exactly once.
            unsafe { ffi::sqlite3_free_table(self.results) };
            self.results = std::ptr::null_mut();
        }
        Ok(())
    }

    /// Whether the snapshot is still held.
    pub fn is_valid(&self) -> bool {
        !self.results.is_null()
    }

    fn check_results(&self) -> Result<()> {
        if self.results.is_null() {
            return Err(SqliteError::misuse("Table has been finalized"));
        }
        Ok(())
    }

    fn resolve(&self, field: Field<'_>) -> Result<c_int> {
        self.check_results()?;
        match field {
            Field::Index(index) => {
                if index < 0 || index >= self.cols {
                    return Err(SqliteError::misuse("Invalid field index requested"));
                }
                Ok(index)
            }
            Field::Name(name) => {
                for i in 0..self.cols {
                    if self.entry_str(i as usize)? == Some(name) {
                        return Ok(i);
                    }
                }
                Err(SqliteError::misuse("Invalid field name requested"))
            }
        }
    }

    fn entry_str(&self, offset: usize) -> Result<Option<&str>> {
        // SAFETY: offset is within the (rows + 1) * cols array owned by
        // self; null entries mark SQL NULL.
        let ptr = unsafe { *self.results.add(offset) };
        if ptr.is_null() {
            return Ok(None);
        }
        // SAFETY: non-null entries are valid C strings owned by the snapshot
        unsafe { CStr::from_ptr(ptr) }
            .to_str()
            .map(Some)
            .map_err(|_| SqliteError::misuse("Field text is not valid UTF-8"))
    }
}

impl Drop for ResultTable {
    fn drop(&mut self) {
        if !self.results.is_null() {
            // SAFETY: results is owned by this wrapper
            unsafe { ffi::sqlite3_free_table(self.results) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Database;

    fn snapshot() -> (Database, ResultTable) {
        let db = Database::open_memory().unwrap();
        db.exec_dml("CREATE TABLE t (id INTEGER, name TEXT, score REAL)")
            .unwrap();
        db.exec_dml("INSERT INTO t VALUES (1, 'ada', 1.5)").unwrap();
        db.exec_dml("INSERT INTO t VALUES (2, NULL, NULL)").unwrap();
        db.exec_dml("INSERT INTO t VALUES (3, 'grace', 3.25)").unwrap();
        let table = db.get_table("SELECT * FROM t ORDER BY id").unwrap();
        (db, table)
    }

    #[test]
    fn test_dimensions_and_header() {
        let (_db, table) = snapshot();
        assert_eq!(table.num_rows().unwrap(), 3);
        assert_eq!(table.num_fields().unwrap(), 3);
        assert_eq!(table.field_name(0).unwrap(), "id");
        assert_eq!(table.field_name(2).unwrap(), "score");
        assert!(table.field_name(3).is_err());
    }

    #[test]
    fn test_row_positioning_and_access() {
        let (_db, mut table) = snapshot();

        assert_eq!(table.int_field("id", -1).unwrap(), 1);
        assert_eq!(table.string_field("name", "<null>").unwrap(), "ada");

        table.set_row(2).unwrap();
        assert_eq!(table.int_field(0, -1).unwrap(), 3);
        assert!((table.double_field("score", 0.0).unwrap() - 3.25).abs() < f64::EPSILON);

        table.set_row(1).unwrap();
        assert!(table.field_is_null("name").unwrap());
        assert_eq!(table.field_value("name").unwrap(), None);
        assert_eq!(table.string_field("name", "<null>").unwrap(), "<null>");
        assert_eq!(table.int64_field("score", -9).unwrap(), -9);
    }

    #[test]
    fn test_set_row_out_of_range() {
        let (_db, mut table) = snapshot();
        assert!(table.set_row(-1).is_err());
        assert!(table.set_row(3).is_err());
        table.set_row(0).unwrap();
    }

    #[test]
    fn test_name_lookup_is_case_sensitive() {
        let (_db, table) = snapshot();
        assert!(table.field_value("NAME").is_err());
        assert!(table.field_value("name").is_ok());
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let (_db, mut table) = snapshot();
        table.finalize().unwrap();
        assert!(!table.is_valid());
        table.finalize().unwrap();
        assert!(table.num_rows().is_err());
        assert!(table.field_value(0).is_err());
    }

    #[test]
    fn test_empty_result_has_header_only() {
        let db = Database::open_memory().unwrap();
        db.exec_dml("CREATE TABLE t (a, b)").unwrap();
        let table = db.get_table("SELECT * FROM t").unwrap();
        assert_eq!(table.num_rows().unwrap(), 0);
        assert_eq!(table.num_fields().unwrap(), 2);
        assert_eq!(table.field_name(1).unwrap(), "b");
    }
}
