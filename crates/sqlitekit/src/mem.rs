//! Engine-heap buffer ownership and `%Q`-quoted SQL formatting.
//!
//! [`SqliteMemory`] exclusively owns an allocation made by `sqlite3_malloc`
//! (or handed back by `sqlite3_mprintf`) and releases it exactly once.
//! [`SqlBuffer`] builds SQL text with the engine's formatter so that text
//! arguments are quoted and escaped by SQLite itself.

use crate::error::{Result, SqliteError};
use crate::ffi;
use std::ffi::{CString, c_char, c_int, c_void};
use std::fmt;

/// An exclusively-owned buffer on the engine heap.
///
/// Invariant: the pointer is null iff the length is zero. The buffer is
/// move-only; a deep copy is available through [`SqliteMemory::try_clone`].
#[derive(Debug)]
pub struct SqliteMemory {
    ptr: *mut c_void,
    len: usize,
}

impl SqliteMemory {
    /// An empty buffer. Does not allocate.
    pub fn new() -> Self {
        Self {
            ptr: std::ptr::null_mut(),
            len: 0,
        }
    }

    /// Allocate `len` bytes on the engine heap.
    pub fn alloc(len: usize) -> Result<Self> {
        if len == 0 {
            return Ok(Self::new());
        }
        // SAFETY: sqlite3_malloc is safe to call with any size; a null
        // return means allocation failure.
        let ptr = unsafe { ffi::sqlite3_malloc(len as c_int) };
        if ptr.is_null() {
            return Err(SqliteError::alloc());
        }
        Ok(Self { ptr, len })
    }

    /// Take ownership of a NUL-terminated string returned by
    /// `sqlite3_mprintf`. `len` includes the terminator.
    ///
    /// # Safety
    /// `ptr` must be a live allocation from the SQLite heap of at least
    /// `len` bytes, and ownership must not be held elsewhere.
    pub(crate) unsafe fn from_engine_cstr(ptr: *mut c_char, len: usize) -> Self {
        Self {
            ptr: ptr.cast::<c_void>(),
            len,
        }
    }

    /// Number of owned bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer is empty (and therefore holds no allocation).
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// View the owned bytes.
    pub fn as_bytes(&self) -> &[u8] {
        if self.ptr.is_null() {
            &[]
        } else {
            // SAFETY: ptr is a live allocation of len bytes owned by self
            unsafe { std::slice::from_raw_parts(self.ptr.cast::<u8>(), self.len) }
        }
    }

    /// Mutable view of the owned bytes.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        if self.ptr.is_null() {
            &mut []
        } else {
            // SAFETY: ptr is a live allocation of len bytes exclusively
            // owned by self
            unsafe { std::slice::from_raw_parts_mut(self.ptr.cast::<u8>(), self.len) }
        }
    }

    /// Deep-copy the allocation. Fails with the allocation error when the
    /// engine heap is exhausted.
    pub fn try_clone(&self) -> Result<Self> {
        let mut copy = Self::alloc(self.len)?;
        copy.as_bytes_mut().copy_from_slice(self.as_bytes());
        Ok(copy)
    }

    /// Release the allocation now. Safe to call repeatedly.
    pub fn clear(&mut self) {
        if !self.ptr.is_null() {
            // SAFETY: ptr came from the SQLite heap and is owned by self
            unsafe { ffi::sqlite3_free(self.ptr) };
        }
        self.ptr = std::ptr::null_mut();
        self.len = 0;
    }
}

impl Default for SqliteMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SqliteMemory {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Formatted SQL text built with the engine's `sqlite3_mprintf`.
///
/// The engine formatter's `%q`/`%Q` directives escape text arguments
/// (embedded quotes doubled; `%Q` also adds the surrounding quotes), so
/// values can be spliced into SQL without hand-rolled escaping.
#[derive(Debug, Default)]
pub struct SqlBuffer {
    mem: SqliteMemory,
}

impl SqlBuffer {
    /// An empty buffer.
    pub fn new() -> Self {
        Self {
            mem: SqliteMemory::new(),
        }
    }

    /// Format `template` with a single text argument.
    ///
    /// The template must contain exactly one directive, and it must be
    /// `%q`, `%Q`, or `%s` (use `%%` for a literal percent). This keeps the
    /// variadic engine call well-formed. Returns the formatted text.
    pub fn format_quoted(&mut self, template: &str, arg: &str) -> Result<&str> {
        check_single_text_directive(template)?;
        let c_template = CString::new(template)
            .map_err(|_| SqliteError::misuse("Format template contains a NUL byte"))?;
        let c_arg = CString::new(arg)
            .map_err(|_| SqliteError::misuse("Format argument contains a NUL byte"))?;

        // SAFETY: the template was checked to consume exactly one C-string
        // argument, and both pointers are valid NUL-terminated strings.
        let out = unsafe { ffi::sqlite3_mprintf(c_template.as_ptr(), c_arg.as_ptr()) };
        if out.is_null() {
            return Err(SqliteError::alloc());
        }
        // SAFETY: out is a NUL-terminated string freshly allocated by the
        // engine; we take sole ownership of it.
        let len = unsafe { std::ffi::CStr::from_ptr(out).to_bytes().len() + 1 };
        let mem = unsafe { SqliteMemory::from_engine_cstr(out, len) };
        if std::str::from_utf8(&mem.as_bytes()[..len - 1]).is_err() {
            return Err(SqliteError::misuse("Formatted SQL is not valid UTF-8"));
        }
        self.mem = mem;
        Ok(self.as_str())
    }

    /// The formatted text, or `""` before the first format call.
    pub fn as_str(&self) -> &str {
        let bytes = self.mem.as_bytes();
        let text = bytes.strip_suffix(&[0]).unwrap_or(bytes);
        std::str::from_utf8(text).unwrap_or("")
    }

    /// Length of the formatted text, excluding the terminator.
    pub fn len(&self) -> usize {
        self.as_str().len()
    }

    /// Whether no formatted text is held.
    pub fn is_empty(&self) -> bool {
        self.mem.is_empty()
    }

    /// Release the held text. Safe to call repeatedly.
    pub fn clear(&mut self) {
        self.mem.clear();
    }
}

impl fmt::Display for SqlBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for SqlBuffer {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Reject templates whose directive list would not match the single
/// C-string argument passed to the variadic formatter.
fn check_single_text_directive(template: &str) -> Result<()> {
    let bytes = template.as_bytes();
    let mut directives = 0usize;
    let mut ok = true;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            match bytes.get(i + 1) {
                Some(b'%') => i += 1,
                Some(b'q' | b'Q' | b's') => directives += 1,
                _ => ok = false,
            }
        }
        i += 1;
    }
    if ok && directives == 1 {
        Ok(())
    } else {
        Err(SqliteError::misuse(
            "Format template must contain exactly one %q, %Q, or %s directive",
        ))
    }
}
