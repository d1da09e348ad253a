/// Engine Boundary Module
///
/// Owned native handles over the SQLite C API (`rusqlite::ffi`). This is the
/// only module that talks to the engine directly; everything above it works
/// with `RawDb`/`RawStatement` and `EngineError`.
///
/// Both handle types release their native resource in `Drop`, so holding one
/// in an `Option` and calling `take()` gives an idempotent explicit release.
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_void};
use std::ptr::{self, NonNull};

use rusqlite::ffi;
use rusqlite::types::ValueRef;
use rusqlite::ErrorCode;
use tracing::{debug, trace};

use crate::core::SqlHostError;

/// A non-OK status code together with the engine's diagnostic.
#[derive(Debug, Clone)]
pub(crate) struct EngineError {
    pub(crate) rc: c_int,
    pub(crate) message: String,
}

impl EngineError {
    /// An error with no connection diagnostic; the message is the code's description.
    fn from_status(rc: c_int) -> Self {
        EngineError {
            rc,
            message: ffi::Error::new(rc).to_string(),
        }
    }

    pub(crate) fn code(&self) -> ErrorCode {
        ffi::Error::new(self.rc).code
    }

    pub(crate) fn into_open(self, path: &str) -> SqlHostError {
        SqlHostError::Open {
            path: path.to_string(),
            code: self.code(),
            message: self.message,
        }
    }

    pub(crate) fn into_prepare(self) -> SqlHostError {
        SqlHostError::Prepare {
            code: self.code(),
            message: self.message,
        }
    }

    pub(crate) fn into_bind(self) -> SqlHostError {
        SqlHostError::Bind {
            code: self.code(),
            message: self.message,
        }
    }

    pub(crate) fn into_step(self) -> SqlHostError {
        SqlHostError::Step {
            code: self.code(),
            message: self.message,
        }
    }
}

/// Borrows a possibly-null C string.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string that outlives `'a`.
unsafe fn borrow_cstr<'a>(ptr: *const c_char) -> Option<&'a CStr> {
    (!ptr.is_null()).then(|| CStr::from_ptr(ptr))
}

/// Copies a possibly-null C string into an owned `String`.
///
/// # Safety
///
/// Same contract as [`borrow_cstr`].
unsafe fn cstr_to_string(ptr: *const c_char) -> String {
    borrow_cstr(ptr).map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
}

/// Borrows `len` bytes starting at `ptr`, treating null or empty as `&[]`.
///
/// # Safety
///
/// When non-null, `ptr` must be valid for `len` bytes for the lifetime `'a`.
unsafe fn raw_bytes<'a>(ptr: *const c_void, len: c_int) -> &'a [u8] {
    match usize::try_from(len) {
        Ok(len) if len > 0 && !ptr.is_null() => std::slice::from_raw_parts(ptr.cast::<u8>(), len),
        _ => &[],
    }
}

/// Length argument for a text or blob bind.
fn byte_len(bytes: &[u8]) -> Result<c_int, EngineError> {
    c_int::try_from(bytes.len()).map_err(|_| EngineError::from_status(ffi::SQLITE_TOOBIG))
}

fn errmsg(db: *mut ffi::sqlite3) -> String {
    // SAFETY: `db` is a live (possibly zombie) connection handle; the message
    // is copied before any further engine call.
    unsafe { cstr_to_string(ffi::sqlite3_errmsg(db)) }
}

/// Owned native database handle.
#[derive(Debug)]
pub(crate) struct RawDb {
    ptr: NonNull<ffi::sqlite3>,
}

impl RawDb {
    pub(crate) fn open(path: &str, flags: c_int) -> Result<RawDb, EngineError> {
        let c_path = CString::new(path).map_err(|_| EngineError {
            rc: ffi::SQLITE_CANTOPEN,
            message: "path contains an interior NUL byte".to_string(),
        })?;

        let mut db: *mut ffi::sqlite3 = ptr::null_mut();
        // SAFETY: `c_path` is NUL-terminated and `db` is a valid out-pointer.
        let rc = unsafe { ffi::sqlite3_open_v2(c_path.as_ptr(), &mut db, flags, ptr::null()) };
        if rc != ffi::SQLITE_OK {
            let Some(db) = NonNull::new(db) else {
                return Err(EngineError::from_status(rc));
            };
            let message = errmsg(db.as_ptr());
            // SAFETY: a handle is allocated even when open fails and must be released.
            unsafe {
                ffi::sqlite3_close_v2(db.as_ptr());
            }
            return Err(EngineError { rc, message });
        }

        let ptr = NonNull::new(db).ok_or_else(|| EngineError::from_status(ffi::SQLITE_NOMEM))?;
        debug!("opened database handle for {}", path);
        Ok(RawDb { ptr })
    }

    /// Compiles the first statement in `sql`, returning it with the unparsed tail.
    pub(crate) fn prepare<'s>(&self, sql: &'s str) -> Result<(RawStatement, &'s str), EngineError> {
        let len = byte_len(sql.as_bytes())?;

        let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
        let mut tail: *const c_char = ptr::null();
        // SAFETY: `sql` is valid for `len` bytes; both out-pointers are valid.
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(
                self.ptr.as_ptr(),
                sql.as_ptr().cast::<c_char>(),
                len,
                &mut stmt,
                &mut tail,
            )
        };
        if rc != ffi::SQLITE_OK {
            return Err(EngineError {
                rc,
                message: errmsg(self.ptr.as_ptr()),
            });
        }

        let consumed = if tail.is_null() {
            sql.len()
        } else {
            (tail as usize).saturating_sub(sql.as_ptr() as usize)
        };
        let rest = sql.get(consumed..).unwrap_or("");

        match NonNull::new(stmt) {
            Some(ptr) => Ok((RawStatement { ptr }, rest)),
            None => Err(EngineError {
                rc: ffi::SQLITE_MISUSE,
                message: "no SQL statement found".to_string(),
            }),
        }
    }

    /// Runs a parameterless script of one or more statements.
    pub(crate) fn exec(&self, sql: &str) -> Result<(), EngineError> {
        let c_sql = CString::new(sql).map_err(|_| EngineError {
            rc: ffi::SQLITE_MISUSE,
            message: "SQL contains an interior NUL byte".to_string(),
        })?;

        let mut err: *mut c_char = ptr::null_mut();
        // SAFETY: `c_sql` is NUL-terminated; no callback is installed.
        let rc = unsafe {
            ffi::sqlite3_exec(self.ptr.as_ptr(), c_sql.as_ptr(), None, ptr::null_mut(), &mut err)
        };
        if rc == ffi::SQLITE_OK {
            return Ok(());
        }

        let message = if err.is_null() {
            errmsg(self.ptr.as_ptr())
        } else {
            // SAFETY: `err` was allocated by sqlite3_exec and is freed exactly once.
            unsafe {
                let message = cstr_to_string(err);
                ffi::sqlite3_free(err.cast::<c_void>());
                message
            }
        };
        Err(EngineError { rc, message })
    }

    pub(crate) fn changes(&self) -> i64 {
        // SAFETY: the handle is live for as long as `self` exists.
        i64::from(unsafe { ffi::sqlite3_changes(self.ptr.as_ptr()) })
    }

    pub(crate) fn is_autocommit(&self) -> bool {
        // SAFETY: the handle is live for as long as `self` exists.
        unsafe { ffi::sqlite3_get_autocommit(self.ptr.as_ptr()) != 0 }
    }

    /// Engine-reported filename of the `main` database; `None` for in-memory databases.
    pub(crate) fn filename(&self) -> Option<String> {
        // SAFETY: the schema name is a NUL-terminated literal.
        let name = unsafe {
            cstr_to_string(ffi::sqlite3_db_filename(
                self.ptr.as_ptr(),
                b"main\0".as_ptr().cast::<c_char>(),
            ))
        };
        (!name.is_empty()).then_some(name)
    }
}

impl Drop for RawDb {
    fn drop(&mut self) {
        // SAFETY: `self.ptr` is a live handle owned exclusively by this value.
        // close_v2 defers the close until outstanding statements are finalized.
        let rc = unsafe { ffi::sqlite3_close_v2(self.ptr.as_ptr()) };
        debug!(rc, "closed database handle");
    }
}

/// Owned native prepared-statement handle.
#[derive(Debug)]
pub(crate) struct RawStatement {
    ptr: NonNull<ffi::sqlite3_stmt>,
}

impl RawStatement {
    fn db(&self) -> *mut ffi::sqlite3 {
        // SAFETY: `self.ptr` is a live statement handle.
        unsafe { ffi::sqlite3_db_handle(self.ptr.as_ptr()) }
    }

    fn error(&self, rc: c_int) -> EngineError {
        EngineError {
            rc,
            message: errmsg(self.db()),
        }
    }

    pub(crate) fn parameter_count(&self) -> usize {
        // SAFETY: `self.ptr` is a live statement handle.
        let count = unsafe { ffi::sqlite3_bind_parameter_count(self.ptr.as_ptr()) };
        usize::try_from(count).unwrap_or(0)
    }

    /// Engine-reported name of the 1-based parameter, sigil included.
    pub(crate) fn parameter_name(&self, index: usize) -> Option<&str> {
        let index = c_int::try_from(index).ok()?;
        // SAFETY: the returned name is owned by the statement and lives until
        // it is finalized, which cannot happen while `self` is borrowed.
        unsafe { borrow_cstr(ffi::sqlite3_bind_parameter_name(self.ptr.as_ptr(), index)) }
            .and_then(|name| name.to_str().ok())
    }

    /// Binds one value; text and blob contents are copied by the engine.
    pub(crate) fn bind(&mut self, index: usize, value: ValueRef<'_>) -> Result<(), EngineError> {
        let p = self.ptr.as_ptr();
        let i = c_int::try_from(index).map_err(|_| EngineError::from_status(ffi::SQLITE_RANGE))?;

        // SAFETY: `p` is live; text/blob pointers are valid for `len` bytes and
        // SQLITE_TRANSIENT makes the engine copy them before returning.
        let rc = match value {
            ValueRef::Null => unsafe { ffi::sqlite3_bind_null(p, i) },
            ValueRef::Integer(v) => unsafe { ffi::sqlite3_bind_int64(p, i, v) },
            ValueRef::Real(v) => unsafe { ffi::sqlite3_bind_double(p, i, v) },
            ValueRef::Text(text) => {
                let len = byte_len(text)?;
                unsafe { ffi::sqlite3_bind_text(p, i, text.as_ptr().cast(), len, ffi::SQLITE_TRANSIENT()) }
            }
            ValueRef::Blob(blob) => {
                let len = byte_len(blob)?;
                unsafe { ffi::sqlite3_bind_blob(p, i, blob.as_ptr().cast(), len, ffi::SQLITE_TRANSIENT()) }
            }
        };

        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(self.error(rc))
        }
    }

    /// Advances one row. `Ok(true)` means a row is available.
    pub(crate) fn step(&mut self) -> Result<bool, EngineError> {
        // SAFETY: `self.ptr` is a live statement handle.
        match unsafe { ffi::sqlite3_step(self.ptr.as_ptr()) } {
            ffi::SQLITE_ROW => Ok(true),
            ffi::SQLITE_DONE => Ok(false),
            rc => Err(self.error(rc)),
        }
    }

    /// Rewinds the execution cursor. Bound values are kept.
    pub(crate) fn reset(&mut self) {
        // SAFETY: `self.ptr` is a live statement handle. The return value only
        // repeats the error of the last step, which was already reported.
        unsafe {
            ffi::sqlite3_reset(self.ptr.as_ptr());
        }
    }

    pub(crate) fn clear_bindings(&mut self) {
        // SAFETY: `self.ptr` is a live statement handle.
        unsafe {
            ffi::sqlite3_clear_bindings(self.ptr.as_ptr());
        }
    }

    pub(crate) fn column_count(&self) -> usize {
        // SAFETY: `self.ptr` is a live statement handle.
        usize::try_from(unsafe { ffi::sqlite3_column_count(self.ptr.as_ptr()) }).unwrap_or(0)
    }

    /// Number of columns in the current row; zero when no row is available.
    pub(crate) fn data_count(&self) -> usize {
        // SAFETY: `self.ptr` is a live statement handle.
        usize::try_from(unsafe { ffi::sqlite3_data_count(self.ptr.as_ptr()) }).unwrap_or(0)
    }

    pub(crate) fn column_name(&self, index: usize) -> String {
        let Ok(i) = c_int::try_from(index) else {
            return String::new();
        };
        // SAFETY: the name is copied immediately, before any other engine call.
        unsafe { cstr_to_string(ffi::sqlite3_column_name(self.ptr.as_ptr(), i)) }
    }

    /// Reads a column of the current row at its exact stored byte length.
    pub(crate) fn column_value(&self, index: usize) -> ValueRef<'_> {
        let p = self.ptr.as_ptr();
        let Ok(i) = c_int::try_from(index) else {
            return ValueRef::Null;
        };

        // SAFETY: `p` is live and positioned on a row. The text/blob pointer is
        // fetched before the byte count as the engine requires, and stays valid
        // until the next step/reset/finalize, all of which need `&mut self`.
        unsafe {
            match ffi::sqlite3_column_type(p, i) {
                ffi::SQLITE_INTEGER => ValueRef::Integer(ffi::sqlite3_column_int64(p, i)),
                ffi::SQLITE_FLOAT => ValueRef::Real(ffi::sqlite3_column_double(p, i)),
                ffi::SQLITE_TEXT => {
                    let text = ffi::sqlite3_column_text(p, i).cast::<c_void>();
                    ValueRef::Text(raw_bytes(text, ffi::sqlite3_column_bytes(p, i)))
                }
                ffi::SQLITE_BLOB => {
                    let blob = ffi::sqlite3_column_blob(p, i);
                    ValueRef::Blob(raw_bytes(blob, ffi::sqlite3_column_bytes(p, i)))
                }
                _ => ValueRef::Null,
            }
        }
    }

    /// Rows changed by the most recent completed write on the owning connection.
    pub(crate) fn changes(&self) -> i64 {
        // SAFETY: the owning handle stays allocated while this statement is live.
        i64::from(unsafe { ffi::sqlite3_changes(self.db()) })
    }

    /// The SQL text the statement was compiled from.
    pub(crate) fn sql(&self) -> String {
        // SAFETY: `self.ptr` is a live statement handle.
        unsafe { cstr_to_string(ffi::sqlite3_sql(self.ptr.as_ptr())) }
    }
}

impl Drop for RawStatement {
    fn drop(&mut self) {
        // SAFETY: `self.ptr` is a live handle owned exclusively by this value.
        unsafe {
            ffi::sqlite3_finalize(self.ptr.as_ptr());
        }
        trace!("finalized statement handle");
    }
}
