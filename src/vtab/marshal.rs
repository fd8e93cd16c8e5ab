//! Conversions between native SQLite memory and owned Rust values
//!
//! Everything returned to SQLite (error text, index strings, result values) is
//! copied into SQLite-owned memory before the callback returns.

use crate::error::{Error, Result};
use crate::value::{ColumnSink, Value};
use libsqlite3_sys as ffi;
use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_void};
use std::{ptr, slice, str};

/// View a native array as a slice; null or non-positive lengths give `&[]`
pub(crate) unsafe fn raw_slice<'a, T>(data: *const T, len: c_int) -> &'a [T] {
    if data.is_null() || len <= 0 {
        return &[];
    }
    slice::from_raw_parts(data, len as usize)
}

pub(crate) unsafe fn raw_slice_mut<'a, T>(data: *mut T, len: c_int) -> &'a mut [T] {
    if data.is_null() || len <= 0 {
        return &mut [];
    }
    slice::from_raw_parts_mut(data, len as usize)
}

/// Copy one native value
///
/// The storage class decides the variant, so SQL NULL and a zero-length blob
/// stay distinct even though both have no bytes.
pub(crate) unsafe fn value_from_raw(value: *mut ffi::sqlite3_value) -> Result<Value> {
    match ffi::sqlite3_value_type(value) {
        ffi::SQLITE_NULL => Ok(Value::Null),
        ffi::SQLITE_INTEGER => Ok(Value::Integer(ffi::sqlite3_value_int64(value))),
        ffi::SQLITE_FLOAT => Ok(Value::Real(ffi::sqlite3_value_double(value))),
        ffi::SQLITE_TEXT => {
            let text = ffi::sqlite3_value_text(value);
            let len = ffi::sqlite3_value_bytes(value);
            let bytes = raw_slice(text, len);
            Ok(Value::Text(str::from_utf8(bytes)?.to_string()))
        }
        ffi::SQLITE_BLOB => {
            let blob = ffi::sqlite3_value_blob(value) as *const u8;
            let len = ffi::sqlite3_value_bytes(value);
            Ok(Value::Blob(raw_slice(blob, len).to_vec()))
        }
        other => Err(Error::InvalidArgument(format!(
            "unknown sqlite value type {}",
            other
        ))),
    }
}

pub(crate) unsafe fn values_from_raw(values: &[*mut ffi::sqlite3_value]) -> Result<Vec<Value>> {
    values.iter().map(|&v| value_from_raw(v)).collect()
}

/// Copy engine argv strings (lossily decoded)
pub(crate) unsafe fn strings_from_raw(argv: &[*const c_char]) -> Vec<String> {
    argv.iter()
        .map(|&s| {
            if s.is_null() {
                String::new()
            } else {
                CStr::from_ptr(s).to_string_lossy().into_owned()
            }
        })
        .collect()
}

/// Allocate a NUL-terminated copy of `s` with `sqlite3_malloc`
///
/// Text after an interior NUL is dropped. Returns null if allocation fails.
pub(crate) fn sqlite_string(s: &str) -> *mut c_char {
    let bytes = s.as_bytes();
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());

    unsafe {
        let buf = ffi::sqlite3_malloc64((len + 1) as ffi::sqlite3_uint64) as *mut u8;
        if buf.is_null() {
            return ptr::null_mut();
        }
        ptr::copy_nonoverlapping(bytes.as_ptr(), buf, len);
        *buf.add(len) = 0;
        buf as *mut c_char
    }
}

/// Replace a table's stored error message, freeing the previous one
pub(crate) unsafe fn set_vtab_error(vtab: *mut ffi::sqlite3_vtab, message: &str) {
    if !(*vtab).zErrMsg.is_null() {
        ffi::sqlite3_free((*vtab).zErrMsg as *mut c_void);
    }
    (*vtab).zErrMsg = sqlite_string(message);
}

/// Engine status for a failed call
pub(crate) fn error_code(err: &Error) -> c_int {
    match err {
        Error::Constraint => ffi::SQLITE_CONSTRAINT,
        Error::Sqlite { code, .. } => *code,
        _ => ffi::SQLITE_ERROR,
    }
}

/// Last error recorded on `db` together with `rc`
pub(crate) unsafe fn sqlite_error(db: *mut ffi::sqlite3, rc: c_int) -> Error {
    let message = if db.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ffi::sqlite3_errmsg(db))
            .to_string_lossy()
            .into_owned()
    };
    Error::Sqlite { code: rc, message }
}

/// [`ColumnSink`] writing into a native function context
pub(crate) struct ContextSink {
    ctx: *mut ffi::sqlite3_context,
}

impl ContextSink {
    pub(crate) fn new(ctx: *mut ffi::sqlite3_context) -> Self {
        ContextSink { ctx }
    }
}

impl ColumnSink for ContextSink {
    fn set_null(&mut self) {
        unsafe { ffi::sqlite3_result_null(self.ctx) }
    }

    fn set_i64(&mut self, value: i64) {
        unsafe { ffi::sqlite3_result_int64(self.ctx, value) }
    }

    fn set_f64(&mut self, value: f64) {
        unsafe { ffi::sqlite3_result_double(self.ctx, value) }
    }

    fn set_text(&mut self, value: &str) {
        match c_int::try_from(value.len()) {
            Ok(len) => unsafe {
                ffi::sqlite3_result_text(
                    self.ctx,
                    value.as_ptr() as *const c_char,
                    len,
                    ffi::SQLITE_TRANSIENT(),
                )
            },
            Err(_) => unsafe { ffi::sqlite3_result_error_toobig(self.ctx) },
        }
    }

    fn set_blob(&mut self, value: &[u8]) {
        // A null data pointer would read back as SQL NULL
        if value.is_empty() {
            unsafe { ffi::sqlite3_result_zeroblob(self.ctx, 0) };
            return;
        }
        match c_int::try_from(value.len()) {
            Ok(len) => unsafe {
                ffi::sqlite3_result_blob(
                    self.ctx,
                    value.as_ptr() as *const c_void,
                    len,
                    ffi::SQLITE_TRANSIENT(),
                )
            },
            Err(_) => unsafe { ffi::sqlite3_result_error_toobig(self.ctx) },
        }
    }
}
