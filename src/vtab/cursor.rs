//! Cursor callbacks: open, filter, next, eof, column, rowid, close

use super::marshal::{error_code, raw_slice, set_vtab_error, values_from_raw, ContextSink};
use super::module::table_handle;
use super::{CURSORS, TABLES};
use crate::error::Error;
use crate::handle::Handle;
use libsqlite3_sys as ffi;
use parking_lot::Mutex;
use std::ffi::CStr;
use std::mem;
use std::os::raw::{c_char, c_int};
use tracing::{trace, warn};

/// Native cursor structure handed to SQLite
#[repr(C)]
struct BridgeCursor {
    /// Base sqlite3_vtab_cursor structure (MUST be first field)
    base: ffi::sqlite3_vtab_cursor,
    handle: Handle,
}

unsafe fn cursor_handle(cursor: *mut ffi::sqlite3_vtab_cursor) -> Handle {
    (*(cursor as *mut BridgeCursor)).handle
}

/// Record `err` on the cursor's table and return the engine status
unsafe fn fail(cursor: *mut ffi::sqlite3_vtab_cursor, op: &str, err: Error) -> c_int {
    warn!(error = %err, op, "cursor call failed");
    set_vtab_error((*cursor).pVtab, &err.to_string());
    error_code(&err)
}

pub(super) unsafe extern "C" fn x_open(
    vtab: *mut ffi::sqlite3_vtab,
    pp_cursor: *mut *mut ffi::sqlite3_vtab_cursor,
) -> c_int {
    let table = table_handle(vtab);
    let opened = TABLES.resolve(table).lock().open(table);

    match opened {
        Ok(cursor) => {
            let native = Box::new(BridgeCursor {
                base: mem::zeroed(),
                handle: CURSORS.register(Mutex::new(cursor)),
            });
            *pp_cursor = Box::into_raw(native) as *mut ffi::sqlite3_vtab_cursor;
            ffi::SQLITE_OK
        }
        Err(e) => {
            warn!(error = %e, "open failed");
            set_vtab_error(vtab, &e.to_string());
            error_code(&e)
        }
    }
}

pub(super) unsafe extern "C" fn x_close(cursor: *mut ffi::sqlite3_vtab_cursor) -> c_int {
    let instance = CURSORS.release(cursor_handle(cursor));
    let result = instance.lock().close();
    trace!(table = ?instance.lock().table(), "cursor closed");

    // SQLite never touches the cursor again, even when close fails
    let vtab = (*cursor).pVtab;
    drop(Box::from_raw(cursor as *mut BridgeCursor));

    match result {
        Ok(()) => ffi::SQLITE_OK,
        Err(e) => {
            warn!(error = %e, "close failed");
            set_vtab_error(vtab, &e.to_string());
            error_code(&e)
        }
    }
}

pub(super) unsafe extern "C" fn x_filter(
    cursor: *mut ffi::sqlite3_vtab_cursor,
    idx_num: c_int,
    idx_str: *const c_char,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) -> c_int {
    let instance = CURSORS.resolve(cursor_handle(cursor));
    let idx_str = if idx_str.is_null() {
        ""
    } else {
        match CStr::from_ptr(idx_str).to_str() {
            Ok(s) => s,
            Err(e) => return fail(cursor, "filter", e.into()),
        }
    };

    let args = match values_from_raw(raw_slice(argv as *const *mut ffi::sqlite3_value, argc)) {
        Ok(args) => args,
        Err(e) => return fail(cursor, "filter", e),
    };

    let result = instance.lock().filter(idx_num, idx_str, &args);
    match result {
        Ok(()) => ffi::SQLITE_OK,
        Err(e) => fail(cursor, "filter", e),
    }
}

pub(super) unsafe extern "C" fn x_next(cursor: *mut ffi::sqlite3_vtab_cursor) -> c_int {
    let result = CURSORS.resolve(cursor_handle(cursor)).lock().next();
    match result {
        Ok(()) => ffi::SQLITE_OK,
        Err(e) => fail(cursor, "next", e),
    }
}

pub(super) unsafe extern "C" fn x_eof(cursor: *mut ffi::sqlite3_vtab_cursor) -> c_int {
    CURSORS.resolve(cursor_handle(cursor)).lock().eof() as c_int
}

pub(super) unsafe extern "C" fn x_column(
    cursor: *mut ffi::sqlite3_vtab_cursor,
    ctx: *mut ffi::sqlite3_context,
    column: c_int,
) -> c_int {
    let no_change = ffi::sqlite3_vtab_nochange(ctx) != 0;
    let mut sink = ContextSink::new(ctx);
    let result = CURSORS
        .resolve(cursor_handle(cursor))
        .lock()
        .column(&mut sink, column, no_change);

    match result {
        Ok(()) => ffi::SQLITE_OK,
        Err(e) => fail(cursor, "column", e),
    }
}

pub(super) unsafe extern "C" fn x_rowid(
    cursor: *mut ffi::sqlite3_vtab_cursor,
    p_rowid: *mut ffi::sqlite3_int64,
) -> c_int {
    let result = CURSORS.resolve(cursor_handle(cursor)).lock().rowid();
    match result {
        Ok(rowid) => {
            *p_rowid = rowid;
            ffi::SQLITE_OK
        }
        Err(e) => fail(cursor, "rowid", e),
    }
}
