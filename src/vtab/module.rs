//! Module registration and table-level callbacks
//!
//! Implements the `sqlite3_module` entry points that act on a whole table:
//! create/connect, best-index, disconnect/destroy, update and the
//! transaction hooks. Cursor entry points live in `cursor.rs`.

use super::cursor::{x_close, x_column, x_eof, x_filter, x_next, x_open, x_rowid};
use super::marshal::{
    error_code, raw_slice, raw_slice_mut, set_vtab_error, sqlite_error, sqlite_string,
    strings_from_raw, values_from_raw,
};
use super::{ModuleEntry, MODULES, TABLES};
use crate::args::CreateArgs;
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::module::{Module, ModuleKind};
use crate::planner::{IndexConstraint, IndexInfo, IndexPlan, Op, OrderBy};
use crate::table::TableInstance;
use libsqlite3_sys as ffi;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::cell::Cell;
use std::ffi::CString;
use std::mem;
use std::os::raw::{c_char, c_int, c_uchar, c_void};
use std::ptr;
use tracing::{debug, warn};

/// Native table structure handed to SQLite
#[repr(C)]
pub(crate) struct BridgeVTab {
    /// Base sqlite3_vtab structure (MUST be first field)
    base: ffi::sqlite3_vtab,
    handle: Handle,
}

/// Handle of the table instance behind a native table pointer
pub(crate) unsafe fn table_handle(vtab: *mut ffi::sqlite3_vtab) -> Handle {
    (*(vtab as *mut BridgeVTab)).handle
}

const BASE_MODULE: ffi::sqlite3_module = ffi::sqlite3_module {
    iVersion: 1,
    xCreate: Some(x_create),
    xConnect: Some(x_connect),
    xBestIndex: Some(x_best_index),
    xDisconnect: Some(x_disconnect),
    xDestroy: Some(x_destroy),
    xOpen: Some(x_open),
    xClose: Some(x_close),
    xFilter: Some(x_filter),
    xNext: Some(x_next),
    xEof: Some(x_eof),
    xColumn: Some(x_column),
    xRowid: Some(x_rowid),
    xUpdate: Some(x_update),
    ..unsafe { mem::zeroed() }
};

static PLAIN_MODULE: ffi::sqlite3_module = BASE_MODULE;

// Without xCreate the table exists only as `SELECT ... FROM module_name`
static EPONYMOUS_ONLY_MODULE: ffi::sqlite3_module = ffi::sqlite3_module {
    xCreate: None,
    ..BASE_MODULE
};

// No xSync: commit is the only commit phase
static TRANSACTIONAL_MODULE: ffi::sqlite3_module = ffi::sqlite3_module {
    xBegin: Some(x_begin),
    xCommit: Some(x_commit),
    xRollback: Some(x_rollback),
    ..BASE_MODULE
};

fn dispatch_table(kind: ModuleKind) -> &'static ffi::sqlite3_module {
    match kind {
        ModuleKind::Plain => &PLAIN_MODULE,
        ModuleKind::EponymousOnly => &EPONYMOUS_ONLY_MODULE,
        ModuleKind::Transactional => &TRANSACTIONAL_MODULE,
    }
}

/// Register `module` under `name` on `conn`
///
/// The dispatch table is chosen from [`Module::kind`]. Registering a second
/// module under the same name replaces the first.
pub fn register_module<M: Module + 'static>(conn: &Connection, name: &str, module: M) -> Result<()> {
    let c_name = CString::new(name)?;
    let kind = module.kind();
    let db = unsafe { conn.handle() };

    let handle = MODULES.register(ModuleEntry {
        name: name.to_string(),
        kind,
        module: Box::new(module),
        db: db as usize,
    });

    let rc = unsafe {
        ffi::sqlite3_create_module_v2(
            db,
            c_name.as_ptr(),
            dispatch_table(kind),
            handle.as_raw() as *mut c_void,
            Some(module_destroy),
        )
    };

    if rc != ffi::SQLITE_OK {
        // SQLite runs the destructor itself when registration fails
        if MODULES.contains(handle) {
            MODULES.release(handle);
        }
        return Err(unsafe { sqlite_error(db, rc) });
    }

    debug!(module = name, ?kind, "registered virtual table module");
    Ok(())
}

/// Remove the registration of module `name`, leaving every other module in place
///
/// Module names are matched case-insensitively, as SQLite resolves them.
pub fn drop_module(conn: &Connection, name: &str) -> Result<()> {
    let mut found = false;
    let keep: Vec<CString> = {
        let mut stmt = conn.prepare("PRAGMA module_list")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut keep = Vec::new();
        for row in rows {
            let module = row?;
            if module.eq_ignore_ascii_case(name) {
                found = true;
            } else {
                keep.push(CString::new(module)?);
            }
        }
        keep
    };

    if !found {
        return Err(Error::InvalidArgument(format!("no such module: {}", name)));
    }

    let mut names: Vec<*const c_char> = keep.iter().map(|s| s.as_ptr()).collect();
    names.push(ptr::null());

    let db = unsafe { conn.handle() };
    let rc = unsafe { ffi::sqlite3_drop_modules(db, names.as_mut_ptr()) };
    if rc != ffi::SQLITE_OK {
        return Err(unsafe { sqlite_error(db, rc) });
    }

    debug!(module = name, "dropped virtual table module");
    Ok(())
}

/// Per-table engine options, set from `create`/`connect`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VTabConfig {
    /// `update` may fail with a constraint error and leave no partial change
    ConstraintSupport,
    /// Safe to use from triggers and views in untrusted schemas
    Innocuous,
    /// Not usable from triggers or views
    DirectOnly,
}

/// Connection handle passed to [`Module::create`] and [`Module::connect`]
pub struct VTabConnection {
    db: *mut ffi::sqlite3,
    declared: Cell<bool>,
}

impl VTabConnection {
    fn new(db: *mut ffi::sqlite3) -> Self {
        VTabConnection {
            db,
            declared: Cell::new(false),
        }
    }

    /// Announce the table's columns, e.g. `CREATE TABLE x(a, b HIDDEN)`
    pub fn declare_vtab(&self, sql: &str) -> Result<()> {
        let c_sql = CString::new(sql)?;
        let rc = unsafe { ffi::sqlite3_declare_vtab(self.db, c_sql.as_ptr()) };
        if rc != ffi::SQLITE_OK {
            return Err(unsafe { sqlite_error(self.db, rc) });
        }
        self.declared.set(true);
        Ok(())
    }

    pub fn config(&self, config: VTabConfig) -> Result<()> {
        let rc = unsafe {
            match config {
                VTabConfig::ConstraintSupport => ffi::sqlite3_vtab_config(
                    self.db,
                    ffi::SQLITE_VTAB_CONSTRAINT_SUPPORT,
                    1 as c_int,
                ),
                VTabConfig::Innocuous => ffi::sqlite3_vtab_config(self.db, ffi::SQLITE_VTAB_INNOCUOUS),
                VTabConfig::DirectOnly => {
                    ffi::sqlite3_vtab_config(self.db, ffi::SQLITE_VTAB_DIRECTONLY)
                }
            }
        };
        if rc != ffi::SQLITE_OK {
            return Err(unsafe { sqlite_error(self.db, rc) });
        }
        Ok(())
    }

    pub fn is_declared(&self) -> bool {
        self.declared.get()
    }
}

unsafe extern "C" fn module_destroy(aux: *mut c_void) {
    let entry = MODULES.release(Handle::from_raw(aux as usize));
    debug!(module = %entry.name, "module registration discarded");
    entry.module.destroy_module();
}

unsafe fn init(
    db: *mut ffi::sqlite3,
    aux: *mut c_void,
    argc: c_int,
    argv: *const *const c_char,
    pp_vtab: *mut *mut ffi::sqlite3_vtab,
    pz_err: *mut *mut c_char,
    is_create: bool,
) -> c_int {
    let entry = MODULES.resolve(Handle::from_raw(aux as usize));
    if entry.db != db as usize {
        *pz_err = sqlite_string("Inconsistent db handles");
        return ffi::SQLITE_ERROR;
    }

    let argv = strings_from_raw(raw_slice(argv, argc));
    match build_table(&entry, db, argv, is_create) {
        Ok(table) => {
            debug!(
                module = %entry.name,
                kind = ?entry.kind,
                table = %table.table_name(),
                capabilities = ?table.capabilities(),
                create = is_create,
                "virtual table ready"
            );
            let vtab = Box::new(BridgeVTab {
                base: mem::zeroed(),
                handle: TABLES.register(Mutex::new(table)),
            });
            *pp_vtab = Box::into_raw(vtab) as *mut ffi::sqlite3_vtab;
            ffi::SQLITE_OK
        }
        Err(e) => {
            warn!(module = %entry.name, error = %e, create = is_create, "virtual table init failed");
            *pz_err = sqlite_string(&e.to_string());
            ffi::SQLITE_ERROR
        }
    }
}

fn build_table(
    entry: &ModuleEntry,
    db: *mut ffi::sqlite3,
    argv: Vec<String>,
    is_create: bool,
) -> Result<TableInstance> {
    let args = CreateArgs::from_argv(argv)?;
    let conn = VTabConnection::new(db);

    let vtab = if is_create {
        entry.module.create(&conn, &args)?
    } else {
        entry.module.connect(&conn, &args)?
    };
    let mut table = TableInstance::new(&entry.name, &args.table, vtab);

    if !conn.is_declared() {
        let _ = table.disconnect();
        return Err(Error::Schema(format!(
            "virtual {} table {} did not declare its schema",
            entry.name, args.table
        )));
    }

    Ok(table)
}

unsafe extern "C" fn x_create(
    db: *mut ffi::sqlite3,
    aux: *mut c_void,
    argc: c_int,
    argv: *const *const c_char,
    pp_vtab: *mut *mut ffi::sqlite3_vtab,
    pz_err: *mut *mut c_char,
) -> c_int {
    init(db, aux, argc, argv, pp_vtab, pz_err, true)
}

unsafe extern "C" fn x_connect(
    db: *mut ffi::sqlite3,
    aux: *mut c_void,
    argc: c_int,
    argv: *const *const c_char,
    pp_vtab: *mut *mut ffi::sqlite3_vtab,
    pz_err: *mut *mut c_char,
) -> c_int {
    init(db, aux, argc, argv, pp_vtab, pz_err, false)
}

unsafe extern "C" fn x_best_index(
    vtab: *mut ffi::sqlite3_vtab,
    info: *mut ffi::sqlite3_index_info,
) -> c_int {
    let table = TABLES.resolve(table_handle(vtab));
    let info = &mut *info;

    let constraints: Vec<IndexConstraint> = raw_slice(info.aConstraint, info.nConstraint)
        .iter()
        .map(|c| IndexConstraint {
            column: c.iColumn,
            op: Op::from_code(c.op),
            usable: c.usable != 0,
        })
        .collect();
    let order_bys: Vec<OrderBy> = raw_slice(info.aOrderBy, info.nOrderBy)
        .iter()
        .map(|o| OrderBy {
            column: o.iColumn,
            desc: o.desc != 0,
        })
        .collect();
    let index_info = IndexInfo {
        col_used: info.colUsed,
    };

    let plan = table.lock().best_index(&constraints, &order_bys, index_info);
    match plan {
        Ok(plan) => write_plan(info, &plan),
        Err(Error::Constraint) => ffi::SQLITE_CONSTRAINT,
        Err(e) => {
            warn!(error = %e, "best_index failed");
            set_vtab_error(vtab, &e.to_string());
            ffi::SQLITE_ERROR
        }
    }
}

/// Copy a validated plan into the engine's index info
unsafe fn write_plan(info: &mut ffi::sqlite3_index_info, plan: &IndexPlan) -> c_int {
    let idx_str = sqlite_string(&plan.idx_str);
    if idx_str.is_null() {
        return ffi::SQLITE_NOMEM;
    }

    let usage = raw_slice_mut(info.aConstraintUsage, info.nConstraint);
    for (slot, planned) in usage.iter_mut().zip(&plan.usage) {
        slot.argvIndex = planned.argv_index;
        slot.omit = planned.omit as c_uchar;
    }

    info.idxNum = plan.idx_num;
    info.idxStr = idx_str;
    info.needToFreeIdxStr = 1;
    info.orderByConsumed = plan.order_by_consumed as c_int;
    info.estimatedCost = plan.estimated_cost;
    info.estimatedRows = plan.estimated_rows;
    if plan.unique_scan {
        info.idxFlags |= ffi::SQLITE_INDEX_SCAN_UNIQUE;
    }
    ffi::SQLITE_OK
}

/// Free the native table and any error text still attached to it
unsafe fn free_vtab(vtab: *mut ffi::sqlite3_vtab) {
    let vtab = Box::from_raw(vtab as *mut BridgeVTab);
    if !vtab.base.zErrMsg.is_null() {
        ffi::sqlite3_free(vtab.base.zErrMsg as *mut c_void);
    }
}

unsafe extern "C" fn x_disconnect(vtab: *mut ffi::sqlite3_vtab) -> c_int {
    let table = TABLES.release(table_handle(vtab));
    let result = table.lock().disconnect();
    free_vtab(vtab);

    match result {
        Ok(()) => ffi::SQLITE_OK,
        Err(e) => {
            warn!(error = %e, "disconnect failed");
            error_code(&e)
        }
    }
}

unsafe extern "C" fn x_destroy(vtab: *mut ffi::sqlite3_vtab) -> c_int {
    let handle = table_handle(vtab);
    let result = TABLES.resolve(handle).lock().destroy();

    match result {
        Ok(()) => {
            TABLES.release(handle);
            free_vtab(vtab);
            ffi::SQLITE_OK
        }
        Err(e) => {
            warn!(error = %e, "destroy failed");
            set_vtab_error(vtab, &e.to_string());
            error_code(&e)
        }
    }
}

unsafe extern "C" fn x_update(
    vtab: *mut ffi::sqlite3_vtab,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
    p_rowid: *mut ffi::sqlite3_int64,
) -> c_int {
    let table = TABLES.resolve(table_handle(vtab));
    let raw = raw_slice(argv as *const *mut ffi::sqlite3_value, argc);
    let unchanged: Vec<bool> = raw
        .iter()
        .map(|&v| ffi::sqlite3_value_nochange(v) != 0)
        .collect();

    let result = match values_from_raw(raw) {
        Ok(args) => table.lock().update(args, &unchanged),
        Err(e) => Err(e),
    };

    match result {
        Ok(Some(rowid)) => {
            *p_rowid = rowid;
            ffi::SQLITE_OK
        }
        Ok(None) => ffi::SQLITE_OK,
        Err(e) => {
            warn!(error = %e, "update failed");
            set_vtab_error(vtab, &e.to_string());
            error_code(&e)
        }
    }
}

type TxHook = fn(&mut TableInstance) -> Result<()>;

unsafe fn transaction_hook(vtab: *mut ffi::sqlite3_vtab, name: &str, hook: TxHook) -> c_int {
    let table = TABLES.resolve(table_handle(vtab));
    let result = hook(&mut table.lock());

    match result {
        Ok(()) => ffi::SQLITE_OK,
        Err(e) => {
            warn!(error = %e, hook = name, "transaction hook failed");
            set_vtab_error(vtab, &e.to_string());
            error_code(&e)
        }
    }
}

unsafe extern "C" fn x_begin(vtab: *mut ffi::sqlite3_vtab) -> c_int {
    transaction_hook(vtab, "begin", TableInstance::begin)
}

unsafe extern "C" fn x_commit(vtab: *mut ffi::sqlite3_vtab) -> c_int {
    transaction_hook(vtab, "commit", TableInstance::commit)
}

unsafe extern "C" fn x_rollback(vtab: *mut ffi::sqlite3_vtab) -> c_int {
    transaction_hook(vtab, "rollback", TableInstance::rollback)
}
