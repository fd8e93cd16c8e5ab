//! SQLite virtual table adapter
//!
//! This module installs native `sqlite3_module` dispatch tables whose
//! callbacks translate SQLite's C protocol into calls on [`Module`],
//! [`VTab`](crate::module::VTab) and [`VTabCursor`](crate::module::VTabCursor)
//! implementations:
//!
//! - Module registrations, table instances and cursors live in process-wide
//!   [`HandleStore`]s; native structures carry only their [`Handle`]
//! - Constraint, ORDER BY and usage arrays are marshaled in both directions
//! - Errors are copied into SQLite-owned memory on the native table
//!
//! [`Handle`]: crate::handle::Handle

mod cursor;
mod marshal;
mod module;


pub use module::{drop_module, register_module, VTabConfig, VTabConnection};

use crate::cursor::CursorInstance;
use crate::handle::HandleStore;
use crate::module::{Module, ModuleKind};
use crate::table::TableInstance;
use parking_lot::Mutex;

/// One module registration on one connection
pub(crate) struct ModuleEntry {
    pub(crate) name: String,
    pub(crate) kind: ModuleKind,
    pub(crate) module: Box<dyn Module>,
    /// Address of the owning `sqlite3` connection, compared on create/connect
    pub(crate) db: usize,
}

pub(crate) static MODULES: HandleStore<ModuleEntry> = HandleStore::new();
pub(crate) static TABLES: HandleStore<Mutex<TableInstance>> = HandleStore::new();
pub(crate) static CURSORS: HandleStore<Mutex<CursorInstance>> = HandleStore::new();

/// Counts of live bridge objects across every connection in the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LiveHandles {
    pub modules: usize,
    pub tables: usize,
    pub cursors: usize,
}

pub fn live_handles() -> LiveHandles {
    LiveHandles {
        modules: MODULES.len(),
        tables: TABLES.len(),
        cursors: CURSORS.len(),
    }
}
