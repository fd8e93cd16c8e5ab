//! # vtab-bridge - Typed SQLite Virtual Tables
//!
//! `vtab-bridge` lets Rust code supply arbitrary data sources (APIs, files,
//! computed relations) that SQLite can plan, scan and mutate as ordinary
//! tables. It adapts SQLite's fixed virtual table callback protocol to three
//! traits:
//!
//! - [`Module`] builds tables on CREATE VIRTUAL TABLE / connect
//! - [`VTab`] plans scans (`best_index`) and opens cursors, optionally
//!   exposing [`UpdateVTab`] and [`TransactionVTab`]
//! - [`VTabCursor`] filters, iterates and produces column values
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rusqlite::Connection;
//! use vtab_bridge::{
//!     ColumnSink, ConnectionExt, CreateArgs, IndexConstraint, IndexInfo, IndexResult, Module,
//!     OrderBy, Result, VTab, VTabConnection, VTabCursor, Value,
//! };
//!
//! struct Numbers;
//! struct NumbersTable;
//! struct NumbersCursor(i64);
//!
//! impl Module for Numbers {
//!     fn connect(&self, conn: &VTabConnection, _args: &CreateArgs) -> Result<Box<dyn VTab>> {
//!         conn.declare_vtab("CREATE TABLE x(n INTEGER)")?;
//!         Ok(Box::new(NumbersTable))
//!     }
//! }
//!
//! impl VTab for NumbersTable {
//!     fn best_index(&self, c: &[IndexConstraint], _: &[OrderBy], _: IndexInfo) -> Result<IndexResult> {
//!         Ok(IndexResult::full_scan(c.len()))
//!     }
//!     fn open(&mut self) -> Result<Box<dyn VTabCursor>> {
//!         Ok(Box::new(NumbersCursor(0)))
//!     }
//! }
//!
//! impl VTabCursor for NumbersCursor {
//!     fn filter(&mut self, _: i32, _: &str, _: &[Value]) -> Result<()> {
//!         self.0 = 1;
//!         Ok(())
//!     }
//!     fn next(&mut self) -> Result<()> {
//!         self.0 += 1;
//!         Ok(())
//!     }
//!     fn eof(&self) -> bool {
//!         self.0 > 10
//!     }
//!     fn column(&mut self, sink: &mut dyn ColumnSink, _: usize, _: bool) -> Result<()> {
//!         sink.set_i64(self.0);
//!         Ok(())
//!     }
//!     fn rowid(&self) -> Result<i64> {
//!         Ok(self.0)
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! let conn = Connection::open_in_memory()?;
//! conn.create_module("numbers", Numbers)?;
//! conn.execute_batch("CREATE VIRTUAL TABLE n USING numbers")?;
//! let total: i64 = conn.query_row("SELECT sum(n) FROM n", [], |r| r.get(0))?;
//! assert_eq!(total, 55);
//! # Ok(())
//! # }
//! ```

pub mod args;
pub mod cursor;
pub mod error;
pub mod handle;
pub mod module;
pub mod planner;
pub mod table;
pub mod value;
pub mod vtab;

pub use args::CreateArgs;
pub use error::{Error, Result};
pub use handle::{Handle, HandleStore};
pub use module::{Module, ModuleKind, TransactionVTab, UpdateVTab, VTab, VTabCursor};
pub use planner::{ConstraintUsage, IndexConstraint, IndexInfo, IndexPlan, IndexResult, Op, OrderBy};
pub use table::{Capabilities, Mutation};
pub use value::{CapturedValue, ColumnSink, ColumnUpdate, Value, ValueKind};
pub use vtab::{drop_module, live_handles, register_module, LiveHandles, VTabConfig, VTabConnection};

use rusqlite::Connection;

/// Module registration methods on [`rusqlite::Connection`]
pub trait ConnectionExt {
    /// Register `module` under `name`; see [`register_module`]
    fn create_module<M: Module + 'static>(&self, name: &str, module: M) -> Result<()>;

    /// Remove one module registration; see [`drop_module`]
    fn drop_module(&self, name: &str) -> Result<()>;
}

impl ConnectionExt for Connection {
    fn create_module<M: Module + 'static>(&self, name: &str, module: M) -> Result<()> {
        register_module(self, name, module)
    }

    fn drop_module(&self, name: &str) -> Result<()> {
        drop_module(self, name)
    }
}
