//! Traits implemented by virtual table modules
//!
//! A [`Module`] builds [`VTab`] instances; a `VTab` plans scans and opens
//! [`VTabCursor`]s. Optional capabilities are separate traits a table exposes
//! through accessor methods ([`VTab::as_update`], [`VTab::as_transaction`]).
//! The bridge probes them once when the table is created and caches the answer.

use crate::args::CreateArgs;
use crate::error::Result;
use crate::planner::{IndexConstraint, IndexInfo, IndexResult, OrderBy};
use crate::value::{ColumnSink, ColumnUpdate, Value};
use crate::vtab::VTabConnection;

/// Dispatch table a module is registered with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModuleKind {
    /// CREATE VIRTUAL TABLE and connect
    #[default]
    Plain,
    /// Usable only as `SELECT ... FROM module_name`; never created
    EponymousOnly,
    /// Plain, plus begin/commit/rollback hooks
    Transactional,
}

pub trait Module: Send + Sync {
    fn kind(&self) -> ModuleKind {
        ModuleKind::Plain
    }

    /// Build a table for CREATE VIRTUAL TABLE
    ///
    /// Must call [`VTabConnection::declare_vtab`] before returning.
    fn create(&self, conn: &VTabConnection, args: &CreateArgs) -> Result<Box<dyn VTab>> {
        self.connect(conn, args)
    }

    /// Attach to an existing table (or an eponymous one)
    fn connect(&self, conn: &VTabConnection, args: &CreateArgs) -> Result<Box<dyn VTab>>;

    /// Called once when the engine discards the registration
    fn destroy_module(&self) {}
}

pub trait VTab: Send {
    fn best_index(
        &self,
        constraints: &[IndexConstraint],
        order_bys: &[OrderBy],
        info: IndexInfo,
    ) -> Result<IndexResult>;

    fn open(&mut self) -> Result<Box<dyn VTabCursor>>;

    fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Drop the table's backing storage (DROP TABLE)
    fn destroy(&mut self) -> Result<()> {
        Ok(())
    }

    fn table_name(&self) -> Option<&str> {
        None
    }

    fn as_update(&mut self) -> Option<&mut dyn UpdateVTab> {
        None
    }

    fn as_transaction(&mut self) -> Option<&mut dyn TransactionVTab> {
        None
    }
}

/// Mutation capability
pub trait UpdateVTab {
    fn delete(&mut self, key: &Value) -> Result<()>;

    /// Insert a row; `key` is the requested rowid (often NULL). Returns the
    /// new row's id.
    fn insert(&mut self, key: &Value, columns: &[Value]) -> Result<i64>;

    fn update(&mut self, key: &Value, columns: &[ColumnUpdate]) -> Result<()>;

    /// Columns an UPDATE does not assign may be left unfetched by cursors
    fn partial_update(&self) -> bool {
        false
    }
}

pub trait TransactionVTab {
    fn begin(&mut self) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;
}

pub trait VTabCursor: Send {
    /// Restart the scan for the plan identified by `idx_num`/`idx_str`
    ///
    /// `args` holds one value per claimed constraint, in argv slot order.
    fn filter(&mut self, idx_num: i32, idx_str: &str, args: &[Value]) -> Result<()>;

    fn next(&mut self) -> Result<()>;

    fn eof(&self) -> bool;

    /// Write column `column` of the current row into `sink`
    ///
    /// `no_change` is set while the engine refreshes a row for an UPDATE that
    /// does not assign this column; the cursor may write nothing.
    fn column(&mut self, sink: &mut dyn ColumnSink, column: usize, no_change: bool) -> Result<()>;

    fn rowid(&self) -> Result<i64>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
