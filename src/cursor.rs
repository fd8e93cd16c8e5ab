//! Cursor scan protocol
//!
//! `open -> (filter -> next*)* -> close`. The engine checks `eof` after every
//! `filter`/`next` and only reads columns or the rowid on a non-EOF position.

use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::module::VTabCursor;
use crate::value::{ColumnSink, Value};

pub struct CursorInstance {
    table: Handle,
    cursor: Box<dyn VTabCursor>,
    partial_update: bool,
}

impl CursorInstance {
    pub fn new(table: Handle, cursor: Box<dyn VTabCursor>, partial_update: bool) -> Self {
        CursorInstance {
            table,
            cursor,
            partial_update,
        }
    }

    /// Handle of the table instance this cursor scans
    pub fn table(&self) -> Handle {
        self.table
    }

    pub fn partial_update(&self) -> bool {
        self.partial_update
    }

    pub fn filter(&mut self, idx_num: i32, idx_str: &str, args: &[Value]) -> Result<()> {
        self.cursor.filter(idx_num, idx_str, args)
    }

    pub fn next(&mut self) -> Result<()> {
        self.cursor.next()
    }

    pub fn eof(&self) -> bool {
        self.cursor.eof()
    }

    /// Fetch one column; `engine_no_change` is the engine's nochange query
    ///
    /// The module only sees the hint when the table declared partial-update
    /// support.
    pub fn column(&mut self, sink: &mut dyn ColumnSink, column: i32, engine_no_change: bool) -> Result<()> {
        let column = usize::try_from(column)
            .map_err(|_| Error::InvalidArgument(format!("column index {} out of range", column)))?;
        self.cursor
            .column(sink, column, engine_no_change && self.partial_update)
    }

    pub fn rowid(&self) -> Result<i64> {
        self.cursor.rowid()
    }

    pub fn close(&mut self) -> Result<()> {
        self.cursor.close()
    }
}
