//! Table instance lifecycle and the mutation protocol
//!
//! A [`TableInstance`] wraps one module-built [`VTab`] together with the
//! capability flags probed when it was created. The engine's single update
//! callback is decomposed here into [`Mutation`]s before reaching the module.

use crate::cursor::CursorInstance;
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::module::VTab;
use crate::planner::{IndexConstraint, IndexInfo, IndexPlan, OrderBy};
use crate::value::{ColumnUpdate, Value};
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    Connected,
    Disconnected,
    Destroyed,
}

/// Capabilities probed once at create/connect time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub updatable: bool,
    pub partial_update: bool,
    pub transactional: bool,
}

impl Capabilities {
    pub fn probe(vtab: &mut dyn VTab) -> Self {
        let partial_update = vtab.as_update().map(|u| u.partial_update());
        Capabilities {
            updatable: partial_update.is_some(),
            partial_update: partial_update.unwrap_or(false),
            transactional: vtab.as_transaction().is_some(),
        }
    }
}

/// Row mutation decoded from the engine's update argument list
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Delete {
        key: Value,
    },
    Insert {
        key: Value,
        columns: Vec<Value>,
    },
    Update {
        key: Value,
        columns: Vec<ColumnUpdate>,
    },
}

impl Mutation {
    /// Decode `[key]`, `[NULL, key, cols..]` or `[old_key, new_key, cols..]`
    ///
    /// `unchanged[i]` marks `args[i]` as a column the statement did not
    /// assign; such columns become [`ColumnUpdate::Unchanged`] in an update.
    pub fn from_args(args: Vec<Value>, unchanged: &[bool]) -> Result<Self> {
        let mut iter = args.into_iter();
        let first = iter
            .next()
            .ok_or_else(|| Error::InvalidArgument("update called with no arguments".to_string()))?;
        let second = match iter.next() {
            None => return Ok(Mutation::Delete { key: first }),
            Some(second) => second,
        };

        if first.is_null() {
            return Ok(Mutation::Insert {
                key: second,
                columns: iter.collect(),
            });
        }

        let columns = iter
            .enumerate()
            .map(|(i, value)| {
                if unchanged.get(i + 2).copied().unwrap_or(false) {
                    ColumnUpdate::Unchanged
                } else {
                    ColumnUpdate::Set(value)
                }
            })
            .collect();

        Ok(Mutation::Update { key: first, columns })
    }
}

/// One connected virtual table
pub struct TableInstance {
    module: String,
    table: String,
    vtab: Box<dyn VTab>,
    capabilities: Capabilities,
    state: TableState,
}

impl TableInstance {
    pub fn new(module: impl Into<String>, table: impl Into<String>, mut vtab: Box<dyn VTab>) -> Self {
        let capabilities = Capabilities::probe(vtab.as_mut());
        let table = vtab
            .table_name()
            .map(str::to_string)
            .unwrap_or_else(|| table.into());

        TableInstance {
            module: module.into(),
            table,
            vtab,
            capabilities,
            state: TableState::Connected,
        }
    }

    pub fn module_name(&self) -> &str {
        &self.module
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn state(&self) -> TableState {
        self.state
    }

    pub fn best_index(
        &self,
        constraints: &[IndexConstraint],
        order_bys: &[OrderBy],
        info: IndexInfo,
    ) -> Result<IndexPlan> {
        let result = self.vtab.best_index(constraints, order_bys, info)?;
        IndexPlan::from_result(constraints, result)
    }

    /// Open a cursor; `table` is this instance's own handle
    pub fn open(&mut self, table: Handle) -> Result<CursorInstance> {
        let cursor = self.vtab.open()?;
        trace!(module = %self.module, table = %self.table, "cursor opened");
        Ok(CursorInstance::new(table, cursor, self.capabilities.partial_update))
    }

    pub fn disconnect(&mut self) -> Result<()> {
        self.state = TableState::Disconnected;
        debug!(module = %self.module, table = %self.table, "disconnecting virtual table");
        self.vtab.disconnect()
    }

    /// Destroy the table; on failure it stays connected
    pub fn destroy(&mut self) -> Result<()> {
        self.vtab.destroy()?;
        self.state = TableState::Destroyed;
        debug!(module = %self.module, table = %self.table, "destroyed virtual table");
        Ok(())
    }

    /// Apply one engine update call; returns the new row id for inserts
    pub fn update(&mut self, args: Vec<Value>, unchanged: &[bool]) -> Result<Option<i64>> {
        if !self.capabilities.updatable {
            return Err(self.not_updatable());
        }
        let mutation = Mutation::from_args(args, unchanged)?;
        self.apply(mutation)
    }

    pub fn apply(&mut self, mutation: Mutation) -> Result<Option<i64>> {
        let not_updatable = self.not_updatable();
        let updater = match self.vtab.as_update() {
            Some(updater) if self.capabilities.updatable => updater,
            _ => return Err(not_updatable),
        };

        match mutation {
            Mutation::Delete { key } => {
                trace!(table = %self.table, ?key, "delete");
                updater.delete(&key).map(|_| None)
            }
            Mutation::Insert { key, columns } => {
                trace!(table = %self.table, ?key, columns = columns.len(), "insert");
                updater.insert(&key, &columns).map(Some)
            }
            Mutation::Update { key, columns } => {
                trace!(table = %self.table, ?key, columns = columns.len(), "update");
                updater.update(&key, &columns).map(|_| None)
            }
        }
    }

    pub fn begin(&mut self) -> Result<()> {
        match self.vtab.as_transaction() {
            Some(tx) if self.capabilities.transactional => tx.begin(),
            _ => Ok(()),
        }
    }

    pub fn commit(&mut self) -> Result<()> {
        match self.vtab.as_transaction() {
            Some(tx) if self.capabilities.transactional => tx.commit(),
            _ => Ok(()),
        }
    }

    pub fn rollback(&mut self) -> Result<()> {
        match self.vtab.as_transaction() {
            Some(tx) if self.capabilities.transactional => tx.rollback(),
            _ => Ok(()),
        }
    }

    fn not_updatable(&self) -> Error {
        Error::NotUpdatable {
            module: self.module.clone(),
            table: Some(self.table.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{TransactionVTab, UpdateVTab, VTabCursor};
    use crate::planner::{IndexResult, Op};
    use crate::value::ColumnSink;
    use parking_lot::Mutex;
    use std::sync::Arc;

    type Calls = Arc<Mutex<Vec<String>>>;

    struct EmptyCursor;

    impl VTabCursor for EmptyCursor {
        fn filter(&mut self, _: i32, _: &str, _: &[Value]) -> Result<()> {
            Ok(())
        }
        fn next(&mut self) -> Result<()> {
            Ok(())
        }
        fn eof(&self) -> bool {
            true
        }
        fn column(&mut self, _: &mut dyn ColumnSink, _: usize, _: bool) -> Result<()> {
            Ok(())
        }
        fn rowid(&self) -> Result<i64> {
            Err(Error::module("no rows"))
        }
    }

    struct ReadOnly {
        used: Vec<bool>,
    }

    impl VTab for ReadOnly {
        fn best_index(&self, _: &[IndexConstraint], _: &[OrderBy], _: IndexInfo) -> Result<IndexResult> {
            Ok(IndexResult {
                used: self.used.clone(),
                idx_str: "scan".to_string(),
                ..Default::default()
            })
        }
        fn open(&mut self) -> Result<Box<dyn VTabCursor>> {
            Ok(Box::new(EmptyCursor))
        }
    }

    struct Writable {
        calls: Calls,
        inserted: i64,
        partial: bool,
        fail_destroy: bool,
    }

    impl Writable {
        fn new(partial: bool) -> (Self, Calls) {
            let calls = Calls::default();
            let vtab = Writable {
                calls: Arc::clone(&calls),
                inserted: 0,
                partial,
                fail_destroy: false,
            };
            (vtab, calls)
        }

        fn log(&self, call: impl Into<String>) {
            self.calls.lock().push(call.into());
        }
    }

    impl VTab for Writable {
        fn best_index(&self, c: &[IndexConstraint], _: &[OrderBy], _: IndexInfo) -> Result<IndexResult> {
            if c.iter().any(|c| c.op == Op::Match && !c.usable) {
                return Err(Error::Constraint);
            }
            Ok(IndexResult::full_scan(c.len()))
        }
        fn open(&mut self) -> Result<Box<dyn VTabCursor>> {
            Ok(Box::new(EmptyCursor))
        }
        fn destroy(&mut self) -> Result<()> {
            if self.fail_destroy {
                return Err(Error::module("storage busy"));
            }
            Ok(())
        }
        fn table_name(&self) -> Option<&str> {
            Some("writable_rows")
        }
        fn as_update(&mut self) -> Option<&mut dyn UpdateVTab> {
            Some(self)
        }
        fn as_transaction(&mut self) -> Option<&mut dyn TransactionVTab> {
            Some(self)
        }
    }

    impl UpdateVTab for Writable {
        fn delete(&mut self, key: &Value) -> Result<()> {
            self.log(format!("delete {:?}", key));
            Ok(())
        }
        fn insert(&mut self, key: &Value, columns: &[Value]) -> Result<i64> {
            self.log(format!("insert {:?} {}", key, columns.len()));
            self.inserted += 1;
            Ok(self.inserted)
        }
        fn update(&mut self, key: &Value, columns: &[ColumnUpdate]) -> Result<()> {
            self.log(format!("update {:?} {}", key, columns.len()));
            Ok(())
        }
        fn partial_update(&self) -> bool {
            self.partial
        }
    }

    impl TransactionVTab for Writable {
        fn begin(&mut self) -> Result<()> {
            self.log("begin");
            Ok(())
        }
        fn commit(&mut self) -> Result<()> {
            self.log("commit");
            Ok(())
        }
        fn rollback(&mut self) -> Result<()> {
            Err(Error::module("rollback refused"))
        }
    }

    #[test]
    fn test_capabilities_probed_at_creation() {
        let ro = TableInstance::new("ro", "t", Box::new(ReadOnly { used: vec![] }));
        assert_eq!(ro.capabilities(), Capabilities::default());
        assert_eq!(ro.table_name(), "t");

        let (vtab, _) = Writable::new(true);
        let rw = TableInstance::new("rw", "t", Box::new(vtab));
        assert_eq!(
            rw.capabilities(),
            Capabilities {
                updatable: true,
                partial_update: true,
                transactional: true,
            }
        );
        assert_eq!(rw.table_name(), "writable_rows");
    }

    #[test]
    fn test_single_argument_is_delete() {
        let m = Mutation::from_args(vec![Value::Integer(5)], &[false]).unwrap();
        assert_eq!(m, Mutation::Delete { key: Value::Integer(5) });

        let (vtab, calls) = Writable::new(false);
        let mut table = TableInstance::new("rw", "t", Box::new(vtab));
        assert_eq!(table.update(vec![Value::Integer(5)], &[]).unwrap(), None);
        assert_eq!(*calls.lock(), vec!["delete Integer(5)"]);
    }

    #[test]
    fn test_null_first_argument_is_insert() {
        let (vtab, calls) = Writable::new(false);
        let mut table = TableInstance::new("rw", "t", Box::new(vtab));
        let args = vec![
            Value::Null,
            Value::Null,
            Value::from("a"),
            Value::Integer(1),
        ];
        let rowid = table.update(args, &[false; 4]).unwrap();
        assert_eq!(rowid, Some(1));
        assert_eq!(*calls.lock(), vec!["insert Null 2"]);
    }

    #[test]
    fn test_insert_ignores_unchanged_flags() {
        let m = Mutation::from_args(
            vec![Value::Null, Value::Integer(9), Value::from("x")],
            &[false, false, true],
        )
        .unwrap();
        assert_eq!(
            m,
            Mutation::Insert {
                key: Value::Integer(9),
                columns: vec![Value::from("x")],
            }
        );
    }

    #[test]
    fn test_update_marks_unchanged_columns() {
        let m = Mutation::from_args(
            vec![
                Value::Integer(3),
                Value::Integer(3),
                Value::Null,
                Value::Null,
                Value::from("new"),
            ],
            &[false, false, false, true, false],
        )
        .unwrap();

        assert_eq!(
            m,
            Mutation::Update {
                key: Value::Integer(3),
                columns: vec![
                    ColumnUpdate::Set(Value::Null),
                    ColumnUpdate::Unchanged,
                    ColumnUpdate::Set(Value::from("new")),
                ],
            }
        );
    }

    #[test]
    fn test_empty_argument_list_is_rejected() {
        assert!(Mutation::from_args(Vec::new(), &[]).is_err());
    }

    #[test]
    fn test_read_only_table_rejects_every_shape() {
        let mut table = TableInstance::new("ro_mod", "people", Box::new(ReadOnly { used: vec![] }));
        let shapes = vec![
            vec![Value::Integer(1)],
            vec![Value::Null, Value::Null, Value::from("a")],
            vec![Value::Integer(1), Value::Integer(1), Value::from("a")],
        ];
        for args in shapes {
            let err = table.update(args, &[]).unwrap_err();
            let msg = err.to_string();
            assert!(msg.contains("ro_mod"), "{}", msg);
            assert!(msg.contains("people"), "{}", msg);
        }
    }

    #[test]
    fn test_best_index_validates_result_length() {
        let table = TableInstance::new("ro", "t", Box::new(ReadOnly { used: vec![true] }));
        let constraints = [
            IndexConstraint { column: 0, op: Op::Eq, usable: true },
            IndexConstraint { column: 1, op: Op::Eq, usable: true },
        ];
        let err = table.best_index(&constraints, &[], IndexInfo::default()).unwrap_err();
        assert!(matches!(err, Error::PlanMismatch { .. }));
    }

    #[test]
    fn test_best_index_constraint_signal_passes_through() {
        let (vtab, _) = Writable::new(false);
        let table = TableInstance::new("rw", "t", Box::new(vtab));
        let constraints = [IndexConstraint { column: 0, op: Op::Match, usable: false }];
        let err = table.best_index(&constraints, &[], IndexInfo::default()).unwrap_err();
        assert!(err.is_constraint());
    }

    #[test]
    fn test_transaction_hooks() {
        let (vtab, calls) = Writable::new(false);
        let mut table = TableInstance::new("rw", "t", Box::new(vtab));
        table.begin().unwrap();
        table.commit().unwrap();
        assert_eq!(table.rollback().unwrap_err().to_string(), "rollback refused");
        assert_eq!(*calls.lock(), vec!["begin", "commit"]);

        let mut ro = TableInstance::new("ro", "t", Box::new(ReadOnly { used: vec![] }));
        ro.begin().unwrap();
        ro.commit().unwrap();
        ro.rollback().unwrap();
    }

    #[test]
    fn test_failed_destroy_keeps_table_connected() {
        let (mut vtab, _) = Writable::new(false);
        vtab.fail_destroy = true;
        let mut table = TableInstance::new("rw", "t", Box::new(vtab));

        assert!(table.destroy().is_err());
        assert_eq!(table.state(), TableState::Connected);
    }

    #[test]
    fn test_open_inherits_partial_update_flag() {
        let (vtab, _) = Writable::new(true);
        let mut table = TableInstance::new("rw", "t", Box::new(vtab));
        let cursor = table.open(Handle::from_raw(1)).unwrap();
        assert!(cursor.partial_update());
        assert_eq!(cursor.table(), Handle::from_raw(1));
    }
}
