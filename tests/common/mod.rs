//! In-memory virtual table module shared by the integration tests
//!
//! `CREATE VIRTUAL TABLE t USING mem(a, b, ...)` declares one column per
//! argument. Rows live in a map shared with the test so results can be
//! checked without going through SQL.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use vtab_bridge::{
    ColumnSink, ColumnUpdate, CreateArgs, Error, IndexConstraint, IndexInfo, IndexResult, Module,
    ModuleKind, Op, OrderBy, Result, TransactionVTab, UpdateVTab, VTab, VTabConnection,
    VTabCursor, Value,
};

pub type Rows = BTreeMap<i64, Vec<Value>>;

/// State visible to both the module and the test
#[derive(Default)]
pub struct Shared {
    pub rows: Mutex<Rows>,
    pub calls: Mutex<Vec<String>>,
    pub updates: Mutex<Vec<(Value, Vec<ColumnUpdate>)>>,
    pub module_destroyed: AtomicUsize,
}

impl Shared {
    pub fn with_rows(rows: Vec<(i64, Vec<Value>)>) -> Arc<Self> {
        let shared = Shared::default();
        shared.rows.lock().extend(rows);
        Arc::new(shared)
    }

    pub fn log(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn called(&self, call: &str) -> bool {
        self.calls.lock().iter().any(|c| c == call)
    }

    pub fn destroyed(&self) -> usize {
        self.module_destroyed.load(Ordering::SeqCst)
    }
}

pub struct MemModule {
    pub shared: Arc<Shared>,
    pub kind: ModuleKind,
    pub updatable: bool,
    pub partial_update: bool,
}

impl MemModule {
    pub fn new(shared: &Arc<Shared>) -> Self {
        MemModule {
            shared: Arc::clone(shared),
            kind: ModuleKind::Plain,
            updatable: true,
            partial_update: false,
        }
    }

    pub fn transactional(mut self) -> Self {
        self.kind = ModuleKind::Transactional;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.updatable = false;
        self
    }

    pub fn partial_update(mut self) -> Self {
        self.partial_update = true;
        self
    }

    fn build(&self, conn: &VTabConnection, args: &CreateArgs) -> Result<Box<dyn VTab>> {
        let columns = if args.arguments.is_empty() {
            vec!["value".to_string()]
        } else {
            args.arguments.iter().map(|a| a.trim().to_string()).collect()
        };
        conn.declare_vtab(&format!("CREATE TABLE x({})", columns.join(", ")))?;

        Ok(Box::new(MemTable {
            shared: Arc::clone(&self.shared),
            columns: columns.len(),
            updatable: self.updatable,
            partial_update: self.partial_update,
            snapshot: None,
        }))
    }
}

impl Module for MemModule {
    fn kind(&self) -> ModuleKind {
        self.kind
    }

    fn create(&self, conn: &VTabConnection, args: &CreateArgs) -> Result<Box<dyn VTab>> {
        self.shared.log("create");
        self.build(conn, args)
    }

    fn connect(&self, conn: &VTabConnection, args: &CreateArgs) -> Result<Box<dyn VTab>> {
        self.shared.log("connect");
        self.build(conn, args)
    }

    fn destroy_module(&self) {
        self.shared.module_destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct MemTable {
    shared: Arc<Shared>,
    columns: usize,
    updatable: bool,
    partial_update: bool,
    snapshot: Option<Rows>,
}

/// Plan number for a single-row lookup by rowid
pub const ROWID_LOOKUP: i32 = 1;

impl VTab for MemTable {
    fn best_index(
        &self,
        constraints: &[IndexConstraint],
        order_bys: &[OrderBy],
        _info: IndexInfo,
    ) -> Result<IndexResult> {
        let lookup = constraints
            .iter()
            .position(|c| c.column == -1 && c.op == Op::Eq && c.usable);
        let already_ordered = order_bys.len() == 1 && order_bys[0].column == -1 && !order_bys[0].desc;

        let mut used = vec![false; constraints.len()];
        match lookup {
            Some(i) => {
                used[i] = true;
                Ok(IndexResult {
                    used,
                    idx_num: ROWID_LOOKUP,
                    idx_str: "rowid".to_string(),
                    already_ordered,
                    estimated_cost: 1.0,
                    estimated_rows: 1,
                    unique_scan: true,
                    ..Default::default()
                })
            }
            None => {
                let rows = self.shared.rows.lock().len() as i64;
                Ok(IndexResult {
                    used,
                    idx_str: "scan".to_string(),
                    already_ordered,
                    estimated_cost: rows as f64 + 10.0,
                    estimated_rows: rows,
                    ..Default::default()
                })
            }
        }
    }

    fn open(&mut self) -> Result<Box<dyn VTabCursor>> {
        Ok(Box::new(MemCursor {
            shared: Arc::clone(&self.shared),
            columns: self.columns,
            rows: Vec::new(),
            pos: 0,
        }))
    }

    fn disconnect(&mut self) -> Result<()> {
        self.shared.log("disconnect");
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        self.shared.log("destroy");
        self.shared.rows.lock().clear();
        Ok(())
    }

    fn as_update(&mut self) -> Option<&mut dyn UpdateVTab> {
        if self.updatable {
            Some(self)
        } else {
            None
        }
    }

    fn as_transaction(&mut self) -> Option<&mut dyn TransactionVTab> {
        Some(self)
    }
}

fn rowid_of(key: &Value) -> Result<i64> {
    key.as_i64()
        .ok_or_else(|| Error::module(format!("rowid must be an integer, got {:?}", key)))
}

impl UpdateVTab for MemTable {
    fn delete(&mut self, key: &Value) -> Result<()> {
        let id = rowid_of(key)?;
        self.shared.log(format!("delete {}", id));
        self.shared.rows.lock().remove(&id);
        Ok(())
    }

    fn insert(&mut self, key: &Value, columns: &[Value]) -> Result<i64> {
        let mut rows = self.shared.rows.lock();
        let id = match key {
            Value::Null => rows.keys().next_back().map_or(1, |last| last + 1),
            other => rowid_of(other)?,
        };
        if rows.contains_key(&id) {
            return Err(Error::module(format!("rowid {} already exists", id)));
        }
        rows.insert(id, columns.to_vec());
        drop(rows);

        self.shared.log(format!("insert {}", id));
        Ok(id)
    }

    fn update(&mut self, key: &Value, columns: &[ColumnUpdate]) -> Result<()> {
        let id = rowid_of(key)?;
        self.shared.updates.lock().push((key.clone(), columns.to_vec()));

        let mut rows = self.shared.rows.lock();
        let row = rows
            .get_mut(&id)
            .ok_or_else(|| Error::module(format!("no row {}", id)))?;
        for (slot, column) in row.iter_mut().zip(columns) {
            if let ColumnUpdate::Set(value) = column {
                *slot = value.clone();
            }
        }
        Ok(())
    }

    fn partial_update(&self) -> bool {
        self.partial_update
    }
}

impl TransactionVTab for MemTable {
    fn begin(&mut self) -> Result<()> {
        self.shared.log("begin");
        self.snapshot = Some(self.shared.rows.lock().clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.shared.log("commit");
        self.snapshot = None;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.shared.log("rollback");
        if let Some(rows) = self.snapshot.take() {
            *self.shared.rows.lock() = rows;
        }
        Ok(())
    }
}

pub struct MemCursor {
    shared: Arc<Shared>,
    columns: usize,
    rows: Vec<(i64, Vec<Value>)>,
    pos: usize,
}

impl VTabCursor for MemCursor {
    fn filter(&mut self, idx_num: i32, idx_str: &str, args: &[Value]) -> Result<()> {
        self.shared
            .log(format!("filter {} {} {}", idx_num, idx_str, args.len()));
        let rows = self.shared.rows.lock();

        self.rows = if idx_num == ROWID_LOOKUP {
            let id = args.first().and_then(Value::as_i64);
            id.and_then(|id| rows.get(&id).map(|row| (id, row.clone())))
                .into_iter()
                .collect()
        } else {
            rows.iter().map(|(id, row)| (*id, row.clone())).collect()
        };
        self.pos = 0;
        Ok(())
    }

    fn next(&mut self) -> Result<()> {
        self.pos += 1;
        Ok(())
    }

    fn eof(&self) -> bool {
        self.pos >= self.rows.len()
    }

    fn column(&mut self, sink: &mut dyn ColumnSink, column: usize, no_change: bool) -> Result<()> {
        if no_change {
            self.shared.log(format!("skip column {}", column));
            return Ok(());
        }
        if column >= self.columns {
            return Err(Error::module(format!("no column {}", column)));
        }
        match self.rows[self.pos].1.get(column) {
            Some(value) => sink.set_value(value),
            None => sink.set_null(),
        }
        Ok(())
    }

    fn rowid(&self) -> Result<i64> {
        Ok(self.rows[self.pos].0)
    }
}

pub fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}
