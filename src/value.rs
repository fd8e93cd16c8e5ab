//! Dynamic values exchanged between SQLite and module code
//!
//! Everything SQLite hands to a module (filter arguments, mutation arguments)
//! arrives as an owned [`Value`], copied out of engine memory for the duration
//! of the call and beyond. Results flow back through a [`ColumnSink`].

use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use serde::{Deserialize, Serialize};

/// Storage class of a [`Value`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Null,
    Integer,
    Real,
    Text,
    Blob,
}

/// Owned SQLite value
///
/// `Null` and an empty `Blob` are different values even though both reach the
/// native layer as a zero-length byte sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Integer(_) => ValueKind::Integer,
            Value::Real(_) => ValueKind::Real,
            Value::Text(_) => ValueKind::Text,
            Value::Blob(_) => ValueKind::Blob,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Real(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Blob(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<SqlValue> for Value {
    fn from(v: SqlValue) -> Self {
        match v {
            SqlValue::Null => Value::Null,
            SqlValue::Integer(i) => Value::Integer(i),
            SqlValue::Real(f) => Value::Real(f),
            SqlValue::Text(s) => Value::Text(s),
            SqlValue::Blob(b) => Value::Blob(b),
        }
    }
}

impl From<Value> for SqlValue {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => SqlValue::Null,
            Value::Integer(i) => SqlValue::Integer(i),
            Value::Real(f) => SqlValue::Real(f),
            Value::Text(s) => SqlValue::Text(s),
            Value::Blob(b) => SqlValue::Blob(b),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(match self {
            Value::Null => ValueRef::Null,
            Value::Integer(i) => ValueRef::Integer(*i),
            Value::Real(f) => ValueRef::Real(*f),
            Value::Text(s) => ValueRef::Text(s.as_bytes()),
            Value::Blob(b) => ValueRef::Blob(b),
        }))
    }
}

/// One column of an UPDATE row
///
/// `Unchanged` is the "leave as-is" marker for columns the statement does not
/// assign. It is a distinct variant, never encoded as `Value::Null`.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnUpdate {
    Unchanged,
    Set(Value),
}

impl ColumnUpdate {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, ColumnUpdate::Unchanged)
    }

    /// New value, or `None` when the column keeps its current value
    pub fn value(&self) -> Option<&Value> {
        match self {
            ColumnUpdate::Unchanged => None,
            ColumnUpdate::Set(v) => Some(v),
        }
    }
}

/// Destination for one column value produced by a cursor
///
/// The engine-side implementation copies every value into engine-owned memory
/// before returning, so borrowed arguments need not outlive the call.
pub trait ColumnSink {
    fn set_null(&mut self);
    fn set_i64(&mut self, value: i64);
    fn set_f64(&mut self, value: f64);
    fn set_text(&mut self, value: &str);
    fn set_blob(&mut self, value: &[u8]);

    fn set_value(&mut self, value: &Value) {
        match value {
            Value::Null => self.set_null(),
            Value::Integer(i) => self.set_i64(*i),
            Value::Real(f) => self.set_f64(*f),
            Value::Text(s) => self.set_text(s),
            Value::Blob(b) => self.set_blob(b),
        }
    }
}

/// Sink that keeps the last value written, for driving cursors outside SQLite
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CapturedValue(pub Option<Value>);

impl CapturedValue {
    pub fn take(&mut self) -> Option<Value> {
        self.0.take()
    }
}

impl ColumnSink for CapturedValue {
    fn set_null(&mut self) {
        self.0 = Some(Value::Null);
    }

    fn set_i64(&mut self, value: i64) {
        self.0 = Some(Value::Integer(value));
    }

    fn set_f64(&mut self, value: f64) {
        self.0 = Some(Value::Real(value));
    }

    fn set_text(&mut self, value: &str) {
        self.0 = Some(Value::Text(value.to_string()));
    }

    fn set_blob(&mut self, value: &[u8]) {
        self.0 = Some(Value::Blob(value.to_vec()));
    }
}
