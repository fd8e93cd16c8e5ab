//! CREATE VIRTUAL TABLE arguments
//!
//! SQLite passes `argv[0]` = module name, `argv[1]` = database name,
//! `argv[2]` = table name, followed by whatever appeared inside the
//! parentheses of `USING module(...)`. Modules usually treat those trailing
//! arguments as `key=value` options; [`CreateArgs::options`] deserializes them
//! into a typed config struct.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value as JsonValue};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateArgs {
    pub module: String,
    pub database: String,
    pub table: String,
    pub arguments: Vec<String>,
}

impl CreateArgs {
    /// Split the raw engine argv into its fixed prefix and module arguments
    pub fn from_argv(argv: Vec<String>) -> Result<Self> {
        if argv.len() < 3 {
            return Err(Error::InvalidArgument(format!(
                "expected at least 3 create arguments, got {}",
                argv.len()
            )));
        }

        let mut iter = argv.into_iter();
        let module = iter.next().unwrap_or_default();
        let database = iter.next().unwrap_or_default();
        let table = iter.next().unwrap_or_default();

        Ok(CreateArgs {
            module,
            database,
            table,
            arguments: iter.collect(),
        })
    }

    /// Module arguments as `(key, value)` pairs
    ///
    /// Keys are trimmed; values are trimmed and dequoted. An argument without
    /// `=` yields an empty value.
    pub fn parameters(&self) -> Vec<(String, String)> {
        self.arguments
            .iter()
            .map(|arg| match arg.split_once('=') {
                Some((key, value)) => (key.trim().to_string(), dequote(value.trim())),
                None => (arg.trim().to_string(), String::new()),
            })
            .collect()
    }

    /// Deserialize the module arguments into `T`
    ///
    /// Unquoted values that parse as integers, floats or booleans are typed
    /// accordingly; everything else, and every quoted value, is a string.
    pub fn options<T: DeserializeOwned>(&self) -> Result<T> {
        let mut map = Map::new();
        for arg in &self.arguments {
            let (key, raw) = match arg.split_once('=') {
                Some((key, value)) => (key.trim(), value.trim()),
                None => (arg.trim(), ""),
            };
            map.insert(key.to_string(), typed_value(raw));
        }

        serde_json::from_value(JsonValue::Object(map)).map_err(|e| {
            Error::InvalidArgument(format!("{} arguments: {}", self.module, e))
        })
    }
}

fn typed_value(raw: &str) -> JsonValue {
    if is_quoted(raw) {
        return JsonValue::String(dequote(raw));
    }
    if let Ok(i) = raw.parse::<i64>() {
        return JsonValue::Number(i.into());
    }
    if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
        return JsonValue::Number(n);
    }
    match raw.to_ascii_lowercase().as_str() {
        "true" => JsonValue::Bool(true),
        "false" => JsonValue::Bool(false),
        _ => JsonValue::String(raw.to_string()),
    }
}

fn is_quoted(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() < 2 {
        return false;
    }
    matches!(
        (bytes[0], bytes[bytes.len() - 1]),
        (b'\'', b'\'') | (b'"', b'"') | (b'`', b'`') | (b'[', b']')
    )
}

/// Strip SQL quoting: `'..'`, `".."`, `` `..` `` or `[..]`, collapsing doubled
/// quote characters inside
pub fn dequote(s: &str) -> String {
    if !is_quoted(s) {
        return s.to_string();
    }

    let quote = s.as_bytes()[0] as char;
    let inner = &s[1..s.len() - 1];
    if quote == '[' {
        return inner.to_string();
    }

    let doubled: String = [quote, quote].iter().collect();
    inner.replace(&doubled, &quote.to_string())
}
