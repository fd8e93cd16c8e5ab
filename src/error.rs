use std::ffi::NulError;
use std::str::Utf8Error;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Arbitrary failure reported by a module implementation
    #[error("{0}")]
    Module(String),

    /// The offered plan is unusable; the engine reports a constraint failure
    #[error("constraint failed")]
    Constraint,

    #[error("virtual {module} table {}is not updatable", table_prefix(.table))]
    NotUpdatable {
        module: String,
        table: Option<String>,
    },

    #[error("best_index returned {got} usage flags for {expected} constraints")]
    PlanMismatch { expected: usize, got: usize },

    #[error("constraint {0} is not usable and cannot be claimed")]
    UnusableConstraint(usize),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("sqlite error {code}: {message}")]
    Sqlite { code: i32, message: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("rusqlite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),

    #[error("string contains interior NUL byte: {0}")]
    Nul(#[from] NulError),

    #[error("invalid UTF-8 text value: {0}")]
    Utf8(#[from] Utf8Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Generic module error with the given message
    pub fn module(message: impl Into<String>) -> Self {
        Error::Module(message.into())
    }

    /// True for the distinguished constraint-violation signal
    pub fn is_constraint(&self) -> bool {
        matches!(self, Error::Constraint)
    }
}

fn table_prefix(table: &Option<String>) -> String {
    match table {
        Some(name) => format!("{} ", name),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;
