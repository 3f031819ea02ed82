//! Driver trait executing statements against a connection.
//!
//! Concrete drivers live in submodules: [`SqliteDriver`] over `rusqlite`,
//! plus the [`TxDriver`] and [`DebugDriver`] decorators the client stacks
//! on top of any driver.

mod debug;
mod sqlite;
mod tx;

pub use debug::{DebugDriver, Logger, default_logger};
pub use sqlite::{SqliteConfig, SqliteDriver};
pub use tx::{TxDriver, TxState};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use crate::{context::Context, dialect::Dialect, errors::EntError, sql::Statement, value::Value};

/// Outcome of a statement that returns no rows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: usize,
    pub last_insert_id: i64,
}

/// One result row; columns are shared by every row of a result set.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

pub type Rows = Vec<Row>;

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        let (columns, values): (Vec<String>, Vec<Value>) = pairs
            .into_iter()
            .map(|(column, value)| (column.into(), value))
            .unzip();
        Self {
            columns: columns.into(),
            values,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Result<&Value, EntError> {
        self.columns
            .iter()
            .position(|name| name == column)
            .and_then(|idx| self.values.get(idx))
            .ok_or_else(|| EntError::decode(format!("missing column {column}")))
    }

    pub fn int(&self, column: &str) -> Result<i64, EntError> {
        self.opt_int(column)?
            .ok_or_else(|| EntError::decode(format!("column {column} is null")))
    }

    pub fn opt_int(&self, column: &str) -> Result<Option<i64>, EntError> {
        match self.get(column)? {
            Value::Null => Ok(None),
            Value::Int(v) => Ok(Some(*v)),
            Value::Bool(v) => Ok(Some(i64::from(*v))),
            other => Err(mismatch(column, "int", other)),
        }
    }

    pub fn float(&self, column: &str) -> Result<f64, EntError> {
        match self.get(column)? {
            Value::Float(v) => Ok(*v),
            Value::Int(v) => Ok(*v as f64),
            other => Err(mismatch(column, "float", other)),
        }
    }

    pub fn bool(&self, column: &str) -> Result<bool, EntError> {
        match self.get(column)? {
            Value::Bool(v) => Ok(*v),
            Value::Int(v) => Ok(*v != 0),
            other => Err(mismatch(column, "bool", other)),
        }
    }

    pub fn string(&self, column: &str) -> Result<String, EntError> {
        self.opt_string(column)?
            .ok_or_else(|| EntError::decode(format!("column {column} is null")))
    }

    pub fn opt_string(&self, column: &str) -> Result<Option<String>, EntError> {
        match self.get(column)? {
            Value::Null => Ok(None),
            Value::String(v) => Ok(Some(v.clone())),
            other => Err(mismatch(column, "string", other)),
        }
    }

    pub fn time(&self, column: &str) -> Result<DateTime<Utc>, EntError> {
        match self.get(column)? {
            Value::Time(v) => Ok(*v),
            Value::String(v) => DateTime::parse_from_rfc3339(v)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| EntError::decode(format!("column {column}: {e}"))),
            other => Err(mismatch(column, "time", other)),
        }
    }

    /// JSON column decoded into `T`; NULL decodes as `T::default()`.
    pub fn json<T: DeserializeOwned + Default>(&self, column: &str) -> Result<T, EntError> {
        let decoded = match self.get(column)? {
            Value::Null => return Ok(T::default()),
            Value::Json(v) => serde_json::from_value(v.clone()),
            Value::String(v) => serde_json::from_str(v),
            other => return Err(mismatch(column, "json", other)),
        };
        decoded.map_err(|e| EntError::decode(format!("column {column}: {e}")))
    }
}

fn mismatch(column: &str, expected: &str, got: &Value) -> EntError {
    EntError::decode(format!(
        "column {column}: expected {expected}, got {}",
        got.type_name()
    ))
}

/// A connection-level driver. Implementations must abort a running statement
/// once `ctx` is cancelled or past its deadline and report that as the error.
pub trait Driver: Send + Sync {
    fn exec(&self, ctx: &Context, stmt: &Statement) -> Result<ExecResult, EntError>;
    fn query(&self, ctx: &Context, stmt: &Statement) -> Result<Rows, EntError>;
    fn tx(&self, ctx: &Context) -> Result<Box<dyn Transaction>, EntError>;
    fn close(&self) -> Result<(), EntError>;
    fn dialect(&self) -> Dialect;

    /// True when statements already run inside a transaction.
    fn in_transaction(&self) -> bool {
        false
    }
}

/// A driver-level transaction; lifecycle bookkeeping lives in [`TxDriver`].
pub trait Transaction: Send + Sync {
    fn exec(&self, ctx: &Context, stmt: &Statement) -> Result<ExecResult, EntError>;
    fn query(&self, ctx: &Context, stmt: &Statement) -> Result<Rows, EntError>;
    fn commit(&self) -> Result<(), EntError>;
    fn rollback(&self) -> Result<(), EntError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_getters_coerce_storage_forms() {
        let row = Row::from_pairs([
            ("id", Value::Int(4)),
            ("active", Value::Int(1)),
            ("created_at", Value::from("2024-05-01T10:00:00.000000000Z")),
            ("tags", Value::from(r#"["a","b"]"#)),
            ("owner", Value::Null),
        ]);
        assert_eq!(row.int("id").unwrap(), 4);
        assert!(row.bool("active").unwrap());
        assert_eq!(row.time("created_at").unwrap().timestamp(), 1_714_557_600);
        assert_eq!(row.json::<Vec<String>>("tags").unwrap(), vec!["a", "b"]);
        assert_eq!(row.opt_int("owner").unwrap(), None);
    }

    #[test]
    fn test_row_reports_missing_and_mismatched_columns() {
        let row = Row::from_pairs([("name", Value::from("x"))]);
        assert!(matches!(row.int("id"), Err(EntError::DecodeError(_))));
        assert!(matches!(row.int("name"), Err(EntError::DecodeError(_))));
    }
}
