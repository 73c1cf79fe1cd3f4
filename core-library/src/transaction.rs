//! # SQL Transactions
//!
//! A [`SqlTransaction`] is an ordered batch of statements built by the caller
//! and executed as a unit on the cache worker.
//!
//! ## Overview
//!
//! - [`SqlTransaction::add_sql`] queues a statement whose rows are discarded
//! - [`SqlTransaction::add_query`] queues a statement whose rows are collected
//!   under an output key
//! - [`SqlTransaction::add_mapped_query`] additionally reshapes each row
//!
//! With [`TransactionOptions::atomic`] set (the default) the batch runs inside
//! `BEGIN` / `COMMIT` and is rolled back on the first failing statement. With
//! it cleared the statements still run one after another on the worker, but a
//! failure leaves the statements before it applied.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let results = cache
//!     .transaction(
//!         |tx| {
//!             tx.add_sql("DELETE FROM DBState WHERE stateKey = ?", vec!["cursor".into()]);
//!             tx.add_query("SELECT count(*) AS total FROM Track", vec![], "count");
//!             Ok(())
//!         },
//!         TransactionOptions::default(),
//!     )
//!     .await?;
//! ```

use crate::{LibraryError, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::{Column, Connection, Row, SqliteConnection};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

/// Rows collected per output key.
pub type QueryResults = HashMap<String, Vec<Value>>;

/// Reshapes one result row, given as a column-name keyed object.
pub type RowMapper = Box<dyn Fn(Map<String, Value>) -> Result<Value> + Send + Sync>;

/// A bound statement parameter, one per SQLite storage class.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Serialize `value` to a JSON text parameter.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(SqlValue::Text(serde_json::to_string(value)?))
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Integer(i64::from(value))
    }
}

impl From<u32> for SqlValue {
    fn from(value: u32) -> Self {
        SqlValue::Integer(i64::from(value))
    }
}

impl From<u64> for SqlValue {
    fn from(value: u64) -> Self {
        SqlValue::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<usize> for SqlValue {
    fn from(value: usize) -> Self {
        SqlValue::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Real(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Integer(i64::from(value))
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<&String> for SqlValue {
    fn from(value: &String) -> Self {
        SqlValue::Text(value.clone())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(value: Vec<u8>) -> Self {
        SqlValue::Blob(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

struct Output {
    key: String,
    mapper: Option<RowMapper>,
}

/// One queued statement.
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<SqlValue>,
    output: Option<Output>,
}

impl SqlStatement {
    /// Output key the rows are collected under, if any.
    pub fn output_key(&self) -> Option<&str> {
        self.output.as_ref().map(|output| output.key.as_str())
    }
}

impl fmt::Debug for SqlStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlStatement")
            .field("sql", &self.sql)
            .field("params", &self.params)
            .field("output_key", &self.output_key())
            .field(
                "mapped",
                &self.output.as_ref().is_some_and(|o| o.mapper.is_some()),
            )
            .finish()
    }
}

/// Execution options for a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Bracket the batch with `BEGIN` / `COMMIT` and roll back on failure.
    pub atomic: bool,
}

impl TransactionOptions {
    /// Statements run serially without a rollback boundary.
    pub fn non_atomic() -> Self {
        Self { atomic: false }
    }
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self { atomic: true }
    }
}

/// Ordered batch of statements.
#[derive(Debug, Default)]
pub struct SqlTransaction {
    statements: Vec<SqlStatement>,
}

impl SqlTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sql(&mut self, sql: impl Into<String>, params: Vec<SqlValue>) -> &mut Self {
        self.statements.push(SqlStatement {
            sql: sql.into(),
            params,
            output: None,
        });
        self
    }

    pub fn add_query(
        &mut self,
        sql: impl Into<String>,
        params: Vec<SqlValue>,
        out_key: impl Into<String>,
    ) -> &mut Self {
        self.statements.push(SqlStatement {
            sql: sql.into(),
            params,
            output: Some(Output {
                key: out_key.into(),
                mapper: None,
            }),
        });
        self
    }

    pub fn add_mapped_query<F>(
        &mut self,
        sql: impl Into<String>,
        params: Vec<SqlValue>,
        out_key: impl Into<String>,
        mapper: F,
    ) -> &mut Self
    where
        F: Fn(Map<String, Value>) -> Result<Value> + Send + Sync + 'static,
    {
        self.statements.push(SqlStatement {
            sql: sql.into(),
            params,
            output: Some(Output {
                key: out_key.into(),
                mapper: Some(Box::new(mapper)),
            }),
        });
        self
    }

    pub fn statements(&self) -> &[SqlStatement] {
        &self.statements
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

// ============================================================================
// Execution
// ============================================================================

/// Run `transaction` on `conn`.
pub(crate) async fn execute(
    conn: &mut SqliteConnection,
    transaction: &SqlTransaction,
    options: TransactionOptions,
) -> Result<QueryResults> {
    debug!(
        statements = transaction.len(),
        atomic = options.atomic,
        "Executing transaction"
    );

    if !options.atomic {
        return run_statements(conn, &transaction.statements).await;
    }

    let mut tx = conn.begin().await?;
    match run_statements(&mut *tx, &transaction.statements).await {
        Ok(results) => {
            tx.commit().await?;
            Ok(results)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}

async fn run_statements(
    conn: &mut SqliteConnection,
    statements: &[SqlStatement],
) -> Result<QueryResults> {
    let mut results = QueryResults::new();

    for (index, statement) in statements.iter().enumerate() {
        let query = bind_params(sqlx::query(&statement.sql), &statement.params);

        let Some(output) = &statement.output else {
            query.execute(&mut *conn).await.map_err(|e| {
                warn!(index, sql = %statement.sql, error = %e, "Statement failed");
                LibraryError::Database(e)
            })?;
            continue;
        };

        let rows = query.fetch_all(&mut *conn).await.map_err(|e| {
            warn!(index, sql = %statement.sql, error = %e, "Query failed");
            LibraryError::Database(e)
        })?;

        let collected = results.entry(output.key.clone()).or_default();
        for row in &rows {
            let object = row_to_json(row);
            let value = match &output.mapper {
                Some(mapper) => mapper(object)?,
                None => Value::Object(object),
            };
            collected.push(value);
        }
    }

    Ok(results)
}

/// Convert a row to a column-name keyed object by storage class.
fn row_to_json(row: &SqliteRow) -> Map<String, Value> {
    let mut result = Map::new();

    for column in row.columns() {
        let ordinal = column.ordinal();

        let value = if let Ok(v) = row.try_get::<Option<i64>, _>(ordinal) {
            v.map(Value::from).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<f64>, _>(ordinal) {
            v.map(Value::from).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<String>, _>(ordinal) {
            v.map(Value::String).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(ordinal) {
            v.map(|bytes| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
                .unwrap_or(Value::Null)
        } else {
            Value::Null
        };

        result.insert(column.name().to_string(), value);
    }

    result
}

fn bind_params<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &'q [SqlValue],
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    let mut query = query;
    for param in params {
        query = match param {
            SqlValue::Null => query.bind(None::<i64>),
            SqlValue::Integer(i) => query.bind(*i),
            SqlValue::Real(r) => query.bind(*r),
            SqlValue::Text(s) => query.bind(s.as_str()),
            SqlValue::Blob(b) => query.bind(b.as_slice()),
        };
    }
    query
}
