//! Statement execution against MySQL
//!
//! The statement is prepared first so its result columns are known before it
//! runs. A statement with no result columns reports affected rows instead of an
//! empty row set, which keeps "UPDATE matched nothing" distinct from "SELECT
//! returned nothing".

use crate::config::DbConfig;
use crate::db::connection::{classify_error, connect, connect_options};
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column, Connection, Executor, Row, Statement};
use std::future::Future;
use std::pin::Pin;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of running one statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryOutcome {
    /// The statement produced a result set, possibly with zero rows.
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<Option<String>>>,
    },
    /// The statement produced no result set.
    Affected { rows_affected: u64 },
}

impl QueryOutcome {
    pub fn row_count(&self) -> usize {
        match self {
            QueryOutcome::Rows { rows, .. } => rows.len(),
            QueryOutcome::Affected { .. } => 0,
        }
    }
}

/// Something that runs SQL and reports rows or an error. Implementations do
/// not retry.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<QueryOutcome>;
}

pub struct MySqlExecutor {
    options: MySqlConnectOptions,
}

impl MySqlExecutor {
    pub fn new(config: &DbConfig) -> Self {
        Self {
            options: connect_options(config),
        }
    }

    /// Opens a connection for callers that need more than one statement.
    pub async fn connect(&self) -> Result<MySqlConnection> {
        connect(&self.options).await
    }
}

#[async_trait]
impl QueryExecutor for MySqlExecutor {
    async fn execute(&self, sql: &str) -> Result<QueryOutcome> {
        let started = Instant::now();
        let mut conn = self.connect().await?;

        let outcome = run_statement(&mut conn, sql).await;

        if let Err(e) = conn.close().await {
            warn!("Failed to close database connection cleanly: {}", e);
        }

        match &outcome {
            Ok(result) => info!(
                rows = result.row_count(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "query executed"
            ),
            Err(e) => warn!("query failed: {}", e),
        }
        outcome
    }
}

type StatementFuture<'c> = Pin<Box<dyn Future<Output = Result<QueryOutcome>> + Send + 'c>>;

/// Boxed at a concrete lifetime so the borrowed connection never has to be
/// proven `Send` for every lifetime inside the `async_trait` body.
fn run_statement<'c>(conn: &'c mut MySqlConnection, sql: &'c str) -> StatementFuture<'c> {
    Box::pin(async move {
        let columns: Vec<String> = {
            let statement = Executor::prepare(&mut *conn, sql)
                .await
                .map_err(classify_error)?;
            statement
                .columns()
                .iter()
                .map(|column| column.name().to_string())
                .collect()
        };

        // A bare `&str` carries no arguments, so it goes over the text protocol.
        if columns.is_empty() {
            let result = Executor::execute(&mut *conn, sql)
                .await
                .map_err(classify_error)?;
            debug!(rows_affected = result.rows_affected(), "statement without result set");
            return Ok(QueryOutcome::Affected {
                rows_affected: result.rows_affected(),
            });
        }

        let rows = Executor::fetch_all(&mut *conn, sql)
            .await
            .map_err(classify_error)?;

        Ok(QueryOutcome::Rows {
            rows: rows.iter().map(|row| row_text(row, columns.len())).collect(),
            columns,
        })
    })
}

/// Renders each cell as text. Over the text protocol every
/// non-NULL value arrives as its textual form regardless of column type.
fn row_text(row: &MySqlRow, width: usize) -> Vec<Option<String>> {
    (0..width.min(row.len()))
        .map(|index| match row.try_get_unchecked::<Option<String>, _>(index) {
            Ok(value) => value,
            Err(e) => {
                debug!(index = index, "cell is not valid text: {}", e);
                Some("<binary>".to_string())
            }
        })
        .collect()
}
