//! Connection traits and the sqlx-backed implementation.

use std::sync::Once;

use async_trait::async_trait;
use sqlx::any::AnyRow;
use sqlx::{AnyConnection, Connection as _};

use error::{ConnectError, ProxyError, QueryError};

use crate::bind::{BindMap, BindValue, Row, SqlValue};
use crate::config::{DbConfig, DbDriver};
use crate::sql::rewrite_placeholders;

/// A single physical database connection.
///
/// Exclusively owned by one worker; never shared. Implementations block the
/// owning task until the database responds.
#[async_trait]
pub trait Connection: Send {
    /// Prepare and execute one statement.
    ///
    /// Returns the full result row set, or `None` if the statement produced
    /// no result.
    async fn execute(&mut self, sql: &str, bindings: &BindMap)
        -> Result<Option<Vec<Row>>, QueryError>;

    /// Open a transaction on this connection.
    async fn begin(&mut self) -> Result<(), QueryError>;

    /// Commit the open transaction.
    async fn commit(&mut self) -> Result<(), QueryError>;

    /// Roll back the open transaction.
    async fn rollback(&mut self) -> Result<(), QueryError>;

    /// Trivial round-trip used by the liveness probe.
    async fn ping(&mut self) -> Result<(), QueryError>;
}

/// Creates connections from a configuration template.
///
/// The seam that lets workers re-establish connections and tests substitute
/// scripted ones.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn connect(&self, config: &DbConfig) -> Result<Box<dyn Connection>, ProxyError>;
}

/// Factory producing real sqlx connections.
#[derive(Debug, Clone, Default)]
pub struct SqlxFactory;

static INSTALL_DRIVERS: Once = Once::new();

#[async_trait]
impl ConnectionFactory for SqlxFactory {
    async fn connect(&self, config: &DbConfig) -> Result<Box<dyn Connection>, ProxyError> {
        // URL construction fails before any I/O for bad configurations
        let url = config.connection_url()?;

        INSTALL_DRIVERS.call_once(sqlx::any::install_default_drivers);

        let conn = AnyConnection::connect(&url)
            .await
            .map_err(|e| ConnectError::Failed(e.to_string()))?;

        tracing::debug!(
            driver = %config.driver,
            database = %config.database,
            "connection established"
        );

        Ok(Box::new(SqlxConnection {
            conn,
            driver: config.driver,
        }))
    }
}

/// A live connection over sqlx's `Any` driver.
pub struct SqlxConnection {
    conn: AnyConnection,
    driver: DbDriver,
}

#[async_trait]
impl Connection for SqlxConnection {
    async fn execute(
        &mut self,
        sql: &str,
        bindings: &BindMap,
    ) -> Result<Option<Vec<Row>>, QueryError> {
        let (sql, keys) = rewrite_placeholders(sql, self.driver);

        let mut query = sqlx::query(&sql);
        for key in &keys {
            let value = bindings
                .get(key)
                .ok_or_else(|| QueryError::Failed(format!("missing bind value for {key}")))?;
            query = match value {
                BindValue::Int(v) => query.bind(*v),
                BindValue::Blob(v) => query.bind(v.clone()),
                BindValue::Text(v) => query.bind(v.clone()),
            };
        }

        let rows = query
            .fetch_all(&mut self.conn)
            .await
            .map_err(classify_sqlx_error)?;

        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(rows.iter().map(decode_row).collect()))
    }

    async fn begin(&mut self) -> Result<(), QueryError> {
        self.raw("BEGIN").await
    }

    async fn commit(&mut self) -> Result<(), QueryError> {
        self.raw("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<(), QueryError> {
        self.raw("ROLLBACK").await
    }

    async fn ping(&mut self) -> Result<(), QueryError> {
        sqlx::query("SELECT 1")
            .fetch_one(&mut self.conn)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(())
    }
}

impl SqlxConnection {
    async fn raw(&mut self, sql: &str) -> Result<(), QueryError> {
        sqlx::query(sql)
            .execute(&mut self.conn)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(())
    }
}

/// Error codes that mean the connection itself is gone, not the statement.
///
/// mysql: server gone away / lost connection during query.
/// postgres: admin shutdown, crash shutdown, cannot connect now, and the
/// 08xxx connection-exception class.
const TRANSIENT_DISCONNECT_CODES: &[&str] = &[
    "2006", "2013", "08000", "08003", "08006", "57P01", "57P02", "57P03",
];

/// Map a sqlx error into the proxy taxonomy.
///
/// Dropped sockets surface as I/O errors; server-initiated disconnects
/// surface as database errors with a driver code. Both classify as
/// transient connection loss; everything else is a plain query failure.
pub fn classify_sqlx_error(err: sqlx::Error) -> QueryError {
    match &err {
        sqlx::Error::Io(_) | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
            QueryError::ConnectionLost(err.to_string())
        }
        sqlx::Error::Database(db) => {
            if let Some(code) = db.code() {
                if TRANSIENT_DISCONNECT_CODES.contains(&code.as_ref()) {
                    return QueryError::ConnectionLost(err.to_string());
                }
            }
            QueryError::Failed(err.to_string())
        }
        _ => QueryError::Failed(err.to_string()),
    }
}

fn decode_row(row: &AnyRow) -> Row {
    use sqlx::{Column, Row as _};

    let mut out = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        out.insert(column.name().to_string(), decode_value(row, idx));
    }
    out
}

fn decode_value(row: &AnyRow, idx: usize) -> SqlValue {
    use sqlx::Row as _;

    if let Ok(value) = row.try_get::<Option<i64>, _>(idx) {
        return value.map(SqlValue::Int).unwrap_or(SqlValue::Null);
    }
    if let Ok(value) = row.try_get::<Option<f64>, _>(idx) {
        return value.map(SqlValue::Float).unwrap_or(SqlValue::Null);
    }
    if let Ok(value) = row.try_get::<Option<bool>, _>(idx) {
        return value.map(SqlValue::Bool).unwrap_or(SqlValue::Null);
    }
    if let Ok(value) = row.try_get::<Option<String>, _>(idx) {
        return value.map(SqlValue::Text).unwrap_or(SqlValue::Null);
    }
    if let Ok(value) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return value.map(SqlValue::Blob).unwrap_or(SqlValue::Null);
    }
    SqlValue::Null
}
