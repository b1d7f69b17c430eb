//! Database-schema and query backend
//!
//! The structured-data pipeline sees only `SqlBackend`; `SqliteBackend`
//! implements it over an sqlx pool.

mod schema;

pub use schema::{describe_schema, ColumnInfo, TableSchema};

use crate::tools::ERROR_PREFIX;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, TypeInfo, ValueRef};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// Query backend used by the structured-data path
#[async_trait]
pub trait SqlBackend: Send + Sync {
    /// Structured column listing for every user table
    async fn schema(&self) -> DbResult<Vec<TableSchema>>;

    /// Run a query; rows on success, `❌ Error: ...` text on failure
    async fn execute(&self, query: &str) -> String;

    /// DDL-style rendering of the schema
    async fn schema_ddl(&self) -> DbResult<String>;
}

/// Connection settings for the query backend
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub read_only: bool,
}

impl DbConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            read_only: true,
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }
}

/// sqlx-backed sqlite implementation
#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    pub async fn connect(config: &DbConfig) -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?.read_only(config.read_only);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await?;
        tracing::info!(
            url = %config.url,
            max_connections = config.max_connections,
            read_only = config.read_only,
            "Database pool ready"
        );
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_rendered(&self, query: &str) -> DbResult<String> {
        // The connection goes back to the pool when `conn` drops, on every path
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(query).fetch_all(&mut *conn).await?;
        Ok(render_rows(&rows))
    }

    async fn table_names(&self) -> DbResult<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }
}

#[async_trait]
impl SqlBackend for SqliteBackend {
    async fn schema(&self) -> DbResult<Vec<TableSchema>> {
        let mut tables = Vec::new();
        for name in self.table_names().await? {
            let rows = sqlx::query(
                "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid",
            )
            .bind(&name)
            .fetch_all(&self.pool)
            .await?;

            let columns = rows
                .iter()
                .map(|row| {
                    Ok(ColumnInfo {
                        name: row.try_get("name")?,
                        data_type: row.try_get("type")?,
                        nullable: row.try_get::<i64, _>("notnull")? == 0,
                        default: row.try_get("dflt_value")?,
                        primary_key: row.try_get::<i64, _>("pk")? > 0,
                    })
                })
                .collect::<Result<Vec<_>, sqlx::Error>>()?;

            tables.push(TableSchema { name, columns });
        }
        Ok(tables)
    }

    async fn execute(&self, query: &str) -> String {
        match self.fetch_rendered(query).await {
            Ok(rendered) => rendered,
            Err(e) => {
                tracing::warn!(error = %e, "Query execution failed");
                format!("{ERROR_PREFIX}{e}")
            }
        }
    }

    async fn schema_ddl(&self) -> DbResult<String> {
        let statements = sqlx::query_scalar::<_, String>(
            "SELECT sql FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND sql IS NOT NULL
             ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(statements
            .iter()
            .map(|s| format!("{};", s.trim()))
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

/// Render rows as a list of tuples: `[(1, 'Alice'), (2, 'Bob')]`
fn render_rows(rows: &[SqliteRow]) -> String {
    let rendered: Vec<String> = rows
        .iter()
        .map(|row| {
            let values: Vec<String> = (0..row.len()).map(|i| render_value(row, i)).collect();
            if values.len() == 1 {
                format!("({},)", values[0])
            } else {
                format!("({})", values.join(", "))
            }
        })
        .collect();
    format!("[{}]", rendered.join(", "))
}

fn render_value(row: &SqliteRow, idx: usize) -> String {
    let type_name = match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return "NULL".to_string(),
        Ok(raw) => raw.type_info().name().to_string(),
        Err(_) => return "?".to_string(),
    };

    let value = match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => row.try_get::<i64, _>(idx).map(|v| v.to_string()),
        "REAL" => row.try_get::<f64, _>(idx).map(render_real),
        "BLOB" => row
            .try_get::<Vec<u8>, _>(idx)
            .map(|v| format!("<{} bytes>", v.len())),
        _ => row
            .try_get::<String, _>(idx)
            .map(|v| quote_text(&v)),
    };
    value.unwrap_or_else(|_| "?".to_string())
}

/// Whole reals keep a trailing `.0`, as in `[(2.0,)]`
fn render_real(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

/// Quote a text value: single quotes unless the text holds a single quote
/// and no double quote, e.g. `"O'Brien"`
fn quote_text(value: &str) -> String {
    let delimiter = if value.contains('\'') && !value.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push(delimiter);
    for c in value.chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c if c == delimiter => {
                quoted.push('\\');
                quoted.push(c);
            }
            c => quoted.push(c),
        }
    }
    quoted.push(delimiter);
    quoted
}
