//! Per-user SQL sandboxes.
//!
//! Every user gets a private in-memory SQLite database seeded with sample
//! tables. A sandbox is a pool with exactly one connection, so a user's
//! queries run one at a time while different users run in parallel.
//! Sandboxes live in a moka cache and are dropped when idle or when the
//! cache is over capacity; the next request re-seeds from scratch.

use std::str::FromStr;
use std::time::{Duration, Instant};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use futures::TryStreamExt;
use moka::future::Cache;
use playground_core::error::AppError;
use playground_core::models::{
    ColumnInfo, PreparedQuery, QueryOutcome, TableInfo, ValidationOutcome,
};
use playground_core::sql::{StatementKind, analyze, unique_column_keys};
use playground_core::traits::QueryEngine;
use serde_json::{Map, Value};
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteStatement,
};
use sqlx::{Column, Either, Executor, Row, Sqlite, Statement, TypeInfo, ValueRef};

const SEED_SQL: &str = include_str!("../sql/sandbox_seed.sql");

/// SQLite progress handler granularity, in virtual machine instructions.
const PROGRESS_STEPS: i32 = 1000;

/// How long past its deadline a query may run before the tokio backstop
/// gives up on it.
const BACKSTOP_GRACE: Duration = Duration::from_secs(5);

/// Sandbox cache settings.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Sandboxes unused for this long are discarded.
    pub idle_timeout: Duration,
    /// Upper bound on live sandboxes.
    pub max_sandboxes: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30 * 60),
            max_sandboxes: 1000,
        }
    }
}

/// A single user's database.
#[derive(Clone)]
struct Sandbox {
    pool: SqlitePool,
}

impl Sandbox {
    async fn create() -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| AppError::DatabaseError(e.to_string()))?
            .foreign_keys(true);

        // The database lives as long as its only connection does.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to open sandbox: {e}")))?;

        sqlx::raw_sql(SEED_SQL)
            .execute(&pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to seed sandbox: {e}")))?;

        Ok(Self { pool })
    }

    async fn acquire(&self) -> Result<PoolConnection<Sqlite>, AppError> {
        self.pool
            .acquire()
            .await
            .map_err(|e| AppError::DatabaseError(format!("Sandbox unavailable: {e}")))
    }

    async fn run(&self, query: &PreparedQuery) -> Result<QueryOutcome, AppError> {
        let mut conn = self.acquire().await?;

        let started = Instant::now();
        let deadline = started + query.timeout;
        set_deadline(&mut conn, Some(deadline)).await?;

        let result = run_statement(&mut conn, query, deadline).await;

        if let Err(e) = set_deadline(&mut conn, None).await {
            tracing::warn!(error = %e, "Failed to clear sandbox progress handler");
        }

        let mut outcome = result?;
        outcome.execution_time = started.elapsed();
        Ok(outcome)
    }

    /// Whether only the sandbox's own databases are attached.
    async fn is_isolated(&self) -> bool {
        let foreign: Result<i64, sqlx::Error> = sqlx::query_scalar(
            "SELECT count(*) FROM pragma_database_list WHERE name NOT IN ('main', 'temp')",
        )
        .fetch_one(&self.pool)
        .await;

        match foreign {
            Ok(count) => count == 0,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to inspect sandbox databases");
                false
            }
        }
    }

    async fn validate(&self, statement: &str) -> Result<ValidationOutcome, AppError> {
        let kind = analyze(statement)?.kind;
        let mut conn = self.acquire().await?;
        let prepared = (&mut *conn)
            .prepare(statement)
            .await
            .map_err(syntax_error)?;

        Ok(ValidationOutcome {
            kind,
            columns: statement_columns(&prepared),
            parameter_count: parameter_count(&prepared),
        })
    }

    async fn describe(&self) -> Result<Vec<TableInfo>, AppError> {
        let objects: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT name, type
            FROM sqlite_master
            WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        let mut tables = Vec::with_capacity(objects.len());
        for (name, kind) in objects {
            let columns: Vec<(String, String, bool, i64)> = sqlx::query_as(
                r#"SELECT name, type, "notnull", pk FROM pragma_table_info(?) ORDER BY cid"#,
            )
            .bind(&name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

            tables.push(TableInfo {
                name,
                kind,
                columns: columns
                    .into_iter()
                    .map(|(column, declared, not_null, pk)| {
                        ColumnInfo::new(column, &declared).with_nullable(!not_null && pk == 0)
                    })
                    .collect(),
            });
        }

        Ok(tables)
    }
}

/// Install or remove the progress handler that interrupts statements past
/// `deadline`.
async fn set_deadline(
    conn: &mut PoolConnection<Sqlite>,
    deadline: Option<Instant>,
) -> Result<(), AppError> {
    let mut handle = conn
        .lock_handle()
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

    match deadline {
        Some(deadline) => {
            handle.set_progress_handler(PROGRESS_STEPS, move || Instant::now() < deadline)
        }
        None => handle.remove_progress_handler(),
    }
    Ok(())
}

async fn run_statement(
    conn: &mut PoolConnection<Sqlite>,
    query: &PreparedQuery,
    deadline: Instant,
) -> Result<QueryOutcome, AppError> {
    let sql = query.analyzed.statement.as_str();

    let prepared = (&mut **conn).prepare(sql).await.map_err(syntax_error)?;
    let expected = parameter_count(&prepared);
    if expected != query.parameters.len() {
        return Err(AppError::ParameterError(format!(
            "Statement expects {expected} parameter(s), {} given",
            query.parameters.len()
        )));
    }
    let mut columns = statement_columns(&prepared);
    drop(prepared);

    let mut bound = sqlx::query(sql);
    for value in &query.parameters {
        bound = bind_value(bound, value);
    }

    let failed = |e: sqlx::Error| execution_error(e, deadline, query.timeout);

    if !query.analyzed.returns_rows {
        let result = bound.execute(&mut **conn).await.map_err(failed)?;
        // sqlite3_changes() keeps the count of the last DML across DDL.
        let rows_affected = match query.analyzed.kind {
            StatementKind::Insert | StatementKind::Update | StatementKind::Delete => {
                result.rows_affected()
            }
            _ => 0,
        };
        return Ok(QueryOutcome {
            kind: query.analyzed.kind.clone(),
            columns,
            rows: Vec::new(),
            rows_affected,
            truncated: false,
            execution_time: Duration::ZERO,
        });
    }

    let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    let keys = unique_column_keys(&names);
    let mut observed: Vec<Option<&'static str>> = vec![None; keys.len()];

    let mut rows = Vec::new();
    let mut truncated = false;
    {
        let mut stream = bound.fetch(&mut **conn);
        while let Some(row) = stream.try_next().await.map_err(failed)? {
            if rows.len() >= query.limit {
                truncated = true;
                // Statements with side effects run to completion.
                if query.analyzed.kind.is_read_only() {
                    break;
                }
                continue;
            }
            rows.push(decode_row(&row, &keys, &mut observed)?);
        }
    }

    // Expression columns have no declared type; report what the data held.
    for (column, class) in columns.iter_mut().zip(observed) {
        if column.data_type == "NULL" {
            if let Some(class) = class {
                column.data_type = class.to_string();
            }
        }
    }

    Ok(QueryOutcome {
        kind: query.analyzed.kind.clone(),
        columns,
        rows_affected: rows.len() as u64,
        rows,
        truncated,
        execution_time: Duration::ZERO,
    })
}

fn statement_columns(statement: &SqliteStatement<'_>) -> Vec<ColumnInfo> {
    statement
        .columns()
        .iter()
        .map(|c| ColumnInfo::new(c.name(), c.type_info().name()))
        .collect()
}

fn parameter_count(statement: &SqliteStatement<'_>) -> usize {
    match statement.parameters() {
        Some(Either::Left(types)) => types.len(),
        Some(Either::Right(count)) => count,
        None => 0,
    }
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

/// Convert a row by storage class: INTEGER and REAL become numbers, TEXT a
/// string, BLOB a base64 string and NULL null.
fn decode_row(
    row: &SqliteRow,
    keys: &[String],
    observed: &mut [Option<&'static str>],
) -> Result<Map<String, Value>, AppError> {
    let decode_failed = |e: sqlx::Error| AppError::SqlExecutionError(e.to_string());
    let mut map = Map::with_capacity(keys.len());

    for (index, key) in keys.iter().enumerate() {
        let raw = row.try_get_raw(index).map_err(decode_failed)?;
        let (value, class) = if raw.is_null() {
            (Value::Null, None)
        } else {
            match raw.type_info().name() {
                "INTEGER" => (
                    Value::from(row.try_get_unchecked::<i64, _>(index).map_err(decode_failed)?),
                    Some("INTEGER"),
                ),
                "REAL" => {
                    let f = row.try_get_unchecked::<f64, _>(index).map_err(decode_failed)?;
                    (
                        serde_json::Number::from_f64(f)
                            .map(Value::Number)
                            .unwrap_or(Value::Null),
                        Some("REAL"),
                    )
                }
                "BLOB" => {
                    let bytes = row
                        .try_get_unchecked::<Vec<u8>, _>(index)
                        .map_err(decode_failed)?;
                    (Value::String(STANDARD.encode(bytes)), Some("BLOB"))
                }
                _ => (
                    Value::String(
                        row.try_get_unchecked::<String, _>(index)
                            .map_err(decode_failed)?,
                    ),
                    Some("TEXT"),
                ),
            }
        };

        if observed[index].is_none() {
            observed[index] = class;
        }
        map.insert(key.clone(), value);
    }

    Ok(map)
}

fn syntax_error(e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::Database(db) => AppError::SqlSyntaxError(db.message().to_string()),
        other => AppError::DatabaseError(other.to_string()),
    }
}

fn execution_error(e: sqlx::Error, deadline: Instant, timeout: Duration) -> AppError {
    if Instant::now() >= deadline {
        return AppError::Timeout(timeout.as_secs());
    }
    match e {
        sqlx::Error::Database(db) => AppError::SqlExecutionError(db.message().to_string()),
        other => AppError::DatabaseError(other.to_string()),
    }
}

/// [`QueryEngine`] over a cache of per-user sandboxes.
#[derive(Clone)]
pub struct SandboxManager {
    sandboxes: Cache<String, Sandbox>,
}

impl SandboxManager {
    pub fn new(config: SandboxConfig) -> Self {
        let sandboxes = Cache::builder()
            .max_capacity(config.max_sandboxes)
            .time_to_idle(config.idle_timeout)
            .eviction_listener(|owner, _sandbox, cause| {
                tracing::debug!(user = %owner, ?cause, "Sandbox discarded");
            })
            .build();

        Self { sandboxes }
    }

    async fn sandbox(&self, owner: &str) -> Result<Sandbox, AppError> {
        self.sandboxes
            .try_get_with(owner.to_string(), async {
                tracing::info!(user = %owner, "Creating sandbox");
                Sandbox::create().await
            })
            .await
            .map_err(|e| match e.as_ref() {
                AppError::DatabaseError(message) => AppError::DatabaseError(message.clone()),
                other => AppError::DatabaseError(other.to_string()),
            })
    }

    /// Number of live sandboxes.
    pub async fn active_sandboxes(&self) -> u64 {
        self.sandboxes.run_pending_tasks().await;
        self.sandboxes.entry_count()
    }
}

impl QueryEngine for SandboxManager {
    async fn execute(&self, owner: &str, query: &PreparedQuery) -> Result<QueryOutcome, AppError> {
        let sandbox = self.sandbox(owner).await?;

        match tokio::time::timeout(query.timeout + BACKSTOP_GRACE, sandbox.run(query)).await {
            Ok(result) => {
                if !sandbox.is_isolated().await {
                    tracing::warn!(user = %owner, "Sandbox reached another database, discarding it");
                    self.sandboxes.invalidate(owner).await;
                    return Err(AppError::ForbiddenStatement(
                        "ATTACH statements are not allowed in the sandbox".into(),
                    ));
                }
                result
            }
            Err(_) => {
                // The connection may still be busy; start the user over.
                tracing::warn!(user = %owner, "Query ignored its deadline, discarding sandbox");
                self.sandboxes.invalidate(owner).await;
                Err(AppError::Timeout(query.timeout.as_secs()))
            }
        }
    }

    async fn validate(&self, owner: &str, statement: &str) -> Result<ValidationOutcome, AppError> {
        self.sandbox(owner).await?.validate(statement).await
    }

    async fn describe_schema(&self, owner: &str) -> Result<Vec<TableInfo>, AppError> {
        self.sandbox(owner).await?.describe().await
    }

    async fn reset(&self, owner: &str) -> Result<(), AppError> {
        self.sandboxes.invalidate(owner).await;
        Ok(())
    }
}
