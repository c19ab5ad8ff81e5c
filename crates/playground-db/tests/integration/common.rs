use std::time::Duration;

use playground_core::models::{PreparedQuery, SandboxLimits};
use playground_core::sql::analyze;
use playground_db::Database;
use sqlx::sqlite::SqlitePoolOptions;

/// Opens a fresh in-memory application database with migrations applied.
///
/// A single connection keeps every query on the same in-memory database.
pub async fn setup_test_db() -> Database {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");

    let db = Database::from_pool(pool);
    db.migrate().await.expect("Failed to run migrations");
    db
}

/// Builds a prepared query the way the query service would.
pub fn prepared(sql: &str) -> PreparedQuery {
    let limits = SandboxLimits::default();
    PreparedQuery {
        analyzed: analyze(sql).expect("query should pass analysis"),
        parameters: Vec::new(),
        limit: limits.max_rows,
        timeout: limits.default_timeout,
    }
}

pub fn prepared_with(
    sql: &str,
    parameters: Vec<serde_json::Value>,
    limit: usize,
    timeout: Duration,
) -> PreparedQuery {
    PreparedQuery {
        parameters,
        limit,
        timeout,
        ..prepared(sql)
    }
}
