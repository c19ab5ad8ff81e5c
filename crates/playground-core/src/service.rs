use std::time::Duration;

use crate::error::AppError;
use crate::models::{
    HistoryEntry, NewHistoryEntry, PreparedQuery, QueryInput, QueryOutcome, SandboxLimits,
    TableInfo, ValidationOutcome,
};
use crate::sql::analyze;
use crate::traits::{HistoryStore, QueryEngine};

pub const DEFAULT_HISTORY_LIMIT: usize = 10;
pub const MAX_HISTORY_LIMIT: usize = 100;

/// Orchestrates a playground request: validate → analyse → run in the
/// user's sandbox → record history.
///
/// Generic over the engine and the history store so it can be tested
/// without a database.
pub struct QueryService<E, H>
where
    E: QueryEngine,
    H: HistoryStore,
{
    engine: E,
    history: H,
    limits: SandboxLimits,
}

impl<E, H> QueryService<E, H>
where
    E: QueryEngine,
    H: HistoryStore,
{
    pub fn new(engine: E, history: H, limits: SandboxLimits) -> Self {
        Self {
            engine,
            history,
            limits,
        }
    }

    /// Validate and analyse a request, resolving its limits.
    ///
    /// The limit defaults to and is capped at `max_rows`; the timeout
    /// defaults to `default_timeout` and is clamped to `max_timeout`.
    pub fn prepare(&self, input: &QueryInput) -> Result<PreparedQuery, AppError> {
        input.validate()?;
        let analyzed = analyze(&input.query)?;

        let parameters = match &input.parameters {
            Some(params) => params.clone().into_positional()?,
            None => Vec::new(),
        };

        let limit = input
            .limit
            .map(|l| (l as usize).min(self.limits.max_rows))
            .unwrap_or(self.limits.max_rows);

        let timeout = input
            .timeout
            .map(|t| Duration::from_secs(u64::from(t)).min(self.limits.max_timeout))
            .unwrap_or(self.limits.default_timeout);

        Ok(PreparedQuery {
            analyzed,
            parameters,
            limit,
            timeout,
        })
    }

    /// Run a query in the user's sandbox.
    ///
    /// Successful and failed queries are both recorded; malformed requests
    /// are not. A failure to record history is logged and otherwise ignored.
    pub async fn execute(&self, login: &str, input: &QueryInput) -> Result<QueryOutcome, AppError> {
        let result = match self.prepare(input) {
            Ok(prepared) => {
                tracing::debug!(
                    user = %login,
                    kind = %prepared.analyzed.kind,
                    limit = prepared.limit,
                    timeout_secs = prepared.timeout.as_secs(),
                    "Executing query"
                );
                self.engine.execute(login, &prepared).await
            }
            Err(e) => Err(e),
        };

        match &result {
            Ok(outcome) => {
                tracing::info!(
                    user = %login,
                    kind = %outcome.kind,
                    rows = outcome.rows_affected,
                    truncated = outcome.truncated,
                    elapsed_ms = outcome.execution_time.as_millis() as u64,
                    "Query executed"
                );
                let entry = NewHistoryEntry {
                    user_login: login.to_string(),
                    query: input.query.clone(),
                    parameters: parameters_json(input),
                    success: true,
                    message: "Query executed successfully".to_string(),
                    error_code: None,
                    rows_affected: Some(outcome.rows_affected),
                    execution_time_ms: Some(outcome.execution_time.as_millis() as u64),
                };
                self.record(&entry).await;
            }
            Err(e) if e.is_query_failure() => {
                tracing::info!(user = %login, error = %e, "Query failed");
                let entry = NewHistoryEntry {
                    user_login: login.to_string(),
                    query: input.query.clone(),
                    parameters: parameters_json(input),
                    success: false,
                    message: e.to_string(),
                    error_code: e.sql_error_code().map(str::to_string),
                    rows_affected: None,
                    execution_time_ms: None,
                };
                self.record(&entry).await;
            }
            Err(_) => {}
        }

        result
    }

    /// Check that a query would prepare in the user's sandbox, without running it.
    pub async fn validate(
        &self,
        login: &str,
        input: &QueryInput,
    ) -> Result<ValidationOutcome, AppError> {
        let prepared = self.prepare(input)?;
        let outcome = self
            .engine
            .validate(login, &prepared.analyzed.statement)
            .await?;

        if input.parameters.is_some() && prepared.parameters.len() != outcome.parameter_count {
            return Err(AppError::ParameterError(format!(
                "Statement expects {} parameter(s), {} given",
                outcome.parameter_count,
                prepared.parameters.len()
            )));
        }

        Ok(outcome)
    }

    /// Most recent queries of a user, newest first.
    pub async fn history(
        &self,
        login: &str,
        limit: Option<usize>,
    ) -> Result<Vec<HistoryEntry>, AppError> {
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT);
        self.history.recent(login, limit).await
    }

    pub async fn schema(&self, login: &str) -> Result<Vec<TableInfo>, AppError> {
        self.engine.describe_schema(login).await
    }

    pub async fn reset(&self, login: &str) -> Result<(), AppError> {
        tracing::info!(user = %login, "Resetting sandbox");
        self.engine.reset(login).await
    }

    async fn record(&self, entry: &NewHistoryEntry) {
        if let Err(e) = self.history.record(entry).await {
            tracing::warn!(user = %entry.user_login, error = %e, "Failed to record query history");
        }
    }
}

fn parameters_json(input: &QueryInput) -> Option<serde_json::Value> {
    input
        .parameters
        .as_ref()
        .and_then(|p| serde_json::to_value(p).ok())
}
