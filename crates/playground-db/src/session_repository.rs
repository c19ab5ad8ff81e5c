use chrono::{Duration, Utc};
use playground_core::error::AppError;
use playground_core::models::{Principal, compute_hash};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Server-side login sessions.
///
/// Clients hold a random session id; the table only stores its SHA-256, so
/// a leaked database does not yield usable cookies.
#[derive(Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Start a session for `principal`. Returns the raw session id.
    pub async fn create(&self, principal: &Principal, ttl: Duration) -> Result<String, AppError> {
        let raw_id = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO sessions (id_hash, login, email, avatar_url, access_token, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(compute_hash(&raw_id))
        .bind(&principal.login)
        .bind(&principal.email)
        .bind(&principal.avatar_url)
        .bind(&principal.access_token)
        .bind(now.timestamp())
        .bind((now + ttl).timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        tracing::debug!(user = %principal.login, "Session created");
        Ok(raw_id)
    }

    /// Look up a live session. Expired sessions are treated as absent.
    pub async fn find(&self, raw_id: &str) -> Result<Option<Principal>, AppError> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT login, email, avatar_url, access_token
            FROM sessions
            WHERE id_hash = ? AND expires_at > ?
            "#,
        )
        .bind(compute_hash(raw_id))
        .bind(Utc::now().timestamp())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    /// End a session. Returns false if it did not exist.
    pub async fn delete(&self, raw_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id_hash = ?")
            .bind(compute_hash(raw_id))
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove expired sessions. Returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    login: String,
    email: Option<String>,
    avatar_url: Option<String>,
    access_token: String,
}

impl From<SessionRow> for Principal {
    fn from(row: SessionRow) -> Self {
        Self {
            login: row.login,
            email: row.email,
            avatar_url: row.avatar_url,
            access_token: row.access_token,
        }
    }
}
