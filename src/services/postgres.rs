use crate::models::{ListingPair, Match, WeightVector, Weights};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when interacting with PostgreSQL
#[derive(Debug, Error)]
pub enum PostgresError {
    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Weight version {0} already exists")]
    VersionTaken(u64),
}

/// PostgreSQL client for the outcome archive and weight history
///
/// Terminal matches are stored as JSONB snapshots so the optimizer can be
/// re-seeded after a restart, and every committed weight version is kept
/// append-only.
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Create a new PostgreSQL client from a connection string
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout_secs: u64,
        idle_timeout_secs: u64,
    ) -> Result<Self, PostgresError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(idle_timeout_secs))
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        // Run migrations on startup
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a new PostgreSQL client from settings
    pub async fn from_settings(
        url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
        acquire_timeout_secs: Option<u64>,
        idle_timeout_secs: Option<u64>,
    ) -> Result<Self, PostgresError> {
        tracing::info!("Connecting to PostgreSQL");

        Self::new(
            url,
            max_connections.unwrap_or(10),
            min_connections.unwrap_or(1),
            acquire_timeout_secs.unwrap_or(5),
            idle_timeout_secs.unwrap_or(600),
        )
        .await
    }

    /// Persist a terminal match
    ///
    /// Re-archiving the same match id is a no-op.
    pub async fn archive_match(&self, m: &Match) -> Result<(), PostgresError> {
        if !m.state.is_terminal() {
            return Err(PostgresError::InvalidInput(format!(
                "match {} is still {}",
                m.id, m.state
            )));
        }

        let query = r#"
            INSERT INTO archived_matches
                (id, source_listing_id, candidate_listing_id, final_state,
                 weight_version, score, snapshot, closed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
        "#;

        sqlx::query(query)
            .bind(m.id)
            .bind(to_i64(m.source_listing_id)?)
            .bind(to_i64(m.candidate_listing_id)?)
            .bind(m.state.as_str())
            .bind(to_i64(m.weights.version)?)
            .bind(m.score)
            .bind(Json(m))
            .bind(m.updated_at)
            .execute(&self.pool)
            .await?;

        tracing::debug!("Archived match {} ({})", m.id, m.state);

        Ok(())
    }

    /// Persist a batch of terminal matches, returning how many were written
    ///
    /// Individual failures are logged and skipped.
    pub async fn archive_matches(&self, matches: &[Match]) -> usize {
        let mut written = 0;
        for m in matches {
            match self.archive_match(m).await {
                Ok(()) => written += 1,
                Err(e) => tracing::warn!("Failed to archive match {}: {}", m.id, e),
            }
        }
        written
    }

    /// Terminal matches closed at or after `since`, oldest first
    pub async fn load_archived_matches(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Match>, PostgresError> {
        let query = r#"
            SELECT snapshot
            FROM archived_matches
            WHERE closed_at >= $1
            ORDER BY closed_at ASC
        "#;

        let rows = sqlx::query(query).bind(since).fetch_all(&self.pool).await?;

        let mut matches = Vec::with_capacity(rows.len());
        for row in &rows {
            match row.try_get::<Json<Match>, _>("snapshot") {
                Ok(Json(m)) => matches.push(m),
                Err(e) => tracing::warn!("Skipping unreadable archived match: {}", e),
            }
        }

        tracing::debug!("Loaded {} archived matches since {}", matches.len(), since);

        Ok(matches)
    }

    /// Every unordered listing pair that has a closed match, over the whole archive
    pub async fn load_closed_pairs(&self) -> Result<Vec<ListingPair>, PostgresError> {
        let query = r#"
            SELECT DISTINCT
                LEAST(source_listing_id, candidate_listing_id) AS low,
                GREATEST(source_listing_id, candidate_listing_id) AS high
            FROM archived_matches
        "#;

        let rows = sqlx::query(query).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| -> Result<ListingPair, PostgresError> {
                let low: i64 = row.try_get("low")?;
                let high: i64 = row.try_get("high")?;
                Ok(ListingPair::new(to_u64(low)?, to_u64(high)?))
            })
            .collect()
    }

    /// Append a committed weight version
    ///
    /// Version numbers are never reused: an existing row yields
    /// `VersionTaken` and leaves the stored entry untouched.
    pub async fn save_weight_version(&self, vector: &WeightVector) -> Result<(), PostgresError> {
        let query = r#"
            INSERT INTO weight_versions (version, weights, author, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (version) DO NOTHING
        "#;

        let result = sqlx::query(query)
            .bind(to_i64(vector.version)?)
            .bind(Json(&vector.weights))
            .bind(&vector.author)
            .bind(vector.created_at)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(PostgresError::VersionTaken(vector.version));
        }

        tracing::info!("Persisted weight version {} by {}", vector.version, vector.author);

        Ok(())
    }

    /// Every persisted weight version, ascending
    pub async fn load_weight_history(&self) -> Result<Vec<WeightVector>, PostgresError> {
        let query = r#"
            SELECT version, weights, author, created_at
            FROM weight_versions
            ORDER BY version ASC
        "#;

        let rows = sqlx::query(query).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| -> Result<WeightVector, PostgresError> {
                let version: i64 = row.try_get("version")?;
                let Json(weights): Json<Weights> = row.try_get("weights")?;
                Ok(WeightVector {
                    version: to_u64(version)?,
                    weights,
                    author: row.try_get("author")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    /// Get statistics about the outcome archive
    pub async fn archive_stats(&self) -> Result<ArchiveStats, PostgresError> {
        let query = r#"
            SELECT
                COUNT(*) as total,
                COUNT(*) FILTER (WHERE final_state = 'completed') as completed,
                COUNT(*) FILTER (WHERE final_state = 'declined') as declined,
                COUNT(*) FILTER (WHERE final_state = 'expired') as expired,
                MAX(closed_at) as last_closed_at
            FROM archived_matches
        "#;

        let row = sqlx::query(query).fetch_one(&self.pool).await?;

        Ok(ArchiveStats {
            total: row.try_get("total")?,
            completed: row.try_get("completed")?,
            declined: row.try_get("declined")?,
            expired: row.try_get("expired")?,
            last_closed_at: row.try_get("last_closed_at")?,
        })
    }

    /// Health check for the database connection
    pub async fn health_check(&self) -> Result<bool, PostgresError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }
}

fn to_i64(value: u64) -> Result<i64, PostgresError> {
    i64::try_from(value)
        .map_err(|_| PostgresError::InvalidInput(format!("{} does not fit a BIGINT", value)))
}

fn to_u64(value: i64) -> Result<u64, PostgresError> {
    u64::try_from(value)
        .map_err(|_| PostgresError::InvalidInput(format!("unexpected negative id {}", value)))
}

/// Counts of archived matches by final state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveStats {
    pub total: i64,
    pub completed: i64,
    pub declined: i64,
    pub expired: i64,
    pub last_closed_at: Option<DateTime<Utc>>,
}
