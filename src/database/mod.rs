use crate::assets::MigrationAssets;
use crate::config::DatabaseConfig;
use crate::models::*;
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{migrate::MigrateDatabase, Pool, Row, Sqlite};
use uuid::Uuid;

// Helper function to parse datetime from either RFC3339 or SQLite format
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    // Try RFC3339 first
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (YYYY-MM-DD HH:MM:SS)
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.and_utc());
    }
    Err(anyhow::anyhow!("Failed to parse datetime: {}", s))
}

/// Durable log for recordings, job records and probe results.
///
/// The store is write-mostly: the core never reads persisted state back to
/// make scheduling decisions, the in-memory registry stays authoritative
/// while the process runs.
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub fn pool(&self) -> Pool<Sqlite> {
        self.pool.clone()
    }

    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        // Create database if it doesn't exist (for SQLite)
        if !Sqlite::database_exists(&config.url).await? {
            Sqlite::create_database(&config.url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.unwrap_or(10))
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        self.run_embedded_migrations().await?;
        Ok(())
    }

    async fn run_embedded_migrations(&self) -> Result<()> {
        // Create migrations table if it doesn't exist
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _sqlx_migrations (
                version BIGINT PRIMARY KEY,
                description TEXT NOT NULL,
                installed_on TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                success BOOLEAN NOT NULL,
                checksum BLOB NOT NULL,
                execution_time BIGINT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        let migrations = MigrationAssets::get_migrations();

        for (name, content) in migrations {
            // Extract version from filename (e.g., "001_initial_schema.sql" -> 1)
            let version: i64 = name
                .split('_')
                .next()
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| anyhow::anyhow!("Migration {} has no numeric prefix", name))?;

            // Check if migration is already applied
            let existing = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM _sqlx_migrations WHERE version = ? AND success = true",
            )
            .bind(version)
            .fetch_one(&self.pool)
            .await?;

            if existing > 0 {
                continue; // Migration already applied
            }

            // Apply migration, one statement at a time inside one transaction
            let start = std::time::Instant::now();
            let mut transaction = self.pool.begin().await?;

            for statement in content.split(';') {
                let statement = statement.trim();
                if statement.is_empty() {
                    continue;
                }
                if let Err(e) = sqlx::query(statement).execute(&mut *transaction).await {
                    transaction.rollback().await?;
                    return Err(anyhow::anyhow!("Migration {} failed: {}", name, e));
                }
            }

            let execution_time = start.elapsed().as_millis() as i64;
            let checksum = Self::calculate_checksum(&content);

            sqlx::query(
                r#"
                INSERT INTO _sqlx_migrations (version, description, success, checksum, execution_time)
                VALUES (?, ?, true, ?, ?)
                "#,
            )
            .bind(version)
            .bind(&name)
            .bind(&checksum)
            .bind(execution_time)
            .execute(&mut *transaction)
            .await?;

            transaction.commit().await?;
            tracing::info!("Applied migration: {} ({}ms)", name, execution_time);
        }

        Ok(())
    }

    fn calculate_checksum(content: &str) -> Vec<u8> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut hasher = DefaultHasher::new();
        content.hash(&mut hasher);
        hasher.finish().to_be_bytes().to_vec()
    }

    /// Append one recording outcome to the durable log.
    pub async fn record_recording(
        &self,
        task: &RecordingTask,
        result: &TaskResult,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO recordings
            (station_name, station_url, country, city, duration, file_path,
             status, timestamp, file_size, error_message)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&task.station.name)
        .bind(&task.station.url)
        .bind(&task.station.country)
        .bind(&task.station.city)
        .bind(task.duration_secs as i64)
        .bind(task.output_path.to_string_lossy().as_ref())
        .bind(result.status.as_str())
        .bind(result.finished_at.to_rfc3339())
        .bind(result.file_size as i64)
        .bind(result.error.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist a job record for restart visibility.
    pub async fn record_job(&self, job: &RecordingJob) -> Result<()> {
        let (job_kind, station_name, station_url, country_filter, max_stations, max_concurrent, stagger_seconds) =
            match &job.kind {
                JobKind::SingleStation { station } => (
                    "single",
                    Some(station.name.as_str()),
                    Some(station.url.as_str()),
                    None,
                    None,
                    None,
                    None,
                ),
                JobKind::BulkSet {
                    country_filter,
                    max_stations,
                    max_concurrent,
                    stagger_seconds,
                } => (
                    "bulk",
                    None,
                    None,
                    country_filter.as_deref(),
                    max_stations.map(|m| m as i64),
                    Some(*max_concurrent as i64),
                    Some(*stagger_seconds as i64),
                ),
            };

        let (repeat_type, interval_minutes, start_at) = match &job.repeat {
            RepeatRule::Once { start_at } => ("once", None, start_at.map(|at| at.to_rfc3339())),
            RepeatRule::Interval { minutes } => ("interval", Some(*minutes as i64), None),
        };

        sqlx::query(
            r#"
            INSERT INTO scheduled_jobs
            (id, job_kind, station_name, station_url, country_filter, max_stations,
             max_concurrent, stagger_seconds, repeat_type, interval_minutes, start_at,
             duration, is_active, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.id.to_string())
        .bind(job_kind)
        .bind(station_name)
        .bind(station_url)
        .bind(country_filter)
        .bind(max_stations)
        .bind(max_concurrent)
        .bind(stagger_seconds)
        .bind(repeat_type)
        .bind(interval_minutes)
        .bind(start_at)
        .bind(job.duration_secs as i64)
        .bind(job.is_active)
        .bind(job.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Flip a persisted job record inactive. Returns whether a row changed.
    pub async fn deactivate_job(&self, job_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE scheduled_jobs SET is_active = FALSE WHERE id = ? AND is_active = TRUE",
        )
        .bind(job_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Append one probe result to the durable log.
    pub async fn record_connection_status(&self, status: &ConnectionStatus) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO connection_status
            (station_name, station_url, status, response_time, country, city, last_check)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&status.station_name)
        .bind(&status.station_url)
        .bind(status.state.as_str())
        .bind(status.latency_secs)
        .bind(&status.country)
        .bind(&status.city)
        .bind(status.last_check.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Aggregate historical counters, used once at startup to seed the
    /// in-memory statistics.
    pub async fn load_statistics(&self) -> Result<StatisticsSnapshot> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM recordings")
            .fetch_one(&self.pool)
            .await?;

        let successful: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM recordings WHERE status = 'success'")
                .fetch_one(&self.pool)
                .await?;

        let failed: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM recordings WHERE status != 'success'")
                .fetch_one(&self.pool)
                .await?;

        let total_duration: Option<i64> = sqlx::query_scalar(
            "SELECT SUM(duration) FROM recordings WHERE status = 'success'",
        )
        .fetch_one(&self.pool)
        .await?;

        let last_recording: Option<String> = sqlx::query_scalar(
            "SELECT timestamp FROM recordings ORDER BY timestamp DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(StatisticsSnapshot {
            total_recordings: total as u64,
            successful_recordings: successful as u64,
            failed_recordings: failed as u64,
            total_duration_secs: total_duration.unwrap_or(0) as u64,
            last_recording: last_recording.map(|s| parse_datetime(&s)).transpose()?,
        })
    }

    /// Most recent recordings, newest first.
    pub async fn recent_recordings(&self, limit: u32) -> Result<Vec<RecordingRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, station_name, station_url, country, city, duration, file_path,
                   status, timestamp, file_size, error_message
            FROM recordings ORDER BY timestamp DESC LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let status_str: String = row.get("status");
            let status = match TaskStatus::parse(&status_str) {
                Some(status) => status,
                None => continue,
            };
            let timestamp: String = row.get("timestamp");

            records.push(RecordingRecord {
                id: row.get("id"),
                station_name: row.get("station_name"),
                station_url: row.get("station_url"),
                country: row.get("country"),
                city: row.get("city"),
                duration_secs: row.get::<i64, _>("duration") as u32,
                file_path: row.get("file_path"),
                status,
                timestamp: parse_datetime(&timestamp)?,
                file_size: row.get::<i64, _>("file_size") as u64,
                error_message: row.get("error_message"),
            });
        }

        Ok(records)
    }
}
