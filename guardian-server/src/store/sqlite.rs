use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use guardian_core::{
    Activity, Decision, DecisionKind, DeviceId, DeviceRecord, LogEntry, ParseActivityError,
    ParseLevelError, ParsePhaseError, StatusSample,
};
use jiff::Timestamp;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool, migrate::Migrator};

use crate::store::models::{StoredDecision, StoredLog};
use crate::store::Store;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, thiserror::Error)]
pub enum SqliteStoreError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(f64),
    #[error(transparent)]
    InvalidLevel(#[from] ParseLevelError),
    #[error(transparent)]
    InvalidActivity(#[from] ParseActivityError),
    #[error(transparent)]
    InvalidPhase(#[from] ParsePhaseError),
}

/// SQLite-backed store.
/// Timestamps are kept as fractional Unix seconds in REAL columns.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens or creates the database at `path` and applies pending migrations.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, SqliteStoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;

        MIGRATOR.run(&pool).await?;

        Ok(Self { pool })
    }

    pub async fn new_in_memory() -> Result<Self, SqliteStoreError> {
        // every connection to :memory: is its own database, so keep exactly one alive
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect("sqlite::memory:")
            .await?;

        MIGRATOR.run(&pool).await?;

        Ok(Self { pool })
    }
}

fn to_epoch(ts: Timestamp) -> f64 {
    ts.as_millisecond() as f64 / 1000.0
}

fn from_epoch(secs: f64) -> Result<Timestamp, SqliteStoreError> {
    Timestamp::from_millisecond((secs * 1000.0).round() as i64)
        .map_err(|_| SqliteStoreError::InvalidTimestamp(secs))
}

#[async_trait]
impl Store for SqliteStore {
    type Error = SqliteStoreError;

    async fn append_log(&self, entry: LogEntry) -> Result<(), Self::Error> {
        sqlx::query(
            r#"
            INSERT INTO logs (device_id, level, message, timestamp)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(entry.device_id.as_str())
        .bind(entry.level.as_str())
        .bind(&*entry.message)
        .bind(to_epoch(entry.timestamp))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_decision(&self, decision: Decision) -> Result<(), Self::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO decisions (device_id, decision, decision_time, note)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(decision.device_id.as_str())
        .bind(decision.kind.as_str())
        .bind(to_epoch(decision.timestamp))
        .bind(&*decision.note)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE devices SET last_decision = ?, pending_action = 0 WHERE device_id = ?")
            .bind(decision.kind.as_str())
            .bind(decision.device_id.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn upsert_device(
        &self,
        device_id: &DeviceId,
        status: Activity,
        seen_at: Timestamp,
    ) -> Result<(), Self::Error> {
        sqlx::query(
            r#"
            INSERT INTO devices (device_id, status, last_seen, pending_action, created_time)
            VALUES (?, ?, ?, 0, ?)
            ON CONFLICT(device_id) DO UPDATE SET
                status = excluded.status,
                last_seen = excluded.last_seen
            "#,
        )
        .bind(device_id.as_str())
        .bind(status.as_str())
        .bind(to_epoch(seen_at))
        .bind(to_epoch(seen_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_pending_action(
        &self,
        device_id: &DeviceId,
        pending: bool,
    ) -> Result<(), Self::Error> {
        sqlx::query("UPDATE devices SET pending_action = ? WHERE device_id = ?")
            .bind(pending)
            .bind(device_id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn recent_logs(
        &self,
        device_id: Option<&DeviceId>,
        limit: usize,
    ) -> Result<Vec<StoredLog>, Self::Error> {
        let mut query_builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id, device_id, level, message, timestamp FROM logs");

        if let Some(device_id) = device_id {
            query_builder
                .push(" WHERE device_id = ")
                .push_bind(device_id.as_str().to_owned());
        }

        query_builder
            .push(" ORDER BY timestamp DESC, id DESC LIMIT ")
            .push_bind(limit as i64);

        let rows = query_builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(map_row_to_log).collect()
    }

    async fn recent_decisions(
        &self,
        device_id: Option<&DeviceId>,
        limit: usize,
    ) -> Result<Vec<StoredDecision>, Self::Error> {
        let mut query_builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, device_id, decision, decision_time, note FROM decisions",
        );

        if let Some(device_id) = device_id {
            query_builder
                .push(" WHERE device_id = ")
                .push_bind(device_id.as_str().to_owned());
        }

        query_builder
            .push(" ORDER BY decision_time DESC, id DESC LIMIT ")
            .push_bind(limit as i64);

        let rows = query_builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(map_row_to_decision).collect()
    }

    async fn devices(&self) -> Result<Vec<DeviceRecord>, Self::Error> {
        let rows = sqlx::query(
            r#"
            SELECT device_id, status, last_seen, pending_action, last_decision, created_time
            FROM devices ORDER BY device_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_row_to_device).collect()
    }

    async fn add_status_sample(
        &self,
        sample: StatusSample,
        retain: usize,
    ) -> Result<(), Self::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO status_history (ts, state) VALUES (?, ?)")
            .bind(to_epoch(sample.timestamp))
            .bind(sample.phase.as_str())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            DELETE FROM status_history WHERE id NOT IN (
                SELECT id FROM status_history ORDER BY ts DESC, id DESC LIMIT ?
            )
            "#,
        )
        .bind(retain as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn status_history(&self, limit: usize) -> Result<Vec<StatusSample>, Self::Error> {
        let rows = sqlx::query(
            "SELECT ts, state FROM status_history ORDER BY ts DESC, id DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_row_to_sample).collect()
    }
}

fn map_row_to_log(r: &SqliteRow) -> Result<StoredLog, SqliteStoreError> {
    let device_id: Option<String> = r.try_get("device_id")?;
    let level: String = r.try_get("level")?;
    let message: String = r.try_get("message")?;

    Ok(StoredLog {
        id: r.try_get("id")?,
        entry: LogEntry {
            device_id: DeviceId::from(device_id.unwrap_or_default()),
            level: level.parse()?,
            message: message.into_boxed_str(),
            timestamp: from_epoch(r.try_get("timestamp")?)?,
        },
    })
}

fn map_row_to_decision(r: &SqliteRow) -> Result<StoredDecision, SqliteStoreError> {
    let device_id: String = r.try_get("device_id")?;
    let kind: String = r.try_get("decision")?;
    let note: Option<String> = r.try_get("note")?;

    Ok(StoredDecision {
        id: r.try_get("id")?,
        decision: Decision {
            device_id: DeviceId::from(device_id),
            kind: DecisionKind::from(kind),
            timestamp: from_epoch(r.try_get("decision_time")?)?,
            note: note.unwrap_or_default().into_boxed_str(),
        },
    })
}

fn map_row_to_device(r: &SqliteRow) -> Result<DeviceRecord, SqliteStoreError> {
    let device_id: String = r.try_get("device_id")?;
    let status: String = r.try_get("status")?;
    let last_decision: Option<String> = r.try_get("last_decision")?;

    Ok(DeviceRecord {
        device_id: DeviceId::from(device_id),
        status: status.parse()?,
        last_seen: from_epoch(r.try_get("last_seen")?)?,
        pending_action: r.try_get("pending_action")?,
        last_decision: last_decision.map(DecisionKind::from),
        created_at: from_epoch(r.try_get("created_time")?)?,
    })
}

fn map_row_to_sample(r: &SqliteRow) -> Result<StatusSample, SqliteStoreError> {
    let state: String = r.try_get("state")?;

    Ok(StatusSample {
        phase: state.parse()?,
        timestamp: from_epoch(r.try_get("ts")?)?,
    })
}
