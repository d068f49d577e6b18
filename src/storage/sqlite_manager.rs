use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::time::Duration;

use crate::config::settings::SqliteConfig;
use crate::storage::models::{MeterDataRecord, MeterReading};
use crate::storage::sink::{readings_to_json, PersistenceSink};
use crate::utils::error::AcquisitionError;

#[derive(Clone)]
pub struct SqliteManager {
    pool: SqlitePool,
    config: SqliteConfig,
}

impl SqliteManager {
    pub async fn new(config: SqliteConfig) -> Result<Self, AcquisitionError> {
        // Create database directory if it doesn't exist
        if let Some(parent) = Path::new(&config.database_path)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                AcquisitionError::PersistenceError(format!("Failed to create database directory: {}", e))
            })?;
        }

        info!("🗄️  Initializing SQLite database: {}", config.database_path);

        let options = SqliteConnectOptions::new()
            .filename(&config.database_path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .journal_mode(if config.enable_wal {
                SqliteJournalMode::Wal
            } else {
                SqliteJournalMode::Delete
            })
            .synchronous(match config.sync_mode.to_uppercase().as_str() {
                "OFF" => SqliteSynchronous::Off,
                "FULL" => SqliteSynchronous::Full,
                _ => SqliteSynchronous::Normal,
            });

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| AcquisitionError::PersistenceError(format!("Failed to connect to SQLite: {}", e)))?;

        let manager = Self { pool, config };
        manager.initialize_schema().await?;

        info!(
            "✅ SQLite database initialized successfully ({} stored batches)",
            manager.count().await?
        );
        Ok(manager)
    }

    async fn initialize_schema(&self) -> Result<(), AcquisitionError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS meter_data (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
                unix_timestamp INTEGER NOT NULL,
                device_id TEXT NOT NULL,
                json_data TEXT NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        let indexes = [
            "CREATE INDEX IF NOT EXISTS idx_meter_data_timestamp ON meter_data(timestamp)",
            "CREATE INDEX IF NOT EXISTS idx_meter_data_device_id ON meter_data(device_id)",
            "CREATE INDEX IF NOT EXISTS idx_meter_data_timestamp_device ON meter_data(timestamp, device_id)",
        ];
        for index_sql in indexes {
            sqlx::query(index_sql).execute(&self.pool).await?;
        }

        debug!("🔧 meter_data schema ready");
        Ok(())
    }

    /// Store one batch as a single row inside one transaction.
    pub async fn insert_batch(&self, device_id: &str, json_data: &str) -> Result<i64, AcquisitionError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO meter_data (unix_timestamp, device_id, json_data) VALUES (?, ?, ?)",
        )
        .bind(Utc::now().timestamp())
        .bind(device_id)
        .bind(json_data)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn latest_json(&self) -> Result<Option<String>, AcquisitionError> {
        let record = sqlx::query_as::<_, MeterDataRecord>(
            "SELECT id, unix_timestamp, device_id, json_data FROM meter_data ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(|record| {
            debug!("📤 Latest batch #{} from {} at {}", record.id, record.device_id, record.unix_timestamp);
            record.json_data
        }))
    }

    pub async fn count(&self) -> Result<i64, AcquisitionError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM meter_data")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("total")?)
    }

    pub fn database_path(&self) -> &str {
        &self.config.database_path
    }

    pub async fn close_pool(&self) {
        info!("🔒 Closing SQLite database connections");
        self.pool.close().await;
    }
}

#[async_trait]
impl PersistenceSink for SqliteManager {
    async fn save(&self, readings: &[MeterReading], device_id: &str) -> Result<(), AcquisitionError> {
        let json = readings_to_json(readings)?;
        let id = self.insert_batch(device_id, &json).await?;
        debug!("💾 Stored batch #{} with {} readings for {}", id, readings.len(), device_id);
        Ok(())
    }

    async fn latest(&self) -> Result<Option<String>, AcquisitionError> {
        self.latest_json().await
    }

    fn sink_type(&self) -> &str {
        "sqlite"
    }

    fn destination(&self) -> &str {
        self.database_path()
    }

    async fn close(&self) {
        self.close_pool().await;
    }
}
