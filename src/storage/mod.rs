pub mod models;
pub mod sink;
#[cfg(feature = "sqlite")]
pub mod sqlite_manager;

use log::info;
use std::sync::Arc;

use crate::config::settings::{StorageBackend, StorageConfig};
use crate::utils::error::AcquisitionError;

pub use models::{MeterDataRecord, MeterReading};
pub use sink::{JsonFileSink, MemorySink, PersistenceSink};
#[cfg(feature = "sqlite")]
pub use sqlite_manager::SqliteManager;

/// Open the configured sink. Failure here is fatal at startup.
pub async fn open_sink(config: &StorageConfig) -> Result<Arc<dyn PersistenceSink>, AcquisitionError> {
    let sink: Arc<dyn PersistenceSink> = match config.backend {
        #[cfg(feature = "sqlite")]
        StorageBackend::Sqlite => Arc::new(SqliteManager::new(config.sqlite.clone()).await?),
        #[cfg(not(feature = "sqlite"))]
        StorageBackend::Sqlite => {
            return Err(AcquisitionError::ConfigError(
                "SQLite backend requested but the 'sqlite' feature is disabled".to_string(),
            ))
        }
        StorageBackend::JsonFile => Arc::new(JsonFileSink::new(&config.json_file.path, config.json_file.pretty)),
        StorageBackend::Memory => Arc::new(MemorySink::new()),
    };

    info!("💾 Persistence: {} -> {}", sink.sink_type(), sink.destination());
    Ok(sink)
}
