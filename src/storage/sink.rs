use async_trait::async_trait;
use log::{debug, error, info};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs;

use crate::storage::models::MeterReading;
use crate::utils::error::AcquisitionError;

/// Where decoded batches go. Called at most once per cycle; implementations
/// must make each batch visible to `latest()` atomically.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn save(&self, readings: &[MeterReading], device_id: &str) -> Result<(), AcquisitionError>;

    /// Most recently saved batch as stored, or `None` before the first save.
    async fn latest(&self) -> Result<Option<String>, AcquisitionError>;

    fn sink_type(&self) -> &str;
    fn destination(&self) -> &str;

    async fn close(&self) {}
}

pub fn readings_to_json(readings: &[MeterReading]) -> Result<String, AcquisitionError> {
    serde_json::to_string(readings)
        .map_err(|e| AcquisitionError::PersistenceError(format!("Failed to serialize readings: {}", e)))
}

fn readings_to_pretty_json(readings: &[MeterReading]) -> Result<Vec<u8>, AcquisitionError> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    readings
        .serialize(&mut serializer)
        .map_err(|e| AcquisitionError::PersistenceError(format!("Failed to serialize readings: {}", e)))?;
    Ok(out)
}

/// Latest batch kept as a single JSON file, replaced on every save.
pub struct JsonFileSink {
    path: PathBuf,
    display_path: String,
    pretty: bool,
}

impl JsonFileSink {
    pub fn new<P: AsRef<Path>>(path: P, pretty: bool) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            display_path: path.to_string_lossy().to_string(),
            path,
            pretty,
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl PersistenceSink for JsonFileSink {
    async fn save(&self, readings: &[MeterReading], device_id: &str) -> Result<(), AcquisitionError> {
        let data = if self.pretty {
            readings_to_pretty_json(readings)?
        } else {
            readings_to_json(readings)?.into_bytes()
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                AcquisitionError::PersistenceError(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        // Readers only ever see the old or the new file
        let temp = self.temp_path();
        fs::write(&temp, &data).await.map_err(|e| {
            error!("❌ Failed to write {}: {}", temp.display(), e);
            AcquisitionError::PersistenceError(format!("File write error: {}", e))
        })?;
        fs::rename(&temp, &self.path).await.map_err(|e| {
            error!("❌ Failed to replace {}: {}", self.display_path, e);
            AcquisitionError::PersistenceError(format!("File rename error: {}", e))
        })?;

        debug!(
            "📝 Wrote {} readings for {} to {} ({} bytes)",
            readings.len(),
            device_id,
            self.display_path,
            data.len()
        );
        Ok(())
    }

    async fn latest(&self) -> Result<Option<String>, AcquisitionError> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AcquisitionError::PersistenceError(format!(
                "Failed to read {}: {}",
                self.display_path, e
            ))),
        }
    }

    fn sink_type(&self) -> &str {
        "json_file"
    }

    fn destination(&self) -> &str {
        &self.display_path
    }
}

/// Keeps every batch in memory. Used for dry runs and tests.
#[derive(Default)]
pub struct MemorySink {
    batches: Mutex<Vec<(String, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(device_id, json)` for every saved batch, oldest first.
    pub fn batches(&self) -> Vec<(String, String)> {
        match self.batches.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.batches().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PersistenceSink for MemorySink {
    async fn save(&self, readings: &[MeterReading], device_id: &str) -> Result<(), AcquisitionError> {
        let json = readings_to_json(readings)?;
        let mut batches = self
            .batches
            .lock()
            .map_err(|_| AcquisitionError::PersistenceError("Memory sink lock poisoned".to_string()))?;
        batches.push((device_id.to_string(), json));
        Ok(())
    }

    async fn latest(&self) -> Result<Option<String>, AcquisitionError> {
        Ok(self.batches().pop().map(|(_, json)| json))
    }

    fn sink_type(&self) -> &str {
        "memory"
    }

    fn destination(&self) -> &str {
        "memory"
    }

    async fn close(&self) {
        info!("🔒 Memory sink closed with {} batches", self.len());
    }
}
