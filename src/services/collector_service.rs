use log::info;
use std::sync::Arc;
use std::time::Duration;

use crate::config::settings::{Config, TransportKind};
use crate::modbus::decoder::RegisterDecoder;
use crate::services::acquisition::{AcquisitionCycle, AcquisitionScheduler, SharedStats};
#[cfg(feature = "api")]
use crate::services::api_service::{ApiService, ApiServiceState};
use crate::storage::{open_sink, PersistenceSink};
use crate::transport::build_transport;
use crate::utils::error::AcquisitionError;

/// Build the cycle described by `config`, writing to `sink`.
pub fn build_cycle(config: &Config, sink: Arc<dyn PersistenceSink>) -> AcquisitionCycle {
    let decoder = match config.acquisition.transport {
        TransportKind::Fieldbus => config.fieldbus.byte_order.map(RegisterDecoder::new),
        TransportKind::FramedSocket => None,
    };
    AcquisitionCycle::new(
        build_transport(config),
        sink,
        config.device_id.clone(),
        config.parameter_table(),
        decoder,
    )
}

/// Owns the scheduler, the sink and the optional HTTP API for one run of the
/// collector.
pub struct CollectorService {
    sink: Arc<dyn PersistenceSink>,
    scheduler: AcquisitionScheduler,
    #[cfg(feature = "api")]
    api: Option<ApiService>,
}

impl CollectorService {
    pub async fn new(config: Config) -> Result<Self, AcquisitionError> {
        config.validate()?;

        info!("🚀 Initializing Energy Meter Collector");
        info!("🏭 Collector: {} [{}]", config.collector_name, config.collector_uuid);
        info!("📦 Version: {}", crate::VERSION);
        info!("🔌 Device: {}", config.device_id);
        match config.acquisition.transport {
            TransportKind::Fieldbus => {
                info!(
                    "📡 Modbus TCP {}:{} unit {}, {} parameters",
                    config.fieldbus.host,
                    config.fieldbus.port,
                    config.fieldbus.unit_id,
                    config.fieldbus.parameters.len()
                );
                if let Some(order) = config.fieldbus.byte_order {
                    info!("🔀 Byte order: {}", order.description());
                }
            }
            TransportKind::FramedSocket => info!(
                "📡 Framed socket {}:{} command '{}'",
                config.framed_socket.host, config.framed_socket.port, config.framed_socket.command
            ),
        }

        let sink = open_sink(&config.storage).await?;
        let cycle = build_cycle(&config, sink.clone());
        let transport = format!("{} {}", cycle.transport().transport_type(), cycle.transport().endpoint());
        let scheduler = AcquisitionScheduler::new(cycle, Duration::from_secs(config.acquisition.interval_seconds));

        #[cfg(feature = "api")]
        let api = if config.api.enabled {
            Some(ApiService::new(
                config.api.clone(),
                ApiServiceState {
                    sink: sink.clone(),
                    stats: scheduler.stats(),
                    collector_name: config.collector_name.clone(),
                    device_id: config.device_id.clone(),
                    transport,
                },
            ))
        } else {
            info!("📝 HTTP API disabled in configuration");
            None
        };
        #[cfg(not(feature = "api"))]
        {
            if config.api.enabled {
                log::warn!("⚠️  HTTP API requested but the 'api' feature is disabled ({})", transport);
            }
        }

        info!("✅ Collector initialized");
        Ok(Self {
            sink,
            scheduler,
            #[cfg(feature = "api")]
            api,
        })
    }

    pub async fn start(&mut self) -> Result<(), AcquisitionError> {
        #[cfg(feature = "api")]
        if let Some(api) = self.api.as_mut() {
            api.start().await?;
        }
        self.scheduler.start();
        Ok(())
    }

    pub async fn stop(&mut self) {
        self.scheduler.stop().await;
        #[cfg(feature = "api")]
        if let Some(api) = self.api.as_mut() {
            api.stop().await;
        }
        self.sink.close().await;
        info!("👋 Collector stopped");
    }

    pub fn stats(&self) -> SharedStats {
        self.scheduler.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::StorageBackend;
    use crate::modbus::decoder::ByteOrder;
    use crate::services::acquisition::{read_stats, SchedulerState};

    fn memory_config() -> Config {
        let mut config = Config::default();
        config.storage.backend = StorageBackend::Memory;
        config.api.enabled = false;
        config
    }

    #[tokio::test]
    async fn test_missing_byte_order_is_rejected() {
        let result = CollectorService::new(memory_config()).await;
        assert!(matches!(result, Err(AcquisitionError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let mut config = memory_config();
        config.fieldbus.byte_order = Some(ByteOrder::WordSwapped);

        let mut service = CollectorService::new(config).await.unwrap();
        service.start().await.unwrap();
        assert_eq!(read_stats(&service.stats()).state, SchedulerState::Running);

        service.stop().await;
        assert_eq!(read_stats(&service.stats()).state, SchedulerState::Stopped);
    }

    #[test]
    fn test_build_cycle_decoder_only_for_fieldbus() {
        let mut config = memory_config();
        config.fieldbus.byte_order = Some(ByteOrder::Straight);
        let sink: Arc<dyn PersistenceSink> = Arc::new(crate::storage::MemorySink::new());

        let cycle = build_cycle(&config, sink.clone());
        assert_eq!(cycle.transport().transport_type(), "fieldbus");
        assert_eq!(cycle.device_id(), "DPMC530E");

        config.acquisition.transport = TransportKind::FramedSocket;
        let cycle = build_cycle(&config, sink);
        assert_eq!(cycle.transport().transport_type(), "framed_socket");
    }
}
