use actix_web::{middleware::Logger, web, App, HttpResponse, HttpServer, Result as ActixResult};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::config::settings::ApiConfig;
use crate::services::acquisition::{read_stats, SharedStats};
use crate::storage::sink::PersistenceSink;
use crate::utils::error::AcquisitionError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, code: &str) -> Self {
        Self {
            success: false,
            error: error.into(),
            code: code.to_string(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Clone)]
pub struct ApiServiceState {
    pub sink: Arc<dyn PersistenceSink>,
    pub stats: SharedStats,
    pub collector_name: String,
    pub device_id: String,
    /// `"<type> <endpoint>"` of the active transport.
    pub transport: String,
}

pub struct ApiService {
    config: ApiConfig,
    state: ApiServiceState,
    server_handle: Option<actix_web::dev::ServerHandle>,
}

impl ApiService {
    pub fn new(config: ApiConfig, state: ApiServiceState) -> Self {
        Self {
            config,
            state,
            server_handle: None,
        }
    }

    /// Bind and serve in the background. A missing dashboard index or a port
    /// that cannot be bound is returned as an error.
    pub async fn start(&mut self) -> Result<(), AcquisitionError> {
        if let Some(dir) = &self.config.static_dir {
            let index = Path::new(dir).join(&self.config.index_file);
            if !index.is_file() {
                return Err(AcquisitionError::ConfigError(format!(
                    "Dashboard index file {} not found",
                    index.display()
                )));
            }
        }

        let address = format!("{}:{}", self.config.bind_address, self.config.port);
        info!("🌐 Starting HTTP API server on {}", address);

        let state_data = web::Data::new(self.state.clone());
        let static_dir = self.config.static_dir.clone();
        let index_file = self.config.index_file.clone();

        let server = HttpServer::new(move || {
            let app = App::new()
                .app_data(state_data.clone())
                .wrap(Logger::default())
                .configure(configure_routes);

            match &static_dir {
                Some(dir) => app.service(actix_files::Files::new("/", dir).index_file(index_file.clone())),
                None => app,
            }
        })
        .workers(2)
        .bind(&address)
        .map_err(|e| AcquisitionError::ConnectionError(format!("Failed to bind {}: {}", address, e)))?
        .run();

        self.server_handle = Some(server.handle());

        tokio::spawn(async move {
            if let Err(e) = server.await {
                error!("❌ HTTP API server error: {}", e);
            }
        });

        info!("✅ HTTP API server started on {}", address);
        Ok(())
    }

    pub async fn stop(&mut self) {
        if let Some(handle) = self.server_handle.take() {
            info!("🛑 Stopping HTTP API server...");
            tokio::select! {
                _ = handle.stop(true) => {
                    info!("✅ HTTP API server stopped gracefully");
                }
                _ = tokio::time::sleep(tokio::time::Duration::from_secs(10)) => {
                    warn!("⚠️  HTTP API server shutdown timeout, forcing stop");
                    handle.stop(false).await;
                }
            }
        }
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(health_check))
            .route("/latest", web::get().to(latest_readings))
            .route("/status", web::get().to(acquisition_status)),
    );
}

// GET /api/health
async fn health_check() -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "Energy Meter Collector API",
        "timestamp": Utc::now(),
        "version": crate::VERSION
    })))
}

// GET /api/latest - newest persisted batch, verbatim
async fn latest_readings(state: web::Data<ApiServiceState>) -> ActixResult<HttpResponse> {
    match state.sink.latest().await {
        Ok(Some(json)) => Ok(HttpResponse::Ok().content_type("application/json").body(json)),
        Ok(None) => Ok(HttpResponse::NotFound().json(ErrorResponse::new(
            "No readings have been stored yet",
            "NO_DATA",
        ))),
        Err(e) => {
            error!("❌ Failed to load latest readings: {}", e);
            Ok(HttpResponse::InternalServerError().json(ErrorResponse::new(
                "Failed to load latest readings",
                "STORAGE_ERROR",
            )))
        }
    }
}

// GET /api/status
async fn acquisition_status(state: web::Data<ApiServiceState>) -> ActixResult<HttpResponse> {
    let stats = read_stats(&state.stats);
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "collector": state.collector_name,
        "device_id": state.device_id,
        "transport": state.transport,
        "storage": state.sink.sink_type(),
        "acquisition": stats,
        "timestamp": Utc::now()
    })))
}
