pub mod acquisition;
#[cfg(feature = "api")]
pub mod api_service;
pub mod collector_service;

pub use acquisition::{AcquisitionCycle, AcquisitionScheduler, AcquisitionStats, SchedulerState};
#[cfg(feature = "api")]
pub use api_service::{ApiService, ApiServiceState};
pub use collector_service::{build_cycle, CollectorService};
