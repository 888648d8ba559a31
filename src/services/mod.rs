pub mod health_service;
pub mod items_service;

pub use health_service::{HealthReport, HealthService, OverallStatus, ProbeStatus};
pub use items_service::ItemService;
