use crate::config::MonitorConfig;
use crate::services::availability::{AvailabilityRecorder, AvailabilityService};
use crate::services::health::HealthMonitor;
use crate::store::EventStore;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: MonitorConfig,
    pub db: PgPool,
    pub events: Arc<dyn EventStore>,
    pub health: Arc<HealthMonitor>,
    pub availability: Arc<AvailabilityService>,
    pub recorder: AvailabilityRecorder,
}
