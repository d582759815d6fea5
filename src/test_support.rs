use crate::config::MonitorConfig;
use crate::services::health::{
    CriticalMetricSet, DeviceDirectory, HealthMonitor, MetricKey, MetricRegistry,
};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

pub fn metric(key: &str, field_name: &str) -> MetricKey {
    MetricKey::new(key, field_name)
}

/// Registry fake whose unhealthy set is controlled by the test.
#[derive(Default)]
pub struct StaticMetricRegistry {
    unhealthy: Mutex<Vec<MetricKey>>,
}

impl StaticMetricRegistry {
    pub async fn set_unhealthy(&self, metrics: Vec<MetricKey>) {
        *self.unhealthy.lock().await = metrics;
    }
}

#[async_trait]
impl MetricRegistry for StaticMetricRegistry {
    async fn unhealthy_metrics(&self, _device_id: Uuid) -> Result<Vec<MetricKey>> {
        Ok(self.unhealthy.lock().await.clone())
    }
}

/// Directory fake that records which devices had their management address
/// cleared.
#[derive(Default)]
pub struct RecordingDirectory {
    cleared: Mutex<Vec<Uuid>>,
}

impl RecordingDirectory {
    pub async fn cleared(&self) -> Vec<Uuid> {
        self.cleared.lock().await.clone()
    }
}

#[async_trait]
impl DeviceDirectory for RecordingDirectory {
    async fn clear_management_address(&self, device_id: Uuid) -> Result<()> {
        self.cleared.lock().await.push(device_id);
        Ok(())
    }
}

pub fn test_monitor() -> (
    Arc<HealthMonitor>,
    Arc<StaticMetricRegistry>,
    Arc<RecordingDirectory>,
) {
    let registry = Arc::new(StaticMetricRegistry::default());
    let directory = Arc::new(RecordingDirectory::default());
    let monitor = Arc::new(HealthMonitor::new(
        registry.clone(),
        directory.clone(),
        CriticalMetricSet::new(crate::config::default_critical_metrics()),
        true,
    ));
    (monitor, registry, directory)
}

pub fn test_config() -> MonitorConfig {
    MonitorConfig {
        database_url: "postgresql://postgres@localhost/postgres".to_string(),
        mqtt_host: "127.0.0.1".to_string(),
        mqtt_port: 1883,
        mqtt_username: None,
        mqtt_password: None,
        store_query_timeout_ms: 1_000,
        availability_max_events: 500,
        auto_clear_management_address: true,
        close_sessions_on_critical: false,
        critical_metrics: crate::config::default_critical_metrics(),
    }
}
