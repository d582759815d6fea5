use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

pub mod aggregate;
pub mod backends;
pub mod types;

pub use aggregate::{decide, CriticalMetricSet};
pub use types::{HealthStatus, MetricKey, MetricReading, StatusChange};

/// A lagging subscriber loses old changes instead of backpressuring the
/// transition path.
const CHANGE_BUS_CAPACITY: usize = 256;

/// Read-only view of the externally-evaluated per-metric health of a device.
#[async_trait]
pub trait MetricRegistry: Send + Sync {
    /// Every currently-unhealthy metric recorded for the device, including
    /// the one that just crossed (the caller filters it out).
    async fn unhealthy_metrics(&self, device_id: Uuid) -> Result<Vec<MetricKey>>;
}

/// Device-record side effects owned by an external system.
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    async fn clear_management_address(&self, device_id: Uuid) -> Result<()>;
}

/// The single live status record of one device.
#[derive(Debug, Clone, Copy)]
pub struct DeviceHealth {
    pub status: HealthStatus,
    pub updated_at: DateTime<Utc>,
}

/// Holds the authoritative status record per device and applies transitions.
///
/// Transitions for one device are serialized: the per-device lock is held
/// across reading related-metric health, deciding, and applying, so two
/// near-simultaneous crossings cannot clobber each other with stale related
/// state. Different devices proceed fully in parallel.
pub struct HealthMonitor {
    registry: Arc<dyn MetricRegistry>,
    directory: Arc<dyn DeviceDirectory>,
    critical: CriticalMetricSet,
    auto_clear_management_address: bool,
    devices: Mutex<HashMap<Uuid, Arc<Mutex<DeviceHealth>>>>,
    changes: broadcast::Sender<StatusChange>,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<dyn MetricRegistry>,
        directory: Arc<dyn DeviceDirectory>,
        critical: CriticalMetricSet,
        auto_clear_management_address: bool,
    ) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUS_CAPACITY);
        Self {
            registry,
            directory,
            critical,
            auto_clear_management_address,
            devices: Mutex::new(HashMap::new()),
            changes,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.changes.subscribe()
    }

    /// Live status if the device has ever been observed.
    pub async fn known_status(&self, device_id: Uuid) -> Option<HealthStatus> {
        let record = {
            let devices = self.devices.lock().await;
            devices.get(&device_id).cloned()
        };
        match record {
            Some(record) => Some(record.lock().await.status),
            None => None,
        }
    }

    /// Live status; a device without a record is implicitly `unknown`.
    pub async fn current_status(&self, device_id: Uuid) -> HealthStatus {
        self.known_status(device_id)
            .await
            .unwrap_or(HealthStatus::Unknown)
    }

    /// React to one externally-evaluated threshold crossing: read the
    /// related-metric health, decide the new device status, and apply it,
    /// all under the device's lock. Returns the decided status.
    pub async fn threshold_crossed(&self, reading: &MetricReading) -> Result<HealthStatus> {
        let record = self.record(reading.device_id).await;
        let mut record = record.lock().await;

        let related: Vec<MetricKey> = self
            .registry
            .unhealthy_metrics(reading.device_id)
            .await?
            .into_iter()
            .filter(|metric| {
                !(metric.key == reading.key && metric.field_name == reading.field_name)
            })
            .collect();

        let status = aggregate::decide(
            reading.is_healthy,
            self.critical.is_critical(&reading.key, &reading.field_name),
            &related,
            &self.critical,
        );
        self.apply(reading.device_id, &mut record, status).await;
        Ok(status)
    }

    /// Force a status. No-op when the value is unchanged: no notification is
    /// emitted and no side effect runs. Returns whether a transition happened.
    pub async fn update_status(&self, device_id: Uuid, status: HealthStatus) -> bool {
        let record = self.record(device_id).await;
        let mut record = record.lock().await;
        self.apply(device_id, &mut record, status).await
    }

    /// Administratively disable the device until `activate`.
    pub async fn deactivate(&self, device_id: Uuid) -> bool {
        self.update_status(device_id, HealthStatus::Deactivated).await
    }

    /// Bring a deactivated device back; it starts over as `unknown`.
    pub async fn activate(&self, device_id: Uuid) -> bool {
        self.update_status(device_id, HealthStatus::Unknown).await
    }

    async fn record(&self, device_id: Uuid) -> Arc<Mutex<DeviceHealth>> {
        let mut devices = self.devices.lock().await;
        devices
            .entry(device_id)
            .or_insert_with(|| {
                Arc::new(Mutex::new(DeviceHealth {
                    status: HealthStatus::Unknown,
                    updated_at: Utc::now(),
                }))
            })
            .clone()
    }

    async fn apply(&self, device_id: Uuid, record: &mut DeviceHealth, status: HealthStatus) -> bool {
        if record.status == status {
            return false;
        }
        let old_status = record.status;
        record.status = status;
        record.updated_at = Utc::now();

        // Only on the transition into critical, never on repeat observations.
        if status == HealthStatus::Critical && self.auto_clear_management_address {
            if let Err(err) = self.directory.clear_management_address(device_id).await {
                tracing::warn!(device_id = %device_id, "failed to clear management address: {err:#}");
            }
        }

        let change = StatusChange {
            device_id,
            old_status,
            new_status: status,
            at: record.updated_at,
        };
        // Nobody listening is fine; subscribers are strictly fire-and-forget.
        let _ = self.changes.send(change);
        true
    }
}
