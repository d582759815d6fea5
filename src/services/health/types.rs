use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Aggregated health of one device.
///
/// `unknown`: recently added or reset, nothing observed yet.
/// `ok`: operating normally.
/// `problem`: degraded but still reachable.
/// `critical`: unreachable or in critical condition.
/// `deactivated`: administratively disabled until re-activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Unknown,
    Ok,
    Problem,
    Critical,
    Deactivated,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Ok => "ok",
            Self::Problem => "problem",
            Self::Critical => "critical",
            Self::Deactivated => "deactivated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "unknown" => Some(Self::Unknown),
            "ok" => Some(Self::Ok),
            "problem" => Some(Self::Problem),
            "critical" => Some(Self::Critical),
            "deactivated" => Some(Self::Deactivated),
            _ => None,
        }
    }

    /// A device in `problem` is degraded but still reachable, so it counts
    /// as up for availability purposes. Every uptime number flows through
    /// this single policy point.
    pub fn is_up(self) -> bool {
        matches!(self, Self::Ok | Self::Problem)
    }
}

/// Identifies a metric within a device: the check key plus the field it
/// reports (e.g. `ping` / `reachable`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricKey {
    pub key: String,
    pub field_name: String,
}

impl MetricKey {
    pub fn new(key: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            field_name: field_name.into(),
        }
    }
}

/// One externally-evaluated threshold crossing for a device metric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricReading {
    pub device_id: Uuid,
    pub key: String,
    pub field_name: String,
    pub is_healthy: bool,
    pub is_healthy_tolerant: bool,
}

impl MetricReading {
    pub fn metric_key(&self) -> MetricKey {
        MetricKey::new(self.key.clone(), self.field_name.clone())
    }
}

/// Emitted on the change bus for every effective status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub device_id: Uuid,
    pub old_status: HealthStatus,
    pub new_status: HealthStatus,
    pub at: DateTime<Utc>,
}
