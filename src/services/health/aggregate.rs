use super::types::{HealthStatus, MetricKey};

/// The `(key, field_name)` pairs whose unhealthy state forces a device to
/// `critical` regardless of every other metric.
#[derive(Debug, Clone, Default)]
pub struct CriticalMetricSet {
    entries: Vec<MetricKey>,
}

impl CriticalMetricSet {
    pub fn new(entries: Vec<MetricKey>) -> Self {
        Self { entries }
    }

    pub fn is_critical(&self, key: &str, field_name: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.key == key && entry.field_name == field_name)
    }
}

/// Combine the health of the metric that just crossed with the health of
/// every other metric on the same device into one device status.
///
/// The result is recomputed fresh from metric facts on every crossing and is
/// independent of the device's current status, so evaluation order across
/// metrics cannot change where the device converges.
pub fn decide(
    triggering_healthy: bool,
    triggering_is_critical: bool,
    related_unhealthy: &[MetricKey],
    critical: &CriticalMetricSet,
) -> HealthStatus {
    let mut related_status = HealthStatus::Ok;
    for metric in related_unhealthy {
        if critical.is_critical(&metric.key, &metric.field_name) {
            related_status = HealthStatus::Critical;
            break;
        }
        related_status = HealthStatus::Problem;
    }

    let mut status = if triggering_healthy {
        HealthStatus::Ok
    } else {
        HealthStatus::Problem
    };
    if triggering_healthy && related_status == HealthStatus::Problem {
        status = HealthStatus::Problem;
    } else if triggering_healthy && related_status == HealthStatus::Critical {
        status = HealthStatus::Critical;
    } else if !triggering_healthy
        && (triggering_is_critical || related_status == HealthStatus::Critical)
    {
        status = HealthStatus::Critical;
    }
    status
}
