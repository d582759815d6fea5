use crate::services::health::HealthMonitor;
use crate::store::EventStore;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

mod reconstruct;
mod recorder;

pub use reconstruct::{
    reconstruct, uptime_percent, AvailabilityEvent, AvailabilityWindow, EventKind,
    FriendlyInterval, FriendlyReport, FriendlySummary, LongestOutage, TimelineInterval,
};
pub use recorder::AvailabilityRecorder;

/// Read-side entry point for reporting callers.
///
/// Reads the event store only; the health monitor is consulted solely to
/// override the window's end state with the live status, which is fresher
/// than the store tail.
pub struct AvailabilityService {
    store: Arc<dyn EventStore>,
    health: Arc<HealthMonitor>,
    default_max_events: usize,
}

impl AvailabilityService {
    pub fn new(
        store: Arc<dyn EventStore>,
        health: Arc<HealthMonitor>,
        default_max_events: usize,
    ) -> Self {
        Self {
            store,
            health,
            default_max_events,
        }
    }

    pub async fn device_availability(
        &self,
        device_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        max_events: Option<usize>,
    ) -> Result<AvailabilityWindow> {
        let override_end_up = self
            .health
            .known_status(device_id)
            .await
            .map(|status| status.is_up());
        reconstruct(
            self.store.as_ref(),
            device_id,
            start,
            end,
            max_events.unwrap_or(self.default_max_events),
            override_end_up,
        )
        .await
    }

    /// Uptime percentage for an arbitrary window; `None` when the store is
    /// unavailable so the rest of a report can still render.
    pub async fn device_uptime_percent(
        &self,
        device_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<f64> {
        match uptime_percent(self.store.as_ref(), device_id, start, end).await {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(device_id = %device_id, "uptime percentage unavailable: {err:#}");
                None
            }
        }
    }

    /// Convenience for the dashboard's rolling last-24h figure.
    pub async fn uptime_percent_24h(&self, device_id: Uuid) -> Option<f64> {
        let end = Utc::now();
        self.device_uptime_percent(device_id, end - Duration::hours(24), end)
            .await
    }
}
