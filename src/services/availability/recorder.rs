use crate::services::health::StatusChange;
use crate::store::{EventPoint, EventStore};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Appends one up/down point to the event store for every status transition,
/// plus per-interface WAN link observations on demand.
///
/// Recording is strictly best-effort: one retry, then the point is dropped
/// with a warning. A dead store must never affect the transition that
/// produced the point.
#[derive(Clone)]
pub struct AvailabilityRecorder {
    store: Arc<dyn EventStore>,
}

impl AvailabilityRecorder {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// Consume the status-change bus until cancelled.
    pub fn start(self, changes: broadcast::Receiver<StatusChange>, cancel: CancellationToken) {
        tokio::spawn(async move {
            let mut changes = changes;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    change = changes.recv() => match change {
                        Ok(change) => self.record_status_change(&change).await,
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            tracing::warn!(missed, "availability recorder lagged, dropping missed transitions");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
    }

    pub async fn record_status_change(&self, change: &StatusChange) {
        let point =
            EventPoint::device_status(change.device_id, change.new_status.is_up(), change.at);
        self.write_best_effort(point).await;
    }

    /// Record a raw link up/down observation for a named WAN interface.
    pub async fn record_wan_link(
        &self,
        device_id: Uuid,
        ifname: &str,
        is_up: bool,
        at: Option<DateTime<Utc>>,
    ) {
        let point = EventPoint::wan_link(device_id, ifname, is_up, at.unwrap_or_else(Utc::now));
        self.write_best_effort(point).await;
    }

    async fn write_best_effort(&self, point: EventPoint) {
        if let Err(err) = self.try_write(&point).await {
            tracing::warn!(
                device_id = %point.device_id,
                measurement = point.measurement,
                "dropping availability point: {err:#}"
            );
        }
    }

    async fn try_write(&self, point: &EventPoint) -> Result<()> {
        match self.store.write(point.clone()).await {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::debug!(
                    device_id = %point.device_id,
                    "availability write failed, retrying once: {err:#}"
                );
                self.store.write(point.clone()).await
            }
        }
    }
}
