use super::{EventPoint, EventStore, QueryOrder, UpSample};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

/// In-memory event store used by tests and demo mode.
///
/// Duplicate `(measurement, device, ifname, ts)` writes follow last-write-wins,
/// matching the Postgres adapter. Failure injection toggles let tests exercise
/// the swallow-on-write / propagate-on-read error contract.
#[derive(Default)]
pub struct MemoryEventStore {
    points: Mutex<Vec<EventPoint>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub async fn point_count(&self) -> usize {
        self.points.lock().await.len()
    }

    pub async fn points_for(&self, measurement: &str, device_id: Uuid) -> Vec<EventPoint> {
        self.points
            .lock()
            .await
            .iter()
            .filter(|point| point.measurement == measurement && point.device_id == device_id)
            .cloned()
            .collect()
    }
}

#[async_trait::async_trait]
impl EventStore for MemoryEventStore {
    async fn write(&self, point: EventPoint) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("event store unavailable");
        }
        let mut points = self.points.lock().await;
        if let Some(existing) = points.iter_mut().find(|existing| {
            existing.measurement == point.measurement
                && existing.device_id == point.device_id
                && existing.ifname == point.ifname
                && existing.ts == point.ts
        }) {
            *existing = point;
            return Ok(());
        }
        points.push(point);
        points.sort_by_key(|point| point.ts);
        Ok(())
    }

    async fn last_before(
        &self,
        measurement: &str,
        device_id: Uuid,
        at: DateTime<Utc>,
        inclusive: bool,
    ) -> Result<Option<UpSample>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            anyhow::bail!("event store unavailable");
        }
        let points = self.points.lock().await;
        let sample = points
            .iter()
            .filter(|point| point.measurement == measurement && point.device_id == device_id)
            .filter(|point| if inclusive { point.ts <= at } else { point.ts < at })
            .max_by_key(|point| point.ts)
            .map(|point| UpSample {
                ts: point.ts,
                up: point.up,
            });
        Ok(sample)
    }

    async fn range(
        &self,
        measurement: &str,
        device_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        order: QueryOrder,
        limit: Option<usize>,
    ) -> Result<Vec<UpSample>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            anyhow::bail!("event store unavailable");
        }
        let points = self.points.lock().await;
        let mut samples: Vec<UpSample> = points
            .iter()
            .filter(|point| point.measurement == measurement && point.device_id == device_id)
            .filter(|point| point.ts >= start && point.ts < end)
            .map(|point| UpSample {
                ts: point.ts,
                up: point.up,
            })
            .collect();
        if matches!(order, QueryOrder::Descending) {
            samples.reverse();
        }
        if let Some(limit) = limit {
            samples.truncate(limit);
        }
        Ok(samples)
    }
}
