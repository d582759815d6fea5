use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

mod memory;
mod postgres;

pub use memory::MemoryEventStore;
pub use postgres::PgEventStore;

/// Measurement holding one point per device-level status transition.
pub const DEVICE_STATUS_MEASUREMENT: &str = "device_status";
/// Measurement holding per-interface WAN link events.
pub const WAN_LINK_MEASUREMENT: &str = "wan_link_status";
/// Retention policy the availability points are written under. Expiry is
/// enforced by the store backend, not by this crate.
pub const AVAILABILITY_RETENTION: &str = "autogen";

/// One append-only up/down point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPoint {
    pub measurement: &'static str,
    pub device_id: Uuid,
    pub ifname: Option<String>,
    pub ts: DateTime<Utc>,
    pub up: bool,
    pub retention_policy: &'static str,
}

impl EventPoint {
    pub fn device_status(device_id: Uuid, up: bool, ts: DateTime<Utc>) -> Self {
        Self {
            measurement: DEVICE_STATUS_MEASUREMENT,
            device_id,
            ifname: None,
            ts,
            up,
            retention_policy: AVAILABILITY_RETENTION,
        }
    }

    pub fn wan_link(device_id: Uuid, ifname: &str, up: bool, ts: DateTime<Utc>) -> Self {
        Self {
            measurement: WAN_LINK_MEASUREMENT,
            device_id,
            ifname: Some(ifname.to_string()),
            ts,
            up,
            retention_policy: AVAILABILITY_RETENTION,
        }
    }
}

/// A stored sample as read back from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpSample {
    pub ts: DateTime<Utc>,
    pub up: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOrder {
    Ascending,
    Descending,
}

/// Time-series backend for availability events.
///
/// Two read shapes are all the reconstruction engine needs: the last value
/// at-or-before (or strictly before) an instant, and an ordered range over
/// `[start, end)` with an optional limit. Implementations must enforce a
/// timeout on every call; callers on the write path treat failures as
/// best-effort, while read failures propagate.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn write(&self, point: EventPoint) -> Result<()>;

    async fn last_before(
        &self,
        measurement: &str,
        device_id: Uuid,
        at: DateTime<Utc>,
        inclusive: bool,
    ) -> Result<Option<UpSample>>;

    async fn range(
        &self,
        measurement: &str,
        device_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        order: QueryOrder,
        limit: Option<usize>,
    ) -> Result<Vec<UpSample>>;
}
