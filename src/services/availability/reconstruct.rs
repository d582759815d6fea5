use crate::store::{EventStore, QueryOrder, DEVICE_STATUS_MEASUREMENT};
use crate::time::{clamped_seconds, fmt_duration_short, round2};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A recorded flip, or a synthetic boundary bounding the query window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    Boundary,
    Flip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AvailabilityEvent {
    pub at: DateTime<Utc>,
    pub up: bool,
    pub synthetic: bool,
    pub kind: EventKind,
}

/// One stitched timeline segment; the status is the state in force from
/// `start` until `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimelineInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub up: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FriendlyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub up: bool,
    pub status_label: &'static str,
    pub duration_seconds: i64,
    pub duration_human: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LongestOutage {
    pub duration_seconds: i64,
    pub duration_human: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl LongestOutage {
    fn none() -> Self {
        Self {
            duration_seconds: 0,
            duration_human: "0s".to_string(),
            start: None,
            end: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FriendlySummary {
    pub total_uptime_seconds: i64,
    pub total_uptime: String,
    pub total_downtime_seconds: i64,
    pub total_downtime: String,
    pub longest_outage: LongestOutage,
    pub uptime_percent: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FriendlyReport {
    pub intervals: Vec<FriendlyInterval>,
    pub summary: FriendlySummary,
}

/// Full reconstruction result for one `[start, end)` window.
#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub events: Vec<AvailabilityEvent>,
    pub timeline: Vec<TimelineInterval>,
    pub friendly: FriendlyReport,
    pub uptime_percent: Option<f64>,
}

impl AvailabilityWindow {
    fn empty(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            events: Vec::new(),
            timeline: Vec::new(),
            friendly: FriendlyReport {
                intervals: Vec::new(),
                summary: FriendlySummary {
                    total_uptime_seconds: 0,
                    total_uptime: "0s".to_string(),
                    total_downtime_seconds: 0,
                    total_downtime: "0s".to_string(),
                    longest_outage: LongestOutage::none(),
                    uptime_percent: Some(0.0),
                },
            },
            uptime_percent: Some(0.0),
        }
    }
}

/// Rebuild the continuous up/down timeline of a device over `[start, end)`
/// from the sparse flip events in the store.
///
/// Only the newest `max_events` in-window points are fetched (descending,
/// then reversed for processing). When a device flapped more often than
/// that inside the window, the oldest flips are dropped from the timeline,
/// an accepted precision/cost trade-off. The uptime percentage runs as a
/// separate unlimited scan, and its failure downgrades to `None` instead of
/// aborting the whole report.
pub async fn reconstruct(
    store: &dyn EventStore,
    device_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    max_events: usize,
    override_end_up: Option<bool>,
) -> Result<AvailabilityWindow> {
    if start >= end {
        return Ok(AvailabilityWindow::empty(start, end));
    }

    // State at the window start: last event at-or-before it, else down.
    let state_at_start = store
        .last_before(DEVICE_STATUS_MEASUREMENT, device_id, start, true)
        .await?
        .map(|sample| sample.up)
        .unwrap_or(false);

    let mut rows = store
        .range(
            DEVICE_STATUS_MEASUREMENT,
            device_id,
            start,
            end,
            QueryOrder::Descending,
            Some(max_events),
        )
        .await?;
    rows.reverse();

    let end_from_store = store
        .last_before(DEVICE_STATUS_MEASUREMENT, device_id, end, false)
        .await?
        .map(|sample| sample.up);

    let mut events = vec![AvailabilityEvent {
        at: start,
        up: state_at_start,
        synthetic: true,
        kind: EventKind::Boundary,
    }];

    // Walk ascending, keeping only true flips; duplicate observations of the
    // running state are dropped.
    let mut current = state_at_start;
    for row in rows {
        if row.up != current {
            events.push(AvailabilityEvent {
                at: row.ts,
                up: row.up,
                synthetic: false,
                kind: EventKind::Flip,
            });
            current = row.up;
        }
    }

    // The caller may override the end state with the live status, which is
    // fresher than a possibly stale store tail.
    let end_up = override_end_up
        .or(end_from_store)
        .unwrap_or(state_at_start);
    events.push(AvailabilityEvent {
        at: end,
        up: end_up,
        synthetic: true,
        kind: EventKind::Boundary,
    });

    let timeline: Vec<TimelineInterval> = events
        .windows(2)
        .map(|pair| TimelineInterval {
            start: pair[0].at,
            end: pair[1].at,
            up: pair[0].up,
        })
        .collect();

    let mut friendly = build_friendly(&events);

    let uptime = match uptime_percent(store, device_id, start, end).await {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(device_id = %device_id, "uptime percentage unavailable: {err:#}");
            None
        }
    };
    friendly.summary.uptime_percent = uptime;

    Ok(AvailabilityWindow {
        start,
        end,
        events,
        timeline,
        friendly,
        uptime_percent: uptime,
    })
}

/// Uptime percentage over `[start, end)`, weighting each sub-interval by the
/// state in force during it (not the state at the flip), rounded to two
/// decimals. A zero-duration window is 0.0.
pub async fn uptime_percent(
    store: &dyn EventStore,
    device_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<f64> {
    if start >= end {
        return Ok(0.0);
    }

    let mut current = store
        .last_before(DEVICE_STATUS_MEASUREMENT, device_id, start, true)
        .await?
        .map(|sample| sample.up)
        .unwrap_or(false);

    let events = store
        .range(
            DEVICE_STATUS_MEASUREMENT,
            device_id,
            start,
            end,
            QueryOrder::Ascending,
            None,
        )
        .await?;

    let mut cursor = start;
    let mut up_seconds = 0.0;
    for event in events {
        if current {
            up_seconds += clamped_seconds(event.ts - cursor);
        }
        current = event.up;
        cursor = event.ts;
    }
    if current {
        up_seconds += clamped_seconds(end - cursor);
    }

    let total = clamped_seconds(end - start);
    if total <= 0.0 {
        return Ok(0.0);
    }
    Ok(round2(up_seconds / total * 100.0))
}

fn build_friendly(events: &[AvailabilityEvent]) -> FriendlyReport {
    let mut intervals = Vec::new();
    let mut total_up = 0.0;
    let mut total_down = 0.0;
    let mut longest_outage = LongestOutage::none();

    for pair in events.windows(2) {
        let delta = clamped_seconds(pair[1].at - pair[0].at);
        let duration_human = fmt_duration_short(delta);
        intervals.push(FriendlyInterval {
            start: pair[0].at,
            end: pair[1].at,
            up: pair[0].up,
            status_label: if pair[0].up { "Up" } else { "Down" },
            duration_seconds: delta.round() as i64,
            duration_human: duration_human.clone(),
        });

        if pair[0].up {
            total_up += delta;
        } else {
            total_down += delta;
            // strictly greater keeps the first of equal-length outages
            if delta > longest_outage.duration_seconds as f64 {
                longest_outage = LongestOutage {
                    duration_seconds: delta.round() as i64,
                    duration_human,
                    start: Some(pair[0].at),
                    end: Some(pair[1].at),
                };
            }
        }
    }

    FriendlyReport {
        intervals,
        summary: FriendlySummary {
            total_uptime_seconds: total_up.round() as i64,
            total_uptime: fmt_duration_short(total_up),
            total_downtime_seconds: total_down.round() as i64,
            total_downtime: fmt_duration_short(total_down),
            longest_outage,
            uptime_percent: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EventPoint, MemoryEventStore, UpSample};
    use chrono::{Duration, TimeZone};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn ts(seconds: i64) -> DateTime<Utc> {
        base() + Duration::seconds(seconds)
    }

    async fn seed(store: &MemoryEventStore, device: Uuid, points: &[(i64, bool)]) {
        for (offset, up) in points {
            store
                .write(EventPoint::device_status(device, *up, ts(*offset)))
                .await
                .expect("seed write");
        }
    }

    #[tokio::test]
    async fn inverted_window_yields_empty_zero_valued_result() -> Result<()> {
        let store = MemoryEventStore::new();
        let device = Uuid::new_v4();

        for (start, end) in [(ts(60), ts(0)), (ts(60), ts(60))] {
            let window = reconstruct(&store, device, start, end, 500, None).await?;
            assert!(window.events.is_empty());
            assert!(window.timeline.is_empty());
            assert!(window.friendly.intervals.is_empty());
            assert_eq!(window.uptime_percent, Some(0.0));
        }
        Ok(())
    }

    #[tokio::test]
    async fn device_with_no_events_is_down_for_the_whole_window() -> Result<()> {
        let store = MemoryEventStore::new();
        let device = Uuid::new_v4();

        let window = reconstruct(&store, device, ts(0), ts(3600), 500, None).await?;
        assert_eq!(window.timeline.len(), 1);
        assert_eq!(window.timeline[0].start, ts(0));
        assert_eq!(window.timeline[0].end, ts(3600));
        assert!(!window.timeline[0].up);
        assert_eq!(window.uptime_percent, Some(0.0));
        assert_eq!(window.friendly.summary.total_downtime, "1h");
        assert_eq!(
            window.friendly.summary.longest_outage.duration_seconds,
            3600
        );
        Ok(())
    }

    #[tokio::test]
    async fn no_flips_inside_window_keeps_the_prior_state() -> Result<()> {
        let store = MemoryEventStore::new();
        let device = Uuid::new_v4();
        seed(&store, device, &[(-300, true)]).await;

        let window = reconstruct(&store, device, ts(0), ts(600), 500, None).await?;
        assert_eq!(window.timeline.len(), 1);
        assert!(window.timeline[0].up);
        assert_eq!(window.uptime_percent, Some(100.0));
        assert_eq!(window.friendly.summary.total_uptime, "10m");
        assert_eq!(window.friendly.summary.longest_outage.start, None);
        Ok(())
    }

    #[tokio::test]
    async fn single_flip_splits_the_window() -> Result<()> {
        // no prior events, one up flip 10s into a 60s window
        let store = MemoryEventStore::new();
        let device = Uuid::new_v4();
        seed(&store, device, &[(10, true)]).await;

        let window = reconstruct(&store, device, ts(0), ts(60), 500, None).await?;
        assert_eq!(window.timeline.len(), 2);
        assert_eq!(window.timeline[0].start, ts(0));
        assert_eq!(window.timeline[0].end, ts(10));
        assert!(!window.timeline[0].up);
        assert_eq!(window.timeline[1].start, ts(10));
        assert_eq!(window.timeline[1].end, ts(60));
        assert!(window.timeline[1].up);
        assert_eq!(window.uptime_percent, Some(83.33));

        assert_eq!(window.events.len(), 3);
        assert_eq!(window.events[0].kind, EventKind::Boundary);
        assert!(window.events[0].synthetic);
        assert_eq!(window.events[1].kind, EventKind::Flip);
        assert!(!window.events[1].synthetic);
        assert_eq!(window.events[2].kind, EventKind::Boundary);
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_observations_are_not_flips() -> Result<()> {
        let store = MemoryEventStore::new();
        let device = Uuid::new_v4();
        seed(&store, device, &[(-60, true)]).await;
        seed(&store, device, &[(10, true), (20, true), (30, false), (40, false)]).await;

        let window = reconstruct(&store, device, ts(0), ts(100), 500, None).await?;
        let flips: Vec<&AvailabilityEvent> = window
            .events
            .iter()
            .filter(|event| event.kind == EventKind::Flip)
            .collect();
        assert_eq!(flips.len(), 1);
        assert_eq!(flips[0].at, ts(30));
        assert!(!flips[0].up);
        Ok(())
    }

    #[tokio::test]
    async fn timeline_covers_the_window_without_gaps_or_overlaps() -> Result<()> {
        let store = MemoryEventStore::new();
        let device = Uuid::new_v4();
        seed(
            &store,
            device,
            &[(-10, true), (100, false), (200, true), (350, false)],
        )
        .await;

        let window = reconstruct(&store, device, ts(0), ts(400), 500, None).await?;
        assert_eq!(window.timeline.first().map(|i| i.start), Some(ts(0)));
        assert_eq!(window.timeline.last().map(|i| i.end), Some(ts(400)));
        for pair in window.timeline.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
            assert_ne!(pair[0].up, pair[1].up);
        }
        Ok(())
    }

    #[tokio::test]
    async fn truncation_keeps_only_the_newest_flips() -> Result<()> {
        // five true flips but a cap of one: only the newest survives,
        // the older ones silently fall out of the timeline
        let store = MemoryEventStore::new();
        let device = Uuid::new_v4();
        seed(
            &store,
            device,
            &[(10, true), (20, false), (30, true), (40, false), (50, true)],
        )
        .await;

        let window = reconstruct(&store, device, ts(0), ts(60), 1, None).await?;
        assert_eq!(window.events.len(), 3);
        assert_eq!(window.events[1].kind, EventKind::Flip);
        assert_eq!(window.events[1].at, ts(50));
        assert_eq!(window.timeline.len(), 2);
        assert!(!window.timeline[0].up);
        assert!(window.timeline[1].up);

        // the uptime scan is unlimited, so it still sees every flip:
        // up during [10,20) + [30,40) + [50,60) = 30s of 60s
        assert_eq!(window.uptime_percent, Some(50.0));
        Ok(())
    }

    #[tokio::test]
    async fn override_replaces_the_end_boundary_state() -> Result<()> {
        let store = MemoryEventStore::new();
        let device = Uuid::new_v4();

        let window = reconstruct(&store, device, ts(0), ts(60), 500, Some(true)).await?;
        let last = window.events.last().expect("end boundary");
        assert!(last.up);
        assert!(last.synthetic);
        // boundaries never change state: the single interval still carries
        // the state in force during the window
        assert_eq!(window.timeline.len(), 1);
        assert!(!window.timeline[0].up);
        Ok(())
    }

    #[tokio::test]
    async fn end_state_defaults_to_last_event_before_end() -> Result<()> {
        let store = MemoryEventStore::new();
        let device = Uuid::new_v4();
        seed(&store, device, &[(-60, false), (30, true)]).await;

        let window = reconstruct(&store, device, ts(0), ts(100), 500, None).await?;
        assert!(window.events.last().expect("end boundary").up);
        Ok(())
    }

    #[tokio::test]
    async fn longest_outage_tie_keeps_the_first() -> Result<()> {
        let store = MemoryEventStore::new();
        let device = Uuid::new_v4();
        // down [0,100), up [100,200), down [200,300), up [300,400)
        seed(
            &store,
            device,
            &[(100, true), (200, false), (300, true)],
        )
        .await;

        let window = reconstruct(&store, device, ts(0), ts(400), 500, None).await?;
        let outage = &window.friendly.summary.longest_outage;
        assert_eq!(outage.duration_seconds, 100);
        assert_eq!(outage.start, Some(ts(0)));
        assert_eq!(outage.end, Some(ts(100)));
        assert_eq!(window.friendly.summary.total_uptime_seconds, 200);
        assert_eq!(window.friendly.summary.total_downtime_seconds, 200);
        assert_eq!(window.uptime_percent, Some(50.0));
        Ok(())
    }

    #[tokio::test]
    async fn uptime_percent_stays_within_bounds() -> Result<()> {
        let store = MemoryEventStore::new();
        let device = Uuid::new_v4();
        seed(&store, device, &[(-5, true)]).await;

        let full = uptime_percent(&store, device, ts(0), ts(90)).await?;
        assert_eq!(full, 100.0);

        seed(&store, device, &[(30, false)]).await;
        let partial = uptime_percent(&store, device, ts(0), ts(90)).await?;
        assert_eq!(partial, 33.33);
        assert!((0.0..=100.0).contains(&partial));
        Ok(())
    }

    #[tokio::test]
    async fn primary_read_failure_propagates() {
        let store = MemoryEventStore::new();
        let device = Uuid::new_v4();
        store.fail_reads(true);

        let result = reconstruct(&store, device, ts(0), ts(60), 500, None).await;
        assert!(result.is_err());
    }

    /// Fails only the unlimited ascending scan used for the uptime
    /// percentage, leaving the timeline queries intact.
    struct UptimeFailStore {
        inner: MemoryEventStore,
    }

    #[async_trait::async_trait]
    impl EventStore for UptimeFailStore {
        async fn write(&self, point: EventPoint) -> Result<()> {
            self.inner.write(point).await
        }

        async fn last_before(
            &self,
            measurement: &str,
            device_id: Uuid,
            at: DateTime<Utc>,
            inclusive: bool,
        ) -> Result<Option<UpSample>> {
            self.inner
                .last_before(measurement, device_id, at, inclusive)
                .await
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
            if limit.is_none() {
                anyhow::bail!("event store unavailable");
            }
            self.inner
                .range(measurement, device_id, start, end, order, limit)
                .await
        }
    }

    #[tokio::test]
    async fn uptime_failure_degrades_to_none_without_losing_the_timeline() -> Result<()> {
        let store = UptimeFailStore {
            inner: MemoryEventStore::new(),
        };
        let device = Uuid::new_v4();
        store
            .write(EventPoint::device_status(device, true, ts(10)))
            .await?;

        let window = reconstruct(&store, device, ts(0), ts(60), 500, None).await?;
        assert_eq!(window.timeline.len(), 2);
        assert_eq!(window.uptime_percent, None);
        assert_eq!(window.friendly.summary.uptime_percent, None);
        Ok(())
    }
}
