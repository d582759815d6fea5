use super::{EventPoint, EventStore, QueryOrder, UpSample};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

/// Postgres-backed event store.
///
/// Every query runs under an enforced timeout so a stalled backend can never
/// block a status transition or a reconstruction request indefinitely.
pub struct PgEventStore {
    pool: PgPool,
    query_timeout: Duration,
}

#[derive(Debug, Clone, FromRow)]
struct UpRow {
    ts: DateTime<Utc>,
    up: i16,
}

impl From<UpRow> for UpSample {
    fn from(row: UpRow) -> Self {
        UpSample {
            ts: row.ts,
            up: row.up != 0,
        }
    }
}

impl PgEventStore {
    pub fn new(pool: PgPool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS availability_events (
                measurement text NOT NULL,
                device_id uuid NOT NULL,
                ifname text NOT NULL DEFAULT '',
                ts timestamptz NOT NULL,
                up smallint NOT NULL,
                retention_policy text NOT NULL DEFAULT 'autogen',
                PRIMARY KEY (measurement, device_id, ifname, ts)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create availability_events table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS availability_events_device_ts_idx
            ON availability_events (device_id, measurement, ts DESC)
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to create availability_events index")?;

        Ok(())
    }

    async fn bounded<T>(&self, fut: impl Future<Output = sqlx::Result<T>>) -> Result<T> {
        tokio::time::timeout(self.query_timeout, fut)
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "event store query exceeded {}ms",
                    self.query_timeout.as_millis()
                )
            })?
            .context("event store query failed")
    }
}

#[async_trait::async_trait]
impl EventStore for PgEventStore {
    async fn write(&self, point: EventPoint) -> Result<()> {
        self.bounded(
            sqlx::query(
                r#"
                INSERT INTO availability_events (measurement, device_id, ifname, ts, up, retention_policy)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (measurement, device_id, ifname, ts)
                DO UPDATE SET up = EXCLUDED.up, retention_policy = EXCLUDED.retention_policy
                "#,
            )
            .bind(point.measurement)
            .bind(point.device_id)
            .bind(point.ifname.unwrap_or_default())
            .bind(point.ts)
            .bind(i16::from(point.up))
            .bind(point.retention_policy)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn last_before(
        &self,
        measurement: &str,
        device_id: Uuid,
        at: DateTime<Utc>,
        inclusive: bool,
    ) -> Result<Option<UpSample>> {
        let query = if inclusive {
            r#"
            SELECT ts, up
            FROM availability_events
            WHERE measurement = $1 AND device_id = $2 AND ts <= $3
            ORDER BY ts DESC
            LIMIT 1
            "#
        } else {
            r#"
            SELECT ts, up
            FROM availability_events
            WHERE measurement = $1 AND device_id = $2 AND ts < $3
            ORDER BY ts DESC
            LIMIT 1
            "#
        };

        let row: Option<UpRow> = self
            .bounded(
                sqlx::query_as(query)
                    .bind(measurement)
                    .bind(device_id)
                    .bind(at)
                    .fetch_optional(&self.pool),
            )
            .await?;
        Ok(row.map(UpSample::from))
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
        let query = match order {
            QueryOrder::Ascending => {
                r#"
                SELECT ts, up
                FROM availability_events
                WHERE measurement = $1 AND device_id = $2 AND ts >= $3 AND ts < $4
                ORDER BY ts ASC
                LIMIT $5
                "#
            }
            QueryOrder::Descending => {
                r#"
                SELECT ts, up
                FROM availability_events
                WHERE measurement = $1 AND device_id = $2 AND ts >= $3 AND ts < $4
                ORDER BY ts DESC
                LIMIT $5
                "#
            }
        };

        let rows: Vec<UpRow> = self
            .bounded(
                sqlx::query_as(query)
                    .bind(measurement)
                    .bind(device_id)
                    .bind(start)
                    .bind(end)
                    .bind(limit.map(|limit| limit as i64))
                    .fetch_all(&self.pool),
            )
            .await?;
        Ok(rows.into_iter().map(UpSample::from).collect())
    }
}
