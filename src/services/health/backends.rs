use super::{DeviceDirectory, MetricKey, MetricRegistry};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Metric health as maintained by the external threshold evaluator, read
/// from the shared database.
pub struct PgMetricRegistry {
    pool: PgPool,
}

impl PgMetricRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, Clone, FromRow)]
struct MetricRow {
    key: String,
    field_name: String,
}

#[async_trait]
impl MetricRegistry for PgMetricRegistry {
    async fn unhealthy_metrics(&self, device_id: Uuid) -> Result<Vec<MetricKey>> {
        let rows: Vec<MetricRow> = sqlx::query_as(
            r#"
            SELECT key, field_name
            FROM device_metrics
            WHERE device_id = $1 AND is_healthy = FALSE
            ORDER BY key ASC, field_name ASC
            "#,
        )
        .bind(device_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to query unhealthy metrics")?;

        Ok(rows
            .into_iter()
            .map(|row| MetricKey::new(row.key, row.field_name))
            .collect())
    }
}

/// Device records live in the external controller database; the only write
/// this crate performs against them is dropping the management address when
/// a device becomes unreachable.
pub struct PgDeviceDirectory {
    pool: PgPool,
}

impl PgDeviceDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeviceDirectory for PgDeviceDirectory {
    async fn clear_management_address(&self, device_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE devices
            SET management_address = NULL
            WHERE id = $1
            "#,
        )
        .bind(device_id)
        .execute(&self.pool)
        .await
        .context("failed to clear management address")?;
        Ok(())
    }
}
