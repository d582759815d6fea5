use crate::services::health::{HealthStatus, StatusChange};
use sqlx::PgPool;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Closes open WiFi sessions when a device transitions into `critical`.
///
/// Runs as an isolated subscriber on the status-change bus: a failing close
/// can never roll back or delay the transition that triggered it.
pub struct SessionCloserService {
    pool: PgPool,
}

impl SessionCloserService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn start(self, changes: broadcast::Receiver<StatusChange>, cancel: CancellationToken) {
        tokio::spawn(async move {
            let mut changes = changes;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    change = changes.recv() => match change {
                        Ok(change) if change.new_status == HealthStatus::Critical => {
                            match close_open_sessions(&self.pool, change.device_id).await {
                                Ok(closed) if closed > 0 => {
                                    tracing::info!(device_id = %change.device_id, closed, "closed open wifi sessions for unreachable device");
                                }
                                Ok(_) => {}
                                Err(err) => {
                                    tracing::warn!(device_id = %change.device_id, "failed to close wifi sessions: {err:#}");
                                }
                            }
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            tracing::warn!(missed, "session closer lagged behind status changes");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
    }
}

pub async fn close_open_sessions(pool: &PgPool, device_id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE wifi_sessions
        SET stop_time = NOW()
        WHERE device_id = $1 AND stop_time IS NULL
        "#,
    )
    .bind(device_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
