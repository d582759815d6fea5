use crate::config::MonitorConfig;
use crate::services::health::{HealthMonitor, MetricReading};
use anyhow::Result;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const TOPIC_FILTER: &str = "monitoring/+/metric";

/// Feeds externally-evaluated threshold crossings from the broker into the
/// health monitor. Payloads arrive on `monitoring/<device_id>/metric`.
pub struct MqttMetricIngestService {
    config: MonitorConfig,
    health: Arc<HealthMonitor>,
}

impl MqttMetricIngestService {
    pub fn new(config: MonitorConfig, health: Arc<HealthMonitor>) -> Self {
        Self { config, health }
    }

    pub fn start(self, cancel: CancellationToken) {
        tokio::spawn(async move {
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                if let Err(err) = run_once(&self.config, &self.health, cancel.clone()).await {
                    tracing::warn!("mqtt metric ingest loop failed: {err:#}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        });
    }
}

async fn run_once(
    config: &MonitorConfig,
    health: &Arc<HealthMonitor>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut options = MqttOptions::new(
        "netwatch-core-metric-ingest",
        &config.mqtt_host,
        config.mqtt_port,
    );
    options.set_keep_alive(Duration::from_secs(10));
    if let (Some(username), Some(password)) = (
        config.mqtt_username.as_deref(),
        config.mqtt_password.as_deref(),
    ) {
        options.set_credentials(username, password);
    }

    let (client, mut eventloop) = AsyncClient::new(options, 10);
    client.subscribe(TOPIC_FILTER, QoS::AtLeastOnce).await?;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            }
            event = eventloop.poll() => {
                match event {
                    Ok(Event::Incoming(Incoming::Publish(publish))) => {
                        handle_publish(health, publish.topic.as_str(), publish.payload.as_ref())
                            .await;
                    }
                    Ok(Event::Incoming(Incoming::Disconnect)) => anyhow::bail!("mqtt disconnected"),
                    Ok(_) => {}
                    Err(err) => {
                        anyhow::bail!(err);
                    }
                }
            }
        }
    }

    Ok(())
}

async fn handle_publish(health: &Arc<HealthMonitor>, topic: &str, payload: &[u8]) {
    let Some(reading) = parse_metric_payload(topic, payload) else {
        tracing::debug!(topic, "mqtt metric ingest: unusable payload");
        return;
    };
    if let Err(err) = health.threshold_crossed(&reading).await {
        tracing::warn!(device_id = %reading.device_id, "threshold crossing failed: {err:#}");
    }
}

fn parse_metric_payload(topic: &str, payload: &[u8]) -> Option<MetricReading> {
    let parsed: JsonValue = serde_json::from_slice(payload).ok()?;
    let obj = parsed.as_object()?;

    let device_id = obj
        .get("device_id")
        .and_then(|value| value.as_str())
        .or_else(|| topic.split('/').nth(1))
        .and_then(|value| Uuid::parse_str(value.trim()).ok())?;
    let key = obj
        .get("key")
        .and_then(|value| value.as_str())
        .map(str::trim)
        .filter(|value| !value.is_empty())?
        .to_string();
    let field_name = obj
        .get("field_name")
        .and_then(|value| value.as_str())
        .map(str::trim)
        .filter(|value| !value.is_empty())?
        .to_string();
    let is_healthy = obj.get("is_healthy").and_then(|value| value.as_bool())?;
    let is_healthy_tolerant = obj
        .get("is_healthy_tolerant")
        .and_then(|value| value.as_bool())
        .unwrap_or(is_healthy);

    Some(MetricReading {
        device_id,
        key,
        field_name,
        is_healthy,
        is_healthy_tolerant,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_payload() {
        let device = Uuid::new_v4();
        let topic = format!("monitoring/{device}/metric");
        let payload = serde_json::json!({
            "key": "ping",
            "field_name": "reachable",
            "is_healthy": false,
            "is_healthy_tolerant": false,
        });

        let reading = parse_metric_payload(&topic, payload.to_string().as_bytes())
            .expect("valid payload");
        assert_eq!(reading.device_id, device);
        assert_eq!(reading.key, "ping");
        assert_eq!(reading.field_name, "reachable");
        assert!(!reading.is_healthy);
    }

    #[test]
    fn payload_device_id_wins_over_the_topic() {
        let topic_device = Uuid::new_v4();
        let payload_device = Uuid::new_v4();
        let topic = format!("monitoring/{topic_device}/metric");
        let payload = serde_json::json!({
            "device_id": payload_device.to_string(),
            "key": "cpu",
            "field_name": "load",
            "is_healthy": true,
        });

        let reading = parse_metric_payload(&topic, payload.to_string().as_bytes())
            .expect("valid payload");
        assert_eq!(reading.device_id, payload_device);
        // tolerant health defaults to the plain health flag
        assert!(reading.is_healthy_tolerant);
    }

    #[test]
    fn rejects_incomplete_or_malformed_payloads() {
        let device = Uuid::new_v4();
        let topic = format!("monitoring/{device}/metric");

        assert!(parse_metric_payload(&topic, b"not json").is_none());
        assert!(parse_metric_payload(&topic, b"[]").is_none());

        let missing_health = serde_json::json!({"key": "ping", "field_name": "reachable"});
        assert!(parse_metric_payload(&topic, missing_health.to_string().as_bytes()).is_none());

        let bad_topic_no_id = serde_json::json!({
            "key": "ping", "field_name": "reachable", "is_healthy": true,
        });
        assert!(
            parse_metric_payload("monitoring/not-a-uuid/metric", bad_topic_no_id.to_string().as_bytes())
                .is_none()
        );
    }
}
