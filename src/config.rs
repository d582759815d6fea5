use crate::services::health::MetricKey;
use anyhow::{Context, Result};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub database_url: String,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    /// Enforced on every event-store call so a stalled backend cannot block
    /// a transition or a report.
    pub store_query_timeout_ms: u64,
    /// Newest-N cap on in-window flip candidates per reconstruction.
    pub availability_max_events: usize,
    pub auto_clear_management_address: bool,
    pub close_sessions_on_critical: bool,
    pub critical_metrics: Vec<MetricKey>,
}

impl MonitorConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("NETWATCH_DATABASE_URL")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .context("NETWATCH_DATABASE_URL must be set")?;

        let critical_metrics = match env_optional_string("NETWATCH_CRITICAL_METRICS") {
            Some(raw) => match parse_critical_metrics(&raw) {
                Ok(entries) => entries,
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        "failed to parse NETWATCH_CRITICAL_METRICS; using default critical metrics"
                    );
                    default_critical_metrics()
                }
            },
            None => default_critical_metrics(),
        };

        Ok(Self {
            database_url,
            mqtt_host: env_string("NETWATCH_MQTT_HOST", "127.0.0.1"),
            mqtt_port: env_u16("NETWATCH_MQTT_PORT", 1883),
            mqtt_username: env_optional_string("NETWATCH_MQTT_USERNAME"),
            mqtt_password: env_optional_string("NETWATCH_MQTT_PASSWORD"),
            store_query_timeout_ms: env_u64("NETWATCH_STORE_QUERY_TIMEOUT_MS", 5_000)
                .clamp(100, 60_000),
            availability_max_events: env_u64("NETWATCH_AVAILABILITY_MAX_EVENTS", 500)
                .clamp(1, 10_000) as usize,
            auto_clear_management_address: env_bool("NETWATCH_AUTO_CLEAR_MANAGEMENT_ADDRESS", true),
            close_sessions_on_critical: env_bool("NETWATCH_CLOSE_SESSIONS_ON_CRITICAL", true),
            critical_metrics,
        })
    }

    pub fn store_query_timeout(&self) -> Duration {
        Duration::from_millis(self.store_query_timeout_ms)
    }
}

/// The reachability check is the one metric whose failure means the device
/// itself is gone, not merely degraded.
pub fn default_critical_metrics() -> Vec<MetricKey> {
    vec![MetricKey::new("ping", "reachable")]
}

fn parse_critical_metrics(raw: &str) -> Result<Vec<MetricKey>> {
    let entries: Vec<MetricKey> =
        serde_json::from_str(raw).context("critical metrics must be a JSON list of {key, field_name}")?;
    if entries.is_empty() {
        anyhow::bail!("critical metrics list must not be empty");
    }
    Ok(entries)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_optional_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key)
        .ok()
        .map(|value| value.trim().to_lowercase())
    {
        Some(value) if value == "1" || value == "true" || value == "yes" => true,
        Some(value) if value == "0" || value == "false" || value == "no" => false,
        _ => default,
    }
}

fn env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u16>().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}
