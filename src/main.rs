use anyhow::Result;
use clap::Parser;
use netwatch_core_rs::services::availability::{AvailabilityRecorder, AvailabilityService};
use netwatch_core_rs::services::health::backends::{PgDeviceDirectory, PgMetricRegistry};
use netwatch_core_rs::services::health::{CriticalMetricSet, HealthMonitor};
use netwatch_core_rs::services::mqtt_ingest::MqttMetricIngestService;
use netwatch_core_rs::services::sessions::SessionCloserService;
use netwatch_core_rs::store::{EventStore, PgEventStore};
use netwatch_core_rs::{cli, config, db, state};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = config::MonitorConfig::from_env()?;
    let pool = db::connect_lazy(&config.database_url)?;

    let pg_store = Arc::new(PgEventStore::new(
        pool.clone(),
        config.store_query_timeout(),
    ));
    if args.ensure_schema {
        pg_store.ensure_schema().await?;
        tracing::info!("event store schema is in place");
        return Ok(());
    }

    let events: Arc<dyn EventStore> = pg_store;
    let health = Arc::new(HealthMonitor::new(
        Arc::new(PgMetricRegistry::new(pool.clone())),
        Arc::new(PgDeviceDirectory::new(pool.clone())),
        CriticalMetricSet::new(config.critical_metrics.clone()),
        config.auto_clear_management_address,
    ));
    let recorder = AvailabilityRecorder::new(events.clone());
    let availability = Arc::new(AvailabilityService::new(
        events.clone(),
        health.clone(),
        config.availability_max_events,
    ));

    let state = state::AppState {
        config: config.clone(),
        db: pool.clone(),
        events,
        health: health.clone(),
        availability,
        recorder: recorder.clone(),
    };

    let cancel = CancellationToken::new();
    recorder.start(health.subscribe(), cancel.clone());
    if config.close_sessions_on_critical {
        SessionCloserService::new(pool).start(health.subscribe(), cancel.clone());
    }
    MqttMetricIngestService::new(state.config.clone(), health).start(cancel.clone());

    tracing::info!(
        mqtt_host = %state.config.mqtt_host,
        "netwatch core running; press ctrl-c to stop"
    );
    tokio::signal::ctrl_c().await?;
    cancel.cancel();
    Ok(())
}
