use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};
use transmission_monitoring::{
    actors::{
        black_screen::BlackScreenHandle, failover::FailoverHandle, fleet::FleetHandle,
        notifier::{NotifierHandle, lowest_accepted},
        persistence::PersistenceHandle, sampler::SamplerHandle,
    },
    aggregator::MonitoringSummary,
    alerts::AlertManager,
    config::{Config, SourceConfig, StorageConfig, read_config_file},
    fleet::FleetState,
    monitors::RandomProbe,
    sources::{HttpSource, MetricSource, SimulatedSource},
    storage::{StateBackend, file::FileBackend, memory::MemoryBackend, schema},
    util,
};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (defaults to $TXMON_CONFIG or ./txmon.json)
    #[arg(short)]
    file: Option<String>,
}

fn init() {
    let level = LevelFilter::from_level(util::get_log_level());
    let filter = filter::Targets::new().with_targets(vec![
        ("transmission_monitoring", level),
        ("txmon_hub", level),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let path = args.file.unwrap_or_else(util::get_config_path);
    let config = read_config_file(&path).with_context(|| format!("failed to read {path}"))?;

    let backend = open_backend(&config.storage).await?;
    // a store that cannot be decoded is never silently replaced
    let stored = schema::load_snapshot(backend.as_ref())
        .await
        .context("persisted state is unreadable, refusing to start")?;
    let fresh = stored.is_none();

    let state = match stored {
        Some(snapshot) => {
            info!(
                "restored {} transmitters and {} alerts",
                snapshot.transmitters.len(),
                snapshot.alerts.len()
            );
            FleetState::from_snapshot(config.fleet_settings(), snapshot)
        }
        None => FleetState::new(config.fleet_settings()),
    };

    let (event_tx, _) = broadcast::channel(1024);
    let fleet = FleetHandle::spawn(state, event_tx);

    let persistence = PersistenceHandle::spawn(
        fleet.clone(),
        backend,
        Duration::from_secs(config.storage.flush_interval()),
    );

    if fresh {
        seed(&fleet, &config).await?;
    }

    let alert_manager = AlertManager::new(config.notify.clone());
    match lowest_accepted(&alert_manager) {
        Some(severity) => info!("pushing notifications of severity {severity} and above"),
        None => debug!("no notification targets configured"),
    }
    let notifier = NotifierHandle::spawn(alert_manager, fleet.subscribe());

    let failover = config
        .alerting
        .auto_failover
        .then(|| FailoverHandle::spawn(fleet.clone()));

    let sampler = SamplerHandle::spawn(
        fleet.clone(),
        metric_source(&config.sampler.source)?,
        Duration::from_secs(config.sampler.interval),
    );

    let bs = &config.black_screen;
    let black_screen = BlackScreenHandle::spawn(
        fleet.clone(),
        Arc::new(RandomProbe::new(bs.probability, bs.min_duration, bs.max_duration)),
        Duration::from_secs(bs.interval),
    );

    tokio::select! {
        _ = dashboard(fleet.clone(), persistence.clone(), config.dashboard_interval) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("failed to listen for ctrl-c: {e}");
            }
            info!("shutting down");
        }
    }

    let failover_shutdown = async {
        match &failover {
            Some(failover) => failover.shutdown().await,
            None => Ok(()),
        }
    };
    let (sampled, scanned, notified, failed_over) = futures::join!(
        sampler.shutdown(),
        black_screen.shutdown(),
        notifier.shutdown(),
        failover_shutdown
    );
    for result in [sampled, scanned, notified, failed_over] {
        if let Err(e) = result {
            warn!("{e:#}");
        }
    }

    if let Err(e) = persistence.shutdown().await {
        error!("final flush failed: {e:#}");
    }
    fleet.shutdown().await?;

    Ok(())
}

async fn open_backend(storage: &StorageConfig) -> anyhow::Result<Box<dyn StateBackend>> {
    let backend: Box<dyn StateBackend> = match storage {
        StorageConfig::None => {
            warn!("no storage configured, state is kept in memory only");
            Box::new(MemoryBackend::new())
        }
        StorageConfig::File { dir, .. } => {
            let dir = util::get_state_dir().unwrap_or_else(|| dir.clone());
            info!("storing state in {}", dir.display());
            Box::new(FileBackend::new(&dir).await?)
        }
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path, .. } => {
            info!("storing state in {}", path.display());
            Box::new(transmission_monitoring::storage::sqlite::SqliteBackend::new(path).await?)
        }
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => {
            anyhow::bail!("sqlite storage requires the storage-sqlite feature")
        }
    };

    let health = backend.health_check().await?;
    debug!("storage health: {health:?}");
    Ok(backend)
}

fn metric_source(source: &SourceConfig) -> anyhow::Result<Arc<dyn MetricSource>> {
    Ok(match source {
        SourceConfig::Simulated { bounds } => Arc::new(SimulatedSource::new(*bounds)),
        SourceConfig::Http {
            endpoints,
            timeout_secs,
        } => Arc::new(HttpSource::new(
            endpoints.clone(),
            Duration::from_secs(*timeout_secs),
        )?),
    })
}

/// Load the configured equipment into an empty store
#[instrument(skip_all)]
async fn seed(fleet: &FleetHandle, config: &Config) -> anyhow::Result<()> {
    for transmitter in &config.transmitters {
        fleet.add_transmitter(transmitter.clone()).await?;
    }
    for channel in &config.channels {
        fleet.add_channel(channel.clone()).await?;
    }
    for channel in &config.broadcast_channels {
        fleet.add_broadcast_channel(channel.clone()).await?;
    }
    for backup in &config.backup_systems {
        fleet.add_backup_system(backup.clone()).await?;
    }

    info!(
        "seeded {} transmitters, {} channels, {} broadcast channels, {} backup systems",
        config.transmitters.len(),
        config.channels.len(),
        config.broadcast_channels.len(),
        config.backup_systems.len()
    );
    Ok(())
}

async fn dashboard(fleet: FleetHandle, persistence: PersistenceHandle, interval_secs: u64) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    ticker.tick().await;

    loop {
        ticker.tick().await;

        match fleet.snapshot().await {
            Ok(snapshot) => info!("{}", MonitoringSummary::from_snapshot(&snapshot)),
            Err(e) => {
                error!("failed to read fleet state: {e:#}");
                return;
            }
        }

        if let Ok(stats) = persistence.stats().await {
            debug!(
                "persistence: {} flushes, {} keys written, {} failed, {} dirty",
                stats.flush_count, stats.keys_written, stats.failed_flushes, stats.dirty_keys
            );
        }
    }
}
