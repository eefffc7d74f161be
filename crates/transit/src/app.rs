//! Main application logic and lifecycle management.
//!
//! The `Application` runs the whole pipeline in one process: an origin tier
//! that replays raw records, a mid tier and a terminal tier, chained with
//! in-process links. A dashboard subscriber drains the terminal tier.

use crate::{
    cli::CliArgs,
    config::AppConfig,
    logging::display_banner,
    signals::{setup_signal_handlers, wait_for_signal},
};
use std::path::PathBuf;
use std::sync::Arc;
use tier_server::{
    link_tiers, ChannelSubscriber, JsonLinesRecordSource, StaticStopDirectory, StopDirectory,
    TierController,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use transit_event_system::{BusEvent, Interest, PipelineMonitor, ShutdownState, TierRole};

/// The running pipeline and its configuration.
pub struct Application {
    config: AppConfig,
    shutdown_state: ShutdownState,
    origin: Arc<TierController>,
    mid: Arc<TierController>,
    terminal: Arc<TierController>,
}

impl Application {
    /// Loads configuration, applies CLI overrides, validates it and builds
    /// the three tiers. Nothing is started yet.
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;
        apply_overrides(&mut config, &args);

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        display_banner();
        Self::from_config(config).await
    }

    /// Builds the tiers from an already validated configuration.
    pub async fn from_config(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let stops: Arc<dyn StopDirectory> = match &config.ingest.stops_path {
            Some(path) => {
                let directory = StaticStopDirectory::from_json_file(path).await?;
                info!("🚏 Loaded {} known stops from {}", directory.len(), path);
                Arc::new(directory)
            }
            None => {
                warn!("⚠️ No stop reference file configured - enrichment will be zone-only");
                Arc::new(StaticStopDirectory::default())
            }
        };

        let shutdown_state = ShutdownState::new();
        let build = |role: TierRole| -> Result<Arc<TierController>, Box<dyn std::error::Error>> {
            let tier = TierController::new(config.to_tier_config(role), stops.clone())?
                .with_shutdown_state(shutdown_state.clone());
            Ok(Arc::new(tier))
        };

        let origin = build(TierRole::Origin)?;
        let mid = build(TierRole::Mid)?;
        let terminal = build(TierRole::Terminal)?;

        Ok(Self {
            config,
            shutdown_state,
            origin,
            mid,
            terminal,
        })
    }

    pub fn shutdown_state(&self) -> &ShutdownState {
        &self.shutdown_state
    }

    pub fn tier(&self, role: TierRole) -> Arc<TierController> {
        match role {
            TierRole::Origin => self.origin.clone(),
            TierRole::Mid => self.mid.clone(),
            TierRole::Terminal => self.terminal.clone(),
        }
    }

    /// Starts the tiers bottom-up and links them origin → mid → terminal.
    /// Returns the queue of the terminal dashboard subscriber.
    pub async fn start_pipeline(&self) -> Result<mpsc::Receiver<BusEvent>, Box<dyn std::error::Error>> {
        for tier in [&self.terminal, &self.mid, &self.origin] {
            let restored = tier.start().await?;
            if restored.restored + restored.expired + restored.skipped > 0 {
                info!(
                    "💾 {} tier snapshot: {} restored, {} expired, {} skipped",
                    tier.role(),
                    restored.restored,
                    restored.expired,
                    restored.skipped
                );
            }
        }

        link_tiers(&self.origin, &self.mid, Interest::All)?;
        link_tiers(&self.mid, &self.terminal, Interest::All)?;

        let (dashboard, receiver) =
            ChannelSubscriber::new("terminal-dashboard", self.config.routing.subscriber_queue_capacity);
        self.terminal
            .connect_client("", Interest::All, Arc::new(dashboard))
            .await?;

        info!("🔗 Pipeline linked: origin → mid → terminal → dashboard");
        Ok(receiver)
    }

    /// Stops every tier top-down and persists their caches.
    pub async fn shutdown_pipeline(&self) {
        for tier in [&self.origin, &self.mid, &self.terminal] {
            if let Err(e) = tier.shutdown().await {
                error!("❌ {} tier shutdown failed: {}", tier.role(), e);
            }
        }
        self.shutdown_state.complete_shutdown();
    }

    /// Runs until SIGINT/SIGTERM, then shuts down gracefully.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting transit pipeline");
        self.log_configuration_summary();

        let dashboard = self.start_pipeline().await?;
        let dashboard_handle = spawn_dashboard(dashboard);
        let monitoring_handle = self.spawn_monitoring();
        let ingest_handle = self.spawn_ingest();

        info!("✅ Transit pipeline is now running!");
        info!(
            "🔍 Health monitoring active - stats every {} seconds",
            self.config.monitoring.stats_interval_secs
        );
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        setup_signal_handlers(&self.shutdown_state).await?;

        // merciless shutdown
        tokio::spawn(async move {
            if let Err(e) = wait_for_signal().await {
                error!("Failed to set up merciless shutdown signal handler: {e}");
                return;
            }
            warn!("Shutdown handler received again! I'll make this quick.");
            std::process::exit(1);
        });

        info!("📡 Phase 1: Stopping record intake...");
        monitoring_handle.abort();
        if let Some(handle) = ingest_handle {
            match tokio::time::timeout(std::time::Duration::from_secs(5), handle).await {
                Ok(_) => info!("✅ Record source stopped"),
                Err(_) => warn!("⏰ Record source did not stop in time, proceeding"),
            }
        }

        info!("💾 Phase 2: Stopping tiers and persisting caches...");
        self.shutdown_pipeline().await;
        dashboard_handle.abort();

        self.log_final_statistics().await;
        info!("👋 Transit pipeline shutdown complete");
        Ok(())
    }

    /// Replays the configured record file into the origin tier.
    fn spawn_ingest(&self) -> Option<JoinHandle<()>> {
        let Some(path) = self.config.ingest.records_path.clone() else {
            info!("📭 No record file configured - waiting for shutdown");
            return None;
        };
        let origin = self.origin.clone();
        let replay_interval = self.config.replay_interval();

        Some(tokio::spawn(async move {
            let mut source = match JsonLinesRecordSource::open(PathBuf::from(&path), replay_interval).await {
                Ok(source) => source,
                Err(e) => {
                    error!("❌ Cannot open record file {}: {}", path, e);
                    return;
                }
            };
            match origin.run_source(&mut source).await {
                Ok(summary) if source.skipped() > 0 => {
                    warn!("⚠️ {} malformed lines skipped in {}", source.skipped(), path);
                    debug!("Ingest summary: {:?}", summary);
                }
                Ok(summary) => debug!("Ingest summary: {:?}", summary),
                Err(e) => error!("❌ Record source failed: {}", e),
            }
        }))
    }

    /// Periodic health reports, client pruning and analytics publication.
    fn spawn_monitoring(&self) -> JoinHandle<()> {
        let tiers = [self.origin.clone(), self.mid.clone(), self.terminal.clone()];
        let mut monitors: Vec<PipelineMonitor> = tiers.iter().map(|tier| tier.monitor()).collect();
        let mid = self.mid.clone();
        let period = self.config.stats_interval();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;

            loop {
                interval.tick().await;

                for (tier, monitor) in tiers.iter().zip(monitors.iter_mut()) {
                    let pruned = tier.prune_disconnected();
                    if pruned > 0 {
                        info!("🧹 {} tier released {} unreachable clients", tier.role(), pruned);
                    }

                    let report = monitor.generate_report().await;
                    info!(
                        "📊 {} tier - {} events | {} delivered | {} failed | {} zones | cache hit rate {:.1}%",
                        report.tier,
                        report.system.events_observed,
                        report.router.deliveries,
                        report.router.delivery_failures,
                        report.tracked_zones,
                        report.cache.as_ref().map(|c| c.hit_rate() * 100.0).unwrap_or(0.0)
                    );
                    for alert in report.alerts() {
                        warn!("🚨 {} tier: {}", report.tier, alert);
                    }
                }

                let delivery = mid.publish_analytics().await;
                debug!("Analytics snapshot forwarded to {} subscribers", delivery.delivered);
            }
        })
    }

    fn log_configuration_summary(&self) {
        let config = &self.config;
        info!("📋 Configuration Summary:");
        info!(
            "  🗺️ Grid: {}x{} over lat [{}, {}] lon [{}, {}]",
            config.geo.rows,
            config.geo.columns,
            config.geo.min_latitude,
            config.geo.max_latitude,
            config.geo.min_longitude,
            config.geo.max_longitude
        );
        info!(
            "  💾 Cache TTL: {}s | persistence: {}",
            config.cache.ttl_secs,
            if config.cache.enable_persistence { config.cache.snapshot_path.as_str() } else { "off" }
        );
        info!(
            "  📡 Delivery timeout: {}ms | drop after {} failures",
            config.routing.delivery_timeout_ms, config.routing.max_consecutive_failures
        );
        info!(
            "  📥 Records: {} | Stops: {}",
            config.ingest.records_path.as_deref().unwrap_or("none"),
            config.ingest.stops_path.as_deref().unwrap_or("none")
        );
    }

    async fn log_final_statistics(&self) {
        info!("📊 Final Statistics:");
        for tier in [&self.origin, &self.mid, &self.terminal] {
            let system = tier.statistics().global().snapshot();
            let bus = tier.bus().get_stats().await;
            let router = tier.router().stats();
            info!(
                "  - {}: {} events observed, {} published, {} delivered, {} dropped, {} handler failures",
                tier.role(),
                system.events_observed,
                bus.events_published,
                router.deliveries,
                router.events_dropped,
                bus.handler_failures
            );
        }
    }
}

fn apply_overrides(config: &mut AppConfig, args: &CliArgs) {
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
    if let Some(records) = &args.records_path {
        config.ingest.records_path = Some(records.to_string_lossy().to_string());
    }
    if let Some(stops) = &args.stops_path {
        config.ingest.stops_path = Some(stops.to_string_lossy().to_string());
    }
    if let Some(snapshot) = &args.snapshot_path {
        config.cache.snapshot_path = snapshot.to_string_lossy().to_string();
        config.cache.enable_persistence = true;
    }
}

/// Drains the dashboard queue so the terminal tier never sees it full.
fn spawn_dashboard(mut receiver: mpsc::Receiver<BusEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            match event {
                BusEvent::Enriched(event) => debug!(
                    "🖥️ {} ({}) in {} near stop {:?}",
                    event.source_id, event.line_id, event.zone_id, event.nearest_stop_id
                ),
                BusEvent::Analytics(snapshot) => debug!(
                    "🖥️ Analytics from {} tier: {} zones",
                    snapshot.tier,
                    snapshot.zones.len()
                ),
                BusEvent::QueryResult(_) => {}
            }
        }
    })
}
