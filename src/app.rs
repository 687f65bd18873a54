//! Application wiring
//!
//! Builds every component once from [`Config`] and hands out shared
//! handles. Nothing in the crate reaches for a global.

use crate::alert::{AlertManager, EmailOutbox, LogChannel, NotificationChannel, TelegramChannel};
use crate::backtest::{BacktestEngine, BacktestJobs};
use crate::broadcast::{self, BroadcastManager};
use crate::cache::{CacheStore, MemoryStore, ScoreCache};
use crate::cluster::ClusterEngine;
use crate::config::{Config, TelegramConfig};
use crate::fusion::Fusion;
use crate::rank::RankTracker;
use crate::scoring::ScoringEngine;
use crate::service::MomentumService;
use crate::source::{MarketDataClient, MarketDataSource};
use crate::worker::{Orchestrator, Pipeline};
use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Fully wired application
pub struct App {
    pub config: Config,
    pub source: Arc<dyn MarketDataSource>,
    pub cache: ScoreCache,
    pub ranks: Arc<RankTracker>,
    pub alerts: Arc<AlertManager>,
    pub pipeline: Arc<Pipeline>,
    pub orchestrator: Arc<Orchestrator>,
    pub backtests: Arc<BacktestJobs>,
    pub broadcast: Arc<BroadcastManager>,
    pub service: MomentumService,
}

impl App {
    /// Build against the configured market data source
    pub fn build(config: Config) -> anyhow::Result<Self> {
        let client = MarketDataClient::new(config.source.clone())
            .context("Failed to create market data client")?;
        Self::with_source(config, Arc::new(client))
    }

    /// Build against a caller-provided source
    pub fn with_source(config: Config, source: Arc<dyn MarketDataSource>) -> anyhow::Result<Self> {
        let store: Arc<dyn CacheStore> = Arc::new(MemoryStore::new());
        let cache = ScoreCache::new(store, &config.cache);
        let ranks = Arc::new(RankTracker::new(config.ranking.history_hours));

        let fusion = Arc::new(Fusion::new(&config.fusion).context("Failed to create fusion adapters")?);
        let scoring = ScoringEngine::new(config.scoring.clone());
        let clusterer = ClusterEngine::new(config.clustering.clone());

        let channels = notification_channels(&config)?;
        let alerts = Arc::new(AlertManager::new(&config.alerts, channels));

        let pipeline = Arc::new(Pipeline::new(
            Arc::clone(&source),
            fusion,
            scoring,
            cache.clone(),
            Arc::clone(&ranks),
            Arc::clone(&alerts),
            clusterer,
            config.worker.clone(),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&pipeline),
            &config.worker,
            &config.clustering,
        ));

        let engine = Arc::new(BacktestEngine::new(Arc::clone(&source), &config.backtest));
        let backtests = Arc::new(BacktestJobs::new(engine, &config.backtest));
        let broadcast = Arc::new(BroadcastManager::new(cache.clone(), &config.broadcast));

        let service = MomentumService::new(
            cache.clone(),
            Arc::clone(&ranks),
            Arc::clone(&alerts),
            Arc::clone(&backtests),
            Arc::clone(&broadcast),
            &config.ranking,
        );

        tracing::info!(
            source = ?config.source.mode,
            fast_secs = config.worker.fast_interval_secs,
            full_secs = config.worker.full_interval_secs,
            "Application built"
        );

        Ok(Self {
            config,
            source,
            cache,
            ranks,
            alerts,
            pipeline,
            orchestrator,
            backtests,
            broadcast,
            service,
        })
    }

    /// Start the cycles, the broadcast loops and the WebSocket server
    pub async fn start(&self, shutdown: watch::Receiver<bool>) -> anyhow::Result<Vec<JoinHandle<()>>> {
        let listener = TcpListener::bind(&self.config.broadcast.bind_addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.config.broadcast.bind_addr))?;

        let mut handles = Arc::clone(&self.orchestrator).spawn(shutdown.clone());
        handles.push(Arc::clone(&self.broadcast).spawn(shutdown.clone()));
        handles.push(tokio::spawn(broadcast::server::serve(
            listener,
            Arc::clone(&self.broadcast),
            shutdown,
        )));
        Ok(handles)
    }
}

/// Telegram when credentials exist, the email outbox, and the log sink
fn notification_channels(config: &Config) -> anyhow::Result<Vec<Arc<dyn NotificationChannel>>> {
    let mut channels: Vec<Arc<dyn NotificationChannel>> = Vec::new();

    match config.alerts.telegram.clone().or_else(TelegramConfig::from_env) {
        Some(telegram) => {
            let channel = TelegramChannel::new(telegram).context("Failed to create Telegram channel")?;
            channels.push(Arc::new(channel));
        }
        None => tracing::info!("Telegram alerts disabled: no bot token configured"),
    }

    let outbox = EmailOutbox::new(config.alerts.email.clone()).context("Failed to create email outbox")?;
    channels.push(Arc::new(outbox));
    channels.push(Arc::new(LogChannel));
    Ok(channels)
}
