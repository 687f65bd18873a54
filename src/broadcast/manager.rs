//! Subscription registry and score-change fan-out

use super::connection::Connection;
use super::types::{
    coin_channel, parse_channel, BroadcastError, ConnectionId, ScoreUpdate, ServerMessage,
    TOP_N_CHANNEL,
};
use crate::cache::{CacheError, ScoreCache};
use crate::config::BroadcastConfig;
use crate::telemetry::{self, CounterMetric, GaugeMetric, LatencyMetric};
use chrono::Utc;
use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

struct Subscriber {
    connection: Arc<dyn Connection>,
    channels: HashSet<String>,
}

/// Outcome of one broadcast tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Entries whose score moved past the epsilon
    pub changed: usize,
    /// Frames delivered
    pub delivered: usize,
    /// Connections removed after a failed send
    pub dropped: usize,
}

/// Pushes ranking changes to subscribed connections
pub struct BroadcastManager {
    cache: ScoreCache,
    subscribers: RwLock<HashMap<ConnectionId, Subscriber>>,
    last_scores: Mutex<HashMap<String, f64>>,
    top_n: usize,
    epsilon: f64,
    send_timeout: Duration,
    tick_interval: Duration,
    heartbeat_interval: Duration,
}

impl BroadcastManager {
    pub fn new(cache: ScoreCache, config: &BroadcastConfig) -> Self {
        Self {
            cache,
            subscribers: RwLock::new(HashMap::new()),
            last_scores: Mutex::new(HashMap::new()),
            top_n: config.top_n,
            epsilon: config.epsilon,
            send_timeout: Duration::from_millis(config.send_timeout_ms.max(1)),
            tick_interval: Duration::from_millis(config.tick_ms.max(1)),
            heartbeat_interval: Duration::from_secs(config.heartbeat_secs.max(1)),
        }
    }

    /// Add a connection; it starts subscribed to the top-N channel
    pub fn register(&self, connection: Arc<dyn Connection>) -> ConnectionId {
        let id = Uuid::new_v4();
        let channels = HashSet::from([TOP_N_CHANNEL.to_string()]);
        let count = {
            let mut subscribers = self.subscribers.write();
            subscribers.insert(
                id,
                Subscriber {
                    connection,
                    channels,
                },
            );
            subscribers.len()
        };

        telemetry::set_gauge(GaugeMetric::Connections, count as f64);
        tracing::info!(connection = %id, connections = count, "Client connected");
        id
    }

    /// Drop a connection from every channel; false if it was unknown
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let (removed, count) = {
            let mut subscribers = self.subscribers.write();
            let removed = subscribers.remove(&id).is_some();
            (removed, subscribers.len())
        };

        if removed {
            telemetry::set_gauge(GaugeMetric::Connections, count as f64);
            tracing::info!(connection = %id, connections = count, "Client disconnected");
        }
        removed
    }

    /// Subscribe to a channel, returning its canonical name
    pub fn subscribe(&self, id: ConnectionId, channel: &str) -> Result<String, BroadcastError> {
        let channel =
            parse_channel(channel).ok_or_else(|| BroadcastError::InvalidChannel(channel.to_string()))?;
        let mut subscribers = self.subscribers.write();
        let subscriber = subscribers
            .get_mut(&id)
            .ok_or(BroadcastError::UnknownConnection(id))?;
        subscriber.channels.insert(channel.clone());
        tracing::debug!(connection = %id, channel = %channel, "Subscribed");
        Ok(channel)
    }

    /// Leave a channel, returning its canonical name
    pub fn unsubscribe(&self, id: ConnectionId, channel: &str) -> Result<String, BroadcastError> {
        let channel =
            parse_channel(channel).ok_or_else(|| BroadcastError::InvalidChannel(channel.to_string()))?;
        let mut subscribers = self.subscribers.write();
        let subscriber = subscribers
            .get_mut(&id)
            .ok_or(BroadcastError::UnknownConnection(id))?;
        subscriber.channels.remove(&channel);
        Ok(channel)
    }

    /// Channels a connection listens on, sorted
    pub fn subscriptions(&self, id: ConnectionId) -> Vec<String> {
        let mut channels: Vec<String> = self
            .subscribers
            .read()
            .get(&id)
            .map(|s| s.channels.iter().cloned().collect())
            .unwrap_or_default();
        channels.sort();
        channels
    }

    pub fn connection_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Send one message to one connection, dropping it on failure
    pub async fn send_to(
        &self,
        id: ConnectionId,
        message: &ServerMessage,
    ) -> Result<(), BroadcastError> {
        let connection = self
            .subscribers
            .read()
            .get(&id)
            .map(|s| Arc::clone(&s.connection))
            .ok_or(BroadcastError::UnknownConnection(id))?;
        let text = message.to_json()?;

        match self.send_with_timeout(connection.as_ref(), &text).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.drop_connections(&[id]);
                Err(e)
            }
        }
    }

    /// Diff the cached top-N against the last push and send what moved
    pub async fn tick(&self) -> Result<TickReport, CacheError> {
        let started = Instant::now();
        let top = self.cache.top(self.top_n).await?;

        let changes: Vec<ScoreUpdate> = {
            let mut last = self.last_scores.lock();
            let changes: Vec<ScoreUpdate> = top
                .iter()
                .enumerate()
                .filter_map(|(index, result)| {
                    let previous = last.get(&result.asset_id).copied();
                    let delta = previous.map(|p| result.score - p);
                    if matches!(delta, Some(d) if d.abs() <= self.epsilon) {
                        return None;
                    }
                    Some(ScoreUpdate {
                        asset_id: result.asset_id.clone(),
                        symbol: result.symbol.clone(),
                        rank: index + 1,
                        score: result.score,
                        confidence: result.confidence,
                        delta,
                    })
                })
                .collect();

            // Unchanged entries keep their old baseline so slow drift still
            // crosses the epsilon eventually
            let mut next: HashMap<String, f64> = top
                .iter()
                .map(|r| (r.asset_id.clone(), last.get(&r.asset_id).copied().unwrap_or(r.score)))
                .collect();
            for update in &changes {
                next.insert(update.asset_id.clone(), update.score);
            }
            *last = next;
            changes
        };

        if changes.is_empty() {
            telemetry::record_latency(LatencyMetric::BroadcastTick, started.elapsed());
            return Ok(TickReport::default());
        }

        let outbox = self.build_outbox(&changes);
        let (delivered, failed) = self.deliver(outbox).await;
        self.drop_connections(&failed);

        telemetry::increment_by(CounterMetric::BroadcastMessages, delivered as u64);
        telemetry::record_latency(LatencyMetric::BroadcastTick, started.elapsed());
        tracing::debug!(
            changed = changes.len(),
            delivered,
            dropped = failed.len(),
            "Broadcast tick"
        );

        Ok(TickReport {
            changed: changes.len(),
            delivered,
            dropped: failed.len(),
        })
    }

    /// Send a heartbeat to every connection; returns how many got it
    pub async fn heartbeat(&self) -> usize {
        let text = match (ServerMessage::Heartbeat { timestamp: Utc::now() }).to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode heartbeat");
                return 0;
            }
        };

        let outbox: Vec<(ConnectionId, Arc<dyn Connection>, String)> = self
            .subscribers
            .read()
            .iter()
            .map(|(id, s)| (*id, Arc::clone(&s.connection), text.clone()))
            .collect();

        let (delivered, failed) = self.deliver(outbox).await;
        self.drop_connections(&failed);
        delivered
    }

    /// Run the tick and heartbeat loops until `shutdown` fires
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(self.tick_interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut heartbeat = tokio::time::interval(self.heartbeat_interval);
            heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        if let Err(e) = self.tick().await {
                            tracing::warn!(error = %e, "Broadcast tick failed");
                        }
                    }
                    _ = heartbeat.tick() => {
                        self.heartbeat().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            tracing::info!("Broadcast loop stopped");
                            return;
                        }
                    }
                }
            }
        })
    }

    /// Frames per connection: the batch for top-N listeners, one entry per
    /// coin channel
    fn build_outbox(&self, changes: &[ScoreUpdate]) -> Vec<(ConnectionId, Arc<dyn Connection>, String)> {
        let timestamp = Utc::now();
        let encode = |channel: String, data: Vec<ScoreUpdate>| {
            ServerMessage::Update {
                channel,
                data,
                timestamp,
            }
            .to_json()
        };

        let top_frame = encode(TOP_N_CHANNEL.to_string(), changes.to_vec());
        let coin_frames: HashMap<String, Result<String, BroadcastError>> = changes
            .iter()
            .map(|u| {
                let channel = coin_channel(&u.symbol);
                (channel.clone(), encode(channel, vec![u.clone()]))
            })
            .collect();

        let subscribers = self.subscribers.read();
        let mut outbox = Vec::new();
        for (id, subscriber) in subscribers.iter() {
            for channel in &subscriber.channels {
                let frame = if channel == TOP_N_CHANNEL {
                    Some(&top_frame)
                } else {
                    coin_frames.get(channel)
                };
                match frame {
                    Some(Ok(text)) => {
                        outbox.push((*id, Arc::clone(&subscriber.connection), text.clone()))
                    }
                    Some(Err(e)) => tracing::error!(error = %e, "Failed to encode update"),
                    None => {}
                }
            }
        }
        outbox
    }

    /// Send every frame concurrently; returns (delivered, failed connections)
    async fn deliver(
        &self,
        outbox: Vec<(ConnectionId, Arc<dyn Connection>, String)>,
    ) -> (usize, Vec<ConnectionId>) {
        let sends = outbox.iter().map(|(id, connection, text)| async move {
            (*id, self.send_with_timeout(connection.as_ref(), text).await)
        });

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (id, outcome) in join_all(sends).await {
            match outcome {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(connection = %id, error = %e, "Broadcast send failed");
                    if !failed.contains(&id) {
                        failed.push(id);
                    }
                }
            }
        }
        (delivered, failed)
    }

    async fn send_with_timeout(
        &self,
        connection: &dyn Connection,
        text: &str,
    ) -> Result<(), BroadcastError> {
        match tokio::time::timeout(self.send_timeout, connection.send(text)).await {
            Ok(result) => result,
            Err(_) => Err(BroadcastError::Timeout(self.send_timeout)),
        }
    }

    fn drop_connections(&self, ids: &[ConnectionId]) {
        if ids.is_empty() {
            return;
        }
        let count = {
            let mut subscribers = self.subscribers.write();
            let before = subscribers.len();
            subscribers.retain(|id, _| !ids.contains(id));
            telemetry::increment_by(
                CounterMetric::DroppedConnections,
                (before - subscribers.len()) as u64,
            );
            subscribers.len()
        };
        telemetry::set_gauge(GaugeMetric::Connections, count as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::ChannelConnection;
    use crate::cache::MemoryStore;
    use crate::config::CacheConfig;
    use crate::features::FeatureVector;
    use crate::scoring::{ScoredResult, ScoringEngine};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use tokio::sync::mpsc;

    struct StuckConnection;

    #[async_trait]
    impl Connection for StuckConnection {
        async fn send(&self, _text: &str) -> Result<(), BroadcastError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn result(id: &str, symbol: &str, score: f64) -> ScoredResult {
        let engine = ScoringEngine::new(Default::default());
        let vector = FeatureVector::neutral(id, symbol, dec!(1), dec!(1000000));
        let mut result = engine.score(&vector).unwrap();
        result.score = score;
        result
    }

    fn setup() -> (BroadcastManager, ScoreCache) {
        let cache = ScoreCache::new(Arc::new(MemoryStore::new()), &CacheConfig::default());
        let config = BroadcastConfig {
            top_n: 10,
            epsilon: 0.5,
            send_timeout_ms: 50,
            ..Default::default()
        };
        (BroadcastManager::new(cache.clone(), &config), cache)
    }

    fn connect(manager: &BroadcastManager) -> (ConnectionId, mpsc::Receiver<String>) {
        let (connection, rx) = ChannelConnection::new(16);
        (manager.register(Arc::new(connection)), rx)
    }

    fn parse(frame: &str) -> ServerMessage {
        serde_json::from_str(frame).unwrap()
    }

    #[tokio::test]
    async fn test_register_defaults_to_top_n() {
        let (manager, _) = setup();
        let (id, _rx) = connect(&manager);
        assert_eq!(manager.subscriptions(id), vec!["top-n"]);
        assert_eq!(manager.connection_count(), 1);

        assert_eq!(manager.subscribe(id, "coin:btc").unwrap(), "coin:BTC");
        assert!(matches!(
            manager.subscribe(id, "weather"),
            Err(BroadcastError::InvalidChannel(_))
        ));
        assert!(matches!(
            manager.subscribe(Uuid::new_v4(), "top-n"),
            Err(BroadcastError::UnknownConnection(_))
        ));

        manager.unsubscribe(id, "top-n").unwrap();
        assert_eq!(manager.subscriptions(id), vec!["coin:BTC"]);
        assert!(manager.unregister(id));
        assert!(!manager.unregister(id));
    }

    #[tokio::test]
    async fn test_tick_pushes_only_moved_scores() {
        let (manager, cache) = setup();
        let (_id, mut rx) = connect(&manager);

        cache
            .set_scored_results(&[result("bitcoin", "BTC", 80.0), result("ethereum", "ETH", 60.0)])
            .await
            .unwrap();
        let first = manager.tick().await.unwrap();
        assert_eq!(first.changed, 2);
        match parse(&rx.recv().await.unwrap()) {
            ServerMessage::Update { channel, data, .. } => {
                assert_eq!(channel, "top-n");
                assert_eq!(data[0].symbol, "BTC");
                assert_eq!(data[0].rank, 1);
                assert!(data[0].delta.is_none());
            }
            other => panic!("unexpected frame {:?}", other),
        }

        cache
            .set_scored_result(&result("ethereum", "ETH", 60.3))
            .await
            .unwrap();
        assert_eq!(manager.tick().await.unwrap(), TickReport::default());

        cache
            .set_scored_result(&result("ethereum", "ETH", 65.0))
            .await
            .unwrap();
        let third = manager.tick().await.unwrap();
        assert_eq!(third.changed, 1);
        match parse(&rx.recv().await.unwrap()) {
            ServerMessage::Update { data, .. } => {
                assert_eq!(data.len(), 1);
                assert_eq!(data[0].asset_id, "ethereum");
                assert!((data[0].delta.unwrap() - 5.0).abs() < 1e-9);
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_coin_channel_gets_its_own_entry() {
        let (manager, cache) = setup();
        let (id, mut rx) = connect(&manager);
        manager.unsubscribe(id, "top-n").unwrap();
        manager.subscribe(id, "coin:ETH").unwrap();

        cache
            .set_scored_results(&[result("bitcoin", "BTC", 80.0), result("ethereum", "ETH", 60.0)])
            .await
            .unwrap();
        let report = manager.tick().await.unwrap();
        assert_eq!(report.delivered, 1);

        match parse(&rx.recv().await.unwrap()) {
            ServerMessage::Update { channel, data, .. } => {
                assert_eq!(channel, "coin:ETH");
                assert_eq!(data.len(), 1);
                assert_eq!(data[0].rank, 2);
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_and_slow_connections_are_removed() {
        let (manager, cache) = setup();
        let (_live, mut rx) = connect(&manager);
        let (closed, closed_rx) = connect(&manager);
        drop(closed_rx);
        let stuck = manager.register(Arc::new(StuckConnection));
        manager.subscribe(stuck, "coin:BTC").unwrap();

        cache
            .set_scored_results(&[result("bitcoin", "BTC", 80.0)])
            .await
            .unwrap();
        let report = manager.tick().await.unwrap();

        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, 2);
        assert_eq!(manager.connection_count(), 1);
        assert!(manager.subscriptions(closed).is_empty());
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_heartbeat_reaches_everyone() {
        let (manager, _) = setup();
        let (_a, mut rx_a) = connect(&manager);
        let (_b, mut rx_b) = connect(&manager);

        assert_eq!(manager.heartbeat().await, 2);
        assert!(matches!(
            parse(&rx_a.recv().await.unwrap()),
            ServerMessage::Heartbeat { .. }
        ));
        assert!(matches!(
            parse(&rx_b.recv().await.unwrap()),
            ServerMessage::Heartbeat { .. }
        ));
    }

    #[tokio::test]
    async fn test_empty_cache_sends_nothing() {
        let (manager, _) = setup();
        let (_id, mut rx) = connect(&manager);
        assert_eq!(manager.tick().await.unwrap(), TickReport::default());
        assert!(rx.try_recv().is_err());
    }
}
