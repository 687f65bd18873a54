//! Configuration types for momentum-radar

use crate::retry::RetryPolicy;
use crate::scoring::{FeatureBounds, Weights};
use crate::telemetry::LogFormat;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure
///
/// Every section has defaults, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub fusion: FusionConfig,
    pub scoring: ScoringConfig,
    pub cache: CacheConfig,
    pub ranking: RankingConfig,
    pub clustering: ClusteringConfig,
    pub alerts: AlertConfig,
    pub backtest: BacktestConfig,
    pub worker: WorkerConfig,
    pub broadcast: BroadcastConfig,
    pub telemetry: TelemetryConfig,
}

/// Market data source mode
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Real HTTP requests against the configured provider
    Live,
    /// Deterministic hash-derived data, no network access
    #[default]
    Synthetic,
}

/// Market data source configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceConfig {
    pub mode: SourceMode,
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub vs_currency: String,
    /// Self-imposed request ceiling per rolling minute
    pub requests_per_minute: u32,
    /// Attempts per request before giving up with `SourceUnavailable`
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub timeout_secs: u64,
    /// Number of assets the synthetic universe exposes
    pub synthetic_universe_size: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            mode: SourceMode::Synthetic,
            base_url: "https://api.coingecko.com/api/v3".to_string(),
            api_key: None,
            vs_currency: "usd".to_string(),
            requests_per_minute: 30,
            max_attempts: 5,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
            timeout_secs: 10,
            synthetic_universe_size: 120,
        }
    }
}

impl SourceConfig {
    /// Retry policy for rate-limited requests
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .max_attempts(self.max_attempts)
            .initial_delay(Duration::from_millis(self.initial_backoff_ms))
            .max_delay(Duration::from_millis(self.max_backoff_ms))
    }

    /// Per-request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Whether a fusion adapter talks to its live endpoint
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AdapterMode {
    #[default]
    Mock,
    Live,
}

/// Configuration for a single fusion adapter
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdapterConfig {
    pub mode: AdapterMode,
    /// Overrides the adapter's built-in endpoint
    pub base_url: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_ms: u64,
    pub max_attempts: u32,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            mode: AdapterMode::Mock,
            base_url: None,
            api_key: None,
            timeout_ms: 3_000,
            max_attempts: 2,
        }
    }
}

impl AdapterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .max_attempts(self.max_attempts)
            .initial_delay(Duration::from_millis(250))
            .max_delay(Duration::from_secs(2))
    }
}

/// Auxiliary signal adapters
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FusionConfig {
    pub whale: AdapterConfig,
    pub trend: AdapterConfig,
    pub liquidity: AdapterConfig,
}

/// Composite scoring configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: Weights,
    pub bounds: FeatureBounds,
    pub min_score: f64,
    pub max_score: f64,
    /// Confidence lost per feature that fell back to a neutral default
    pub missing_feature_penalty: f64,
    /// Fused liquidity score below which confidence is penalized
    pub low_liquidity_threshold: f64,
    pub low_liquidity_penalty: f64,
    /// Fewer venues than this raises `LowVenueConfirmation`
    pub min_venues: u32,
    /// Sparkline coefficient of variation that raises `HighVolatility`
    pub high_volatility_cv: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: Weights::default(),
            bounds: FeatureBounds::default(),
            min_score: 0.0,
            max_score: 100.0,
            missing_feature_penalty: 10.0,
            low_liquidity_threshold: 0.3,
            low_liquidity_penalty: 15.0,
            min_venues: 2,
            high_volatility_cv: 0.08,
        }
    }
}

/// Cache/rank store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub key_prefix: String,
    pub result_ttl_secs: u64,
    pub cluster_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: "momentum".to_string(),
            result_ttl_secs: 1_800,
            cluster_ttl_secs: 7_200,
        }
    }
}

/// Rank history configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RankingConfig {
    pub history_hours: i64,
    pub default_window_minutes: i64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            history_hours: 24,
            default_window_minutes: 60,
        }
    }
}

/// Clustering configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClusteringConfig {
    pub clusters: usize,
    /// Pinned so assignments are reproducible across runs
    pub seed: u64,
    pub max_iterations: usize,
    pub interval_secs: u64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            clusters: 5,
            seed: 42,
            max_iterations: 100,
            interval_secs: 3_600,
        }
    }
}

/// Telegram bot credentials
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelegramConfig {
    #[serde(skip_serializing)]
    pub bot_token: String,
    /// Chat used when a rule's contact is not itself a chat id
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default = "default_telegram_api")]
    pub api_url: String,
}

fn default_telegram_api() -> String {
    "https://api.telegram.org".to_string()
}

impl TelegramConfig {
    /// Read credentials from `TELEGRAM_BOT_TOKEN` and `TELEGRAM_CHAT_ID`
    pub fn from_env() -> Option<Self> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN").ok()?;
        Some(Self {
            bot_token,
            chat_id: std::env::var("TELEGRAM_CHAT_ID").ok(),
            api_url: default_telegram_api(),
        })
    }
}

/// Store-and-forward email configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EmailConfig {
    /// HTTP relay that accepts queued messages; messages stay queued without one
    pub relay_url: Option<String>,
    pub from: String,
    pub max_queue: usize,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            relay_url: None,
            from: "alerts@momentum-radar.local".to_string(),
            max_queue: 1_000,
        }
    }
}

/// Alerting configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Minimum time between two firings of the same rule
    pub rate_limit_secs: i64,
    pub dispatch_timeout_secs: u64,
    pub telegram: Option<TelegramConfig>,
    pub email: EmailConfig,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            rate_limit_secs: 3_600,
            dispatch_timeout_secs: 10,
            telegram: None,
            email: EmailConfig::default(),
        }
    }
}

/// Backtest configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub max_runtime_secs: u64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    /// Samples required before the proxy score leaves neutral
    pub lookback: usize,
    /// Score points per percent of lookback return
    pub score_scale: f64,
    /// Assets in the portfolio-level simulation
    pub portfolio_size: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            max_runtime_secs: 120,
            stop_loss_pct: 0.10,
            take_profit_pct: 0.20,
            lookback: 24,
            score_scale: 2.5,
            portfolio_size: 10,
        }
    }
}

/// Worker orchestration configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub fast_interval_secs: u64,
    pub fast_top_n: u32,
    pub full_interval_secs: u64,
    pub page_size: u32,
    pub max_pages: u32,
    pub page_pause_ms: u64,
    /// Assets per batch that get a cross-venue lookup
    pub venue_lookup_limit: usize,
    pub with_history: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            fast_interval_secs: 30,
            fast_top_n: 50,
            full_interval_secs: 300,
            page_size: 100,
            max_pages: 10,
            page_pause_ms: 1_500,
            venue_lookup_limit: 25,
            with_history: true,
        }
    }
}

/// Broadcast configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BroadcastConfig {
    pub bind_addr: String,
    pub top_n: usize,
    pub tick_ms: u64,
    pub heartbeat_secs: u64,
    /// Score moves at or below this are not pushed
    pub epsilon: f64,
    pub send_timeout_ms: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8765".to_string(),
            top_n: 50,
            tick_ms: 5_000,
            heartbeat_secs: 30,
            epsilon: 0.01,
            send_timeout_ms: 2_000,
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// 0 disables the Prometheus exporter
    pub metrics_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            metrics_port: 9100,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.source.mode, SourceMode::Synthetic);
        assert_eq!(config.worker.fast_interval_secs, 30);
        assert_eq!(config.worker.full_interval_secs, 300);
        assert_eq!(config.clustering.interval_secs, 3_600);
        assert_eq!(config.ranking.history_hours, 24);
        assert_eq!(config.scoring.missing_feature_penalty, 10.0);
    }

    #[test]
    fn test_config_deserialize() {
        let toml = r#"
            [source]
            mode = "live"
            requests_per_minute = 10
            api_key = "demo"

            [fusion.whale]
            mode = "live"
            timeout_ms = 500

            [scoring.weights]
            price_momentum = 0.5

            [alerts.telegram]
            bot_token = "123:abc"

            [telemetry]
            metrics_port = 0
            log_level = "debug"
            log_format = "json"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.source.mode, SourceMode::Live);
        assert_eq!(config.source.requests_per_minute, 10);
        assert_eq!(config.source.api_key.as_deref(), Some("demo"));
        // Unspecified fields keep defaults
        assert_eq!(config.source.max_attempts, 5);
        assert_eq!(config.fusion.whale.mode, AdapterMode::Live);
        assert_eq!(config.fusion.whale.timeout(), Duration::from_millis(500));
        assert_eq!(config.fusion.trend.mode, AdapterMode::Mock);
        assert_eq!(config.scoring.weights.price_momentum, 0.5);
        let telegram = config.alerts.telegram.unwrap();
        assert_eq!(telegram.api_url, "https://api.telegram.org");
        assert_eq!(config.telemetry.log_format, LogFormat::Json);
    }

    #[test]
    fn test_retry_policy_from_source_config() {
        let config = SourceConfig {
            max_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 1_000,
            ..Default::default()
        };
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay, Duration::from_millis(200));
        assert_eq!(policy.max_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_config_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[worker]\nfast_top_n = 5\n").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.worker.fast_top_n, 5);
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/config.toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_mode_rejected() {
        let result: Result<Config, _> = toml::from_str("[source]\nmode = \"paper\"\n");
        assert!(result.is_err());
    }
}
