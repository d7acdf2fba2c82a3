// =============================================================================
// Runtime Configuration — every tunable of the scanner in one place
// =============================================================================
//
// Loaded from a JSON file at startup, then selectively overridden from the
// environment (after `.env` has been read).  All fields carry a serde default
// so a partial or empty file still yields a complete configuration.
//
// SECURITY: the feed credential is never serialised and `Debug` redacts it.
// =============================================================================

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_feed_url() -> String {
    "wss://ws.derivws.com/websockets/v3?app_id=1089".to_string()
}

fn default_symbol() -> String {
    "BOOM1000".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_ping_interval_secs() -> u64 {
    30
}

fn default_pong_timeout_secs() -> u64 {
    10
}

fn default_backoff_cap_secs() -> u64 {
    60
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_scheduled_reconnect_secs() -> u64 {
    15 * 60
}

fn default_scheduled_pause_secs() -> u64 {
    2
}

fn default_tick_send_timeout_secs() -> u64 {
    5
}

fn default_event_buffer() -> usize {
    4096
}

fn default_interval_seconds() -> i64 {
    60
}

fn default_history_capacity() -> usize {
    200
}

fn default_min_candles() -> usize {
    50
}

fn default_true() -> bool {
    true
}

// =============================================================================
// FeedConfig
// =============================================================================

/// Connection parameters for the market-data feed.
#[derive(Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_feed_url")]
    pub url: String,

    /// Authorisation credential. Supplied through `DERIV_API_TOKEN`.
    #[serde(default, skip_serializing)]
    pub api_token: String,

    #[serde(default = "default_symbol")]
    pub symbol: String,

    /// How long `connect()` waits for the `Subscribed` state.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,

    /// A ping without a pong inside this window is a transport error.
    #[serde(default = "default_pong_timeout_secs")]
    pub pong_timeout_secs: u64,

    /// Upper bound of the exponential reconnect delay.
    #[serde(default = "default_backoff_cap_secs")]
    pub backoff_cap_secs: u64,

    /// Consecutive failed attempts tolerated before the failure is fatal.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Proactive reconnect after this long on one session.
    #[serde(default = "default_scheduled_reconnect_secs")]
    pub scheduled_reconnect_secs: u64,

    /// Pause between closing and reopening on a scheduled reconnect.
    #[serde(default = "default_scheduled_pause_secs")]
    pub scheduled_pause_secs: u64,

    /// Capacity of the tick hand-off channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// How long a tick may wait for room in a full hand-off channel before
    /// the session is treated as failed.
    #[serde(default = "default_tick_send_timeout_secs")]
    pub tick_send_timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: default_feed_url(),
            api_token: String::new(),
            symbol: default_symbol(),
            connect_timeout_secs: default_connect_timeout_secs(),
            ping_interval_secs: default_ping_interval_secs(),
            pong_timeout_secs: default_pong_timeout_secs(),
            backoff_cap_secs: default_backoff_cap_secs(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            scheduled_reconnect_secs: default_scheduled_reconnect_secs(),
            scheduled_pause_secs: default_scheduled_pause_secs(),
            event_buffer: default_event_buffer(),
            tick_send_timeout_secs: default_tick_send_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for FeedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedConfig")
            .field("url", &self.url)
            .field("api_token", &"<redacted>")
            .field("symbol", &self.symbol)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("ping_interval_secs", &self.ping_interval_secs)
            .field("pong_timeout_secs", &self.pong_timeout_secs)
            .field("backoff_cap_secs", &self.backoff_cap_secs)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .field("scheduled_reconnect_secs", &self.scheduled_reconnect_secs)
            .field("scheduled_pause_secs", &self.scheduled_pause_secs)
            .field("event_buffer", &self.event_buffer)
            .field("tick_send_timeout_secs", &self.tick_send_timeout_secs)
            .finish()
    }
}

// =============================================================================
// CandleParams
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleParams {
    /// Bucket width in seconds.
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: i64,

    /// Finalized candles retained; oldest evicted first.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// History length required before evaluation runs.
    #[serde(default = "default_min_candles")]
    pub min_candles: usize,
}

impl Default for CandleParams {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            history_capacity: default_history_capacity(),
            min_candles: default_min_candles(),
        }
    }
}

// =============================================================================
// IndicatorParams
// =============================================================================

/// Look-back periods for every indicator in the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorParams {
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub ema_trend: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub rsi: usize,
    pub stoch_k: usize,
    pub stoch_d: usize,
    pub stoch_slow: usize,
    pub atr: usize,
    pub volume_ma: usize,
    pub roc: usize,
    pub adx: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            ema_fast: 8,
            ema_slow: 21,
            ema_trend: 50,
            macd_fast: 8,
            macd_slow: 21,
            macd_signal: 9,
            rsi: 14,
            stoch_k: 10,
            stoch_d: 3,
            stoch_slow: 3,
            atr: 14,
            volume_ma: 20,
            roc: 5,
            adx: 14,
        }
    }
}

impl IndicatorParams {
    fn periods(&self) -> [(&'static str, usize); 14] {
        [
            ("ema_fast", self.ema_fast),
            ("ema_slow", self.ema_slow),
            ("ema_trend", self.ema_trend),
            ("macd_fast", self.macd_fast),
            ("macd_slow", self.macd_slow),
            ("macd_signal", self.macd_signal),
            ("rsi", self.rsi),
            ("stoch_k", self.stoch_k),
            ("stoch_d", self.stoch_d),
            ("stoch_slow", self.stoch_slow),
            ("atr", self.atr),
            ("volume_ma", self.volume_ma),
            ("roc", self.roc),
            ("adx", self.adx),
        ]
    }
}

// =============================================================================
// SignalParams
// =============================================================================

/// Thresholds and rate limits for the signal evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalParams {
    /// Minimum spacing between signals, in candle intervals.
    pub cooldown_intervals: i64,
    /// Same-direction signals allowed in a row.
    pub max_consecutive: u32,
    /// A previous signal older than this many intervals no longer counts
    /// towards the consecutive streak.
    pub streak_gap_intervals: i64,
    /// Open RSI band for BUY; SELL uses the mirrored band.
    pub rsi_lower: f64,
    pub rsi_upper: f64,
    /// %K floor for BUY (ceiling `100 - stoch_min` for SELL).
    pub stoch_min: f64,
    pub adx_min: f64,
    pub min_volume_ratio: f64,
    /// Open-to-close percent move that qualifies as a spike.
    pub min_price_change_pct: f64,
    /// ROC percent that counts as strong momentum.
    pub min_roc_pct: f64,
    pub sl_atr_multiplier: f64,
    pub tp_atr_multiplier: f64,
    #[serde(default = "default_true")]
    pub allow_sell: bool,
}

impl Default for SignalParams {
    fn default() -> Self {
        Self {
            cooldown_intervals: 2,
            max_consecutive: 3,
            streak_gap_intervals: 10,
            rsi_lower: 50.0,
            rsi_upper: 75.0,
            stoch_min: 50.0,
            adx_min: 25.0,
            min_volume_ratio: 1.2,
            min_price_change_pct: 0.5,
            min_roc_pct: 1.0,
            sl_atr_multiplier: 2.5,
            tp_atr_multiplier: 3.5,
            allow_sell: true,
        }
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub candles: CandleParams,
    #[serde(default)]
    pub indicators: IndicatorParams,
    #[serde(default)]
    pub signals: SignalParams,
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// A missing file is an error so the caller can fall back to defaults
    /// with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbol = %config.feed.symbol,
            interval_seconds = config.candles.interval_seconds,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup("DERIV_API_TOKEN") {
            self.feed.api_token = token.trim().to_string();
        }
        if let Some(symbol) = lookup("SPIKE_SYMBOL") {
            let symbol = symbol.trim().to_uppercase();
            if !symbol.is_empty() {
                self.feed.symbol = symbol;
            }
        }
        if let Some(url) = lookup("SPIKE_FEED_URL") {
            self.feed.url = url.trim().to_string();
        }
        if let Some(secs) = lookup("SPIKE_INTERVAL_SECS").and_then(|s| s.trim().parse().ok()) {
            self.candles.interval_seconds = secs;
        }
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.feed.symbol.trim().is_empty() {
            bail!("feed.symbol must not be empty");
        }
        let f = &self.feed;
        if f.event_buffer == 0 {
            bail!("feed.event_buffer must be positive");
        }
        if f.pong_timeout_secs == 0 {
            bail!("feed.pong_timeout_secs must be positive");
        }
        if f.ping_interval_secs == 0 {
            bail!("feed.ping_interval_secs must be positive");
        }
        if f.max_reconnect_attempts == 0 {
            bail!("feed.max_reconnect_attempts must be positive");
        }
        if f.tick_send_timeout_secs == 0 {
            bail!("feed.tick_send_timeout_secs must be positive");
        }
        if self.candles.interval_seconds <= 0 {
            bail!(
                "candles.interval_seconds must be positive, got {}",
                self.candles.interval_seconds
            );
        }
        if self.candles.history_capacity == 0 {
            bail!("candles.history_capacity must be positive");
        }
        if self.candles.min_candles > self.candles.history_capacity {
            bail!(
                "candles.min_candles ({}) exceeds history_capacity ({})",
                self.candles.min_candles,
                self.candles.history_capacity
            );
        }
        for (name, period) in self.indicators.periods() {
            if period == 0 {
                bail!("indicators.{name} must be positive");
            }
        }
        let s = &self.signals;
        if s.rsi_lower >= s.rsi_upper {
            bail!(
                "signals.rsi_lower ({}) must be below rsi_upper ({})",
                s.rsi_lower,
                s.rsi_upper
            );
        }
        if s.max_consecutive == 0 {
            bail!("signals.max_consecutive must be positive");
        }
        if s.cooldown_intervals < 0 {
            bail!(
                "signals.cooldown_intervals must not be negative, got {}",
                s.cooldown_intervals
            );
        }
        if s.streak_gap_intervals < 0 {
            bail!(
                "signals.streak_gap_intervals must not be negative, got {}",
                s.streak_gap_intervals
            );
        }
        Ok(())
    }
}
