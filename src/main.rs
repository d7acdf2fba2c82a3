// =============================================================================
// Spike Scanner — Main Entry Point
// =============================================================================
//
// Wires the feed connection to the single analysis loop and runs until
// Ctrl+C or until the feed gives up reconnecting.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod analysis;
mod app_state;
mod clock;
mod feed;
mod indicators;
mod market_data;
mod runtime_config;
mod signals;
mod types;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::analysis::Analyzer;
use crate::app_state::StatusBoard;
use crate::feed::{ConnectionError, ConnectionHandle, ConnectionManager, TungsteniteConnector};
use crate::runtime_config::RuntimeConfig;
use crate::signals::{ChannelSink, FanoutSink, LogSink, SignalRecord};

/// Capacity of the queue handed to an external notifier.
const NOTIFY_BUFFER: usize = 64;
const HEARTBEAT_SECS: u64 = 60;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Spike Scanner — Starting Up                       ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let config_path =
        std::env::var("SPIKE_CONFIG").unwrap_or_else(|_| "spike_config.json".into());
    let mut config = RuntimeConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });
    config.apply_env();
    config.validate()?;

    if config.feed.api_token.is_empty() {
        warn!("DERIV_API_TOKEN is not set; the feed will reject authorization");
    }
    log_strategy(&config);

    // ── 2. Feed connection ───────────────────────────────────────────────
    let (event_tx, event_rx) = mpsc::channel(config.feed.event_buffer);
    let mut manager = ConnectionManager::new(
        config.feed.clone(),
        Arc::new(TungsteniteConnector),
        clock::system(),
        event_tx,
    );
    let status = Arc::new(StatusBoard::new(manager.handle()));

    // ── 3. Signal sinks ──────────────────────────────────────────────────
    let (notify_tx, notify_rx) = mpsc::channel(NOTIFY_BUFFER);
    let sink = FanoutSink::new()
        .with(LogSink::new(config.feed.symbol.clone()))
        .with(ChannelSink::new(notify_tx));
    let notifier = tokio::spawn(forward_signals(notify_rx));

    // ── 4. Analysis loop ─────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let analyzer = Analyzer::new(&config, Box::new(sink), status.clone());
    let analysis = tokio::spawn(analyzer.run(event_rx, shutdown_rx));

    // ── 5. Connect ───────────────────────────────────────────────────────
    match manager.connect().await {
        Ok(()) => info!(symbol = %config.feed.symbol, "Feed subscribed"),
        Err(e @ ConnectionError::HandshakeTimeout { .. }) => {
            warn!(error = %e, "Feed not ready yet, retrying in the background");
        }
        Err(e) => {
            error!(error = %e, "Feed failed to start");
            shutdown_tx.send_replace(true);
            let _ = analysis.await;
            return Err(e.into());
        }
    }

    // ── 6. Heartbeat ─────────────────────────────────────────────────────
    let heartbeat_status = status.clone();
    let heartbeat = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(HEARTBEAT_SECS));
        interval.tick().await;
        loop {
            interval.tick().await;
            let snap = heartbeat_status.snapshot();
            info!(
                connected = snap.connected,
                state = %snap.connection_state,
                candles = snap.candle_count,
                signals = snap.total_signals,
                last_signal = ?snap.last_signal.as_ref().map(|r| r.direction),
                refresh_in_secs = ?snap.seconds_until_scheduled_reconnect,
                "heartbeat"
            );
        }
    });

    let reload = spawn_reconnect_on_hangup(manager.handle());

    info!("All subsystems running. Press Ctrl+C to stop, SIGHUP to refresh the feed.");

    // ── 7. Graceful shutdown ─────────────────────────────────────────────
    let outcome = tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            warn!("Shutdown signal received — stopping gracefully");
            Ok(())
        }
        res = manager.closed() => {
            if let Err(e) = &res {
                error!(error = %e, "Feed stopped");
            }
            res
        }
    };

    manager.disconnect().await;
    shutdown_tx.send_replace(true);
    heartbeat.abort();
    if let Some(reload) = reload {
        reload.abort();
    }
    if let Err(e) = analysis.await {
        error!(error = %e, "analysis loop panicked");
    }
    let _ = notifier.await;

    let snap = status.snapshot();
    info!(
        candles = snap.candle_count,
        signals = snap.total_signals,
        "Spike Scanner shut down complete."
    );
    outcome.map_err(Into::into)
}

/// SIGHUP forces a fresh feed session without restarting the process.
#[cfg(unix)]
fn spawn_reconnect_on_hangup(handle: ConnectionHandle) -> Option<tokio::task::JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "SIGHUP handler unavailable");
            return None;
        }
    };
    Some(tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            handle.request_reconnect();
        }
    }))
}

#[cfg(not(unix))]
fn spawn_reconnect_on_hangup(_handle: ConnectionHandle) -> Option<tokio::task::JoinHandle<()>> {
    None
}

/// Hand-off point for an external notifier: one JSON line per signal.
async fn forward_signals(mut rx: mpsc::Receiver<SignalRecord>) {
    while let Some(record) = rx.recv().await {
        match serde_json::to_string(&record) {
            Ok(json) => info!(target: "spike_scanner::notify", %json, "signal"),
            Err(e) => warn!(error = %e, "failed to serialise signal"),
        }
    }
}

fn log_strategy(config: &RuntimeConfig) {
    let i = &config.indicators;
    let s = &config.signals;
    info!(
        symbol = %config.feed.symbol,
        interval_secs = config.candles.interval_seconds,
        min_candles = config.candles.min_candles,
        "Feed"
    );
    info!(
        "Trend: EMA {}/{}/{} | MACD {}/{}/{} | ROC {} > {}%",
        i.ema_fast, i.ema_slow, i.ema_trend, i.macd_fast, i.macd_slow, i.macd_signal, i.roc, s.min_roc_pct
    );
    info!(
        "Oscillators: RSI {} in ({}, {}) | Stoch {}/{}/{} > {} | ADX {} > {}",
        i.rsi, s.rsi_lower, s.rsi_upper, i.stoch_k, i.stoch_d, i.stoch_slow, s.stoch_min, i.adx, s.adx_min
    );
    info!(
        "Spike: move > {}% | volume > {}x MA{} | SL {}xATR{} | TP {}xATR",
        s.min_price_change_pct, s.min_volume_ratio, i.volume_ma, s.sl_atr_multiplier, i.atr, s.tp_atr_multiplier
    );
    info!(
        "Limits: cooldown {} candles | max {} in a row | sell side {}",
        s.cooldown_intervals,
        s.max_consecutive,
        if s.allow_sell { "on" } else { "off" }
    );
}
