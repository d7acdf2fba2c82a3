// =============================================================================
// Feed wire protocol — JSON text frames
// =============================================================================
//
// Outbound:
//   { "authorize": "<token>" }
//   { "ticks": "<symbol>", "subscribe": 1 }
//
// Inbound frames are dispatched on their top-level key, `error` first:
//   { "error": { "code": "...", "message": "..." }, "msg_type": "authorize" }
//   { "authorize": { "loginid": "..." }, "msg_type": "authorize" }
//   { "tick": { "quote": 1234.56, "epoch": 1700000000, "symbol": "R_100" } }
// =============================================================================

use anyhow::{Context, Result};
use serde_json::json;

use crate::types::Tick;

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    /// Credential accepted.
    Authorized { login_id: Option<String> },
    Tick(Tick),
    /// Error envelope reported by the feed.
    Error {
        code: Option<String>,
        message: String,
        msg_type: Option<String>,
    },
    /// Anything else (echoes, subscription acks without a tick, ...).
    Other { msg_type: Option<String> },
}

impl FeedMessage {
    /// Whether an error envelope answers the authorize request.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::Error { msg_type: Some(t), .. } if t == "authorize")
    }
}

pub fn authorize_request(token: &str) -> String {
    json!({ "authorize": token }).to_string()
}

pub fn subscribe_request(symbol: &str) -> String {
    json!({ "ticks": symbol, "subscribe": 1 }).to_string()
}

/// Parse a JSON numeric that may be encoded as a string or a number.
fn parse_string_f64(val: &serde_json::Value, name: &str) -> Result<f64> {
    match val {
        serde_json::Value::String(s) => s
            .parse::<f64>()
            .with_context(|| format!("failed to parse {name} as f64: {s}")),
        serde_json::Value::Number(n) => n
            .as_f64()
            .with_context(|| format!("field {name} is not a valid f64")),
        _ => anyhow::bail!("field {name} has unexpected JSON type"),
    }
}

fn parse_epoch(val: &serde_json::Value) -> Result<i64> {
    match val {
        serde_json::Value::String(s) => s
            .parse::<i64>()
            .with_context(|| format!("failed to parse tick.epoch as i64: {s}")),
        _ => val.as_i64().context("missing field tick.epoch"),
    }
}

/// Decode one inbound text frame.
pub fn parse_message(text: &str) -> Result<FeedMessage> {
    let root: serde_json::Value =
        serde_json::from_str(text).context("failed to parse feed JSON")?;

    let msg_type = root["msg_type"].as_str().map(str::to_string);

    if let Some(err) = root.get("error") {
        let message = err["message"]
            .as_str()
            .unwrap_or("unknown error")
            .to_string();
        return Ok(FeedMessage::Error {
            code: err["code"].as_str().map(str::to_string),
            message,
            msg_type,
        });
    }

    if let Some(auth) = root.get("authorize") {
        return Ok(FeedMessage::Authorized {
            login_id: auth["loginid"].as_str().map(str::to_string),
        });
    }

    if let Some(tick) = root.get("tick") {
        let price = parse_string_f64(&tick["quote"], "tick.quote")?;
        let epoch = parse_epoch(&tick["epoch"])?;
        return Ok(FeedMessage::Tick(Tick::new(price, epoch)));
    }

    Ok(FeedMessage::Other { msg_type })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
