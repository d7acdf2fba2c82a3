// =============================================================================
// Shared types used across the spike scanner
// =============================================================================

use serde::{Deserialize, Serialize};

/// One timestamped price observation from the feed.
///
/// Ticks are ephemeral: the aggregator folds them into the active bucket and
/// drops them immediately.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub price: f64,
    pub epoch_seconds: i64,
}

impl Tick {
    pub fn new(price: f64, epoch_seconds: i64) -> Self {
        Self {
            price,
            epoch_seconds,
        }
    }
}

/// Lifecycle state of the feed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Subscribed,
    Reconnecting,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Disconnected
    }
}

impl ConnectionState {
    /// Only a subscribed session delivers ticks.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Subscribed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Authenticating => write!(f, "Authenticating"),
            Self::Subscribed => write!(f, "Subscribed"),
            Self::Reconnecting => write!(f, "Reconnecting"),
        }
    }
}

/// Direction of an emitted signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalDirection {
    Buy,
    Sell,
}

impl std::fmt::Display for SignalDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_serialises_uppercase() {
        let json = serde_json::to_string(&SignalDirection::Buy).unwrap();
        assert_eq!(json, "\"BUY\"");
        let back: SignalDirection = serde_json::from_str("\"SELL\"").unwrap();
        assert_eq!(back, SignalDirection::Sell);
    }

    #[test]
    fn only_subscribed_is_live() {
        assert!(ConnectionState::Subscribed.is_live());
        assert!(!ConnectionState::Authenticating.is_live());
        assert!(!ConnectionState::default().is_live());
    }
}
