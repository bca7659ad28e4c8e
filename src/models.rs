//! Shared data structures used throughout the application.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// A streaming JSON-RPC endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: String,
    /// 0 is the primary; larger numbers are tried later.
    pub priority: u32,
    /// Bound on connecting and on waiting for the subscription ack.
    pub timeout: Duration,
}

impl Endpoint {
    pub fn new(url: impl Into<String>, priority: u32, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            priority,
            timeout,
        }
    }
}

/// Lifecycle of the mempool subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Subscribing,
    Active,
    Reconnecting,
    /// Only reachable under an explicit give-up policy, which the default
    /// supervisor never configures.
    FailedPermanently,
}

impl ConnectionState {
    /// Whether `self -> next` is an edge of the supervisor state machine.
    /// `Disconnected` is reachable from everywhere through `stop()`.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (_, Disconnected)
                | (Disconnected, Connecting)
                | (Connecting, Subscribing)
                | (Subscribing, Active)
                | (Active, Active)
                | (Connecting | Subscribing | Active, Reconnecting)
                | (Reconnecting, Connecting)
                | (Reconnecting, FailedPermanently)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Subscribing => "subscribing",
            ConnectionState::Active => "active",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::FailedPermanently => "failed",
        };
        f.write_str(s)
    }
}

/// An acknowledged `eth_subscribe` on the current connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: String,
    pub method: String,
    pub params: Vec<String>,
}

/// Pending transaction as seen by the classifier.
///
/// Every field but `hash` may be missing when the detail lookup failed or was
/// not configured; the classifier degrades instead of erroring.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionRecord {
    pub hash: Option<String>,
    pub from: Option<String>,
    /// Lower-cased recipient address.
    pub to: Option<String>,
    pub input_data: Option<String>,
    /// `0x`-prefixed wei amount as reported by the node.
    pub raw_value: Option<String>,
    /// Decoded value in ETH; `None` when absent or not decodable.
    pub eth_value: Option<f64>,
}

impl TransactionRecord {
    /// Record for a notification whose details were never fetched.
    pub fn from_hash(hash: impl Into<String>) -> Self {
        Self {
            hash: Some(hash.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Strict `>` on both boundaries: 0.05 is MEDIUM, 0.01 is LOW.
    pub fn from_profit(profit_eth: f64) -> Self {
        if profit_eth > 0.05 {
            RiskLevel::High
        } else if profit_eth > 0.01 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        };
        f.write_str(s)
    }
}

/// Result of classifying one pending transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    pub tx_hash: Option<String>,
    pub risk_level: RiskLevel,
    pub estimated_profit_eth: f64,
    pub slippage_percent: f64,
    pub reason: String,
    pub factors: Vec<String>,
    pub is_dex_swap: bool,
    #[serde(with = "duration_micros")]
    pub analysis_duration: Duration,
}

mod duration_micros {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_micros() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    #[test]
    fn profit_boundaries_are_strict() {
        assert_eq!(RiskLevel::from_profit(0.05), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_profit(0.0501), RiskLevel::High);
        assert_eq!(RiskLevel::from_profit(0.01), RiskLevel::Low);
        assert_eq!(RiskLevel::from_profit(0.0101), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_profit(0.0), RiskLevel::Low);
    }

    #[test]
    fn risk_levels_are_totally_ordered() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
    }

    #[test]
    fn state_machine_edges() {
        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Subscribing));
        assert!(Subscribing.can_transition_to(Active));
        assert!(Active.can_transition_to(Reconnecting));
        assert!(Reconnecting.can_transition_to(Connecting));
        assert!(Reconnecting.can_transition_to(Disconnected));

        assert!(!Disconnected.can_transition_to(Active));
        assert!(!Connecting.can_transition_to(Active));
        assert!(!Reconnecting.can_transition_to(Active));
        assert!(!Disconnected.can_transition_to(Reconnecting));
    }

    #[test]
    fn assessment_serializes_level_upper_case() {
        let a = RiskAssessment {
            tx_hash: Some("0xabc".into()),
            risk_level: RiskLevel::High,
            estimated_profit_eth: 0.21,
            slippage_percent: 1.05,
            reason: "High MEV profit opportunity detected".into(),
            factors: vec!["DEX swap detected".into()],
            is_dex_swap: true,
            analysis_duration: Duration::from_micros(42),
        };
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["risk_level"], "HIGH");
        assert_eq!(json["analysis_duration"], 42);
    }
}
