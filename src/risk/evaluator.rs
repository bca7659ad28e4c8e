use super::types::RiskConfig;
use crate::models::{RiskAssessment, RiskLevel, TransactionRecord};
use crate::utils::normalize_address;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

pub const REASON_NON_DEX: &str = "non-DEX transaction — low MEV risk";
pub const REASON_INSUFFICIENT: &str = "insufficient data";
pub const FACTOR_DEX_SWAP: &str = "DEX swap detected";

/// Slippage above which a factor is attached to a DEX assessment.
const SLIPPAGE_FACTOR_PERCENT: f64 = 3.0;

/// Something that turns a pending transaction into a risk assessment.
///
/// Implementations must be deterministic and side-effect free so they can be
/// shared across tasks behind an `Arc`.
pub trait Classifier: Send + Sync {
    fn analyze(&self, record: &TransactionRecord) -> RiskAssessment;

    /// Fast pre-filter: is a `(profit, slippage)` pair worth acting on?
    fn analyze_opportunity(&self, profit_eth: f64, slippage_percent: f64) -> bool;

    /// Symbol of a known token contract, for labelling. Never affects the
    /// assessment.
    fn token_symbol(&self, _address: &str) -> Option<&str> {
        None
    }
}

/// Coarse value-based heuristic. The profit figure is a proxy for how
/// attractive the swap is to a searcher, not an extractable amount.
#[derive(Debug, Clone)]
pub struct HeuristicClassifier {
    routers: HashSet<String>,
    tokens: HashMap<String, String>,
    min_profit_threshold_eth: f64,
    high_risk_slippage_percent: f64,
}

impl HeuristicClassifier {
    pub fn new(config: &RiskConfig) -> Self {
        Self {
            routers: config
                .dex_routers
                .values()
                .map(|a| normalize_address(a))
                .collect(),
            tokens: config
                .tokens
                .iter()
                .map(|(sym, a)| (normalize_address(a), sym.clone()))
                .collect(),
            min_profit_threshold_eth: config.min_profit_threshold_eth,
            high_risk_slippage_percent: config.high_risk_slippage_percent,
        }
    }

    /// Case-insensitive router membership.
    pub fn is_dex_router(&self, to: &str) -> bool {
        self.routers.contains(&normalize_address(to))
    }

    fn assess(&self, record: &TransactionRecord) -> RiskAssessment {
        let (Some(_), Some(to), Some(eth_value)) =
            (record.hash.as_ref(), record.to.as_deref(), record.eth_value)
        else {
            return low(record, REASON_INSUFFICIENT, false);
        };

        if !self.is_dex_router(to) {
            return low(record, REASON_NON_DEX, false);
        }

        let profit = estimate_profit(eth_value);
        let slippage = estimate_slippage(eth_value);
        let risk_level = RiskLevel::from_profit(profit);
        let reason = match risk_level {
            RiskLevel::High => "High MEV profit opportunity detected",
            RiskLevel::Medium => "Medium MEV risk",
            RiskLevel::Low => "Low MEV risk",
        };

        let mut factors = vec![FACTOR_DEX_SWAP.to_string()];
        if slippage > SLIPPAGE_FACTOR_PERCENT {
            factors.push(format!("high slippage: {slippage:.2}%"));
        }

        RiskAssessment {
            tx_hash: record.hash.clone(),
            risk_level,
            estimated_profit_eth: profit,
            slippage_percent: slippage,
            reason: reason.to_string(),
            factors,
            is_dex_swap: true,
            analysis_duration: Duration::ZERO,
        }
    }
}

impl Classifier for HeuristicClassifier {
    fn analyze(&self, record: &TransactionRecord) -> RiskAssessment {
        let started = Instant::now();
        let mut assessment = self.assess(record);
        assessment.analysis_duration = started.elapsed();
        assessment
    }

    fn analyze_opportunity(&self, profit_eth: f64, slippage_percent: f64) -> bool {
        profit_eth >= self.min_profit_threshold_eth
            && slippage_percent <= self.high_risk_slippage_percent
    }

    /// Case-insensitive lookup in the configured token table.
    fn token_symbol(&self, address: &str) -> Option<&str> {
        self.tokens
            .get(&normalize_address(address))
            .map(String::as_str)
    }
}

fn low(record: &TransactionRecord, reason: &str, is_dex_swap: bool) -> RiskAssessment {
    RiskAssessment {
        tx_hash: record.hash.clone(),
        risk_level: RiskLevel::Low,
        estimated_profit_eth: 0.0,
        slippage_percent: 0.0,
        reason: reason.to_string(),
        factors: Vec::new(),
        is_dex_swap,
        analysis_duration: Duration::ZERO,
    }
}

/// 2% of value above 10 ETH, 0.5% at or below it.
pub fn estimate_profit(eth_value: f64) -> f64 {
    if eth_value > 10.0 {
        eth_value * 0.02
    } else {
        eth_value * 0.005
    }
}

/// 0.1% per ETH, capped at 10%.
pub fn estimate_slippage(eth_value: f64) -> f64 {
    (eth_value * 0.1).min(10.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNISWAP_V2: &str = "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D";

    fn classifier() -> HeuristicClassifier {
        HeuristicClassifier::new(&RiskConfig::default())
    }

    fn record(to: &str, eth_value: f64) -> TransactionRecord {
        TransactionRecord {
            hash: Some("0xfeed".into()),
            from: Some("0x1111111111111111111111111111111111111111".into()),
            to: Some(to.to_string()),
            input_data: Some("0x38ed1739".into()),
            raw_value: None,
            eth_value: Some(eth_value),
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn profit_estimate_branches() {
        assert!(approx(estimate_profit(10.5), 0.21));
        assert!(approx(estimate_profit(5.0), 0.025));
        // 10.0 stays on the 0.5% branch
        assert!(approx(estimate_profit(10.0), 0.05));
    }

    #[test]
    fn slippage_estimate_is_capped() {
        assert_eq!(estimate_slippage(200.0), 10.0);
        assert!(approx(estimate_slippage(20.0), 2.0));
    }

    #[test]
    fn opportunity_predicate_includes_boundaries() {
        let c = classifier();
        assert!(c.analyze_opportunity(0.01, 3.0));
        assert!(c.analyze_opportunity(0.5, 0.0));
        assert!(!c.analyze_opportunity(0.0099, 1.0));
        assert!(!c.analyze_opportunity(0.5, 3.0001));

        let samples = [0.0, 0.005, 0.01, 0.02, 1.0];
        let slips = [0.0, 2.9, 3.0, 3.1, 10.0];
        for p in samples {
            for s in slips {
                assert_eq!(c.analyze_opportunity(p, s), p >= 0.01 && s <= 3.0, "p={p} s={s}");
            }
        }
    }

    #[test]
    fn router_match_ignores_case() {
        let c = classifier();
        let upper = c.analyze(&record(UNISWAP_V2, 1.0));
        let lower = c.analyze(&record(&UNISWAP_V2.to_lowercase(), 1.0));
        assert!(upper.is_dex_swap);
        assert_eq!(upper.is_dex_swap, lower.is_dex_swap);
        assert_eq!(upper.risk_level, lower.risk_level);
    }

    #[test]
    fn non_dex_transfer_is_low_without_factors() {
        let a = classifier().analyze(&record("0x2222222222222222222222222222222222222222", 500.0));
        assert_eq!(a.risk_level, RiskLevel::Low);
        assert_eq!(a.reason, REASON_NON_DEX);
        assert!(a.factors.is_empty());
        assert!(!a.is_dex_swap);
    }

    #[test]
    fn large_swap_is_high_with_slippage_factor() {
        let a = classifier().analyze(&record(UNISWAP_V2, 50.0));
        assert_eq!(a.risk_level, RiskLevel::High);
        assert!(approx(a.estimated_profit_eth, 1.0));
        assert_eq!(a.slippage_percent, 5.0);
        assert_eq!(
            a.factors,
            vec!["DEX swap detected".to_string(), "high slippage: 5.00%".to_string()]
        );
    }

    #[test]
    fn levels_follow_profit_bands() {
        let c = classifier();
        // 10 ETH -> 0.05 profit, exactly on the HIGH boundary
        assert_eq!(c.analyze(&record(UNISWAP_V2, 10.0)).risk_level, RiskLevel::Medium);
        // 10.5 ETH -> 0.21
        assert_eq!(c.analyze(&record(UNISWAP_V2, 10.5)).risk_level, RiskLevel::High);
        // 2 ETH -> 0.01, exactly on the MEDIUM boundary
        assert_eq!(c.analyze(&record(UNISWAP_V2, 2.0)).risk_level, RiskLevel::Low);
        // 5 ETH -> 0.025
        let mid = c.analyze(&record(UNISWAP_V2, 5.0));
        assert_eq!(mid.risk_level, RiskLevel::Medium);
        assert_eq!(mid.factors, vec![FACTOR_DEX_SWAP.to_string()]);
    }

    #[test]
    fn missing_fields_degrade_to_insufficient_data() {
        let c = classifier();

        let only_hash = c.analyze(&TransactionRecord::from_hash("0xabc"));
        assert_eq!(only_hash.risk_level, RiskLevel::Low);
        assert_eq!(only_hash.reason, REASON_INSUFFICIENT);

        let mut no_value = record(UNISWAP_V2, 0.0);
        no_value.eth_value = None;
        assert_eq!(c.analyze(&no_value).reason, REASON_INSUFFICIENT);

        let mut no_hash = record(UNISWAP_V2, 100.0);
        no_hash.hash = None;
        let a = c.analyze(&no_hash);
        assert_eq!(a.risk_level, RiskLevel::Low);
        assert_eq!(a.reason, REASON_INSUFFICIENT);
    }

    #[test]
    fn same_input_same_output() {
        let c = classifier();
        let r = record(UNISWAP_V2, 12.0);
        let mut a = c.analyze(&r);
        let mut b = c.analyze(&r);
        a.analysis_duration = Duration::ZERO;
        b.analysis_duration = Duration::ZERO;
        assert_eq!(a, b);
    }

    #[test]
    fn token_lookup() {
        let c = classifier();
        assert_eq!(
            c.token_symbol("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"),
            Some("WETH")
        );
        assert_eq!(c.token_symbol(UNISWAP_V2), None);

        let shared: std::sync::Arc<dyn Classifier> = std::sync::Arc::new(c);
        assert_eq!(
            shared.token_symbol("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
            Some("USDC")
        );
    }

    #[test]
    fn token_table_does_not_change_assessments() {
        let c = classifier();
        // a plain transfer to the USDC contract is still a non-DEX transaction
        let a = c.analyze(&record("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48", 500.0));
        assert_eq!(a.reason, REASON_NON_DEX);
        assert!(a.factors.is_empty());
    }
}
