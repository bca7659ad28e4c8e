use crate::errors::{AppError, Result};
use crate::utils::is_valid_address;
use std::collections::BTreeMap;

/// Tables and thresholds the classifier is built from. Read-only afterwards.
#[derive(Debug, Clone)]
pub struct RiskConfig {
    /// name -> router address
    pub dex_routers: BTreeMap<String, String>,
    /// symbol -> token address
    pub tokens: BTreeMap<String, String>,
    pub min_profit_threshold_eth: f64,
    pub high_risk_slippage_percent: f64,
}

impl RiskConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("min_profit_threshold_eth", self.min_profit_threshold_eth),
            ("high_risk_slippage_percent", self.high_risk_slippage_percent),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(AppError::Config(format!(
                    "{name} must be a finite non-negative number, got {value}"
                )));
            }
        }
        if self.dex_routers.is_empty() {
            return Err(AppError::Config("no DEX routers configured".into()));
        }
        for (name, addr) in self.dex_routers.iter().chain(self.tokens.iter()) {
            if !is_valid_address(addr) {
                return Err(AppError::Config(format!("address for {name} is invalid: {addr}")));
            }
        }
        Ok(())
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        use crate::config::{DEFAULT_DEX_ROUTERS, DEFAULT_TOKENS};
        let table = |t: &[(&str, &str)]| {
            t.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>()
        };
        Self {
            dex_routers: table(DEFAULT_DEX_ROUTERS),
            tokens: table(DEFAULT_TOKENS),
            min_profit_threshold_eth: 0.01,
            high_risk_slippage_percent: 3.0,
        }
    }
}
