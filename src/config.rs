//! Configuration loader and application settings.
//!
//! Everything comes from the process environment (a `.env` file is read by the
//! binary before loading). The whole schema is validated once; any problem is
//! reported as [`AppError::Config`] before the first connection attempt.

use crate::errors::{AppError, Result};
use crate::models::Endpoint;
use crate::risk::RiskConfig;
use crate::utils::{is_valid_address, normalize_address};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

pub const DEFAULT_DEX_ROUTERS: &[(&str, &str)] = &[
    ("uniswap_v2", "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D"),
    ("sushiswap", "0xd9e1cE17f2641f24aE83637ab66a2cca9C378B9F"),
];

pub const DEFAULT_TOKENS: &[(&str, &str)] = &[
    ("WETH", "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
    ("DAI", "0x6B175474E89094C44Da98b954EedeAC495271d0F"),
    ("USDC", "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
    ("USDT", "0xdAC17F958D2ee523a2206206994597C13D831ec7"),
];

/// Consolidated application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Streaming endpoints, primary first.
    pub endpoints: Vec<Endpoint>,
    /// HTTP endpoint for `eth_getTransactionByHash`; lookups are skipped without it.
    pub rpc_url: Option<String>,
    pub rpc_timeout: Duration,
    pub risk: RiskConfig,
    /// Bound of each alert handler's queue.
    pub alert_queue_capacity: usize,
    /// Bound of the dispatcher -> classification queue.
    pub pending_queue_capacity: usize,
    /// Detail lookups allowed in flight at once.
    pub lookup_concurrency: usize,
    /// Test-only: accept plaintext `ws://` endpoints.
    pub allow_insecure_ws: bool,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup; `load` passes the environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let allow_insecure_ws = parse_bool(get("ALLOW_INSECURE_WS"), "ALLOW_INSECURE_WS")?;
        let ws_timeout = Duration::from_millis(parse_num(get("WS_TIMEOUT_MS"), "WS_TIMEOUT_MS", 5000u64)?);

        let primary = get("WS_URL")
            .ok_or_else(|| AppError::Config("WS_URL is not set".into()))?;
        let mut endpoints = vec![Endpoint::new(primary, 0, ws_timeout)];
        if let Some(raw) = get("WS_FALLBACK_URLS") {
            for url in raw.split(',').map(str::trim).filter(|u| !u.is_empty()) {
                let priority = endpoints.len() as u32;
                endpoints.push(Endpoint::new(url, priority, ws_timeout));
            }
        }

        let dex_routers = match get("DEX_ROUTERS") {
            Some(raw) => parse_address_map(&raw, "DEX_ROUTERS")?,
            None => defaults(DEFAULT_DEX_ROUTERS),
        };
        let tokens = match get("TOKENS") {
            Some(raw) => parse_address_map(&raw, "TOKENS")?,
            None => defaults(DEFAULT_TOKENS),
        };

        let risk = RiskConfig {
            dex_routers,
            tokens,
            min_profit_threshold_eth: parse_num(
                get("MIN_PROFIT_THRESHOLD_ETH"),
                "MIN_PROFIT_THRESHOLD_ETH",
                0.01f64,
            )?,
            high_risk_slippage_percent: parse_num(
                get("HIGH_RISK_SLIPPAGE_PERCENT"),
                "HIGH_RISK_SLIPPAGE_PERCENT",
                3.0f64,
            )?,
        };

        let config = Self {
            endpoints,
            rpc_url: get("RPC_URL"),
            rpc_timeout: Duration::from_millis(parse_num(get("RPC_TIMEOUT_MS"), "RPC_TIMEOUT_MS", 5000u64)?),
            risk,
            alert_queue_capacity: parse_num(get("ALERT_QUEUE_CAPACITY"), "ALERT_QUEUE_CAPACITY", 256usize)?,
            pending_queue_capacity: parse_num(get("PENDING_QUEUE_CAPACITY"), "PENDING_QUEUE_CAPACITY", 1024usize)?,
            lookup_concurrency: parse_num(get("LOOKUP_CONCURRENCY"), "LOOKUP_CONCURRENCY", 8usize)?,
            allow_insecure_ws,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the loaded values. Called by the loaders; exposed for configs
    /// assembled by hand.
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(AppError::Config("at least one streaming endpoint is required".into()));
        }
        for ep in &self.endpoints {
            validate_endpoint(ep, self.allow_insecure_ws)?;
        }
        if let Some(rpc) = &self.rpc_url {
            let url = Url::parse(rpc)
                .map_err(|e| AppError::Config(format!("RPC_URL {rpc:?} is invalid: {e}")))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(AppError::Config(format!(
                    "RPC_URL must be http(s), got scheme {:?}",
                    url.scheme()
                )));
            }
        }
        if self.rpc_timeout.is_zero() {
            return Err(AppError::Config("RPC_TIMEOUT_MS must be greater than zero".into()));
        }
        self.risk.validate()?;
        for (name, value) in [
            ("ALERT_QUEUE_CAPACITY", self.alert_queue_capacity),
            ("PENDING_QUEUE_CAPACITY", self.pending_queue_capacity),
            ("LOOKUP_CONCURRENCY", self.lookup_concurrency),
        ] {
            if value == 0 {
                return Err(AppError::Config(format!("{name} must be at least 1")));
            }
        }
        Ok(())
    }

    pub fn primary_endpoint(&self) -> &Endpoint {
        &self.endpoints[0]
    }
}

/// Reject anything the supervisor could never connect to.
pub fn validate_endpoint(ep: &Endpoint, allow_insecure_ws: bool) -> Result<()> {
    let url = Url::parse(&ep.url)
        .map_err(|e| AppError::Config(format!("endpoint {:?} is invalid: {e}", ep.url)))?;
    match url.scheme() {
        "wss" => {}
        "ws" if allow_insecure_ws => {}
        "ws" => {
            return Err(AppError::Config(format!(
                "endpoint {:?} is plaintext; set ALLOW_INSECURE_WS=true only for local testing",
                ep.url
            )));
        }
        other => {
            return Err(AppError::Config(format!(
                "endpoint {:?} has unsupported scheme {other:?}",
                ep.url
            )));
        }
    }
    if ep.timeout.is_zero() {
        return Err(AppError::Config(format!("endpoint {:?} has a zero timeout", ep.url)));
    }
    Ok(())
}

fn defaults(table: &[(&str, &str)]) -> BTreeMap<String, String> {
    table
        .iter()
        .map(|(name, addr)| (name.to_string(), normalize_address(addr)))
        .collect()
}

/// `name=0xaddr,name=0xaddr`
fn parse_address_map(raw: &str, key: &str) -> Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, addr) = entry
            .split_once('=')
            .ok_or_else(|| AppError::Config(format!("{key} entry {entry:?} is not name=address")))?;
        let addr = addr.trim();
        if !is_valid_address(addr) {
            return Err(AppError::Config(format!("{key} entry {entry:?} has an invalid address")));
        }
        map.insert(name.trim().to_string(), normalize_address(addr));
    }
    if map.is_empty() {
        return Err(AppError::Config(format!("{key} is empty")));
    }
    Ok(map)
}

fn parse_num<T: std::str::FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T> {
    match raw {
        Some(v) => v
            .parse()
            .map_err(|_| AppError::Config(format!("{key}={v:?} is not a valid number"))),
        None => Ok(default),
    }
}

fn parse_bool(raw: Option<String>, key: &str) -> Result<bool> {
    match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("0") | Some("false") | Some("no") => Ok(false),
        Some("1") | Some("true") | Some("yes") => Ok(true),
        Some(other) => Err(AppError::Config(format!("{key}={other:?} is not a boolean"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_with_only_ws_url() {
        let cfg = load(&[("WS_URL", "wss://node.example/ws")]).unwrap();
        assert_eq!(cfg.endpoints.len(), 1);
        assert_eq!(cfg.primary_endpoint().priority, 0);
        assert_eq!(cfg.primary_endpoint().timeout, Duration::from_millis(5000));
        assert_eq!(cfg.risk.min_profit_threshold_eth, 0.01);
        assert_eq!(cfg.risk.high_risk_slippage_percent, 3.0);
        assert_eq!(
            cfg.risk.dex_routers.get("uniswap_v2").map(String::as_str),
            Some("0x7a250d5630b4cf539739df2c5dacb4c659f2488d")
        );
        assert_eq!(cfg.risk.tokens.len(), 4);
        assert!(cfg.rpc_url.is_none());
    }

    #[test]
    fn missing_ws_url_is_a_config_error() {
        let err = load(&[]).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn fallbacks_are_ordered_after_primary() {
        let cfg = load(&[
            ("WS_URL", "wss://a.example"),
            ("WS_FALLBACK_URLS", "wss://b.example, wss://c.example"),
        ])
        .unwrap();
        let urls: Vec<_> = cfg.endpoints.iter().map(|e| (e.url.as_str(), e.priority)).collect();
        assert_eq!(
            urls,
            vec![("wss://a.example", 0), ("wss://b.example", 1), ("wss://c.example", 2)]
        );
    }

    #[test]
    fn plaintext_ws_needs_explicit_opt_in() {
        assert!(load(&[("WS_URL", "ws://127.0.0.1:8546")]).is_err());
        let cfg = load(&[("WS_URL", "ws://127.0.0.1:8546"), ("ALLOW_INSECURE_WS", "true")]).unwrap();
        assert!(cfg.allow_insecure_ws);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(load(&[("WS_URL", "https://not-a-stream")]).is_err());
        assert!(load(&[("WS_URL", "wss://a"), ("MIN_PROFIT_THRESHOLD_ETH", "abc")]).is_err());
        assert!(load(&[("WS_URL", "wss://a"), ("HIGH_RISK_SLIPPAGE_PERCENT", "-1")]).is_err());
        assert!(load(&[("WS_URL", "wss://a"), ("DEX_ROUTERS", "uni=0x1234")]).is_err());
        assert!(load(&[("WS_URL", "wss://a"), ("ALERT_QUEUE_CAPACITY", "0")]).is_err());
        assert!(load(&[("WS_URL", "wss://a"), ("WS_TIMEOUT_MS", "0")]).is_err());
        assert!(load(&[("WS_URL", "wss://a"), ("RPC_URL", "ftp://x")]).is_err());
    }

    #[test]
    fn custom_router_map_is_lower_cased() {
        let cfg = load(&[
            ("WS_URL", "wss://a"),
            ("DEX_ROUTERS", "mine=0xABCDEFabcdef0123456789012345678901234567"),
        ])
        .unwrap();
        assert_eq!(
            cfg.risk.dex_routers.get("mine").map(String::as_str),
            Some("0xabcdefabcdef0123456789012345678901234567")
        );
    }
}
