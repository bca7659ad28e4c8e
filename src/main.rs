use anyhow::Result;
use mempool_sentinel::{
    alerts::{AlertSink, LogHandler},
    config::AppConfig,
    mempool::{ConnectionSupervisor, WsTransport},
    pipeline::{StageContext, spawn_classification_stage},
    risk::HeuristicClassifier,
    rpc::{EthersRpcClient, TransactionSource},
    stats::SessionStats,
    utils,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    utils::init_logging();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, fatal = e.is_fatal(), "[INIT] invalid configuration");
            return Err(e.into());
        }
    };

    tracing::info!(
        endpoints = config.endpoints.len(),
        primary = %config.primary_endpoint().url,
        routers = config.risk.dex_routers.len(),
        min_profit_eth = config.risk.min_profit_threshold_eth,
        lookups = config.rpc_url.is_some(),
        "[INIT] mempool-sentinel starting"
    );

    let stats = Arc::new(SessionStats::default());
    let (pending_tx, pending_rx) = mpsc::channel::<String>(config.pending_queue_capacity);

    // Alert fan-out ----------------------------------------------------------
    let sink = Arc::new(AlertSink::new(
        config.alert_queue_capacity,
        Arc::clone(&stats),
    ));
    sink.register(LogHandler);

    // Optional detail lookups ------------------------------------------------
    let source: Option<Arc<dyn TransactionSource>> = match &config.rpc_url {
        Some(url) => {
            let client = EthersRpcClient::new(url, config.rpc_timeout)?;
            match client.gas_price_gwei().await {
                Ok(gwei) => tracing::info!(gas_gwei = gwei, "[INIT] RPC reachable"),
                Err(e) => tracing::warn!(error = %e, "[INIT] RPC not answering yet"),
            }
            Some(Arc::new(client))
        }
        None => {
            tracing::warn!("[INIT] RPC_URL not set, every transaction is classified from its hash only");
            None
        }
    };

    // Classification stage ---------------------------------------------------
    let stage = spawn_classification_stage(
        pending_rx,
        StageContext {
            source,
            classifier: Arc::new(HeuristicClassifier::new(&config.risk)),
            sink: Arc::clone(&sink),
            stats: Arc::clone(&stats),
            lookup_concurrency: config.lookup_concurrency,
        },
    );

    // Connection supervisor --------------------------------------------------
    let supervisor = ConnectionSupervisor::new(WsTransport, pending_tx, Arc::clone(&stats))
        .allow_insecure_ws(config.allow_insecure_ws);
    let handle = supervisor.handle();

    let heartbeat = {
        let stats = Arc::clone(&stats);
        let handle = handle.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(30));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let s = stats.snapshot();
                tracing::info!(
                    state = %handle.state(),
                    notifications = s.notifications,
                    analyzed = s.analyzed,
                    high = s.high_risk,
                    medium = s.medium_risk,
                    reconnections = s.reconnections,
                    pending_dropped = s.pending_dropped,
                    alerts_dropped = s.alerts_dropped,
                    "[HEARTBEAT] session stats"
                );
            }
        })
    };

    tokio::spawn({
        let handle = handle.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("[INIT] shutdown requested");
                handle.stop();
            }
        }
    });

    let outcome = supervisor.start_with_fallbacks(&config.endpoints).await;

    // Dropping the supervisor closes the pending queue so the stage drains.
    drop(supervisor);
    heartbeat.abort();
    if let Err(e) = stage.await {
        tracing::warn!(error = %e, "[RISK] classification stage ended abnormally");
    }
    sink.close().await;

    let s = stats.snapshot();
    tracing::info!(
        notifications = s.notifications,
        analyzed = s.analyzed,
        high = s.high_risk,
        medium = s.medium_risk,
        "[INIT] mempool-sentinel stopped"
    );
    outcome.map_err(Into::into)
}
