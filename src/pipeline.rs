//! Classification stage between the supervisor and the alert sink.

use crate::alerts::AlertSink;
use crate::models::TransactionRecord;
use crate::risk::Classifier;
use crate::rpc::TransactionSource;
use crate::stats::SessionStats;
use crate::utils::short_hash;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Everything the stage needs besides its input queue.
#[derive(Clone)]
pub struct StageContext {
    /// `None` classifies from the hash alone.
    pub source: Option<Arc<dyn TransactionSource>>,
    pub classifier: Arc<dyn Classifier>,
    pub sink: Arc<AlertSink>,
    pub stats: Arc<SessionStats>,
    /// Detail lookups in flight at once.
    pub lookup_concurrency: usize,
}

/// Spawn the stage. Hashes are looked up concurrently but assessments are
/// delivered in the order the hashes arrived. The task ends once every
/// sender of `pending_rx` is gone and the backlog is processed.
pub fn spawn_classification_stage(
    pending_rx: mpsc::Receiver<String>,
    ctx: StageContext,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run_classification_stage(pending_rx, ctx))
}

pub async fn run_classification_stage(pending_rx: mpsc::Receiver<String>, ctx: StageContext) {
    let hashes = futures::stream::unfold(pending_rx, |mut rx| async move {
        rx.recv().await.map(|hash| (hash, rx))
    });

    let source = ctx.source.clone();
    let stats = Arc::clone(&ctx.stats);
    let records = hashes
        .map(move |hash| fetch_record(source.clone(), Arc::clone(&stats), hash))
        .buffered(ctx.lookup_concurrency.max(1));
    futures::pin_mut!(records);

    while let Some(record) = records.next().await {
        let assessment = ctx.classifier.analyze(&record);
        ctx.stats.record_assessment(assessment.risk_level);
        let token = record
            .to
            .as_deref()
            .and_then(|to| ctx.classifier.token_symbol(to));
        debug!(
            tx_hash = %record.hash.as_deref().map(short_hash).unwrap_or("-"),
            token = token.unwrap_or("-"),
            level = %assessment.risk_level,
            reason = %assessment.reason,
            elapsed_us = assessment.analysis_duration.as_micros() as u64,
            "[RISK] classified"
        );
        ctx.sink.deliver(assessment);
    }
    info!("[RISK] classification stage finished");
}

/// Lookup failures are data errors: the record falls back to the hash only.
async fn fetch_record(
    source: Option<Arc<dyn TransactionSource>>,
    stats: Arc<SessionStats>,
    hash: String,
) -> TransactionRecord {
    let Some(source) = source else {
        return TransactionRecord::from_hash(hash);
    };
    match source.get_transaction(&hash).await {
        Ok(mut record) => {
            if record.hash.is_none() {
                record.hash = Some(hash);
            }
            record
        }
        Err(e) => {
            stats.record_lookup_failure();
            debug!(tx_hash = %short_hash(&hash), error = %e, "[RPC] detail lookup failed");
            TransactionRecord::from_hash(hash)
        }
    }
}
