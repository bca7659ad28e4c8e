//! Fan-out of risk assessments to registered handlers.
//!
//! Every handler runs in its own task and drains its own ring of at most
//! `capacity` assessments. Delivering into a full ring evicts the oldest
//! entry; the loss is logged and counted.

use crate::models::{RiskAssessment, RiskLevel};
use crate::stats::SessionStats;
use crate::utils::short_hash;
use async_trait::async_trait;
use futures::FutureExt;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub type HandlerId = u64;

/// Consumer of assessments. Errors (and panics) are logged, never propagated.
#[async_trait]
pub trait AlertHandler: Send + Sync + 'static {
    async fn handle(&self, assessment: &RiskAssessment) -> anyhow::Result<()>;
}

#[async_trait]
impl<F> AlertHandler for F
where
    F: Fn(&RiskAssessment) -> anyhow::Result<()> + Send + Sync + 'static,
{
    async fn handle(&self, assessment: &RiskAssessment) -> anyhow::Result<()> {
        self(assessment)
    }
}

/// Logs each assessment at a level matching its risk.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHandler;

#[async_trait]
impl AlertHandler for LogHandler {
    async fn handle(&self, a: &RiskAssessment) -> anyhow::Result<()> {
        let tx = a.tx_hash.as_deref().map(short_hash).unwrap_or("-");
        match a.risk_level {
            RiskLevel::High => warn!(
                tx_hash = %tx,
                profit_eth = format_args!("{:.4}", a.estimated_profit_eth),
                slippage_pct = format_args!("{:.1}", a.slippage_percent),
                reason = %a.reason,
                factors = ?a.factors,
                "[ALERT] HIGH risk transaction"
            ),
            RiskLevel::Medium => info!(
                tx_hash = %tx,
                profit_eth = format_args!("{:.4}", a.estimated_profit_eth),
                reason = %a.reason,
                "[ALERT] MEDIUM risk transaction"
            ),
            RiskLevel::Low => debug!(tx_hash = %tx, reason = %a.reason, "[ALERT] low risk"),
        }
        Ok(())
    }
}

/// Bounded per-handler backlog.
struct HandlerQueue {
    items: Mutex<VecDeque<Arc<RiskAssessment>>>,
    capacity: usize,
    ready: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl HandlerQueue {
    fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            ready: Notify::new(),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Arc<RiskAssessment>>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append, evicting the oldest entry when full. Returns the evicted one.
    fn push(&self, assessment: Arc<RiskAssessment>) -> Option<Arc<RiskAssessment>> {
        let evicted = {
            let mut items = self.lock();
            let evicted = if items.len() >= self.capacity {
                items.pop_front()
            } else {
                None
            };
            items.push_back(assessment);
            evicted
        };
        if evicted.is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.ready.notify_one();
        evicted
    }

    /// Next queued assessment; `None` once closed and empty.
    async fn pop(&self) -> Option<Arc<RiskAssessment>> {
        loop {
            let next = self.lock().pop_front();
            if next.is_some() {
                return next;
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.ready.notified().await;
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.ready.notify_one();
    }
}

struct HandlerSlot {
    task: JoinHandle<()>,
    queue: Arc<HandlerQueue>,
}

pub struct AlertSink {
    capacity: usize,
    closed: AtomicBool,
    handlers: Mutex<HashMap<HandlerId, HandlerSlot>>,
    next_id: AtomicU64,
    stats: Arc<SessionStats>,
}

impl AlertSink {
    /// `capacity` is the exact per-handler backlog. Values below 1 are
    /// raised to 1.
    pub fn new(capacity: usize, stats: Arc<SessionStats>) -> Self {
        Self {
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
            handlers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            stats,
        }
    }

    /// Start feeding `handler` with every assessment delivered from now on.
    /// Must be called from within a Tokio runtime.
    pub fn register<H: AlertHandler>(&self, handler: H) -> HandlerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if self.closed.load(Ordering::Acquire) {
            warn!(handler = id, "[ALERT] sink already closed, handler will never run");
            return id;
        }

        let queue = Arc::new(HandlerQueue::new(self.capacity));
        let task = tokio::spawn(run_handler(
            id,
            Arc::new(handler),
            Arc::clone(&queue),
            Arc::clone(&self.stats),
        ));
        self.lock_handlers().insert(id, HandlerSlot { task, queue });
        debug!(handler = id, "[ALERT] handler registered");
        id
    }

    /// Stop delivering to `id`; anything still queued for it is discarded.
    /// Returns whether the handler was registered.
    pub fn unregister(&self, id: HandlerId) -> bool {
        match self.lock_handlers().remove(&id) {
            Some(slot) => {
                slot.queue.close();
                slot.task.abort();
                debug!(handler = id, "[ALERT] handler unregistered");
                true
            }
            None => false,
        }
    }

    /// Queue one assessment for every registered handler. Never blocks on a
    /// handler.
    pub fn deliver(&self, assessment: RiskAssessment) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let assessment = Arc::new(assessment);
        for (id, slot) in self.lock_handlers().iter() {
            if let Some(evicted) = slot.queue.push(Arc::clone(&assessment)) {
                self.stats.record_alerts_dropped(1);
                warn!(
                    handler = *id,
                    tx_hash = %evicted.tx_hash.as_deref().map(short_hash).unwrap_or("-"),
                    "[ALERT] handler queue full, oldest assessment dropped"
                );
            }
        }
    }

    pub fn handler_count(&self) -> usize {
        self.lock_handlers().len()
    }

    /// Assessments `id` lost to queue overflow so far.
    pub fn dropped(&self, id: HandlerId) -> Option<u64> {
        self.lock_handlers()
            .get(&id)
            .map(|slot| slot.queue.dropped.load(Ordering::Relaxed))
    }

    /// Stop accepting assessments and wait until every handler has drained
    /// its queue.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let slots: Vec<HandlerSlot> = self.lock_handlers().drain().map(|(_, s)| s).collect();
        for slot in &slots {
            slot.queue.close();
        }
        for slot in slots {
            if let Err(e) = slot.task.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "[ALERT] handler task ended abnormally");
                }
            }
        }
    }

    fn lock_handlers(&self) -> std::sync::MutexGuard<'_, HashMap<HandlerId, HandlerSlot>> {
        self.handlers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

async fn run_handler(
    id: HandlerId,
    handler: Arc<dyn AlertHandler>,
    queue: Arc<HandlerQueue>,
    stats: Arc<SessionStats>,
) {
    while let Some(assessment) = queue.pop().await {
        match AssertUnwindSafe(handler.handle(&assessment)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                stats.record_handler_failure();
                warn!(handler = id, error = %e, "[ALERT] handler failed");
            }
            Err(_) => {
                stats.record_handler_failure();
                warn!(handler = id, "[ALERT] handler panicked");
            }
        }
    }
    debug!(handler = id, "[ALERT] handler finished");
}
