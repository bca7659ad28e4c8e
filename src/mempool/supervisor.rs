//! Subscription lifecycle: connect, subscribe, read, and reconnect forever.
//!
//! ```text
//! Disconnected -> Connecting -> Subscribing -> Active
//!                    ^                          |
//!                    +------ Reconnecting <-----+   (any failure)
//! ```
//! `stop()` drops whatever the loop is awaiting (connect, handshake, read or
//! backoff sleep) and leaves the state at `Disconnected`.

use super::backoff::{Backoff, BackoffConfig};
use super::dispatcher::{self, Frame};
use super::transport::{Connection, Transport};
use crate::config::validate_endpoint;
use crate::errors::{AppError, Result};
use crate::models::{ConnectionState, Endpoint, Subscription};
use crate::stats::SessionStats;
use crate::utils::short_hash;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

pub const SUBSCRIBE_METHOD: &str = "eth_subscribe";
pub const PENDING_TX_TOPIC: &str = "newPendingTransactions";

/// A `from -> to` move of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

/// How one connection attempt ended.
struct SessionEnd {
    reached_active: bool,
    error: AppError,
}

impl SessionEnd {
    fn before_active(error: AppError) -> Self {
        Self {
            reached_active: false,
            error,
        }
    }
}

/// Owns the connection and its state. Frames are handled inline, in arrival
/// order, and notified transaction hashes are pushed onto `pending_tx`.
pub struct ConnectionSupervisor<T: Transport> {
    transport: T,
    backoff: BackoffConfig,
    /// `None` retries forever.
    give_up_after: Option<u32>,
    allow_insecure_ws: bool,
    pending_tx: mpsc::Sender<String>,
    stats: Arc<SessionStats>,
    state_tx: watch::Sender<ConnectionState>,
    transitions_tx: broadcast::Sender<StateTransition>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

/// Cloneable remote for a running supervisor.
#[derive(Clone)]
pub struct SupervisorHandle {
    shutdown_tx: Arc<watch::Sender<bool>>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl SupervisorHandle {
    /// Same as [`ConnectionSupervisor::stop`].
    pub fn stop(&self) {
        self.shutdown_tx.send_replace(true);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }
}

impl<T: Transport> ConnectionSupervisor<T> {
    pub fn new(transport: T, pending_tx: mpsc::Sender<String>, stats: Arc<SessionStats>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (transitions_tx, _) = broadcast::channel(256);
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            transport,
            backoff: BackoffConfig::default(),
            give_up_after: None,
            allow_insecure_ws: false,
            pending_tx,
            stats,
            state_tx,
            transitions_tx,
            shutdown_tx: Arc::new(shutdown_tx),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Enter `FailedPermanently` after this many consecutive failed attempts.
    /// Not used by the binary; the monitor is expected to retry forever.
    pub fn give_up_after(mut self, attempts: u32) -> Self {
        self.give_up_after = Some(attempts);
        self
    }

    /// Test-only escape hatch for plaintext `ws://` endpoints.
    pub fn allow_insecure_ws(mut self, allow: bool) -> Self {
        self.allow_insecure_ws = allow;
        self
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe_transitions(&self) -> broadcast::Receiver<StateTransition> {
        self.transitions_tx.subscribe()
    }

    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            shutdown_tx: Arc::clone(&self.shutdown_tx),
            state_rx: self.state_tx.subscribe(),
        }
    }

    /// Idempotent. The running loop notices immediately, even mid-backoff.
    /// A stop issued before the loop starts makes the next start return
    /// without connecting.
    pub fn stop(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Monitor a single endpoint until [`stop`](Self::stop) is called.
    pub async fn start(&self, endpoint: &Endpoint) -> Result<()> {
        self.start_with_fallbacks(std::slice::from_ref(endpoint)).await
    }

    /// Monitor a priority-ordered endpoint list. Each failed attempt moves to
    /// the next endpoint; after an Active period the primary is tried first.
    ///
    /// Only configuration problems are returned as errors, and only before
    /// the first connection attempt.
    pub async fn start_with_fallbacks(&self, endpoints: &[Endpoint]) -> Result<()> {
        if endpoints.is_empty() {
            return Err(AppError::Config("no streaming endpoint supplied".into()));
        }
        for ep in endpoints {
            validate_endpoint(ep, self.allow_insecure_ws)?;
        }

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        // A previous run may have ended in FailedPermanently.
        self.transition(ConnectionState::Disconnected);
        if *shutdown_rx.borrow_and_update() {
            self.shutdown_tx.send_replace(false);
            info!("[WS] stop requested before start, not connecting");
            return Ok(());
        }
        let mut backoff = Backoff::new(self.backoff.clone());
        let mut idx = 0usize;

        let result = loop {
            let endpoint = &endpoints[idx];
            self.transition(ConnectionState::Connecting);
            info!(url = %endpoint.url, priority = endpoint.priority, "[WS] connecting");

            let end = tokio::select! {
                biased;
                _ = stop_requested(&mut shutdown_rx) => break Ok(()),
                end = self.run_session(endpoint) => end,
            };

            self.transition(ConnectionState::Reconnecting);
            self.stats.record_reconnection();
            if end.reached_active {
                backoff.reset();
                idx = 0;
            } else {
                idx = (idx + 1) % endpoints.len();
            }

            if let Some(limit) = self.give_up_after {
                if backoff.attempts() + 1 >= limit {
                    error!(attempts = limit, error = %end.error, "[WS] giving up");
                    self.transition(ConnectionState::FailedPermanently);
                    return Err(AppError::Transport(format!(
                        "gave up after {limit} attempts: {}",
                        end.error
                    )));
                }
            }

            let delay = backoff.next_delay();
            warn!(
                error = %end.error,
                transport = end.error.is_transport(),
                attempt = backoff.attempts(),
                delay_ms = delay.as_millis() as u64,
                next_url = %endpoints[idx].url,
                "[WS] connection lost, reconnecting"
            );

            tokio::select! {
                biased;
                _ = stop_requested(&mut shutdown_rx) => break Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        };

        // The stop is consumed; a later start runs normally.
        self.shutdown_tx.send_replace(false);
        self.transition(ConnectionState::Disconnected);
        info!("[WS] supervisor stopped");
        result
    }

    fn transition(&self, next: ConnectionState) {
        let prev = self.state_tx.send_replace(next);
        debug_assert!(
            prev.can_transition_to(next),
            "illegal transition {prev} -> {next}"
        );
        if prev != next {
            info!(from = %prev, to = %next, "[WS] state change");
            let _ = self.transitions_tx.send(StateTransition { from: prev, to: next });
        }
    }

    async fn run_session(&self, endpoint: &Endpoint) -> SessionEnd {
        let mut conn =
            match tokio::time::timeout(endpoint.timeout, self.transport.connect(endpoint)).await {
                Ok(Ok(conn)) => conn,
                Ok(Err(e)) => return SessionEnd::before_active(e),
                Err(_) => {
                    return SessionEnd::before_active(AppError::Transport(format!(
                        "connect timed out after {:?}",
                        endpoint.timeout
                    )));
                }
            };

        self.transition(ConnectionState::Subscribing);
        let subscription = match self.handshake(&mut conn, endpoint.timeout).await {
            Ok(sub) => sub,
            Err(e) => {
                conn.close().await;
                return SessionEnd::before_active(e);
            }
        };

        self.transition(ConnectionState::Active);
        info!(subscription = %subscription.id, "[WS] subscribed to pending transactions");

        let error = self.pump(&mut conn, &subscription).await;
        conn.close().await;
        SessionEnd {
            reached_active: true,
            error,
        }
    }

    /// Send `eth_subscribe` and wait for the ack. Timing out counts as a
    /// transport failure.
    async fn handshake(&self, conn: &mut T::Conn, timeout: Duration) -> Result<Subscription> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": SUBSCRIBE_METHOD,
            "params": [PENDING_TX_TOPIC],
        });
        conn.send_text(request.to_string()).await?;

        let wait_ack = async {
            loop {
                let text = match conn.next_text().await {
                    Some(Ok(text)) => text,
                    Some(Err(e)) => return Err(e),
                    None => {
                        return Err(AppError::Transport("peer closed during handshake".into()));
                    }
                };
                match dispatcher::classify(&text) {
                    Frame::SubscriptionAck { id } => {
                        return Ok(Subscription {
                            id,
                            method: SUBSCRIBE_METHOD.to_string(),
                            params: vec![PENDING_TX_TOPIC.to_string()],
                        });
                    }
                    Frame::ProtocolError { message } => {
                        self.stats.record_protocol_error();
                        return Err(AppError::Protocol(format!(
                            "subscription rejected: {message}"
                        )));
                    }
                    Frame::Notification { .. } => {
                        debug!("[WS] notification before ack, ignoring");
                    }
                    frame @ Frame::Unparseable => {
                        self.stats.record_unparseable();
                        dispatcher::record_dropped(&frame);
                    }
                }
            }
        };

        match tokio::time::timeout(timeout, wait_ack).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Transport(format!(
                "no subscription ack within {timeout:?}"
            ))),
        }
    }

    /// Read until the connection fails; returns why it stopped.
    async fn pump(&self, conn: &mut T::Conn, subscription: &Subscription) -> AppError {
        loop {
            match conn.next_text().await {
                Some(Ok(text)) => self.handle_frame(&text, subscription),
                Some(Err(e)) => return e,
                None => return AppError::Transport("peer closed the connection".into()),
            }
        }
    }

    fn handle_frame(&self, text: &str, subscription: &Subscription) {
        match dispatcher::classify(text) {
            Frame::Notification {
                tx_hash,
                subscription: sub_id,
            } => {
                if sub_id.as_deref().is_some_and(|id| id != subscription.id) {
                    debug!(subscription = ?sub_id, "[WS] notification for a stale subscription");
                    return;
                }
                self.stats.record_notification();
                debug!(tx_hash = %short_hash(&tx_hash), "[WS] pending transaction");
                match self.pending_tx.try_send(tx_hash) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(hash)) => {
                        self.stats.record_pending_dropped();
                        warn!(tx_hash = %short_hash(&hash), "[WS] classification queue full, dropping");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        debug!("[WS] classification stage is gone");
                    }
                }
            }
            Frame::SubscriptionAck { id } => {
                debug!(%id, "[WS] unexpected ack while active");
            }
            frame @ Frame::ProtocolError { .. } => {
                self.stats.record_protocol_error();
                dispatcher::record_dropped(&frame);
            }
            frame @ Frame::Unparseable => {
                self.stats.record_unparseable();
                dispatcher::record_dropped(&frame);
            }
        }
    }
}

/// Resolves once a stop has been requested.
async fn stop_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
