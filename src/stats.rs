//! Session counters shared between the pipeline stages.

use crate::models::RiskLevel;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct SessionStats {
    notifications: AtomicU64,
    analyzed: AtomicU64,
    high_risk: AtomicU64,
    medium_risk: AtomicU64,
    reconnections: AtomicU64,
    unparseable_frames: AtomicU64,
    protocol_errors: AtomicU64,
    pending_dropped: AtomicU64,
    lookup_failures: AtomicU64,
    alerts_dropped: AtomicU64,
    handler_failures: AtomicU64,
}

/// Point-in-time copy of [`SessionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub notifications: u64,
    pub analyzed: u64,
    pub high_risk: u64,
    pub medium_risk: u64,
    pub reconnections: u64,
    pub unparseable_frames: u64,
    pub protocol_errors: u64,
    pub pending_dropped: u64,
    pub lookup_failures: u64,
    pub alerts_dropped: u64,
    pub handler_failures: u64,
}

fn bump(c: &AtomicU64) {
    c.fetch_add(1, Ordering::Relaxed);
}

impl SessionStats {
    pub fn record_notification(&self) {
        bump(&self.notifications);
    }

    pub fn record_assessment(&self, level: RiskLevel) {
        bump(&self.analyzed);
        match level {
            RiskLevel::High => bump(&self.high_risk),
            RiskLevel::Medium => bump(&self.medium_risk),
            RiskLevel::Low => {}
        }
    }

    pub fn record_reconnection(&self) {
        bump(&self.reconnections);
    }

    pub fn record_unparseable(&self) {
        bump(&self.unparseable_frames);
    }

    pub fn record_protocol_error(&self) {
        bump(&self.protocol_errors);
    }

    pub fn record_pending_dropped(&self) {
        bump(&self.pending_dropped);
    }

    pub fn record_lookup_failure(&self) {
        bump(&self.lookup_failures);
    }

    pub fn record_alerts_dropped(&self, n: u64) {
        self.alerts_dropped.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_handler_failure(&self) {
        bump(&self.handler_failures);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            notifications: load(&self.notifications),
            analyzed: load(&self.analyzed),
            high_risk: load(&self.high_risk),
            medium_risk: load(&self.medium_risk),
            reconnections: load(&self.reconnections),
            unparseable_frames: load(&self.unparseable_frames),
            protocol_errors: load(&self.protocol_errors),
            pending_dropped: load(&self.pending_dropped),
            lookup_failures: load(&self.lookup_failures),
            alerts_dropped: load(&self.alerts_dropped),
            handler_failures: load(&self.handler_failures),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assessments_are_bucketed_by_level() {
        let s = SessionStats::default();
        s.record_assessment(RiskLevel::High);
        s.record_assessment(RiskLevel::Medium);
        s.record_assessment(RiskLevel::Low);
        s.record_alerts_dropped(3);
        let snap = s.snapshot();
        assert_eq!(snap.analyzed, 3);
        assert_eq!(snap.high_risk, 1);
        assert_eq!(snap.medium_risk, 1);
        assert_eq!(snap.alerts_dropped, 3);
    }
}
