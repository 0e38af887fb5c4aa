//! Aggregate gateway counters.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

use tg_domain::usage::{Outcome, UsageRecord};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub by_outcome: BTreeMap<String, u64>,
}

/// Lifetime totals, fed from the same records the usage sink sees.
#[derive(Default)]
pub struct GatewayStats {
    by_outcome: [AtomicU64; Outcome::ALL.len()],
    total_tokens: AtomicU64,
    total_cost: Mutex<f64>,
}

impl GatewayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, record: &UsageRecord) {
        self.by_outcome[index(record.outcome)].fetch_add(1, Ordering::Relaxed);
        if record.outcome == Outcome::Success {
            self.total_tokens.fetch_add(record.tokens, Ordering::Relaxed);
            *self.total_cost.lock() += record.cost;
        }
    }

    pub fn count(&self, outcome: Outcome) -> u64 {
        self.by_outcome[index(outcome)].load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let by_outcome: BTreeMap<String, u64> = Outcome::ALL
            .iter()
            .map(|o| (o.as_str().to_string(), self.count(*o)))
            .collect();
        StatsSnapshot {
            total_requests: by_outcome.values().sum(),
            total_tokens: self.total_tokens.load(Ordering::Relaxed),
            total_cost: *self.total_cost.lock(),
            by_outcome,
        }
    }
}

fn index(outcome: Outcome) -> usize {
    Outcome::ALL
        .iter()
        .position(|o| *o == outcome)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    fn record(outcome: Outcome, tokens: u64, cost: f64) -> UsageRecord {
        UsageRecord {
            request_id: Uuid::new_v4(),
            service: "openai".into(),
            agent_id: "alpha".into(),
            model: None,
            tokens,
            input_tokens: tokens,
            output_tokens: 0,
            cost,
            duration_ms: 1,
            queue_time_ms: 0,
            outcome,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn counts_every_outcome_but_totals_only_success() {
        let stats = GatewayStats::new();
        stats.record(&record(Outcome::Success, 100, 0.25));
        stats.record(&record(Outcome::Success, 50, 0.25));
        stats.record(&record(Outcome::QuotaExceeded, 999, 0.0));

        let snap = stats.snapshot();
        assert_eq!(snap.total_requests, 3);
        assert_eq!(snap.total_tokens, 150);
        assert!((snap.total_cost - 0.5).abs() < 1e-12);
        assert_eq!(snap.by_outcome["success"], 2);
        assert_eq!(snap.by_outcome["quota_exceeded"], 1);
        assert_eq!(snap.by_outcome["timed_out"], 0);
    }
}
