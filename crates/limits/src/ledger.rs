//! Per-service daily token ledger with per-agent fair-share ceilings.
//!
//! A [`ServiceLedger`] tracks, for one service and one UTC day, how many
//! tokens each agent has used and how many are reserved by requests that
//! are admitted or queued but not yet finished. Admission reserves the
//! estimate; completion converts the reservation into actual usage;
//! rejection, timeout and cancellation release it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use tg_domain::config::{AgentQuota, Config};
use tg_domain::error::QuotaScope;
use tg_domain::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Policy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How an agent's daily ceiling is derived from a service's daily limit.
///
/// Shared by every service ledger.
#[derive(Debug, Clone)]
pub struct QuotaPolicy {
    default_percent: f64,
    overrides: HashMap<String, AgentQuota>,
}

impl QuotaPolicy {
    pub fn new(default_percent: f64, overrides: HashMap<String, AgentQuota>) -> Self {
        Self {
            default_percent,
            overrides,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.gateway.agent_quota_percent,
            config.quota.agents.clone(),
        )
    }

    /// The agent's token ceiling against a service with `daily_limit`.
    ///
    /// An absolute `daily_tokens` override wins over `quota_percent`.
    pub fn ceiling(&self, agent_id: &str, daily_limit: u64) -> u64 {
        let percent = match self.overrides.get(agent_id) {
            Some(AgentQuota {
                daily_tokens: Some(tokens),
                ..
            }) => return *tokens,
            Some(AgentQuota {
                quota_percent: Some(p),
                ..
            }) => *p,
            _ => self.default_percent,
        };
        percent_of(daily_limit, percent)
    }
}

/// `limit × percent / 100`, multiplied first so that 20% of 1000 is
/// exactly 200.
fn percent_of(limit: u64, percent: f64) -> u64 {
    (limit as f64 * percent / 100.0).floor().max(0.0) as u64
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Default, Clone)]
struct AgentAllocation {
    tokens_used_today: u64,
    requests_used_today: u64,
    cost_accrued_today: f64,
    tokens_reserved: u64,
    tokens_over_quota: u64,
}

/// Estimated tokens held against an agent's ceiling and the service's
/// daily limit.
///
/// Not `Clone`: a reservation is given back exactly once, through
/// [`ServiceLedger::release`] or [`ServiceLedger::settle`].
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a reservation must be released or settled"]
pub struct Reservation {
    agent_id: String,
    tokens: u64,
}

impl Reservation {
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn tokens(&self) -> u64 {
        self.tokens
    }
}

/// Snapshot of one agent's usage on one service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentUsage {
    pub service: String,
    pub agent_id: String,
    pub tokens_used_today: u64,
    pub requests_used_today: u64,
    pub cost_accrued_today: f64,
    pub tokens_reserved: u64,
    /// Reported tokens that did not fit under the ceiling and were not
    /// charged.
    pub tokens_over_quota: u64,
    pub quota_ceiling: u64,
}

/// Service-wide daily totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerTotals {
    pub day: NaiveDate,
    pub daily_used: u64,
    pub daily_limit: u64,
    pub daily_requests: u64,
    pub daily_cost: f64,
    pub reserved: u64,
    pub over_quota: u64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ServiceLedger
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ServiceLedger {
    service: String,
    daily_limit: u64,
    daily_used: u64,
    daily_requests: u64,
    daily_cost: f64,
    reserved: u64,
    over_quota: u64,
    agents: HashMap<String, AgentAllocation>,
    policy: Arc<QuotaPolicy>,
    day: NaiveDate,
}

impl ServiceLedger {
    pub fn new(
        service: impl Into<String>,
        daily_limit: u64,
        policy: Arc<QuotaPolicy>,
        day: NaiveDate,
    ) -> Self {
        Self {
            service: service.into(),
            daily_limit,
            daily_used: 0,
            daily_requests: 0,
            daily_cost: 0.0,
            reserved: 0,
            over_quota: 0,
            agents: HashMap::new(),
            policy,
            day,
        }
    }

    /// The UTC day the counters belong to.
    pub fn day(&self) -> NaiveDate {
        self.day
    }

    pub fn ceiling(&self, agent_id: &str) -> u64 {
        self.policy.ceiling(agent_id, self.daily_limit)
    }

    /// Fail with `QuotaExceeded` if `tokens` more would push the agent past
    /// its ceiling, or the service past its daily limit. Reserved tokens
    /// count as used.
    pub fn check_agent_quota(&self, agent_id: &str, tokens: u64) -> Result<()> {
        let (used, reserved) = self
            .agents
            .get(agent_id)
            .map(|a| (a.tokens_used_today, a.tokens_reserved))
            .unwrap_or_default();
        let committed = used.saturating_add(reserved);
        let ceiling = self.ceiling(agent_id);
        if committed.saturating_add(tokens) > ceiling {
            return Err(self.exceeded(agent_id, QuotaScope::Agent, committed, tokens, ceiling));
        }

        let committed = self.daily_used.saturating_add(self.reserved);
        if committed.saturating_add(tokens) > self.daily_limit {
            return Err(self.exceeded(
                agent_id,
                QuotaScope::Service,
                committed,
                tokens,
                self.daily_limit,
            ));
        }
        Ok(())
    }

    /// Check quota and hold `tokens` against it.
    pub fn reserve(&mut self, agent_id: &str, tokens: u64) -> Result<Reservation> {
        self.check_agent_quota(agent_id, tokens)?;
        let alloc = self.agents.entry(agent_id.to_string()).or_default();
        alloc.tokens_reserved = alloc.tokens_reserved.saturating_add(tokens);
        self.reserved = self.reserved.saturating_add(tokens);
        Ok(Reservation {
            agent_id: agent_id.to_string(),
            tokens,
        })
    }

    /// Give a reservation back without charging anything.
    pub fn release(&mut self, reservation: Reservation) {
        if let Some(alloc) = self.agents.get_mut(&reservation.agent_id) {
            alloc.tokens_reserved = alloc.tokens_reserved.saturating_sub(reservation.tokens);
        }
        self.reserved = self.reserved.saturating_sub(reservation.tokens);
    }

    /// Convert a reservation into recorded usage of `actual_tokens`.
    pub fn settle(&mut self, reservation: Reservation, actual_tokens: u64, cost: f64) {
        let agent_id = reservation.agent_id.clone();
        if actual_tokens > reservation.tokens {
            tracing::warn!(
                service = %self.service,
                agent_id = %agent_id,
                estimated = reservation.tokens,
                actual = actual_tokens,
                "actual usage exceeded estimate"
            );
        }
        self.release(reservation);
        let _ = self.record_usage(&agent_id, actual_tokens, cost);
    }

    /// Add a completed request's tokens and cost to today's counters.
    ///
    /// Tokens are charged only up to the remaining headroom under the
    /// agent's ceiling and the service's daily limit, with reservations
    /// still held counting as used. The rest is tracked as over-quota.
    /// Returns the tokens charged.
    pub fn record_usage(&mut self, agent_id: &str, tokens: u64, cost: f64) -> u64 {
        let ceiling = self.ceiling(agent_id);
        let service_room = self
            .daily_limit
            .saturating_sub(self.daily_used.saturating_add(self.reserved));

        let alloc = self.agents.entry(agent_id.to_string()).or_default();
        let agent_room =
            ceiling.saturating_sub(alloc.tokens_used_today.saturating_add(alloc.tokens_reserved));
        let charged = tokens.min(agent_room).min(service_room);
        let over = tokens - charged;

        alloc.tokens_used_today = alloc.tokens_used_today.saturating_add(charged);
        alloc.tokens_over_quota = alloc.tokens_over_quota.saturating_add(over);
        alloc.requests_used_today = alloc.requests_used_today.saturating_add(1);
        alloc.cost_accrued_today += cost;

        self.daily_used = self.daily_used.saturating_add(charged);
        self.over_quota = self.over_quota.saturating_add(over);
        self.daily_requests = self.daily_requests.saturating_add(1);
        self.daily_cost += cost;

        if over > 0 {
            tracing::warn!(
                service = %self.service,
                agent_id = %agent_id,
                reported = tokens,
                charged,
                over_quota = over,
                "usage capped at quota"
            );
        }
        charged
    }

    /// Roll the ledger over to `day`. A no-op unless `day` is later than the
    /// day already being counted, so repeated sweeps are harmless.
    ///
    /// Returns whether counters were zeroed.
    pub fn sweep(&mut self, day: NaiveDate) -> bool {
        if day <= self.day {
            return false;
        }
        self.reset_counters();
        self.day = day;
        true
    }

    /// Zero used counters and cost. In-flight reservations are kept.
    pub fn reset_counters(&mut self) {
        self.daily_used = 0;
        self.daily_requests = 0;
        self.daily_cost = 0.0;
        self.over_quota = 0;
        self.agents.retain(|_, alloc| {
            alloc.tokens_used_today = 0;
            alloc.tokens_over_quota = 0;
            alloc.requests_used_today = 0;
            alloc.cost_accrued_today = 0.0;
            alloc.tokens_reserved > 0
        });
    }

    pub fn totals(&self) -> LedgerTotals {
        LedgerTotals {
            day: self.day,
            daily_used: self.daily_used,
            daily_limit: self.daily_limit,
            daily_requests: self.daily_requests,
            daily_cost: self.daily_cost,
            reserved: self.reserved,
            over_quota: self.over_quota,
        }
    }

    /// Usage for one agent; zeros if the agent has not been seen today.
    pub fn agent_usage(&self, agent_id: &str) -> AgentUsage {
        let alloc = self.agents.get(agent_id).cloned().unwrap_or_default();
        self.snapshot(agent_id, &alloc)
    }

    /// Usage for every agent seen today, sorted by agent_id.
    pub fn agents(&self) -> Vec<AgentUsage> {
        let mut out: Vec<_> = self
            .agents
            .iter()
            .map(|(id, alloc)| self.snapshot(id, alloc))
            .collect();
        out.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        out
    }

    // ── Private ──────────────────────────────────────────────────────

    fn snapshot(&self, agent_id: &str, alloc: &AgentAllocation) -> AgentUsage {
        AgentUsage {
            service: self.service.clone(),
            agent_id: agent_id.to_string(),
            tokens_used_today: alloc.tokens_used_today,
            requests_used_today: alloc.requests_used_today,
            cost_accrued_today: alloc.cost_accrued_today,
            tokens_reserved: alloc.tokens_reserved,
            tokens_over_quota: alloc.tokens_over_quota,
            quota_ceiling: self.ceiling(agent_id),
        }
    }

    fn exceeded(
        &self,
        agent_id: &str,
        scope: QuotaScope,
        used: u64,
        requested: u64,
        limit: u64,
    ) -> Error {
        Error::QuotaExceeded {
            service: self.service.clone(),
            agent_id: agent_id.to_string(),
            scope,
            used,
            requested,
            limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, d).unwrap()
    }

    fn ledger(daily_limit: u64) -> ServiceLedger {
        let policy = Arc::new(QuotaPolicy::new(20.0, HashMap::new()));
        ServiceLedger::new("openai", daily_limit, policy, day(1))
    }

    #[test]
    fn twenty_percent_of_a_thousand() {
        let mut ledger = ledger(1000);
        assert_eq!(ledger.ceiling("alpha"), 200);

        let r = ledger.reserve("alpha", 150).unwrap();
        ledger.settle(r, 150, 0.0);

        let err = ledger.reserve("alpha", 100).unwrap_err();
        assert!(matches!(
            err,
            Error::QuotaExceeded {
                scope: QuotaScope::Agent,
                used: 150,
                requested: 100,
                limit: 200,
                ..
            }
        ));

        // Exactly at the ceiling is still allowed.
        let r = ledger.reserve("alpha", 50).unwrap();
        ledger.settle(r, 50, 0.0);
        assert_eq!(ledger.agent_usage("alpha").tokens_used_today, 200);
    }

    #[test]
    fn reservations_count_against_the_ceiling() {
        let mut ledger = ledger(1000);
        let held = ledger.reserve("alpha", 150).unwrap();
        assert!(ledger.check_agent_quota("alpha", 100).is_err());

        ledger.release(held);
        assert!(ledger.check_agent_quota("alpha", 100).is_ok());
        assert_eq!(ledger.agent_usage("alpha").tokens_used_today, 0);
    }

    #[test]
    fn service_limit_applies_across_agents() {
        let policy = Arc::new(QuotaPolicy::new(100.0, HashMap::new()));
        let mut ledger = ServiceLedger::new("openai", 500, policy, day(1));
        let a = ledger.reserve("a", 300).unwrap();
        let err = ledger.reserve("b", 300).unwrap_err();
        assert!(matches!(
            err,
            Error::QuotaExceeded {
                scope: QuotaScope::Service,
                ..
            }
        ));
        ledger.settle(a, 250, 0.01);
        assert!(ledger.reserve("b", 250).is_ok());
    }

    #[test]
    fn overrides_take_precedence() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "planner".to_string(),
            AgentQuota {
                quota_percent: Some(50.0),
                daily_tokens: None,
            },
        );
        overrides.insert(
            "batch".to_string(),
            AgentQuota {
                quota_percent: Some(90.0),
                daily_tokens: Some(42),
            },
        );
        let policy = QuotaPolicy::new(20.0, overrides);
        assert_eq!(policy.ceiling("planner", 1000), 500);
        assert_eq!(policy.ceiling("batch", 1000), 42);
        assert_eq!(policy.ceiling("anyone", 1000), 200);
    }

    #[test]
    fn overreported_usage_is_capped_at_the_ceiling() {
        let mut ledger = ledger(1000);
        let r = ledger.reserve("alpha", 150).unwrap();
        ledger.settle(r, 400, 0.0);

        let usage = ledger.agent_usage("alpha");
        assert_eq!(usage.tokens_used_today, 200);
        assert!(usage.tokens_used_today <= usage.quota_ceiling);
        assert_eq!(usage.tokens_over_quota, 200);
        assert_eq!(usage.tokens_reserved, 0);
        assert_eq!(ledger.totals().daily_used, 200);
        assert_eq!(ledger.totals().over_quota, 200);
        assert!(ledger.check_agent_quota("alpha", 1).is_err());

        // A held reservation keeps its share of the headroom.
        let held = ledger.reserve("beta", 100).unwrap();
        assert_eq!(ledger.record_usage("beta", 500, 0.0), 100);
        ledger.release(held);
        assert_eq!(ledger.agent_usage("beta").tokens_used_today, 100);

        ledger.reset_counters();
        assert_eq!(ledger.totals().over_quota, 0);
        assert!(ledger.agents().is_empty());
    }

    #[test]
    fn service_limit_caps_recorded_usage() {
        let policy = Arc::new(QuotaPolicy::new(100.0, HashMap::new()));
        let mut ledger = ServiceLedger::new("openai", 500, policy, day(1));
        let a = ledger.reserve("a", 200).unwrap();
        let b = ledger.reserve("b", 200).unwrap();
        ledger.settle(a, 450, 0.0);
        ledger.settle(b, 200, 0.0);

        let totals = ledger.totals();
        assert_eq!(totals.daily_used, 500);
        assert!(totals.daily_used <= totals.daily_limit);
        assert_eq!(totals.over_quota, 150);
    }

    #[test]
    fn settle_records_actual_not_estimate() {
        let mut ledger = ledger(10_000);
        let r = ledger.reserve("alpha", 400).unwrap();
        ledger.settle(r, 320, 0.5);

        let usage = ledger.agent_usage("alpha");
        assert_eq!(usage.tokens_used_today, 320);
        assert_eq!(usage.requests_used_today, 1);
        assert_eq!(usage.tokens_reserved, 0);
        assert!((usage.cost_accrued_today - 0.5).abs() < 1e-12);
        assert_eq!(ledger.totals().reserved, 0);
    }

    #[test]
    fn sweep_is_idempotent_and_keeps_reservations() {
        let mut ledger = ledger(1000);
        let r = ledger.reserve("alpha", 100).unwrap();
        ledger.settle(r, 100, 0.2);
        let held = ledger.reserve("alpha", 50).unwrap();

        assert!(ledger.sweep(day(2)));
        let after_first = ledger.totals();
        assert!(!ledger.sweep(day(2)));
        assert!(!ledger.sweep(day(1)));
        assert_eq!(ledger.totals(), after_first);

        assert_eq!(after_first.daily_used, 0);
        assert_eq!(after_first.daily_cost, 0.0);
        assert_eq!(after_first.reserved, 50);
        assert_eq!(ledger.agent_usage("alpha").tokens_reserved, 50);

        ledger.release(held);
        assert_eq!(ledger.agent_usage("alpha").tokens_reserved, 0);
        assert_eq!(ledger.totals().reserved, 0);
    }

    #[test]
    fn unknown_agent_reports_zero_usage() {
        let ledger = ledger(1000);
        let usage = ledger.agent_usage("ghost");
        assert_eq!(usage.tokens_used_today, 0);
        assert_eq!(usage.quota_ceiling, 200);
    }
}
