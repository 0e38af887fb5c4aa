//! Configuration-driven registry of metered services.
//!
//! Each service's limiter, ledger and queue sit behind their own
//! `parking_lot::Mutex`, so traffic to one provider never contends with
//! another. A per-service [`Notify`] wakes that service's dispatcher.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::{Mutex, MutexGuard};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::Instant;

use tg_domain::config::{Config, ServiceConfig};
use tg_domain::{Error, Result};

use crate::admission::ServiceSlot;
use crate::bucket::Consume;
use crate::ledger::{AgentUsage, QuotaPolicy};

/// Read-only view of one service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStatus {
    pub service: String,
    pub tpm_available: u64,
    pub tpm_limit: u64,
    pub rpm_available: u64,
    pub rpm_limit: u64,
    pub daily_used: u64,
    pub daily_limit: u64,
    pub daily_requests: u64,
    pub daily_cost: f64,
    pub reserved: u64,
    pub queue_size: usize,
    pub day: NaiveDate,
}

/// One registered service.
pub struct ServiceHandle {
    name: String,
    config: ServiceConfig,
    slot: Mutex<ServiceSlot>,
    wake: Notify,
}

impl ServiceHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Lock the service's admission state. Never hold across an `.await`.
    pub fn lock(&self) -> MutexGuard<'_, ServiceSlot> {
        self.slot.lock()
    }

    /// Wake the dispatcher. Coalesces if it is already awake.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Resolves on the next [`ServiceHandle::wake`].
    pub async fn woken(&self) {
        self.wake.notified().await;
    }

    pub fn status(&self, now: Instant) -> ServiceStatus {
        let slot = self.lock();
        let levels = slot.limiter.levels(now);
        let totals = slot.ledger.totals();
        ServiceStatus {
            service: self.name.clone(),
            tpm_available: levels.tpm_available.floor() as u64,
            tpm_limit: self.config.tpm_limit,
            rpm_available: levels.rpm_available.floor() as u64,
            rpm_limit: self.config.rpm_limit,
            daily_used: totals.daily_used,
            daily_limit: totals.daily_limit,
            daily_requests: totals.daily_requests,
            daily_cost: totals.daily_cost,
            reserved: totals.reserved,
            queue_size: slot.queue.len(),
            day: totals.day,
        }
    }
}

/// All configured services, keyed by name.
pub struct ServiceRegistry {
    services: HashMap<String, Arc<ServiceHandle>>,
}

impl ServiceRegistry {
    pub fn from_config(config: &Config, now: Instant, day: NaiveDate) -> Self {
        let policy = Arc::new(QuotaPolicy::from_config(config));
        let services = config
            .services
            .iter()
            .map(|(name, svc)| {
                tracing::debug!(
                    service = %name,
                    tpm_limit = svc.tpm_limit,
                    rpm_limit = svc.rpm_limit,
                    daily_token_limit = svc.daily_token_limit,
                    "registering service"
                );
                let handle = ServiceHandle {
                    name: name.clone(),
                    config: svc.clone(),
                    slot: Mutex::new(ServiceSlot::new(
                        name.clone(),
                        svc,
                        policy.clone(),
                        now,
                        day,
                    )),
                    wake: Notify::new(),
                };
                (name.clone(), Arc::new(handle))
            })
            .collect();
        Self { services }
    }

    pub fn get(&self, service: &str) -> Result<Arc<ServiceHandle>> {
        self.services
            .get(service)
            .cloned()
            .ok_or_else(|| Error::UnknownService(service.to_string()))
    }

    /// Service names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.services.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn handles(&self) -> impl Iterator<Item = &Arc<ServiceHandle>> {
        self.services.values()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn try_consume(&self, service: &str, now: Instant, tokens: u64, requests: u64) -> Result<Consume> {
        Ok(self.get(service)?.lock().limiter.try_consume(now, tokens, requests))
    }

    pub fn check_agent_quota(&self, service: &str, agent_id: &str, tokens: u64) -> Result<()> {
        self.get(service)?.lock().ledger.check_agent_quota(agent_id, tokens)
    }

    pub fn record_usage(&self, service: &str, agent_id: &str, tokens: u64, cost: f64) -> Result<()> {
        self.get(service)?
            .lock()
            .ledger
            .record_usage(agent_id, tokens, cost);
        Ok(())
    }

    /// Roll every ledger over to `day`. Ledgers already on `day` are left
    /// alone. Returns how many were zeroed.
    pub fn sweep_all(&self, day: NaiveDate) -> usize {
        let swept = self
            .handles()
            .filter(|h| h.lock().ledger.sweep(day))
            .count();
        if swept > 0 {
            self.wake_all();
        }
        swept
    }

    /// Zero every ledger's counters for `day`, whether or not it already
    /// rolled over.
    pub fn reset_all(&self, day: NaiveDate) {
        for handle in self.handles() {
            let mut slot = handle.lock();
            if !slot.ledger.sweep(day) {
                slot.ledger.reset_counters();
            }
        }
        self.wake_all();
    }

    pub fn wake_all(&self) {
        for handle in self.handles() {
            handle.wake();
        }
    }

    /// Status of every service, sorted by name.
    pub fn statuses(&self, now: Instant) -> Vec<ServiceStatus> {
        let mut out: Vec<_> = self.handles().map(|h| h.status(now)).collect();
        out.sort_by(|a, b| a.service.cmp(&b.service));
        out
    }

    /// One agent's usage on every service.
    pub fn agent_usage(&self, agent_id: &str) -> Vec<AgentUsage> {
        let mut out: Vec<_> = self
            .handles()
            .map(|h| h.lock().ledger.agent_usage(agent_id))
            .collect();
        out.sort_by(|a, b| a.service.cmp(&b.service));
        out
    }

    /// Usage of every agent seen today, across all services.
    pub fn all_agent_usage(&self) -> Vec<AgentUsage> {
        let mut out: Vec<_> = self
            .handles()
            .flat_map(|h| h.lock().ledger.agents())
            .collect();
        out.sort_by(|a, b| (&a.agent_id, &a.service).cmp(&(&b.agent_id, &b.service)));
        out
    }
}
