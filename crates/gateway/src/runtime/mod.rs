//! The admission gateway: per-service limits, quotas and queues in front of
//! an [`Upstream`].
//!
//! [`GatewayState`] owns every piece of mutable state; nothing is global, so
//! several gateways can live in one process (tests rely on this).

pub mod dispatcher;
pub mod reset;
mod route;
pub mod sink;
pub mod stats;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use tg_domain::config::{Config, GatewaySettings};
use tg_domain::usage::UsageRecord;
use tg_domain::Result;
use tg_limits::{
    AdmissionController, AgentUsage, Clock, CostCalculator, ServiceRegistry, ServiceStatus,
};
use tg_upstream::Upstream;

use self::sink::UsageSink;
use self::stats::{GatewayStats, StatsSnapshot};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GatewayState
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct GatewayState {
    settings: GatewaySettings,
    registry: ServiceRegistry,
    admission: AdmissionController,
    costs: CostCalculator,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn UsageSink>,
    stats: GatewayStats,
    /// Held while a daily or manual reset is sweeping the ledgers.
    resetting: AtomicBool,
}

impl GatewayState {
    pub fn new(config: &Config, clock: Arc<dyn Clock>, sink: Arc<dyn UsageSink>) -> Self {
        let registry =
            ServiceRegistry::from_config(config, clock.now(), clock.utc_now().date_naive());
        Self {
            settings: config.gateway.clone(),
            admission: AdmissionController::from_settings(&config.gateway),
            costs: CostCalculator::new(config.pricing.clone()),
            registry,
            clock,
            sink,
            stats: GatewayStats::new(),
            resetting: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn emit(&self, record: UsageRecord) {
        self.stats.record(&record);
        self.sink.emit(&record);
    }

    /// Roll ledgers over to `day`. `None` if another reset holds the guard.
    pub fn sweep(&self, day: NaiveDate) -> Option<usize> {
        self.with_reset_guard(|| self.registry.sweep_all(day))
    }

    /// Zero today's counters on every service. `None` if another reset
    /// holds the guard.
    pub fn reset(&self) -> Option<NaiveDate> {
        self.with_reset_guard(|| {
            let today = self.clock.utc_now().date_naive();
            self.registry.reset_all(today);
            today
        })
    }

    fn with_reset_guard<T>(&self, f: impl FnOnce() -> T) -> Option<T> {
        if self
            .resetting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        let out = f();
        self.resetting.store(false, Ordering::Release);
        Some(out)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Gateway
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cheap to clone; all clones share one [`GatewayState`].
#[derive(Clone)]
pub struct Gateway {
    state: Arc<GatewayState>,
    upstream: Arc<dyn Upstream>,
}

impl Gateway {
    pub fn new(
        config: &Config,
        upstream: Arc<dyn Upstream>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn UsageSink>,
    ) -> Self {
        Self {
            state: Arc::new(GatewayState::new(config, clock, sink)),
            upstream,
        }
    }

    pub fn state(&self) -> &Arc<GatewayState> {
        &self.state
    }

    /// Remove a queued request. The waiting caller resolves with
    /// `Cancelled`. Returns `false` if the request is not queued anywhere.
    pub fn cancel(&self, request_id: &Uuid) -> bool {
        for handle in self.state.registry.handles() {
            if handle.lock().cancel(request_id) {
                tracing::info!(service = %handle.name(), %request_id, "queued request cancelled");
                handle.wake();
                return true;
            }
        }
        false
    }

    pub fn statuses(&self) -> Vec<ServiceStatus> {
        self.state.registry.statuses(self.state.clock.now())
    }

    pub fn status(&self, service: &str) -> Result<ServiceStatus> {
        Ok(self.state.registry.get(service)?.status(self.state.clock.now()))
    }

    pub fn agent_usage(&self, agent_id: &str) -> Vec<AgentUsage> {
        self.state.registry.agent_usage(agent_id)
    }

    pub fn all_agent_usage(&self) -> Vec<AgentUsage> {
        self.state.registry.all_agent_usage()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.state.stats.snapshot()
    }

    /// Manual daily reset. Idempotent: a second call finds nothing to zero.
    pub fn reset_daily_counters(&self) -> Option<NaiveDate> {
        let day = self.state.reset()?;
        tracing::info!(%day, "daily counters reset manually");
        Some(day)
    }

    /// Start one dispatcher per service plus the daily reset timer. All
    /// stop when `shutdown` is cancelled.
    pub fn spawn_background(&self, shutdown: &CancellationToken) -> Vec<JoinHandle<()>> {
        let tick = self.state.settings.dispatch_tick();
        let mut tasks: Vec<JoinHandle<()>> = self
            .state
            .registry
            .handles()
            .map(|handle| {
                tokio::spawn(dispatcher::run(
                    handle.clone(),
                    self.state.clock.clone(),
                    tick,
                    shutdown.clone(),
                ))
            })
            .collect();
        let dispatchers = tasks.len();
        tasks.push(tokio::spawn(reset::run(self.state.clone(), shutdown.clone())));
        tracing::info!(dispatchers, tick_ms = tick.as_millis() as u64, "background tasks spawned");
        tasks
    }
}
