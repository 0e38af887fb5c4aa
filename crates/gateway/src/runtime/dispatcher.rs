//! Per-service dispatch loop.
//!
//! Wakes on a fixed tick and on explicit wake signals (enqueue, completion,
//! reset), then drains the service queue: expired waiters are timed out and
//! heads are dispatched while the buckets cover them.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use tg_limits::{Clock, ServiceHandle};

pub async fn run(
    handle: Arc<ServiceHandle>,
    clock: Arc<dyn Clock>,
    tick: Duration,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::debug!(service = %handle.name(), tick_ms = tick.as_millis() as u64, "dispatcher started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
            _ = handle.woken() => {}
        }

        let report = handle.lock().drain(clock.now());
        if report.dispatched > 0 || report.expired > 0 {
            tracing::debug!(
                service = %handle.name(),
                dispatched = report.dispatched,
                expired = report.expired,
                "queue drained"
            );
        }
    }

    tracing::debug!(service = %handle.name(), "dispatcher stopped");
}
