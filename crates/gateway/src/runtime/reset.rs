//! Daily quota reset at UTC midnight.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, NaiveDate, Utc};
use tokio_util::sync::CancellationToken;

use super::GatewayState;

/// Pause between attempts while a manual reset holds the guard.
const SWEEP_RETRY: Duration = Duration::from_millis(100);

/// The first UTC midnight strictly after `now`.
pub fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.date_naive();
    let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(today);
    tomorrow
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(now)
}

/// Sleep until each UTC midnight and sweep every ledger over to the new day.
pub async fn run(state: Arc<GatewayState>, shutdown: CancellationToken) {
    loop {
        let now = state.clock.utc_now();
        let next = next_utc_midnight(now);
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        tracing::debug!(next_reset = %next.to_rfc3339(), "daily reset scheduled");

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        let day = next.date_naive();
        match sweep_until_done(&state, day, &shutdown).await {
            Some(swept) => tracing::info!(%day, services = swept, "daily quota reset"),
            None => break,
        }
    }
}

/// Sweep to `day`, waiting out a concurrent manual reset rather than
/// skipping the rollover. `None` only on shutdown.
async fn sweep_until_done(
    state: &GatewayState,
    day: NaiveDate,
    shutdown: &CancellationToken,
) -> Option<usize> {
    loop {
        if let Some(swept) = state.sweep(day) {
            return Some(swept);
        }
        tracing::debug!(%day, "daily reset waiting for a manual reset to finish");
        tokio::select! {
            _ = shutdown.cancelled() => return None,
            _ = tokio::time::sleep(SWEEP_RETRY) => {}
        }
    }
}
