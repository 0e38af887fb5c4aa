//! Admission decisions for one service.
//!
//! ```text
//! New ─┬─ quota exceeded ──────────────► Rejected (QuotaExceeded)
//!      ├─ larger than bucket capacity ─► Rejected (CapacityExceeded)
//!      ├─ queue empty, buckets cover ──► Dispatched
//!      ├─ queue full ──────────────────► Rejected (CapacityExceeded)
//!      └─ otherwise ───────────────────► Queued ─┬─► Dispatched
//!                                                ├─► TimedOut
//!                                                └─► Cancelled
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::oneshot;
use tokio::time::Instant;
use uuid::Uuid;

use tg_domain::config::{GatewaySettings, ServiceConfig};
use tg_domain::{Error, Result};

use crate::bucket::{Consume, ServiceLimiter};
use crate::ledger::{QuotaPolicy, Reservation, ServiceLedger};
use crate::queue::{QueueOutcome, QueuedRequest, ServiceQueue};

/// The admission-relevant part of a request.
#[derive(Debug, Clone)]
pub struct Ticket {
    pub request_id: Uuid,
    pub agent_id: String,
    pub estimated_tokens: u64,
    pub priority: u32,
}

/// Result of a successful admission.
#[derive(Debug)]
pub enum Admission {
    /// Buckets were debited; forward now.
    Dispatched(Reservation),
    /// Wait on `receiver` until dispatch, timeout or cancel.
    Queued {
        request_id: Uuid,
        deadline: Instant,
        receiver: oneshot::Receiver<QueueOutcome>,
    },
}

/// Counts from one [`ServiceSlot::drain`] pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub dispatched: usize,
    pub expired: usize,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ServiceSlot
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// All mutable admission state of one service. Lives behind one mutex.
pub struct ServiceSlot {
    pub service: String,
    pub limiter: ServiceLimiter,
    pub ledger: ServiceLedger,
    pub queue: ServiceQueue,
}

impl ServiceSlot {
    pub fn new(
        service: impl Into<String>,
        config: &ServiceConfig,
        policy: Arc<QuotaPolicy>,
        now: Instant,
        day: NaiveDate,
    ) -> Self {
        let service = service.into();
        Self {
            limiter: ServiceLimiter::new(config.tpm_limit, config.rpm_limit, now),
            ledger: ServiceLedger::new(service.clone(), config.daily_token_limit, policy, day),
            queue: ServiceQueue::new(),
            service,
        }
    }

    /// Expire overdue waiters, then dispatch from the head for as long as
    /// the buckets cover it.
    pub fn drain(&mut self, now: Instant) -> DrainReport {
        let mut report = DrainReport::default();

        for entry in self.queue.drain_expired(now) {
            let waited = now.saturating_duration_since(entry.enqueued_at);
            tracing::debug!(
                service = %self.service,
                agent_id = %entry.agent_id,
                request_id = %entry.request_id,
                waited_ms = waited.as_millis() as u64,
                "queued request expired"
            );
            self.ledger.release(entry.reservation);
            let _ = entry.notify.send(QueueOutcome::TimedOut { waited });
            report.expired += 1;
        }

        while let Some(head) = self.queue.peek() {
            let tokens = head.estimated_tokens;
            if let Consume::Insufficient(shortfall) = self.limiter.try_consume(now, tokens, 1) {
                tracing::trace!(
                    service = %self.service,
                    request_id = %head.request_id,
                    retry_after_ms = shortfall.retry_after.as_millis() as u64,
                    "queue head still throttled"
                );
                break;
            }
            let Some(entry) = self.queue.pop_front() else {
                break;
            };
            let queued_for = now.saturating_duration_since(entry.enqueued_at);
            tracing::debug!(
                service = %self.service,
                agent_id = %entry.agent_id,
                request_id = %entry.request_id,
                queue_time_ms = queued_for.as_millis() as u64,
                "dispatching queued request"
            );
            let outcome = QueueOutcome::Dispatched {
                reservation: entry.reservation,
                queued_for,
            };
            if let Err(QueueOutcome::Dispatched { reservation, .. }) = entry.notify.send(outcome) {
                // Caller is gone; nothing will settle this reservation.
                self.ledger.release(reservation);
            }
            report.dispatched += 1;
        }

        report
    }

    /// Remove a queued request and release its reservation.
    ///
    /// Returns `false` if it was not queued (already dispatched, expired or
    /// never seen).
    pub fn cancel(&mut self, request_id: &Uuid) -> bool {
        let Some(entry) = self.queue.remove(request_id) else {
            return false;
        };
        self.ledger.release(entry.reservation);
        let _ = entry.notify.send(QueueOutcome::Cancelled);
        true
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// AdmissionController
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Longest a request may wait in a queue. Larger configured timeouts are
/// clamped so that deadlines stay representable as an [`Instant`].
pub const MAX_QUEUE_TIMEOUT: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug, Clone)]
pub struct AdmissionController {
    max_queue_size: usize,
    queue_timeout: Duration,
}

impl AdmissionController {
    pub fn new(max_queue_size: usize, queue_timeout: Duration) -> Self {
        Self {
            max_queue_size,
            queue_timeout: queue_timeout.min(MAX_QUEUE_TIMEOUT),
        }
    }

    pub fn from_settings(settings: &GatewaySettings) -> Self {
        Self::new(settings.max_queue_size, settings.queue_timeout())
    }

    pub fn queue_timeout(&self) -> Duration {
        self.queue_timeout
    }

    /// Decide what happens to `ticket`. Must run under the service lock.
    pub fn admit(&self, slot: &mut ServiceSlot, now: Instant, ticket: Ticket) -> Result<Admission> {
        if slot.queue.contains(&ticket.request_id) {
            return Err(Error::InvalidRequest(format!(
                "request {} is already queued",
                ticket.request_id
            )));
        }

        slot.drain(now);

        let reservation = slot.ledger.reserve(&ticket.agent_id, ticket.estimated_tokens)?;

        if !slot.limiter.can_fit(ticket.estimated_tokens, 1) {
            slot.ledger.release(reservation);
            return Err(Error::CapacityExceeded {
                service: slot.service.clone(),
                reason: "request exceeds bucket capacity".into(),
            });
        }

        // Newcomers never overtake existing waiters.
        if slot.queue.is_empty() {
            match slot.limiter.try_consume(now, ticket.estimated_tokens, 1) {
                Consume::Admitted => return Ok(Admission::Dispatched(reservation)),
                Consume::Insufficient(shortfall) => {
                    tracing::debug!(
                        service = %slot.service,
                        agent_id = %ticket.agent_id,
                        request_id = %ticket.request_id,
                        missing_tokens = shortfall.tokens,
                        missing_requests = shortfall.requests,
                        retry_after_ms = shortfall.retry_after.as_millis() as u64,
                        "rate limited"
                    );
                }
            }
        }

        if slot.queue.len() >= self.max_queue_size {
            slot.ledger.release(reservation);
            return Err(Error::CapacityExceeded {
                service: slot.service.clone(),
                reason: format!("queue full ({} waiting)", slot.queue.len()),
            });
        }

        let (tx, rx) = oneshot::channel();
        let deadline = now
            .checked_add(self.queue_timeout)
            .unwrap_or_else(|| now + MAX_QUEUE_TIMEOUT);
        let entry = QueuedRequest {
            request_id: ticket.request_id,
            agent_id: ticket.agent_id,
            estimated_tokens: ticket.estimated_tokens,
            priority: ticket.priority,
            enqueued_at: now,
            deadline,
            reservation,
            notify: tx,
        };
        if let Err(entry) = slot.queue.push(entry) {
            slot.ledger.release(entry.reservation);
            return Err(Error::InvalidRequest(format!(
                "request {} is already queued",
                entry.request_id
            )));
        }

        Ok(Admission::Queued {
            request_id: ticket.request_id,
            deadline,
            receiver: rx,
        })
    }
}
