//! One request's path: validate, price, admit, (wait), forward, settle.
//!
//! After admission the request is tracked by a [`RouteGuard`]. If the
//! caller's future is dropped at any await point the guard's `Drop` gives
//! back whatever the request holds and records it as cancelled.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use tg_domain::config::ModelPricing;
use tg_domain::request::{ProxyRequest, ProxyResponse};
use tg_domain::usage::{Outcome, UsageRecord};
use tg_domain::{Error, Result};
use tg_limits::{cost_of, Admission, QueueOutcome, Reservation, ServiceHandle, Ticket};
use tg_upstream::{TokenUsage, UpstreamError, UpstreamResponse};

use super::{Gateway, GatewayState};

impl Gateway {
    /// Route one request through admission and, if admitted, to the
    /// provider. Every call produces exactly one usage record.
    pub async fn route(&self, mut request: ProxyRequest) -> Result<ProxyResponse> {
        let request_id = *request.request_id.get_or_insert_with(Uuid::new_v4);
        let span = tracing::info_span!(
            "route",
            %request_id,
            service = %request.service,
            agent_id = %request.agent_id,
        );
        self.route_inner(request_id, request).instrument(span).await
    }

    async fn route_inner(&self, request_id: Uuid, request: ProxyRequest) -> Result<ProxyResponse> {
        let state = &*self.state;
        let mut attempt = Attempt {
            request_id,
            service: request.service.clone(),
            agent_id: request.agent_id.clone(),
            model: request.model().map(str::to_string),
            estimated_tokens: request.estimated_tokens,
            started: state.clock.now(),
        };

        let handle = state
            .registry
            .get(&request.service)
            .map_err(|e| attempt.reject(state, e))?;

        if request.agent_id.trim().is_empty() {
            let err = Error::InvalidRequest("agent_id must not be empty".into());
            return Err(attempt.reject(state, err));
        }

        // Price before admitting so a misconfigured model never spends tokens.
        if attempt.model.is_none() {
            attempt.model = handle.config().default_model.clone();
        }
        let pricing = match attempt.model.as_deref() {
            Some(model) => state.costs.price(&request.service, model),
            None => Err(Error::PricingNotFound {
                service: request.service.clone(),
                model: "(unspecified)".into(),
            }),
        }
        .map_err(|e| attempt.reject(state, e))?;

        let ticket = Ticket {
            request_id,
            agent_id: request.agent_id.clone(),
            estimated_tokens: request.estimated_tokens,
            priority: request.priority,
        };
        let admission = {
            let mut slot = handle.lock();
            state.admission.admit(&mut slot, state.clock.now(), ticket)
        }
        .map_err(|e| attempt.reject(state, e))?;

        let mut guard = RouteGuard::new(state, &handle, attempt);
        match admission {
            Admission::Dispatched(reservation) => guard.stage = Stage::InFlight(reservation),
            Admission::Queued {
                deadline, receiver, ..
            } => {
                tracing::debug!(priority = request.priority, "queued behind rate limit");
                handle.wake();
                guard.wait(receiver, deadline).await?;
            }
        }

        let forwarded_at = state.clock.now();
        let result = self.upstream.forward(handle.config(), &request).await;
        guard.complete(result, &pricing, forwarded_at)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Usage records
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What a record charges.
#[derive(Debug, Clone, Copy)]
struct Charge {
    tokens: u64,
    input_tokens: u64,
    output_tokens: u64,
    cost: f64,
}

impl Charge {
    /// The caller's estimate at zero cost, for every non-success outcome.
    fn estimate(tokens: u64) -> Self {
        Self {
            tokens,
            input_tokens: 0,
            output_tokens: 0,
            cost: 0.0,
        }
    }

    fn usage(usage: TokenUsage, cost: f64) -> Self {
        Self {
            tokens: usage.total(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cost,
        }
    }
}

struct Attempt {
    request_id: Uuid,
    service: String,
    agent_id: String,
    model: Option<String>,
    estimated_tokens: u64,
    started: Instant,
}

impl Attempt {
    fn record(
        &self,
        state: &GatewayState,
        outcome: Outcome,
        charge: Charge,
        queue_time: Duration,
    ) -> UsageRecord {
        UsageRecord {
            request_id: self.request_id,
            service: self.service.clone(),
            agent_id: self.agent_id.clone(),
            model: self.model.clone(),
            tokens: charge.tokens,
            input_tokens: charge.input_tokens,
            output_tokens: charge.output_tokens,
            cost: charge.cost,
            duration_ms: millis(state.clock.now().saturating_duration_since(self.started)),
            queue_time_ms: millis(queue_time),
            outcome,
            timestamp: state.clock.utc_now(),
        }
    }

    /// Record a terminal failure that happened before or during admission.
    fn reject(&self, state: &GatewayState, err: Error) -> Error {
        tracing::info!(outcome = %err.outcome(), error = %err, "request rejected");
        let charge = Charge::estimate(self.estimated_tokens);
        state.emit(self.record(state, err.outcome(), charge, Duration::ZERO));
        err
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RouteGuard
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

enum Stage {
    /// Waiting in the service queue.
    Queued(oneshot::Receiver<QueueOutcome>),
    /// Buckets debited; holding a quota reservation.
    InFlight(Reservation),
    /// Record emitted; nothing held.
    Done,
}

struct RouteGuard<'a> {
    state: &'a GatewayState,
    handle: &'a ServiceHandle,
    attempt: Attempt,
    queue_time: Duration,
    stage: Stage,
}

impl<'a> RouteGuard<'a> {
    fn new(state: &'a GatewayState, handle: &'a ServiceHandle, attempt: Attempt) -> Self {
        Self {
            state,
            handle,
            attempt,
            queue_time: Duration::ZERO,
            stage: Stage::Done,
        }
    }

    /// Wait for dispatch, timeout or cancel. On dispatch the guard moves to
    /// `InFlight`; otherwise the record is emitted and the error returned.
    async fn wait(
        &mut self,
        receiver: oneshot::Receiver<QueueOutcome>,
        deadline: Instant,
    ) -> Result<()> {
        self.stage = Stage::Queued(receiver);

        let woken = match &mut self.stage {
            Stage::Queued(rx) => {
                tokio::select! {
                    res = &mut *rx => res.ok(),
                    _ = tokio::time::sleep_until(deadline) => {
                        // Expire our own entry unless the dispatcher already
                        // removed it, in which case its outcome is in `rx`.
                        let now = self.state.clock.now();
                        let mut expired = None;
                        {
                            let mut slot = self.handle.lock();
                            if let Some(entry) = slot.queue.remove(&self.attempt.request_id) {
                                expired = Some(now.saturating_duration_since(entry.enqueued_at));
                                slot.ledger.release(entry.reservation);
                            }
                        }
                        match expired {
                            Some(waited) => Some(QueueOutcome::TimedOut { waited }),
                            None => (&mut *rx).await.ok(),
                        }
                    }
                }
            }
            _ => None,
        };
        self.stage = Stage::Done;

        match woken {
            Some(QueueOutcome::Dispatched {
                reservation,
                queued_for,
            }) => {
                self.queue_time = queued_for;
                self.stage = Stage::InFlight(reservation);
                Ok(())
            }
            Some(QueueOutcome::TimedOut { waited }) => {
                self.queue_time = waited;
                Err(self.fail(Error::TimedOut {
                    service: self.attempt.service.clone(),
                    waited_ms: millis(waited),
                }))
            }
            Some(QueueOutcome::Cancelled) | None => {
                self.queue_time = self
                    .state
                    .clock
                    .now()
                    .saturating_duration_since(self.attempt.started);
                Err(self.fail(Error::Cancelled(self.attempt.request_id)))
            }
        }
    }

    /// Settle the reservation against the provider's answer.
    fn complete(
        &mut self,
        result: std::result::Result<UpstreamResponse, UpstreamError>,
        pricing: &ModelPricing,
        forwarded_at: Instant,
    ) -> Result<ProxyResponse> {
        let Stage::InFlight(reservation) = std::mem::replace(&mut self.stage, Stage::Done) else {
            return Err(Error::Cancelled(self.attempt.request_id));
        };
        let request_time = self
            .state
            .clock
            .now()
            .saturating_duration_since(forwarded_at);
        let estimated = self.attempt.estimated_tokens;

        match result {
            Ok(resp) => {
                let usage = resp.usage.unwrap_or(TokenUsage {
                    input_tokens: estimated,
                    output_tokens: 0,
                });
                let cost = cost_of(pricing, usage.input_tokens, usage.output_tokens);
                self.handle.lock().ledger.settle(reservation, usage.total(), cost);
                self.handle.wake();

                tracing::info!(
                    status = resp.status,
                    tokens = usage.total(),
                    cost,
                    queue_time_ms = millis(self.queue_time),
                    request_time_ms = millis(request_time),
                    "request completed"
                );
                self.state.emit(self.attempt.record(
                    self.state,
                    Outcome::Success,
                    Charge::usage(usage, cost),
                    self.queue_time,
                ));

                Ok(ProxyResponse {
                    success: true,
                    request_id: self.attempt.request_id,
                    status_code: resp.status,
                    data: resp.body,
                    tokens_used: usage.total(),
                    cost,
                    queue_time_ms: millis(self.queue_time),
                    request_time_ms: millis(request_time),
                })
            }
            Err(e) => {
                // Tokens were spent on the attempt: charge the estimate, no refund.
                self.handle.lock().ledger.settle(reservation, estimated, 0.0);
                self.handle.wake();

                let err = e.into_domain(&self.attempt.service);
                tracing::warn!(error = %err, "upstream call failed");
                self.state.emit(self.attempt.record(
                    self.state,
                    Outcome::UpstreamError,
                    Charge::estimate(estimated),
                    self.queue_time,
                ));
                Err(err)
            }
        }
    }

    fn fail(&mut self, err: Error) -> Error {
        self.stage = Stage::Done;
        tracing::info!(
            outcome = %err.outcome(),
            queue_time_ms = millis(self.queue_time),
            "request left the queue without dispatch"
        );
        let charge = Charge::estimate(self.attempt.estimated_tokens);
        self.state
            .emit(self.attempt.record(self.state, err.outcome(), charge, self.queue_time));
        err
    }
}

impl Drop for RouteGuard<'_> {
    fn drop(&mut self) {
        match std::mem::replace(&mut self.stage, Stage::Done) {
            Stage::Done => return,
            Stage::Queued(mut rx) => {
                let mut slot = self.handle.lock();
                match slot.queue.remove(&self.attempt.request_id) {
                    Some(entry) => slot.ledger.release(entry.reservation),
                    None => {
                        if let Ok(QueueOutcome::Dispatched { reservation, .. }) = rx.try_recv() {
                            slot.ledger.release(reservation);
                        }
                    }
                }
            }
            Stage::InFlight(reservation) => {
                // The call may already have reached the provider.
                let estimated = self.attempt.estimated_tokens;
                self.handle.lock().ledger.settle(reservation, estimated, 0.0);
            }
        }
        self.handle.wake();

        let queue_time = self
            .state
            .clock
            .now()
            .saturating_duration_since(self.attempt.started);
        tracing::info!("request abandoned by caller");
        let charge = Charge::estimate(self.attempt.estimated_tokens);
        self.state.emit(self.attempt.record(
            self.state,
            Outcome::Cancelled,
            charge,
            queue_time,
        ));
    }
}
