//! Admission-control primitives for metered provider services.
//!
//! Everything in this crate is synchronous and lock-agnostic except
//! [`registry`], which wraps each service's [`admission::ServiceSlot`] in its
//! own mutex so that different services never contend.

pub mod admission;
pub mod bucket;
pub mod clock;
pub mod cost;
pub mod ledger;
pub mod queue;
pub mod registry;

// Re-exports for convenience.
pub use admission::{Admission, AdmissionController, DrainReport, ServiceSlot, Ticket};
pub use bucket::{Consume, LimiterLevels, ServiceLimiter, Shortfall, TokenBucket};
pub use clock::{Clock, ManualClock, SystemClock};
pub use cost::{cost_of, CostCalculator};
pub use ledger::{AgentUsage, LedgerTotals, QuotaPolicy, Reservation, ServiceLedger};
pub use queue::{QueueOutcome, QueuedRequest, ServiceQueue};
pub use registry::{ServiceHandle, ServiceRegistry, ServiceStatus};
