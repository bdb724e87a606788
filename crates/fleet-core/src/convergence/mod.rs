//! Convergence tracking after mutating commands
//!
//! Provides:
//! - Readiness predicates per entity kind
//! - A bounded poller that re-observes an entity until it converges,
//!   disappears, runs out of attempts or is superseded

mod poller;
mod predicate;


pub use poller::{
    PollEvent, PollHandle, PollOutcome, PollPolicy, PollState, ReadinessPoller, SessionCancel,
    DETAIL_NOT_FOUND, DETAIL_SUPERSEDED, DETAIL_TIMEOUT,
};
pub use predicate::Readiness;

use crate::models::{EntityKind, ReconciledSet};
use async_trait::async_trait;
use std::sync::Arc;

/// Fresh reconciled views for the poller.
///
/// `observe` runs one full load of the kind's stream. `None` means the tick
/// produced no usable observation (the load failed before anything could be
/// committed).
#[async_trait]
pub trait ViewProvider: Send + Sync {
    async fn observe(&self, kind: EntityKind) -> Option<Arc<ReconciledSet>>;
}
