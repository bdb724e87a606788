//! Readiness predicates evaluated on every poll tick

use crate::models::{EntityKind, FleetStatus, ReconciledView};
use std::fmt;
use std::sync::Arc;

/// Condition a poll session waits for
#[derive(Clone)]
pub enum Readiness {
    /// `ready == desired && desired > 0`; for daemonsets the counts are nodes
    ReplicasConverged,
    /// Live status is `Running`
    PodRunning,
    /// Reconciled status is `ONLINE_REGISTERED_READY`
    NodeReady,
    /// Any successful observation of the entity
    Observed,
    Custom(Arc<dyn Fn(&ReconciledView) -> bool + Send + Sync>),
}

impl Readiness {
    /// Default predicate for a kind
    pub fn for_kind(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Deployment | EntityKind::StatefulSet | EntityKind::DaemonSet => {
                Readiness::ReplicasConverged
            }
            EntityKind::Pod => Readiness::PodRunning,
            EntityKind::Node => Readiness::NodeReady,
            _ => Readiness::Observed,
        }
    }

    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&ReconciledView) -> bool + Send + Sync + 'static,
    {
        Readiness::Custom(Arc::new(predicate))
    }

    pub fn is_ready(&self, view: &ReconciledView) -> bool {
        match self {
            // a desired count of zero has nothing to converge toward
            Readiness::ReplicasConverged => view
                .replicas()
                .map(|r| r.desired > 0 && r.ready == r.desired)
                .unwrap_or(false),
            Readiness::PodRunning => view
                .live
                .as_ref()
                .map(|live| live.status_is("Running"))
                .unwrap_or(false),
            Readiness::NodeReady => view.status == FleetStatus::OnlineRegisteredReady,
            Readiness::Observed => true,
            Readiness::Custom(predicate) => predicate(view),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Readiness::ReplicasConverged => "replicas_converged",
            Readiness::PodRunning => "pod_running",
            Readiness::NodeReady => "node_ready",
            Readiness::Observed => "observed",
            Readiness::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
