//! Stream reconciler
//!
//! One `load` is a full cycle for one entity kind: take a fresh epoch, fetch
//! inventory and live state concurrently, merge, and commit the result only
//! if no newer load of the same stream was issued in the meantime.
//!
//! Kinds the inventory does not track are built from live data alone; their
//! loads never touch the inventory source.

use super::epoch::{EpochGuard, EpochToken, StreamId};
use super::merge::merge;
use super::profile::{InventoryScope, KindProfile};
use crate::convergence::ViewProvider;
use crate::health::{components, HealthRegistry};
use crate::models::{EntityKind, FleetStatus, LiveFetch, ReconciledSet};
use crate::observability::FleetMetrics;
use crate::source::{InventorySource, LiveSource};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Result of one load cycle
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    /// The merged set was committed
    Applied(Arc<ReconciledSet>),
    /// A newer load of the same stream was issued; the result was discarded
    Superseded,
    /// Inventory could not be fetched; the last good set stays in place
    Failed { error: String },
}

impl LoadOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadOutcome::Applied(_) => "applied",
            LoadOutcome::Superseded => "superseded",
            LoadOutcome::Failed { .. } => "failed",
        }
    }

    pub fn applied(&self) -> Option<&Arc<ReconciledSet>> {
        match self {
            LoadOutcome::Applied(set) => Some(set),
            _ => None,
        }
    }
}

/// What a stream currently shows: the last committed set plus an inline
/// error when the most recent load failed.
#[derive(Debug, Clone, Default)]
pub struct StreamSnapshot {
    pub set: Option<Arc<ReconciledSet>>,
    pub error: Option<String>,
}

/// Notification that a stream committed a new set
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamUpdate {
    pub kind: EntityKind,
    pub epoch: u64,
    pub entities: usize,
    pub live_available: bool,
}

pub struct Reconciler {
    inventory: Arc<dyn InventorySource>,
    live: Arc<dyn LiveSource>,
    guard: Arc<EpochGuard>,
    streams: DashMap<EntityKind, StreamSnapshot>,
    updates: broadcast::Sender<StreamUpdate>,
    health: Option<HealthRegistry>,
    metrics: FleetMetrics,
}

impl Reconciler {
    pub fn builder() -> ReconcilerBuilder {
        ReconcilerBuilder::new()
    }

    pub fn guard(&self) -> Arc<EpochGuard> {
        self.guard.clone()
    }

    /// Run one load cycle for `kind`
    pub async fn load(&self, kind: EntityKind) -> LoadOutcome {
        let stream = StreamId::for_kind(kind);
        let token = self.guard.next_epoch(&stream);
        let start = Instant::now();

        debug!(stream = %stream, epoch = token.value(), "Loading stream");

        let tracked = KindProfile::of(kind).inventory == InventoryScope::Tracked;
        let (inventory, live) = tokio::join!(
            async {
                if tracked {
                    self.inventory.list_inventory(kind).await
                } else {
                    Ok(Vec::new())
                }
            },
            self.live.list_live(kind)
        );

        let live = match live {
            Ok(records) => LiveFetch::Available(records),
            Err(e) => {
                warn!(stream = %stream, error = %e, "Live source unavailable");
                LiveFetch::unavailable(e.to_string())
            }
        };
        let live_error = match &live {
            LiveFetch::Unavailable { reason } => Some(reason.clone()),
            LiveFetch::Available(_) => None,
        };

        let outcome = match inventory {
            Ok(records) => {
                let views = merge(&records, &live);
                let set = ReconciledSet {
                    kind,
                    views,
                    live_available: live.is_available(),
                    epoch: token.value(),
                    fetched_at: Utc::now(),
                };
                self.commit(kind, &token, set)
            }
            Err(e) => self.annotate(kind, &token, e.to_string()),
        };

        let elapsed = start.elapsed();
        self.metrics
            .record_load(stream.as_str(), outcome.as_str(), elapsed.as_secs_f64());

        match &outcome {
            LoadOutcome::Applied(set) => {
                info!(
                    stream = %stream,
                    epoch = set.epoch,
                    entities = set.views.len(),
                    live_available = set.live_available,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Stream committed"
                );
                for status in FleetStatus::ALL {
                    self.metrics.set_reconciled(
                        stream.as_str(),
                        status.as_str(),
                        set.count_by_status(status) as i64,
                    );
                }
                let _ = self.updates.send(StreamUpdate {
                    kind,
                    epoch: set.epoch,
                    entities: set.views.len(),
                    live_available: set.live_available,
                });
            }
            LoadOutcome::Superseded => {
                debug!(stream = %stream, epoch = token.value(), "Discarding superseded load");
            }
            LoadOutcome::Failed { error } => {
                warn!(stream = %stream, epoch = token.value(), error = %error, "Inventory fetch failed, keeping last good set");
            }
        }

        if !matches!(outcome, LoadOutcome::Superseded) {
            self.report_health(&outcome, tracked, live_error).await;
        }

        outcome
    }

    /// Load `kind` on a background task
    pub fn spawn_load(self: &Arc<Self>, kind: EntityKind) -> JoinHandle<LoadOutcome> {
        let reconciler = self.clone();
        tokio::spawn(async move { reconciler.load(kind).await })
    }

    pub fn snapshot(&self, kind: EntityKind) -> Option<StreamSnapshot> {
        self.streams.get(&kind).map(|snapshot| snapshot.clone())
    }

    /// Kinds that have been loaded at least once
    pub fn loaded_kinds(&self) -> Vec<EntityKind> {
        let mut kinds: Vec<_> = self.streams.iter().map(|entry| *entry.key()).collect();
        kinds.sort_by_key(|kind| kind.as_str());
        kinds
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamUpdate> {
        self.updates.subscribe()
    }

    // The epoch check runs under the stream's entry lock, so a stale load can
    // never overwrite a set committed by a newer one.
    fn commit(&self, kind: EntityKind, token: &EpochToken, set: ReconciledSet) -> LoadOutcome {
        let mut snapshot = self.streams.entry(kind).or_default();
        if !self.guard.is_current(token) {
            return LoadOutcome::Superseded;
        }
        let set = Arc::new(set);
        snapshot.set = Some(set.clone());
        snapshot.error = None;
        LoadOutcome::Applied(set)
    }

    fn annotate(&self, kind: EntityKind, token: &EpochToken, error: String) -> LoadOutcome {
        let mut snapshot = self.streams.entry(kind).or_default();
        if !self.guard.is_current(token) {
            return LoadOutcome::Superseded;
        }
        snapshot.error = Some(error.clone());
        LoadOutcome::Failed { error }
    }

    async fn report_health(&self, outcome: &LoadOutcome, tracked: bool, live_error: Option<String>) {
        let Some(health) = &self.health else {
            return;
        };

        match outcome {
            LoadOutcome::Failed { error } => {
                health
                    .set_degraded(components::INVENTORY_SOURCE, error.clone())
                    .await
            }
            _ => {
                if tracked {
                    health.set_healthy(components::INVENTORY_SOURCE).await;
                }
                health.set_ready(true).await;
            }
        }

        match live_error {
            Some(reason) => health.set_degraded(components::LIVE_SOURCE, reason).await,
            None => health.set_healthy(components::LIVE_SOURCE).await,
        }
    }
}

#[async_trait]
impl ViewProvider for Reconciler {
    async fn observe(&self, kind: EntityKind) -> Option<Arc<ReconciledSet>> {
        match self.load(kind).await {
            LoadOutcome::Applied(set) => Some(set),
            // someone else loaded the stream meanwhile; their result is fresher
            LoadOutcome::Superseded => self.snapshot(kind).and_then(|snapshot| snapshot.set),
            LoadOutcome::Failed { .. } => None,
        }
    }
}

/// Builder for [`Reconciler`]
pub struct ReconcilerBuilder {
    inventory: Option<Arc<dyn InventorySource>>,
    live: Option<Arc<dyn LiveSource>>,
    guard: Option<Arc<EpochGuard>>,
    health: Option<HealthRegistry>,
    update_buffer: usize,
}

impl ReconcilerBuilder {
    pub fn new() -> Self {
        Self {
            inventory: None,
            live: None,
            guard: None,
            health: None,
            update_buffer: 64,
        }
    }

    pub fn inventory(mut self, source: Arc<dyn InventorySource>) -> Self {
        self.inventory = Some(source);
        self
    }

    pub fn live(mut self, source: Arc<dyn LiveSource>) -> Self {
        self.live = Some(source);
        self
    }

    /// Use one backend for both reads
    pub fn sources<S>(self, source: Arc<S>) -> Self
    where
        S: InventorySource + LiveSource + 'static,
    {
        self.inventory(source.clone()).live(source)
    }

    /// Share an epoch guard with other components
    pub fn guard(mut self, guard: Arc<EpochGuard>) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn update_buffer(mut self, size: usize) -> Self {
        self.update_buffer = size;
        self
    }

    pub fn build(self) -> Result<Reconciler> {
        let inventory = self
            .inventory
            .ok_or_else(|| anyhow::anyhow!("Inventory source is required"))?;
        let live = self
            .live
            .ok_or_else(|| anyhow::anyhow!("Live source is required"))?;
        let (updates, _) = broadcast::channel(self.update_buffer.max(1));

        Ok(Reconciler {
            inventory,
            live,
            guard: self.guard.unwrap_or_default(),
            streams: DashMap::new(),
            updates,
            health: self.health,
            metrics: FleetMetrics::new(),
        })
    }
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
