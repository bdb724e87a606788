//! Periodic stream refresh
//!
//! Reloads a fixed list of streams at a configurable interval with jitter.
//! Refresh loads race with operator-triggered ones; the epoch guard decides
//! which result is committed.

use super::reconciler::{LoadOutcome, Reconciler};
use crate::models::EntityKind;
use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Base refresh interval (default: 15 seconds)
    pub interval: Duration,
    /// Maximum jitter added to each interval (default: 1 second)
    pub jitter: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            jitter: Duration::from_secs(1),
        }
    }
}

pub struct RefreshLoop {
    reconciler: Arc<Reconciler>,
    streams: Vec<EntityKind>,
    config: RefreshConfig,
}

impl RefreshLoop {
    pub fn new(reconciler: Arc<Reconciler>, streams: Vec<EntityKind>, config: RefreshConfig) -> Self {
        Self {
            reconciler,
            streams,
            config,
        }
    }

    /// Streams reloaded each cycle, in order
    pub fn streams(&self) -> &[EntityKind] {
        &self.streams
    }

    /// Run until the shutdown channel fires. The first cycle starts
    /// immediately.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            streams = self.streams.len(),
            "Starting stream refresh loop"
        );

        let mut ticker = interval(self.next_interval());
        let mut cycles = 0u64;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let start = Instant::now();
                    let results = self.refresh_all().await;
                    cycles += 1;

                    debug!(
                        cycle = cycles,
                        applied = results.applied,
                        superseded = results.superseded,
                        failed = results.failed,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Refresh cycle complete"
                    );

                    // interval() fires immediately, so consume that tick
                    ticker = interval(self.next_interval());
                    ticker.tick().await;
                }
                _ = shutdown.recv() => {
                    info!(cycles, "Shutting down stream refresh loop");
                    break;
                }
            }
        }
    }

    fn next_interval(&self) -> Duration {
        self.config.interval + Duration::from_millis(rand_jitter(self.config.jitter.as_millis() as u64))
    }

    async fn refresh_all(&self) -> RefreshResults {
        let mut results = RefreshResults::default();

        for kind in &self.streams {
            match self.reconciler.load(*kind).await {
                LoadOutcome::Applied(_) => results.applied += 1,
                LoadOutcome::Superseded => results.superseded += 1,
                LoadOutcome::Failed { error } => {
                    results.failed += 1;
                    warn!(stream = kind.plural(), error = %error, "Scheduled refresh failed");
                }
            }
        }

        results
    }
}

#[derive(Debug, Default)]
struct RefreshResults {
    applied: usize,
    superseded: usize,
    failed: usize,
}

/// Pseudo-random jitter in `[0, max_ms)`
fn rand_jitter(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;

    now % max_ms
}

pub struct RefreshLoopBuilder {
    reconciler: Option<Arc<Reconciler>>,
    streams: Vec<EntityKind>,
    config: RefreshConfig,
}

impl RefreshLoopBuilder {
    pub fn new() -> Self {
        Self {
            reconciler: None,
            streams: Vec::new(),
            config: RefreshConfig::default(),
        }
    }

    pub fn reconciler(mut self, reconciler: Arc<Reconciler>) -> Self {
        self.reconciler = Some(reconciler);
        self
    }

    pub fn streams(mut self, streams: impl IntoIterator<Item = EntityKind>) -> Self {
        self.streams = streams.into_iter().collect();
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.config.jitter = jitter;
        self
    }

    pub fn build(self) -> Result<RefreshLoop> {
        let reconciler = self
            .reconciler
            .ok_or_else(|| anyhow::anyhow!("Reconciler is required"))?;
        if self.streams.is_empty() {
            anyhow::bail!("At least one stream must be refreshed");
        }

        let mut seen = HashSet::new();
        let streams: Vec<_> = self
            .streams
            .into_iter()
            .filter(|kind| seen.insert(*kind))
            .collect();

        Ok(RefreshLoop::new(reconciler, streams, self.config))
    }
}

impl Default for RefreshLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
