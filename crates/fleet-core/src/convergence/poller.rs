//! Bounded readiness polling
//!
//! A poll session re-runs the load pipeline of the entity's stream every
//! `interval` and evaluates a [`Readiness`] predicate against the fresh view.
//! Progress and the single terminal outcome travel over one bounded channel,
//! so a consumer always sees updates before the completion.

use super::{Readiness, ViewProvider};
use crate::models::{EntityIdentity, ReconciledView};
use crate::observability::FleetMetrics;
use crate::reconcile::epoch::{EpochGuard, EpochToken, StreamId};
use crate::reconcile::profile::{InventoryScope, KindProfile};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

/// Completion detail when the entity disappeared
pub const DETAIL_NOT_FOUND: &str = "not found";
/// Completion detail when the attempt budget ran out
pub const DETAIL_TIMEOUT: &str = "timeout";
/// Completion detail reported locally for a cancelled session
pub const DETAIL_SUPERSEDED: &str = "superseded";

/// Attempt budget and pacing of one poll session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// Wait before each tick (default: 5 seconds)
    pub interval: Duration,
    /// Ticks before giving up (default: 60, a 5 minute budget)
    pub max_attempts: u32,
    /// Capacity of the event channel
    pub event_buffer: usize,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 60,
            event_buffer: 16,
        }
    }
}

impl PollPolicy {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Upper bound on how long a session can run, ignoring fetch latency
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

/// Lifecycle of a poll session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    Pending,
    Running,
    Ready,
    Exhausted,
    EntityGone,
    Superseded,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollState::Pending | PollState::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PollState::Pending => "pending",
            PollState::Running => "running",
            PollState::Ready => "ready",
            PollState::Exhausted => "exhausted",
            PollState::EntityGone => "entity_gone",
            PollState::Superseded => "superseded",
        }
    }
}

/// Terminal result of a poll session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollOutcome {
    pub identity: EntityIdentity,
    pub state: PollState,
    pub success: bool,
    pub detail: String,
    pub attempts: u32,
    /// Last view observed, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<ReconciledView>,
}

impl PollOutcome {
    fn ready(identity: EntityIdentity, view: ReconciledView, attempts: u32) -> Self {
        Self {
            identity,
            state: PollState::Ready,
            success: true,
            detail: view.status.label().to_string(),
            attempts,
            view: Some(view),
        }
    }

    fn gone(identity: EntityIdentity, attempts: u32) -> Self {
        Self {
            identity,
            state: PollState::EntityGone,
            success: false,
            detail: DETAIL_NOT_FOUND.to_string(),
            attempts,
            view: None,
        }
    }

    fn exhausted(identity: EntityIdentity, view: Option<ReconciledView>, attempts: u32) -> Self {
        Self {
            identity,
            state: PollState::Exhausted,
            success: false,
            detail: DETAIL_TIMEOUT.to_string(),
            attempts,
            view,
        }
    }

    fn superseded(identity: EntityIdentity) -> Self {
        Self {
            identity,
            state: PollState::Superseded,
            success: false,
            detail: DETAIL_SUPERSEDED.to_string(),
            attempts: 0,
            view: None,
        }
    }

    /// Last observed human-readable status
    pub fn last_status(&self) -> Option<String> {
        self.view.as_ref().map(|view| view.progress_label())
    }
}

/// Event emitted by a running session
#[derive(Debug, Clone)]
pub enum PollEvent {
    /// Interim status changed since the previous tick
    Progress { view: ReconciledView, attempt: u32 },
    /// Terminal outcome; always the last event
    Complete(PollOutcome),
}

/// Cancellation handle for one session
#[derive(Clone)]
pub struct SessionCancel {
    guard: Arc<EpochGuard>,
    token: EpochToken,
    wake: Arc<Notify>,
}

impl SessionCancel {
    /// Supersede the session. Returns false if it was already superseded.
    pub fn cancel(&self) -> bool {
        let cancelled = self.guard.invalidate(&self.token);
        self.wake.notify_one();
        cancelled
    }

    pub fn is_active(&self) -> bool {
        self.guard.is_current(&self.token)
    }
}

/// Consumer side of a poll session.
///
/// Dropping the handle abandons the session at its next tick.
pub struct PollHandle {
    identity: EntityIdentity,
    events: mpsc::Receiver<PollEvent>,
    cancel: SessionCancel,
}

impl std::fmt::Debug for PollHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollHandle")
            .field("identity", &self.identity)
            .field("active", &self.cancel.is_active())
            .finish_non_exhaustive()
    }
}

impl PollHandle {
    pub fn identity(&self) -> &EntityIdentity {
        &self.identity
    }

    pub fn canceller(&self) -> SessionCancel {
        self.cancel.clone()
    }

    pub fn cancel(&self) -> bool {
        self.cancel.cancel()
    }

    /// Next event, or `None` once the session has finished or was superseded
    pub async fn next_event(&mut self) -> Option<PollEvent> {
        if !self.cancel.is_active() {
            return None;
        }
        let event = self.events.recv().await?;
        // a cancel that raced with the send still hides the event
        if self.cancel.is_active() {
            Some(event)
        } else {
            None
        }
    }

    /// Drain the session to its outcome
    pub async fn wait(mut self) -> PollOutcome {
        while let Some(event) = self.next_event().await {
            if let PollEvent::Complete(outcome) = event {
                return outcome;
            }
        }
        PollOutcome::superseded(self.identity.clone())
    }
}

/// Runs poll sessions, at most one per identity
#[derive(Clone)]
pub struct ReadinessPoller {
    provider: Arc<dyn ViewProvider>,
    guard: Arc<EpochGuard>,
    sessions: Arc<DashMap<EntityIdentity, SessionCancel>>,
    metrics: FleetMetrics,
}

impl ReadinessPoller {
    pub fn new(provider: Arc<dyn ViewProvider>) -> Self {
        Self::with_guard(provider, Arc::new(EpochGuard::new()))
    }

    /// Share an existing epoch guard (poll streams are named `poll:<identity>`)
    pub fn with_guard(provider: Arc<dyn ViewProvider>, guard: Arc<EpochGuard>) -> Self {
        Self {
            provider,
            guard,
            sessions: Arc::new(DashMap::new()),
            metrics: FleetMetrics::new(),
        }
    }

    /// Start waiting for `identity` to satisfy `predicate`.
    ///
    /// Any session already running for the identity is cancelled before
    /// this call returns, and therefore before the new session's first tick.
    pub fn poll(&self, identity: EntityIdentity, predicate: Readiness, policy: PollPolicy) -> PollHandle {
        let cancel = match self.sessions.entry(identity.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().cancel() {
                    info!(identity = %identity, "Superseding running poll session");
                }
                let cancel = self.open_session(&identity);
                occupied.insert(cancel.clone());
                cancel
            }
            Entry::Vacant(vacant) => {
                let cancel = self.open_session(&identity);
                vacant.insert(cancel.clone());
                cancel
            }
        };

        let (events_tx, events_rx) = mpsc::channel(policy.event_buffer.max(1));

        info!(
            identity = %identity,
            predicate = predicate.name(),
            interval_ms = policy.interval.as_millis() as u64,
            max_attempts = policy.max_attempts,
            "Starting poll session"
        );

        let session = PollSession {
            identity: identity.clone(),
            predicate,
            policy,
            cancel: cancel.clone(),
            events: events_tx,
            provider: self.provider.clone(),
        };

        let sessions = self.sessions.clone();
        let guard = self.guard.clone();
        let metrics = self.metrics.clone();
        let token = cancel.token.clone();
        let session_identity = identity.clone();
        metrics.poll_started();

        tokio::spawn(async move {
            let state = session.run().await;
            // the entry lock keeps `poll` from opening a session meanwhile
            match sessions.entry(session_identity.clone()) {
                Entry::Occupied(occupied) if occupied.get().token == token => {
                    guard.retire(token.stream());
                    occupied.remove();
                }
                Entry::Occupied(_) => {}
                Entry::Vacant(_) => {
                    guard.retire(token.stream());
                }
            }
            metrics.poll_finished(state.as_str());
        });

        PollHandle {
            identity,
            events: events_rx,
            cancel,
        }
    }

    /// Cancel the active session for `identity`, if any
    pub fn cancel(&self, identity: &EntityIdentity) -> bool {
        self.sessions
            .remove(identity)
            .map(|(_, cancel)| cancel.cancel())
            .unwrap_or(false)
    }

    pub fn is_polling(&self, identity: &EntityIdentity) -> bool {
        self.sessions
            .get(identity)
            .map(|cancel| cancel.is_active())
            .unwrap_or(false)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    fn open_session(&self, identity: &EntityIdentity) -> SessionCancel {
        SessionCancel {
            guard: self.guard.clone(),
            token: self.guard.next_epoch(&StreamId::for_poll(identity)),
            wake: Arc::new(Notify::new()),
        }
    }
}

/// State owned by the task driving one session
struct PollSession {
    identity: EntityIdentity,
    predicate: Readiness,
    policy: PollPolicy,
    cancel: SessionCancel,
    events: mpsc::Sender<PollEvent>,
    provider: Arc<dyn ViewProvider>,
}

impl PollSession {
    fn is_live(&self) -> bool {
        self.cancel.is_active() && !self.events.is_closed()
    }

    async fn run(self) -> PollState {
        let kind = self.identity.kind;
        let profile = KindProfile::of(kind);
        let max_attempts = self.policy.max_attempts.max(1);
        let mut previous_label: Option<String> = None;
        let mut last_view: Option<ReconciledView> = None;

        for attempt in 1..=max_attempts {
            tokio::select! {
                _ = tokio::time::sleep(self.policy.interval) => {}
                _ = self.cancel.wake.notified() => {}
            }

            if !self.is_live() {
                debug!(identity = %self.identity, attempt, "Poll session superseded");
                return PollState::Superseded;
            }

            let observed = self.provider.observe(kind).await;

            // the fetch may have outlived the session
            if !self.is_live() {
                debug!(identity = %self.identity, attempt, "Discarding observation of superseded session");
                return PollState::Superseded;
            }

            let Some(set) = observed else {
                debug!(identity = %self.identity, attempt, "No usable observation this tick");
                continue;
            };

            match set.find(&self.identity) {
                // absence proves nothing while the only source is down
                None if !set.live_available && profile.inventory == InventoryScope::Untracked => {
                    debug!(identity = %self.identity, attempt, "Live source unavailable, skipping tick");
                }
                None => {
                    info!(identity = %self.identity, attempt, "Entity no longer present");
                    self.emit(PollEvent::Complete(PollOutcome::gone(self.identity.clone(), attempt)))
                        .await;
                    return PollState::EntityGone;
                }
                Some(view) if self.predicate.is_ready(view) => {
                    info!(
                        identity = %self.identity,
                        attempt,
                        status = %view.status,
                        "Entity converged"
                    );
                    let outcome = PollOutcome::ready(self.identity.clone(), view.clone(), attempt);
                    self.emit(PollEvent::Complete(outcome)).await;
                    return PollState::Ready;
                }
                Some(view) => {
                    let label = view.progress_label();
                    debug!(identity = %self.identity, attempt, status = %label, "Not converged yet");
                    if previous_label.as_deref() != Some(label.as_str()) {
                        self.emit(PollEvent::Progress {
                            view: view.clone(),
                            attempt,
                        })
                        .await;
                    }
                    previous_label = Some(label);
                    last_view = Some(view.clone());
                }
            }
        }

        warn!(
            identity = %self.identity,
            attempts = max_attempts,
            last_status = previous_label.as_deref().unwrap_or("unobserved"),
            "Poll budget exhausted"
        );
        let outcome = PollOutcome::exhausted(self.identity.clone(), last_view, max_attempts);
        self.emit(PollEvent::Complete(outcome)).await;
        PollState::Exhausted
    }

    async fn emit(&self, event: PollEvent) {
        if !self.cancel.is_active() {
            return;
        }
        if self.events.send(event).await.is_err() {
            debug!(identity = %self.identity, "Poll handle dropped, event discarded");
        }
    }
}
