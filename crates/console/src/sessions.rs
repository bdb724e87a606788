//! Convergence board
//!
//! Consumes the [`PollHandle`] of every converging command on its own task
//! and keeps the latest report per identity for `/api/v1/sessions`.
//! Finished reports are dropped once they are older than the retention
//! window.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use fleet_core::convergence::{PollEvent, PollHandle, PollState};
use fleet_core::models::EntityIdentity;
use fleet_core::observability::AuditLogger;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub identity: EntityIdentity,
    pub command: String,
    pub state: PollState,
    pub attempt: u32,
    /// Last observed progress label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Board-assigned id, returned to the caller that started the session
    pub session_id: u64,
}

/// Default time a finished report stays on the board
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(900);

#[derive(Clone)]
pub struct SessionBoard {
    reports: Arc<DashMap<EntityIdentity, SessionReport>>,
    sequence: Arc<AtomicU64>,
    retention: chrono::Duration,
    audit: AuditLogger,
}

impl SessionBoard {
    pub fn new(audit: AuditLogger) -> Self {
        Self::with_retention(audit, DEFAULT_RETENTION)
    }

    pub fn with_retention(audit: AuditLogger, retention: Duration) -> Self {
        Self {
            reports: Arc::new(DashMap::new()),
            sequence: Arc::new(AtomicU64::new(0)),
            retention: chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::days(365)),
            audit,
        }
    }

    /// Follow `handle` until its session ends. Returns the session id and
    /// the task consuming the handle.
    pub fn track(&self, command: &str, mut handle: PollHandle) -> (u64, JoinHandle<()>) {
        self.prune();

        let session = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let identity = handle.identity().clone();
        let now = Utc::now();

        self.reports.insert(
            identity.clone(),
            SessionReport {
                identity: identity.clone(),
                command: command.to_string(),
                state: PollState::Pending,
                attempt: 0,
                status: None,
                detail: None,
                success: None,
                started_at: now,
                updated_at: now,
                session_id: session,
            },
        );

        let board = self.clone();
        let task = tokio::spawn(async move {
            loop {
                match handle.next_event().await {
                    Some(PollEvent::Progress { view, attempt }) => {
                        board.update(&identity, session, |report| {
                            report.state = PollState::Running;
                            report.attempt = attempt;
                            report.status = Some(view.progress_label());
                        });
                    }
                    Some(PollEvent::Complete(outcome)) => {
                        board.audit.log_convergence(
                            &identity.to_string(),
                            outcome.state.as_str(),
                            &outcome.detail,
                            outcome.attempts,
                        );
                        board.update(&identity, session, |report| {
                            report.state = outcome.state;
                            report.attempt = outcome.attempts;
                            if let Some(status) = outcome.last_status() {
                                report.status = Some(status);
                            }
                            report.detail = Some(outcome.detail.clone());
                            report.success = Some(outcome.success);
                        });
                        break;
                    }
                    None => {
                        debug!(identity = %identity, session, "Session ended without outcome");
                        board.update(&identity, session, |report| {
                            report.state = PollState::Superseded;
                            report.success = Some(false);
                        });
                        break;
                    }
                }
            }
        });

        (session, task)
    }

    // Reports of a newer session for the same identity are left alone
    fn update<F>(&self, identity: &EntityIdentity, session: u64, apply: F)
    where
        F: FnOnce(&mut SessionReport),
    {
        if let Some(mut report) = self.reports.get_mut(identity) {
            if report.session_id == session {
                apply(report.value_mut());
                report.updated_at = Utc::now();
            }
        }
    }

    pub fn get(&self, identity: &EntityIdentity) -> Option<SessionReport> {
        self.reports.get(identity).map(|report| report.clone())
    }

    /// Remove finished reports older than the retention window
    pub fn prune(&self) -> usize {
        let Some(cutoff) = Utc::now().checked_sub_signed(self.retention) else {
            return 0;
        };
        let before = self.reports.len();
        self.reports
            .retain(|_, report| !(report.state.is_terminal() && report.updated_at < cutoff));
        let pruned = before.saturating_sub(self.reports.len());
        if pruned > 0 {
            debug!(pruned, "Pruned finished session reports");
        }
        pruned
    }

    /// All reports ordered by identity
    pub fn list(&self) -> Vec<SessionReport> {
        self.prune();
        let mut reports: Vec<_> = self.reports.iter().map(|entry| entry.value().clone()).collect();
        reports.sort_by(|a, b| a.identity.cmp(&b.identity));
        reports
    }
}
