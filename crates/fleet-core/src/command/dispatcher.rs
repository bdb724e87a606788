//! Command dispatcher
//!
//! Validates a command locally, sends it to the command backend and, once
//! acknowledged, follows up: either a single reload of the owning stream or
//! a convergence poll session plus reloads of dependent streams.

use super::Command;
use crate::convergence::{PollHandle, PollPolicy, Readiness, ReadinessPoller};
use crate::error::{DispatchError, SourceError};
use crate::health::{components, HealthRegistry};
use crate::models::{EntityIdentity, EntityKind};
use crate::observability::{AuditLogger, FleetMetrics};
use crate::reconcile::{LoadOutcome, Reconciler};
use crate::source::{CommandAck, CommandBackend};
use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Namespaces where destructive commands are refused by default
pub const DEFAULT_PROTECTED_NAMESPACES: [&str; 3] = ["kube-system", "kube-public", "kube-node-lease"];

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub protected_namespaces: HashSet<String>,
    /// Identities (`kind/namespace/name`) exempt from namespace protection
    pub allow_list: HashSet<String>,
    pub poll_policy: PollPolicy,
    /// Attempt budget for image rollouts on daemonsets and statefulsets
    pub long_rollout_attempts: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            protected_namespaces: DEFAULT_PROTECTED_NAMESPACES
                .iter()
                .map(|ns| ns.to_string())
                .collect(),
            allow_list: HashSet::new(),
            poll_policy: PollPolicy::default(),
            long_rollout_attempts: 90,
        }
    }
}

impl DispatchConfig {
    pub fn is_protected(&self, identity: &EntityIdentity) -> bool {
        identity
            .governing_namespace()
            .map(|ns| self.protected_namespaces.contains(ns))
            .unwrap_or(false)
            && !self.allow_list.contains(&identity.to_string())
    }

    /// Poll policy for a command on a kind
    pub fn policy_for(&self, command: &Command, kind: EntityKind) -> PollPolicy {
        match (command, kind) {
            // rollouts proceed one pod or node at a time
            (Command::UpdateImage { .. }, EntityKind::DaemonSet | EntityKind::StatefulSet) => self
                .poll_policy
                .clone()
                .with_max_attempts(self.long_rollout_attempts),
            _ => self.poll_policy.clone(),
        }
    }
}

/// What happened after the backend acknowledged a command
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The owning stream is being reloaded once
    Applied {
        ack: CommandAck,
        reload: JoinHandle<LoadOutcome>,
    },
    /// A poll session is tracking convergence
    Converging { ack: CommandAck, session: PollHandle },
}

impl DispatchOutcome {
    pub fn ack(&self) -> &CommandAck {
        match self {
            DispatchOutcome::Applied { ack, .. } | DispatchOutcome::Converging { ack, .. } => ack,
        }
    }

    pub fn is_converging(&self) -> bool {
        matches!(self, DispatchOutcome::Converging { .. })
    }
}

pub struct CommandDispatcher {
    backend: Arc<dyn CommandBackend>,
    reconciler: Arc<Reconciler>,
    poller: ReadinessPoller,
    config: DispatchConfig,
    health: Option<HealthRegistry>,
    metrics: FleetMetrics,
    audit: AuditLogger,
}

impl CommandDispatcher {
    pub fn builder() -> CommandDispatcherBuilder {
        CommandDispatcherBuilder::new()
    }

    pub fn poller(&self) -> &ReadinessPoller {
        &self.poller
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Validate and send `command`, then start its follow-up.
    ///
    /// No backend call is made when validation fails, and no poll session is
    /// started when the backend rejects the command.
    pub async fn dispatch(
        &self,
        command: Command,
        identity: EntityIdentity,
    ) -> Result<DispatchOutcome, DispatchError> {
        if let Err(e) = self.validate(&command, &identity) {
            self.metrics.record_command(command.name(), "invalid");
            self.audit
                .log_command_rejected(&identity.to_string(), command.name(), &e.to_string());
            return Err(e);
        }

        let ack = match self.backend.execute(&identity, &command).await {
            Ok(ack) => {
                self.report_backend(None).await;
                ack
            }
            Err(source) => {
                self.report_backend(Some(&source)).await;
                self.metrics.record_command(command.name(), "rejected");
                self.audit.log_command_rejected(
                    &identity.to_string(),
                    command.name(),
                    &source.to_string(),
                );
                return Err(DispatchError::Rejected {
                    command: command.name(),
                    identity,
                    source,
                });
            }
        };

        self.metrics.record_command(command.name(), "accepted");
        let outcome = self.follow_up(&command, identity.clone(), ack);
        self.audit.log_command_dispatched(
            &identity.to_string(),
            command.name(),
            outcome.is_converging(),
        );

        Ok(outcome)
    }

    fn validate(&self, command: &Command, identity: &EntityIdentity) -> Result<(), DispatchError> {
        if !identity.is_well_formed() {
            return Err(DispatchError::InvalidIdentity(identity.clone()));
        }

        if !command.supports(identity.kind) {
            return Err(DispatchError::Unsupported {
                command: command.name(),
                kind: identity.kind,
            });
        }

        if command.is_destructive() && self.config.is_protected(identity) {
            return Err(DispatchError::ProtectedNamespace {
                command: command.name(),
                identity: identity.clone(),
            });
        }

        if let Command::UpdateImage { container, image } = command {
            if image.trim().is_empty() {
                return Err(DispatchError::InvalidArguments("image must not be empty".to_string()));
            }
            if container.as_deref().is_some_and(|c| c.trim().is_empty()) {
                return Err(DispatchError::InvalidArguments(
                    "container name must not be empty when given".to_string(),
                ));
            }
        }

        Ok(())
    }

    fn follow_up(&self, command: &Command, identity: EntityIdentity, ack: CommandAck) -> DispatchOutcome {
        let kind = identity.kind;

        let predicate = match command {
            Command::Delete | Command::Suspend | Command::Resume => {
                debug!(identity = %identity, command = command.name(), "Reloading owning stream");
                return DispatchOutcome::Applied {
                    ack,
                    reload: self.reconciler.spawn_load(kind),
                };
            }
            // nothing converges toward zero replicas; the first observation settles it
            Command::Scale { replicas: 0 } => Readiness::Observed,
            _ => Readiness::for_kind(kind),
        };

        for dependent in kind.dependent_kinds() {
            debug!(identity = %identity, stream = dependent.plural(), "Reloading dependent stream");
            drop(self.reconciler.spawn_load(*dependent));
        }

        let policy = self.config.policy_for(command, kind);
        DispatchOutcome::Converging {
            ack,
            session: self.poller.poll(identity, predicate, policy),
        }
    }

    async fn report_backend(&self, error: Option<&SourceError>) {
        let Some(health) = &self.health else {
            return;
        };

        match error {
            // the backend answered; only the command was refused
            None | Some(SourceError::Status { .. }) => {
                health.set_healthy(components::COMMAND_BACKEND).await
            }
            Some(e) => health.set_unhealthy(components::COMMAND_BACKEND, e.to_string()).await,
        }
    }
}

pub struct CommandDispatcherBuilder {
    backend: Option<Arc<dyn CommandBackend>>,
    reconciler: Option<Arc<Reconciler>>,
    poller: Option<ReadinessPoller>,
    config: DispatchConfig,
    health: Option<HealthRegistry>,
    instance: String,
}

impl CommandDispatcherBuilder {
    pub fn new() -> Self {
        Self {
            backend: None,
            reconciler: None,
            poller: None,
            config: DispatchConfig::default(),
            health: None,
            instance: "fleet-console".to_string(),
        }
    }

    pub fn backend(mut self, backend: Arc<dyn CommandBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn reconciler(mut self, reconciler: Arc<Reconciler>) -> Self {
        self.reconciler = Some(reconciler);
        self
    }

    /// Defaults to a poller observing through the reconciler
    pub fn poller(mut self, poller: ReadinessPoller) -> Self {
        self.poller = Some(poller);
        self
    }

    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = instance.into();
        self
    }

    pub fn build(self) -> Result<CommandDispatcher> {
        let backend = self
            .backend
            .ok_or_else(|| anyhow::anyhow!("Command backend is required"))?;
        let reconciler = self
            .reconciler
            .ok_or_else(|| anyhow::anyhow!("Reconciler is required"))?;
        let poller = match self.poller {
            Some(poller) => poller,
            None => ReadinessPoller::with_guard(reconciler.clone(), reconciler.guard()),
        };

        Ok(CommandDispatcher {
            backend,
            reconciler,
            poller,
            config: self.config,
            health: self.health,
            metrics: FleetMetrics::new(),
            audit: AuditLogger::new(self.instance),
        })
    }
}

impl Default for CommandDispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
