//! Core data models for the fleet console
//!
//! Inventory and live records are the raw inputs from the two sources;
//! [`ReconciledView`] is the merged, display-ready output of one
//! reconciliation cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Kind of fleet entity tracked by the console
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    #[serde(alias = "nodes")]
    Node,
    #[serde(alias = "deployments")]
    Deployment,
    #[serde(alias = "statefulsets")]
    StatefulSet,
    #[serde(alias = "daemonsets")]
    DaemonSet,
    #[serde(alias = "cronjobs")]
    CronJob,
    #[serde(alias = "namespaces")]
    Namespace,
    #[serde(alias = "services")]
    Service,
    #[serde(alias = "ingresses")]
    Ingress,
    #[serde(alias = "pods")]
    Pod,
    #[serde(alias = "jobs")]
    Job,
}

impl EntityKind {
    pub const ALL: [EntityKind; 10] = [
        EntityKind::Node,
        EntityKind::Deployment,
        EntityKind::StatefulSet,
        EntityKind::DaemonSet,
        EntityKind::CronJob,
        EntityKind::Namespace,
        EntityKind::Service,
        EntityKind::Ingress,
        EntityKind::Pod,
        EntityKind::Job,
    ];

    /// Singular wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Node => "node",
            EntityKind::Deployment => "deployment",
            EntityKind::StatefulSet => "statefulset",
            EntityKind::DaemonSet => "daemonset",
            EntityKind::CronJob => "cronjob",
            EntityKind::Namespace => "namespace",
            EntityKind::Service => "service",
            EntityKind::Ingress => "ingress",
            EntityKind::Pod => "pod",
            EntityKind::Job => "job",
        }
    }

    /// Plural name, also used as the stream name
    pub fn plural(&self) -> &'static str {
        match self {
            EntityKind::Node => "nodes",
            EntityKind::Deployment => "deployments",
            EntityKind::StatefulSet => "statefulsets",
            EntityKind::DaemonSet => "daemonsets",
            EntityKind::CronJob => "cronjobs",
            EntityKind::Namespace => "namespaces",
            EntityKind::Service => "services",
            EntityKind::Ingress => "ingresses",
            EntityKind::Pod => "pods",
            EntityKind::Job => "jobs",
        }
    }

    /// Returns false for cluster-scoped kinds
    pub fn is_namespaced(&self) -> bool {
        !matches!(self, EntityKind::Node | EntityKind::Namespace)
    }

    /// Streams whose contents visibly change when this kind converges
    pub fn dependent_kinds(&self) -> &'static [EntityKind] {
        match self {
            EntityKind::Deployment
            | EntityKind::StatefulSet
            | EntityKind::DaemonSet
            | EntityKind::CronJob
            | EntityKind::Job => &[EntityKind::Pod],
            _ => &[],
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown entity kind
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown entity kind: {0}")]
pub struct ParseKindError(pub String);

impl FromStr for EntityKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        EntityKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == lowered || kind.plural() == lowered)
            .ok_or_else(|| ParseKindError(s.to_string()))
    }
}

/// Composite key identifying an entity across both sources
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityIdentity {
    pub kind: EntityKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
}

impl EntityIdentity {
    pub fn new(kind: EntityKind, namespace: Option<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace,
            name: name.into(),
        }
    }

    /// Identity of a cluster-scoped entity
    pub fn cluster(kind: EntityKind, name: impl Into<String>) -> Self {
        Self::new(kind, None, name)
    }

    /// Identity of a namespaced entity
    pub fn namespaced(kind: EntityKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(kind, Some(namespace.into()), name)
    }

    pub fn node(name: impl Into<String>) -> Self {
        Self::cluster(EntityKind::Node, name)
    }

    /// True when the namespace presence matches the kind's scope
    pub fn is_well_formed(&self) -> bool {
        !self.name.is_empty() && self.kind.is_namespaced() == self.namespace.is_some()
    }

    /// Namespace this entity is governed by, if any.
    ///
    /// For `namespace` entities this is the namespace's own name.
    pub fn governing_namespace(&self) -> Option<&str> {
        match self.kind {
            EntityKind::Namespace => Some(self.name.as_str()),
            _ => self.namespace.as_deref(),
        }
    }
}

impl fmt::Display for EntityIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// Membership declared by the inventory store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Membership {
    #[default]
    Member,
    NotMember,
}

/// Last known reachability recorded by the inventory store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reachability {
    Online,
    Offline,
}

/// Static hardware snapshot kept alongside an inventory record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_cores: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
}

/// Record sourced from the durable inventory store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryRecord {
    #[serde(flatten)]
    pub identity: EntityIdentity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_role: Option<String>,
    #[serde(default)]
    pub membership: Membership,
    pub reachability: Reachability,
    #[serde(default)]
    pub hardware: HardwareSnapshot,
}

impl InventoryRecord {
    pub fn new(identity: EntityIdentity, reachability: Reachability) -> Self {
        Self {
            identity,
            address: None,
            declared_role: None,
            membership: Membership::Member,
            reachability,
            hardware: HardwareSnapshot::default(),
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_membership(mut self, membership: Membership) -> Self {
        self.membership = membership;
        self
    }
}

/// Replica counts reported by the live API.
///
/// For daemonsets `desired` is the number of nodes that should run the pod
/// and `ready` the number of nodes where it is ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaCounts {
    pub desired: u32,
    pub ready: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available: Option<u32>,
}

impl ReplicaCounts {
    pub fn new(desired: u32, ready: u32) -> Self {
        Self {
            desired,
            ready,
            updated: None,
            available: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_millicores: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<u64>,
}

/// Record sourced from the live cluster API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveRecord {
    #[serde(flatten)]
    pub identity: EntityIdentity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_status: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub live_roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<ReplicaCounts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_revision: Option<i64>,
    #[serde(default)]
    pub metrics: LiveMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspended: Option<bool>,
}

impl LiveRecord {
    pub fn new(identity: EntityIdentity) -> Self {
        Self {
            identity,
            internal_address: None,
            live_status: None,
            live_roles: Vec::new(),
            replicas: None,
            live_revision: None,
            metrics: LiveMetrics::default(),
            suspended: None,
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.live_status = Some(status.into());
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.internal_address = Some(address.into());
        self
    }

    pub fn with_replicas(mut self, desired: u32, ready: u32) -> Self {
        self.replicas = Some(ReplicaCounts::new(desired, ready));
        self
    }

    /// True when the reported live status equals `expected` (case-insensitive)
    pub fn status_is(&self, expected: &str) -> bool {
        self.live_status
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case(expected))
            .unwrap_or(false)
    }
}

/// Outcome of a live fetch.
///
/// `Available(vec![])` means the live system answered and reports zero
/// entities; `Unavailable` means it could not be reached at all.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveFetch {
    Available(Vec<LiveRecord>),
    Unavailable { reason: String },
}

impl LiveFetch {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        LiveFetch::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, LiveFetch::Available(_))
    }

    pub fn records(&self) -> &[LiveRecord] {
        match self {
            LiveFetch::Available(records) => records,
            LiveFetch::Unavailable { .. } => &[],
        }
    }
}

/// Reconciled status taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FleetStatus {
    /// Inventory says unreachable, entity is a declared member
    Offline,
    /// Reachable but never joined the live system
    OnlineUnregistered,
    OnlineRegisteredReady,
    OnlineRegisteredNotReady,
    /// Reachable, but the live system itself could not be queried
    OnlineRegisteredUnknown,
    /// Inventory says unreachable and not a declared member
    UnregisteredOffline,
    /// Present in the live system but unknown to inventory
    NotAMember,
}

impl FleetStatus {
    pub const ALL: [FleetStatus; 7] = [
        FleetStatus::Offline,
        FleetStatus::OnlineUnregistered,
        FleetStatus::OnlineRegisteredReady,
        FleetStatus::OnlineRegisteredNotReady,
        FleetStatus::OnlineRegisteredUnknown,
        FleetStatus::UnregisteredOffline,
        FleetStatus::NotAMember,
    ];

    pub fn is_offline_family(&self) -> bool {
        matches!(self, FleetStatus::Offline | FleetStatus::UnregisteredOffline)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, FleetStatus::OnlineRegisteredReady)
    }

    /// Wire name, as serialized
    pub fn as_str(&self) -> &'static str {
        match self {
            FleetStatus::Offline => "OFFLINE",
            FleetStatus::OnlineUnregistered => "ONLINE_UNREGISTERED",
            FleetStatus::OnlineRegisteredReady => "ONLINE_REGISTERED_READY",
            FleetStatus::OnlineRegisteredNotReady => "ONLINE_REGISTERED_NOT_READY",
            FleetStatus::OnlineRegisteredUnknown => "ONLINE_REGISTERED_UNKNOWN",
            FleetStatus::UnregisteredOffline => "UNREGISTERED_OFFLINE",
            FleetStatus::NotAMember => "NOT_A_MEMBER",
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            FleetStatus::Offline => "Offline",
            FleetStatus::OnlineUnregistered => "Online, not registered",
            FleetStatus::OnlineRegisteredReady => "Ready",
            FleetStatus::OnlineRegisteredNotReady => "Not ready",
            FleetStatus::OnlineRegisteredUnknown => "Online, live status unknown",
            FleetStatus::UnregisteredOffline => "Offline, not registered",
            FleetStatus::NotAMember => "Not a member",
        }
    }
}

impl fmt::Display for FleetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FleetStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('-', "_").to_ascii_uppercase();
        FleetStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| format!("unknown status: {}", s))
    }
}

/// Which source(s) contributed to a view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    InventoryOnly,
    LiveOnly,
    Merged,
}

/// Merged, display-ready record for one identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledView {
    pub identity: EntityIdentity,
    pub status: FleetStatus,
    pub source: Provenance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory: Option<InventoryRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live: Option<LiveRecord>,
}

impl ReconciledView {
    pub fn replicas(&self) -> Option<ReplicaCounts> {
        self.live.as_ref().and_then(|live| live.replicas)
    }

    pub fn live_status(&self) -> Option<&str> {
        self.live.as_ref().and_then(|live| live.live_status.as_deref())
    }

    /// Human-readable progress, used to detect interim changes while polling
    pub fn progress_label(&self) -> String {
        match (self.replicas(), self.live_status()) {
            (Some(r), _) => format!("{} ({}/{} ready)", self.status.label(), r.ready, r.desired),
            (None, Some(status)) => format!("{} ({})", self.status.label(), status),
            (None, None) => self.status.label().to_string(),
        }
    }
}

/// Output of one reconciliation cycle for one stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledSet {
    pub kind: EntityKind,
    pub views: Vec<ReconciledView>,
    pub live_available: bool,
    pub epoch: u64,
    pub fetched_at: DateTime<Utc>,
}

impl ReconciledSet {
    pub fn find(&self, identity: &EntityIdentity) -> Option<&ReconciledView> {
        self.views.iter().find(|view| &view.identity == identity)
    }

    /// Count of views per status
    pub fn count_by_status(&self, status: FleetStatus) -> usize {
        self.views.iter().filter(|view| view.status == status).count()
    }
}
