//! Per-kind reconciliation parameters
//!
//! All kind-specific behavior of the merger lives in this table: whether
//! inventory tracks the kind, how records are matched when names differ,
//! and how a live record's readiness is read.

use crate::models::{EntityKind, InventoryRecord, LiveRecord};

/// Whether the inventory store is authoritative for membership of a kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryScope {
    /// Live records without an inventory entry are `NOT_A_MEMBER`
    Tracked,
    /// Inventory never lists this kind; live records stand on their own
    Untracked,
}

/// Fallback join key used when primary identities do not line up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondaryKey {
    None,
    /// Inventory `address` against live `internalAddress`
    Address,
}

impl SecondaryKey {
    pub fn inventory_key<'a>(&self, record: &'a InventoryRecord) -> Option<&'a str> {
        match self {
            SecondaryKey::None => None,
            SecondaryKey::Address => record.address.as_deref().filter(|a| !a.is_empty()),
        }
    }

    pub fn live_key<'a>(&self, record: &'a LiveRecord) -> Option<&'a str> {
        match self {
            SecondaryKey::None => None,
            SecondaryKey::Address => record.internal_address.as_deref().filter(|a| !a.is_empty()),
        }
    }
}

#[derive(Clone, Copy)]
pub struct KindProfile {
    pub kind: EntityKind,
    pub inventory: InventoryScope,
    pub secondary_key: SecondaryKey,
    pub live_ready: fn(&LiveRecord) -> bool,
}

impl KindProfile {
    pub fn of(kind: EntityKind) -> Self {
        let (inventory, secondary_key) = match kind {
            EntityKind::Node => (InventoryScope::Tracked, SecondaryKey::Address),
            _ => (InventoryScope::Untracked, SecondaryKey::None),
        };

        let live_ready: fn(&LiveRecord) -> bool = match kind {
            EntityKind::Node => node_ready,
            EntityKind::Deployment | EntityKind::StatefulSet | EntityKind::DaemonSet => {
                replicas_ready
            }
            EntityKind::Pod => pod_ready,
            EntityKind::CronJob => cronjob_ready,
            EntityKind::Job => job_ready,
            EntityKind::Namespace => namespace_ready,
            EntityKind::Service | EntityKind::Ingress => present,
        };

        Self {
            kind,
            inventory,
            secondary_key,
            live_ready,
        }
    }

    pub fn is_ready(&self, record: &LiveRecord) -> bool {
        (self.live_ready)(record)
    }
}

impl std::fmt::Debug for KindProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KindProfile")
            .field("kind", &self.kind)
            .field("inventory", &self.inventory)
            .field("secondary_key", &self.secondary_key)
            .finish_non_exhaustive()
    }
}

fn node_ready(record: &LiveRecord) -> bool {
    record.status_is("Ready")
}

fn replicas_ready(record: &LiveRecord) -> bool {
    record
        .replicas
        .map(|r| r.ready >= r.desired)
        .unwrap_or(false)
}

fn pod_ready(record: &LiveRecord) -> bool {
    record.status_is("Running") || record.status_is("Succeeded")
}

fn cronjob_ready(record: &LiveRecord) -> bool {
    !record.suspended.unwrap_or(false)
}

fn job_ready(record: &LiveRecord) -> bool {
    record.status_is("Complete") || record.status_is("Running")
}

fn namespace_ready(record: &LiveRecord) -> bool {
    record.live_status.is_none() || record.status_is("Active")
}

fn present(_record: &LiveRecord) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityIdentity;

    fn live(kind: EntityKind) -> LiveRecord {
        let identity = if kind.is_namespaced() {
            EntityIdentity::namespaced(kind, "default", "x")
        } else {
            EntityIdentity::cluster(kind, "x")
        };
        LiveRecord::new(identity)
    }

    #[test]
    fn test_only_nodes_are_inventory_tracked() {
        for kind in EntityKind::ALL {
            let expected = if kind == EntityKind::Node {
                InventoryScope::Tracked
            } else {
                InventoryScope::Untracked
            };
            assert_eq!(KindProfile::of(kind).inventory, expected, "{}", kind);
        }
    }

    #[test]
    fn test_node_readiness() {
        let profile = KindProfile::of(EntityKind::Node);
        assert!(profile.is_ready(&live(EntityKind::Node).with_status("Ready")));
        assert!(!profile.is_ready(&live(EntityKind::Node).with_status("NotReady")));
        assert!(!profile.is_ready(&live(EntityKind::Node)));
    }

    #[test]
    fn test_replica_readiness() {
        let profile = KindProfile::of(EntityKind::DaemonSet);
        assert!(profile.is_ready(&live(EntityKind::DaemonSet).with_replicas(4, 4)));
        assert!(!profile.is_ready(&live(EntityKind::DaemonSet).with_replicas(4, 3)));
        assert!(!profile.is_ready(&live(EntityKind::DaemonSet)));
    }

    #[test]
    fn test_cronjob_readiness_follows_suspension() {
        let profile = KindProfile::of(EntityKind::CronJob);
        let mut record = live(EntityKind::CronJob);
        assert!(profile.is_ready(&record));
        record.suspended = Some(true);
        assert!(!profile.is_ready(&record));
    }

    #[test]
    fn test_address_secondary_key_ignores_empty() {
        let key = SecondaryKey::Address;
        let record = LiveRecord::new(EntityIdentity::node("n1")).with_address("");
        assert_eq!(key.live_key(&record), None);
        let record = LiveRecord::new(EntityIdentity::node("n1")).with_address("10.0.0.1");
        assert_eq!(key.live_key(&record), Some("10.0.0.1"));
    }
}
