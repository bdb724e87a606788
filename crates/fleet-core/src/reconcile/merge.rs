//! Source merger
//!
//! Combines one inventory snapshot and one live snapshot into a full
//! replacement set of [`ReconciledView`]s. The function is pure: identical
//! inputs always produce identical output.

use super::profile::{InventoryScope, KindProfile};
use crate::models::{
    FleetStatus, InventoryRecord, LiveFetch, LiveRecord, Membership, Provenance, Reachability,
    ReconciledView,
};
use std::collections::HashMap;

/// Merge inventory and live records into reconciled views.
///
/// Output order is inventory order followed by unmatched live records in
/// live order.
pub fn merge(inventory: &[InventoryRecord], live: &LiveFetch) -> Vec<ReconciledView> {
    let records = live.records();
    let matches = match_records(inventory, records);

    let mut claimed = vec![false; records.len()];
    let mut views = Vec::with_capacity(inventory.len() + records.len());

    for (record, matched) in inventory.iter().zip(&matches) {
        if let Some(index) = matched {
            claimed[*index] = true;
        }
        let live_record = matched.map(|index| &records[index]);
        views.push(reconcile_inventory(record, live_record, live.is_available()));
    }

    for (record, _) in records.iter().zip(&claimed).filter(|(_, claimed)| !**claimed) {
        views.push(reconcile_live_only(record));
    }

    views
}

/// Status for an inventory record given its (optional) live counterpart
pub fn derive_status(
    record: &InventoryRecord,
    live: Option<&LiveRecord>,
    live_available: bool,
) -> FleetStatus {
    if record.reachability == Reachability::Offline {
        return match record.membership {
            Membership::Member => FleetStatus::Offline,
            Membership::NotMember => FleetStatus::UnregisteredOffline,
        };
    }

    match live {
        Some(live) => readiness_status(live),
        None if live_available => FleetStatus::OnlineUnregistered,
        None => FleetStatus::OnlineRegisteredUnknown,
    }
}

fn readiness_status(live: &LiveRecord) -> FleetStatus {
    if KindProfile::of(live.identity.kind).is_ready(live) {
        FleetStatus::OnlineRegisteredReady
    } else {
        FleetStatus::OnlineRegisteredNotReady
    }
}

fn reconcile_inventory(
    record: &InventoryRecord,
    live: Option<&LiveRecord>,
    live_available: bool,
) -> ReconciledView {
    ReconciledView {
        identity: record.identity.clone(),
        status: derive_status(record, live, live_available),
        source: if live.is_some() {
            Provenance::Merged
        } else {
            Provenance::InventoryOnly
        },
        inventory: Some(record.clone()),
        live: live.cloned(),
    }
}

fn reconcile_live_only(record: &LiveRecord) -> ReconciledView {
    let status = match KindProfile::of(record.identity.kind).inventory {
        InventoryScope::Tracked => FleetStatus::NotAMember,
        InventoryScope::Untracked => readiness_status(record),
    };

    ReconciledView {
        identity: record.identity.clone(),
        status,
        source: Provenance::LiveOnly,
        inventory: None,
        live: Some(record.clone()),
    }
}

/// Pair each inventory record with at most one live record index.
///
/// Primary identity matches are settled for every inventory record first;
/// the secondary key only sees live records no primary match claimed.
fn match_records(inventory: &[InventoryRecord], live: &[LiveRecord]) -> Vec<Option<usize>> {
    let mut by_identity = HashMap::with_capacity(live.len());
    for (index, record) in live.iter().enumerate() {
        by_identity.entry(&record.identity).or_insert(index);
    }

    let mut claimed = vec![false; live.len()];
    let mut matches: Vec<Option<usize>> = inventory
        .iter()
        .map(|record| {
            let index = by_identity.get(&record.identity).copied()?;
            if claimed[index] {
                return None;
            }
            claimed[index] = true;
            Some(index)
        })
        .collect();

    let mut by_secondary: HashMap<(_, &str), usize> = HashMap::new();
    for (index, record) in live.iter().enumerate() {
        if claimed[index] {
            continue;
        }
        let profile = KindProfile::of(record.identity.kind);
        if let Some(key) = profile.secondary_key.live_key(record) {
            by_secondary.entry((record.identity.kind, key)).or_insert(index);
        }
    }

    for (record, matched) in inventory.iter().zip(matches.iter_mut()) {
        if matched.is_some() {
            continue;
        }
        let profile = KindProfile::of(record.identity.kind);
        let Some(key) = profile.secondary_key.inventory_key(record) else {
            continue;
        };
        if let Some(&index) = by_secondary.get(&(record.identity.kind, key)) {
            if !claimed[index] {
                claimed[index] = true;
                *matched = Some(index);
            }
        }
    }

    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityIdentity, EntityKind};

    fn online(name: &str) -> InventoryRecord {
        InventoryRecord::new(EntityIdentity::node(name), Reachability::Online)
    }

    fn offline(name: &str) -> InventoryRecord {
        InventoryRecord::new(EntityIdentity::node(name), Reachability::Offline)
    }

    fn live_node(name: &str, status: &str) -> LiveRecord {
        LiveRecord::new(EntityIdentity::node(name)).with_status(status)
    }

    #[test]
    fn test_reachable_without_live_entry_is_unregistered() {
        let views = merge(&[online("n1")], &LiveFetch::Available(vec![]));

        assert_eq!(views.len(), 1);
        assert_eq!(views[0].status, FleetStatus::OnlineUnregistered);
        assert_eq!(views[0].source, Provenance::InventoryOnly);
    }

    #[test]
    fn test_inventory_reachability_overrides_stale_live_ready() {
        let views = merge(
            &[offline("n1")],
            &LiveFetch::Available(vec![live_node("n1", "Ready")]),
        );

        assert_eq!(views.len(), 1);
        assert!(views[0].status.is_offline_family());
        assert_eq!(views[0].source, Provenance::Merged);
    }

    #[test]
    fn test_offline_non_member_is_unregistered_offline() {
        let record = offline("n1").with_membership(Membership::NotMember);
        let views = merge(&[record], &LiveFetch::Available(vec![]));

        assert_eq!(views[0].status, FleetStatus::UnregisteredOffline);
    }

    #[test]
    fn test_unavailable_live_is_distinct_from_empty() {
        let empty = merge(&[online("n1")], &LiveFetch::Available(vec![]));
        let down = merge(&[online("n1")], &LiveFetch::unavailable("connection refused"));

        assert_eq!(empty[0].status, FleetStatus::OnlineUnregistered);
        assert_eq!(down[0].status, FleetStatus::OnlineRegisteredUnknown);
    }

    #[test]
    fn test_live_readiness_maps_to_ready_and_not_ready() {
        let views = merge(
            &[online("n1"), online("n2")],
            &LiveFetch::Available(vec![live_node("n1", "Ready"), live_node("n2", "NotReady")]),
        );

        assert_eq!(views[0].status, FleetStatus::OnlineRegisteredReady);
        assert_eq!(views[1].status, FleetStatus::OnlineRegisteredNotReady);
    }

    #[test]
    fn test_live_only_node_is_not_a_member() {
        let views = merge(
            &[online("n1")],
            &LiveFetch::Available(vec![live_node("n1", "Ready"), live_node("manual", "Ready")]),
        );

        assert_eq!(views.len(), 2);
        assert_eq!(views[1].identity, EntityIdentity::node("manual"));
        assert_eq!(views[1].status, FleetStatus::NotAMember);
        assert_eq!(views[1].source, Provenance::LiveOnly);
    }

    #[test]
    fn test_secondary_address_match() {
        let inventory = online("server-01").with_address("10.0.0.7");
        let live = live_node("ip-10-0-0-7", "Ready").with_address("10.0.0.7");

        let views = merge(&[inventory], &LiveFetch::Available(vec![live]));

        assert_eq!(views.len(), 1);
        assert_eq!(views[0].status, FleetStatus::OnlineRegisteredReady);
        assert_eq!(views[0].source, Provenance::Merged);
        assert_eq!(
            views[0].live.as_ref().unwrap().identity,
            EntityIdentity::node("ip-10-0-0-7")
        );
    }

    #[test]
    fn test_primary_match_wins_over_secondary() {
        let inventory = online("n1").with_address("10.0.0.9");
        let by_name = live_node("n1", "NotReady").with_address("10.0.0.1");
        let by_address = live_node("other", "Ready").with_address("10.0.0.9");

        let views = merge(&[inventory], &LiveFetch::Available(vec![by_address, by_name]));

        assert_eq!(views[0].status, FleetStatus::OnlineRegisteredNotReady);
        assert_eq!(
            views[0].live.as_ref().unwrap().identity,
            EntityIdentity::node("n1")
        );
        // the address-only candidate stays unclaimed
        assert_eq!(views[1].identity, EntityIdentity::node("other"));
        assert_eq!(views[1].status, FleetStatus::NotAMember);
    }

    #[test]
    fn test_secondary_key_never_steals_primary_match() {
        // n2's address points at the live record that n1 claims by name
        let n1 = online("n1");
        let n2 = online("n2").with_address("10.0.0.1");
        let live = live_node("n1", "Ready").with_address("10.0.0.1");

        let views = merge(&[n2, n1], &LiveFetch::Available(vec![live]));

        assert_eq!(views[0].identity, EntityIdentity::node("n2"));
        assert_eq!(views[0].status, FleetStatus::OnlineUnregistered);
        assert_eq!(views[1].status, FleetStatus::OnlineRegisteredReady);
    }

    #[test]
    fn test_untracked_kinds_use_live_readiness() {
        let web = LiveRecord::new(EntityIdentity::namespaced(EntityKind::Deployment, "default", "web"))
            .with_replicas(3, 3);
        let api = LiveRecord::new(EntityIdentity::namespaced(EntityKind::Deployment, "default", "api"))
            .with_replicas(3, 1);

        let views = merge(&[], &LiveFetch::Available(vec![web, api]));

        assert_eq!(views[0].status, FleetStatus::OnlineRegisteredReady);
        assert_eq!(views[1].status, FleetStatus::OnlineRegisteredNotReady);
        assert!(views.iter().all(|v| v.source == Provenance::LiveOnly));
    }

    #[test]
    fn test_merge_is_deterministic() {
        let inventory = vec![online("n1"), offline("n2"), online("n3").with_address("10.0.0.3")];
        let live = LiveFetch::Available(vec![
            live_node("n1", "Ready"),
            live_node("x", "Ready").with_address("10.0.0.3"),
            live_node("stray", "NotReady"),
        ]);

        let first = merge(&inventory, &live);
        let _unrelated = merge(&[online("zzz")], &LiveFetch::unavailable("down"));
        let second = merge(&inventory, &live);

        assert_eq!(first, second);
    }

    #[test]
    fn test_every_input_combination_yields_a_status() {
        let reachabilities = [Reachability::Online, Reachability::Offline];
        let memberships = [Membership::Member, Membership::NotMember];
        let live_states: [Option<&str>; 3] = [None, Some("Ready"), Some("NotReady")];

        for reachability in reachabilities {
            for membership in memberships {
                for live_state in live_states {
                    for available in [true, false] {
                        let record = InventoryRecord::new(EntityIdentity::node("n1"), reachability)
                            .with_membership(membership);
                        let fetch = match (available, live_state) {
                            (false, _) => LiveFetch::unavailable("down"),
                            (true, None) => LiveFetch::Available(vec![]),
                            (true, Some(status)) => {
                                LiveFetch::Available(vec![live_node("n1", status)])
                            }
                        };

                        let views = merge(&[record], &fetch);
                        assert_eq!(views.len(), 1);
                        assert!(FleetStatus::ALL.contains(&views[0].status));
                    }
                }
            }
        }
    }
}
