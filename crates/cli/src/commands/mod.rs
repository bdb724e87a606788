//! Subcommand implementations

pub mod operations;
pub mod sessions;
pub mod streams;

use anyhow::{bail, Context, Result};
use fleet_core::models::{EntityIdentity, EntityKind};

/// Parse `<kind>` and `<[namespace/]name>` into an identity.
///
/// A namespaced kind given without a namespace falls back to
/// `default_namespace`, then to `default`.
pub fn parse_target(kind: &str, target: &str, default_namespace: Option<&str>) -> Result<EntityIdentity> {
    let kind: EntityKind = kind.parse().context("Unsupported kind")?;

    let (namespace, name) = match target.split_once('/') {
        Some((namespace, name)) => (Some(namespace), name),
        None => (None, target),
    };

    if name.is_empty() || name.contains('/') {
        bail!("Invalid target '{}': expected [namespace/]name", target);
    }

    if !kind.is_namespaced() {
        if namespace.is_some() {
            bail!("{} is cluster-scoped; drop the namespace from '{}'", kind, target);
        }
        return Ok(EntityIdentity::cluster(kind, name));
    }

    let namespace = namespace.or(default_namespace).unwrap_or("default");
    if namespace.is_empty() {
        bail!("Invalid target '{}': empty namespace", target);
    }

    Ok(EntityIdentity::namespaced(kind, namespace, name))
}
