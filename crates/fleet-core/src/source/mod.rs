//! Boundaries to the external collaborators
//!
//! The core never talks to Kubernetes or the inventory database directly.
//! It consumes three HTTP-shaped collaborators through these traits:
//! - the inventory read, per entity kind
//! - the live cluster read, per entity kind
//! - the mutating command endpoint

mod http;

pub use http::{EndpointConfig, HttpBackend, HttpBackendBuilder};

use crate::command::Command;
use crate::error::SourceError;
use crate::models::{EntityIdentity, EntityKind, InventoryRecord, LiveRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Read access to the durable inventory store
#[async_trait]
pub trait InventorySource: Send + Sync {
    async fn list_inventory(&self, kind: EntityKind) -> Result<Vec<InventoryRecord>, SourceError>;
}

/// Read access to the live cluster API.
///
/// An `Err` means the live system could not be reached; `Ok(vec![])`
/// means it answered with zero entities.
#[async_trait]
pub trait LiveSource: Send + Sync {
    async fn list_live(&self, kind: EntityKind) -> Result<Vec<LiveRecord>, SourceError>;
}

/// Mutating command endpoint
#[async_trait]
pub trait CommandBackend: Send + Sync {
    async fn execute(
        &self,
        identity: &EntityIdentity,
        command: &Command,
    ) -> Result<CommandAck, SourceError>;
}

/// Backend acknowledgment: the command was accepted, nothing more
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandAck {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
