//! Operator commands
//!
//! Provides:
//! - The command vocabulary and which kinds accept which command
//! - The dispatcher, which validates, sends and follows up on a command

mod dispatcher;

#[cfg(test)]
mod tests;

pub use dispatcher::{
    CommandDispatcher, CommandDispatcherBuilder, DispatchConfig, DispatchOutcome,
    DEFAULT_PROTECTED_NAMESPACES,
};

use crate::models::EntityKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Mutating operation on a single entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum Command {
    Scale {
        replicas: u32,
    },
    Restart,
    Rollback {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        revision: Option<i64>,
    },
    UpdateImage {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        container: Option<String>,
        image: String,
    },
    Suspend,
    Resume,
    Delete,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Scale { .. } => "scale",
            Command::Restart => "restart",
            Command::Rollback { .. } => "rollback",
            Command::UpdateImage { .. } => "updateImage",
            Command::Suspend => "suspend",
            Command::Resume => "resume",
            Command::Delete => "delete",
        }
    }

    /// Last URL segment of the backend endpoint
    pub fn path_segment(&self) -> &'static str {
        match self {
            Command::UpdateImage { .. } => "update-image",
            other => other.name(),
        }
    }

    pub fn supports(&self, kind: EntityKind) -> bool {
        use EntityKind::*;

        match self {
            Command::Scale { .. } => matches!(kind, Deployment | StatefulSet),
            Command::Restart | Command::Rollback { .. } | Command::UpdateImage { .. } => {
                matches!(kind, Deployment | StatefulSet | DaemonSet)
            }
            Command::Suspend | Command::Resume => kind == CronJob,
            Command::Delete => true,
        }
    }

    /// Commands refused inside protected namespaces
    pub fn is_destructive(&self) -> bool {
        matches!(self, Command::Delete | Command::Suspend)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Scale { replicas } => write!(f, "scale to {}", replicas),
            Command::Rollback {
                revision: Some(revision),
            } => write!(f, "rollback to revision {}", revision),
            Command::UpdateImage { container, image } => match container {
                Some(container) => write!(f, "set image {}={}", container, image),
                None => write!(f, "set image {}", image),
            },
            other => f.write_str(other.name()),
        }
    }
}
