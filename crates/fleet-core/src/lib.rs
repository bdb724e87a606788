//! Core library of the fleet console
//!
//! This crate provides the core functionality for:
//! - Reconciling the inventory store with the live cluster per entity kind
//! - Discarding stale loads with per-stream request epochs
//! - Dispatching operator commands and tracking their convergence
//! - HTTP access to the fleet backend
//! - Health checks and observability

pub mod command;
pub mod convergence;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod reconcile;
pub mod source;

pub use command::{Command, CommandDispatcher, DispatchConfig, DispatchOutcome};
pub use convergence::{PollEvent, PollHandle, PollOutcome, PollPolicy, PollState, Readiness, ReadinessPoller};
pub use error::{DispatchError, SourceError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AuditLogger, FleetMetrics};
pub use reconcile::{LoadOutcome, Reconciler, RefreshLoop, StreamSnapshot};
pub use source::HttpBackend;
