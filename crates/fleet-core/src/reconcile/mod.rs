//! Reconciliation of inventory and live state
//!
//! Provides:
//! - Per-stream request epochs (last-issued load wins)
//! - The per-kind profile table and the pure source merger
//! - The reconciler, which owns the committed set of every stream
//! - A periodic refresh loop

pub mod epoch;
mod merge;
pub mod profile;
mod reconciler;
mod refresh;


pub use epoch::{EpochGuard, EpochToken, StreamId};
pub use merge::{derive_status, merge};
pub use profile::{InventoryScope, KindProfile, SecondaryKey};
pub use reconciler::{LoadOutcome, Reconciler, ReconcilerBuilder, StreamSnapshot, StreamUpdate};
pub use refresh::{RefreshConfig, RefreshLoop, RefreshLoopBuilder};
