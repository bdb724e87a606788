//! Fleet console service
//!
//! Wires the fleet core into a long-running service: configuration, the
//! HTTP API and the convergence board.

pub mod api;
pub mod config;
pub mod error;
pub mod sessions;
