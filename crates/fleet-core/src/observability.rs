//! Observability infrastructure for the fleet console
//!
//! Provides:
//! - Prometheus metrics (stream loads, load latency, reconciled entities,
//!   poll sessions, commands)
//! - Structured audit logging of operator commands with tracing

use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for load latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<FleetMetricsInner> = OnceLock::new();

struct FleetMetricsInner {
    stream_loads: IntCounterVec,
    load_latency_seconds: HistogramVec,
    reconciled_entities: IntGaugeVec,
    poll_sessions_active: IntGauge,
    poll_outcomes: IntCounterVec,
    commands: IntCounterVec,
}

impl FleetMetricsInner {
    fn new() -> Self {
        Self {
            stream_loads: register_int_counter_vec!(
                "fleet_console_stream_loads_total",
                "Stream load cycles by outcome (applied, superseded, failed)",
                &["stream", "outcome"]
            )
            .expect("Failed to register stream_loads_total"),

            load_latency_seconds: register_histogram_vec!(
                "fleet_console_load_latency_seconds",
                "Time spent fetching and merging one stream",
                &["stream"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register load_latency_seconds"),

            reconciled_entities: register_int_gauge_vec!(
                "fleet_console_reconciled_entities",
                "Entities in the last committed set of a stream, by status",
                &["stream", "status"]
            )
            .expect("Failed to register reconciled_entities"),

            poll_sessions_active: register_int_gauge!(
                "fleet_console_poll_sessions_active",
                "Convergence poll sessions currently running"
            )
            .expect("Failed to register poll_sessions_active"),

            poll_outcomes: register_int_counter_vec!(
                "fleet_console_poll_outcomes_total",
                "Terminal states reached by poll sessions",
                &["state"]
            )
            .expect("Failed to register poll_outcomes_total"),

            commands: register_int_counter_vec!(
                "fleet_console_commands_total",
                "Operator commands by command and result",
                &["command", "result"]
            )
            .expect("Failed to register commands_total"),
        }
    }
}

/// Handle to the process-wide fleet metrics.
///
/// Clones share the same underlying Prometheus collectors.
#[derive(Clone)]
pub struct FleetMetrics {
    _private: (),
}

impl Default for FleetMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl FleetMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(FleetMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &FleetMetricsInner {
        GLOBAL_METRICS.get_or_init(FleetMetricsInner::new)
    }

    pub fn record_load(&self, stream: &str, outcome: &str, duration_secs: f64) {
        let inner = self.inner();
        inner.stream_loads.with_label_values(&[stream, outcome]).inc();
        inner
            .load_latency_seconds
            .with_label_values(&[stream])
            .observe(duration_secs);
    }

    pub fn set_reconciled(&self, stream: &str, status: &str, count: i64) {
        self.inner()
            .reconciled_entities
            .with_label_values(&[stream, status])
            .set(count);
    }

    pub fn poll_started(&self) {
        self.inner().poll_sessions_active.inc();
    }

    pub fn poll_finished(&self, state: &str) {
        let inner = self.inner();
        inner.poll_sessions_active.dec();
        inner.poll_outcomes.with_label_values(&[state]).inc();
    }

    pub fn record_command(&self, command: &str, result: &str) {
        self.inner()
            .commands
            .with_label_values(&[command, result])
            .inc();
    }
}

/// Structured logger for operator-visible events
#[derive(Clone)]
pub struct AuditLogger {
    instance: String,
}

impl AuditLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_command_dispatched(&self, identity: &str, command: &str, converging: bool) {
        info!(
            event = "command_dispatched",
            instance = %self.instance,
            identity = %identity,
            command = %command,
            converging = converging,
            "Command acknowledged by backend"
        );
    }

    pub fn log_command_rejected(&self, identity: &str, command: &str, reason: &str) {
        warn!(
            event = "command_rejected",
            instance = %self.instance,
            identity = %identity,
            command = %command,
            reason = %reason,
            "Command rejected"
        );
    }

    pub fn log_convergence(&self, identity: &str, state: &str, detail: &str, attempts: u32) {
        match state {
            "ready" | "entity_gone" => {
                info!(
                    event = "convergence_finished",
                    instance = %self.instance,
                    identity = %identity,
                    state = %state,
                    detail = %detail,
                    attempts = attempts,
                    "Convergence wait finished"
                );
            }
            _ => {
                warn!(
                    event = "convergence_finished",
                    instance = %self.instance,
                    identity = %identity,
                    state = %state,
                    detail = %detail,
                    attempts = attempts,
                    "Stopped waiting for convergence"
                );
            }
        }
    }

    pub fn log_startup(&self, version: &str, backend: &str) {
        info!(
            event = "console_started",
            instance = %self.instance,
            version = %version,
            backend = %backend,
            "Fleet console started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "console_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Fleet console shutting down"
        );
    }
}
