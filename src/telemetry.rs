//! Telemetry primitives tracking per-operation lifecycle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::warn;

use crate::{InpaintError, OperationKind};

#[derive(Debug, Default)]
struct TelemetryState {
    stage_counts: HashMap<&'static str, u64>,
    completed_operations: u64,
    failed_operations: u64,
}

/// Request-scoped correlation handle issued when an operation begins.
#[derive(Debug)]
pub struct OperationTicket {
    pub id: u64,
    pub kind: OperationKind,
    pub started: Instant,
}

/// Snapshot of telemetry suitable for assertions and health reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub stage_counts: Vec<(String, u64)>,
    pub completed_operations: u64,
    pub failed_operations: u64,
}

impl TelemetrySnapshot {
    /// Count recorded for a stage, zero when the stage never ran.
    pub fn stage_count(&self, stage: &str) -> u64 {
        self.stage_counts
            .iter()
            .find(|(name, _)| name == stage)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }
}

/// Shared sink capturing per-stage events and operation outcomes.
#[derive(Clone, Default)]
pub struct TelemetrySink {
    state: Arc<Mutex<TelemetryState>>,
    next_id: Arc<AtomicU64>,
}

impl TelemetrySink {
    /// Opens an operation record and issues its correlation id.
    pub fn begin(&self, kind: OperationKind) -> OperationTicket {
        OperationTicket {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            kind,
            started: Instant::now(),
        }
    }

    /// Records that an operation reached a lifecycle stage.
    pub fn record_stage(&self, stage: &'static str) {
        let mut state = self.state.lock().expect("telemetry mutex poisoned");
        *state.stage_counts.entry(stage).or_insert(0) += 1;
    }

    /// Records a terminal success.
    pub fn record_completed(&self, ticket: &OperationTicket) {
        let mut state = self.state.lock().expect("telemetry mutex poisoned");
        state.completed_operations += 1;
        drop(state);
        tracing::info!(
            request = ticket.id,
            operation = %ticket.kind,
            elapsed_ms = ticket.started.elapsed().as_millis() as u64,
            "operation completed"
        );
    }

    /// Records a terminal failure.
    pub fn record_failed(&self, ticket: &OperationTicket, error: &InpaintError) {
        let mut state = self.state.lock().expect("telemetry mutex poisoned");
        state.failed_operations += 1;
        drop(state);
        warn!(
            request = ticket.id,
            operation = %ticket.kind,
            elapsed_ms = ticket.started.elapsed().as_millis() as u64,
            error = %error,
            "operation failed"
        );
    }

    /// Exposes a snapshot for diagnostics and testing.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        let state = self.state.lock().expect("telemetry mutex poisoned");
        TelemetrySnapshot {
            stage_counts: state
                .stage_counts
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            completed_operations: state.completed_operations,
            failed_operations: state.failed_operations,
        }
    }
}
