//! System events
//!
//! Closed event set with priority-tagged, immutable payloads. The kind is
//! always derived from the payload variant, so a kind/payload mismatch is
//! unrepresentable.

use serde::{Deserialize, Serialize};

use crate::clock::Nanos;
use crate::error::{ErrorCategory, ErrorSeverity};
use crate::estimate::FusedState;
use crate::sensor::SensorKind;

/// Delivery priority. 0 is delivered strictly before any queued 1, and so
/// on down to 3.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    /// Emergencies: consensus loss, security lockdown, system failure.
    Critical = 0,
    /// Urgent operational traffic: block creation, anomaly reports.
    High = 1,
    /// Steady-state traffic: sensor and fusion updates.
    Normal = 2,
    /// Diagnostics and housekeeping.
    Low = 3,
}

impl Priority {
    pub const LANES: usize = 4;

    pub fn lane(self) -> usize {
        self as usize
    }

    pub fn from_lane(lane: usize) -> Option<Self> {
        match lane {
            0 => Some(Priority::Critical),
            1 => Some(Priority::High),
            2 => Some(Priority::Normal),
            3 => Some(Priority::Low),
            _ => None,
        }
    }

    /// Event priority used when reporting an error of the given grade.
    pub fn from_severity(severity: ErrorSeverity) -> Self {
        match severity {
            ErrorSeverity::Critical => Priority::Critical,
            ErrorSeverity::Error => Priority::High,
            ErrorSeverity::Warning => Priority::Normal,
            ErrorSeverity::Debug | ErrorSeverity::Info => Priority::Low,
        }
    }
}

/// The closed set of event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    ComponentRegistered,
    ComponentUnregistered,
    ComponentInitialized,
    SensorDataUpdated,
    SensorDropped,
    SensorAlignmentComplete,
    FusedStateUpdated,
    NavigationPositionUpdated,
    BlockCreated,
    ConsensusFailure,
    ConsensusRecovery,
    SecurityViolation,
    AntiHijackingActive,
    SlowHandler,
    QueueEvicted,
    Error,
    SystemFailure,
    MaintenanceAlert,
    EmergencyProtocol,
    HilConnected,
    HilDisconnected,
}

/// Active mitigation applied by the command gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Countermeasure {
    /// Blocks all command admission until explicitly cleared.
    CommandLockdown,
    EmergencyBeacon,
    /// Double-checks every subsequent command.
    EnhancedValidation,
    /// Drops commands whose parameters fall outside the tightened
    /// envelope.
    ParameterLockdown,
    FrequencyHop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnomalyKind {
    /// Per-source rate or per-kind frequency exceeded.
    ExcessiveCommands,
    /// Command fell outside the learned behavioral envelope.
    UnusualPattern,
    /// Parameters outside per-kind bounds or restricted without Admin.
    InvalidParameters,
}

/// A detected security anomaly, severity graded 0-10.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityAnomaly {
    pub timestamp_ns: Nanos,
    pub anomaly_type: AnomalyKind,
    pub severity: u8,
    pub source_id: String,
    pub details: String,
}

/// Tagged payload; exactly one variant per [`EventKind`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // ========================================================================
    // Component lifecycle
    // ========================================================================
    ComponentRegistered {
        component_id: String,
        component_type: String,
    },
    ComponentUnregistered {
        component_id: String,
    },
    ComponentInitialized {
        component_id: String,
    },

    // ========================================================================
    // Sensing & fusion
    // ========================================================================
    SensorDataUpdated {
        sensor_id: String,
        sensor_kind: SensorKind,
        sample_timestamp_ns: Nanos,
    },
    SensorDropped {
        sensor_id: String,
        dropped_total: u64,
    },
    SensorAlignmentComplete {
        sensor_id: String,
        reference_id: String,
        residual_error: f64,
        confidence: f64,
    },
    FusedStateUpdated(Box<FusedState>),
    NavigationPositionUpdated {
        position: [f64; 3],
        velocity: [f64; 3],
    },

    // ========================================================================
    // Ledger & consensus
    // ========================================================================
    BlockCreated {
        index: u64,
        block_hash: String,
        transaction_count: usize,
    },
    ConsensusFailure {
        chain_length: usize,
    },
    ConsensusRecovery {
        recovered: bool,
        chain_length: usize,
    },

    // ========================================================================
    // Security
    // ========================================================================
    SecurityViolation(SecurityAnomaly),
    AntiHijackingActive {
        countermeasures: Vec<Countermeasure>,
    },
    EmergencyProtocol {
        reason: String,
    },

    // ========================================================================
    // Bus housekeeping
    // ========================================================================
    SlowHandler {
        kind: EventKind,
        elapsed_ms: u64,
    },
    QueueEvicted {
        evicted_kind: EventKind,
        evicted_priority: Priority,
    },

    // ========================================================================
    // Faults
    // ========================================================================
    Error {
        message: String,
        category: ErrorCategory,
        severity: ErrorSeverity,
        origin_component: Option<String>,
    },
    SystemFailure {
        message: String,
        origin_component: Option<String>,
    },
    MaintenanceAlert {
        component_id: String,
        message: String,
    },

    // ========================================================================
    // HIL link state
    // ========================================================================
    HilConnected {
        interface_id: String,
    },
    HilDisconnected {
        interface_id: String,
    },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::ComponentRegistered { .. } => EventKind::ComponentRegistered,
            EventPayload::ComponentUnregistered { .. } => EventKind::ComponentUnregistered,
            EventPayload::ComponentInitialized { .. } => EventKind::ComponentInitialized,
            EventPayload::SensorDataUpdated { .. } => EventKind::SensorDataUpdated,
            EventPayload::SensorDropped { .. } => EventKind::SensorDropped,
            EventPayload::SensorAlignmentComplete { .. } => EventKind::SensorAlignmentComplete,
            EventPayload::FusedStateUpdated(_) => EventKind::FusedStateUpdated,
            EventPayload::NavigationPositionUpdated { .. } => EventKind::NavigationPositionUpdated,
            EventPayload::BlockCreated { .. } => EventKind::BlockCreated,
            EventPayload::ConsensusFailure { .. } => EventKind::ConsensusFailure,
            EventPayload::ConsensusRecovery { .. } => EventKind::ConsensusRecovery,
            EventPayload::SecurityViolation(_) => EventKind::SecurityViolation,
            EventPayload::AntiHijackingActive { .. } => EventKind::AntiHijackingActive,
            EventPayload::EmergencyProtocol { .. } => EventKind::EmergencyProtocol,
            EventPayload::SlowHandler { .. } => EventKind::SlowHandler,
            EventPayload::QueueEvicted { .. } => EventKind::QueueEvicted,
            EventPayload::Error { .. } => EventKind::Error,
            EventPayload::SystemFailure { .. } => EventKind::SystemFailure,
            EventPayload::MaintenanceAlert { .. } => EventKind::MaintenanceAlert,
            EventPayload::HilConnected { .. } => EventKind::HilConnected,
            EventPayload::HilDisconnected { .. } => EventKind::HilDisconnected,
        }
    }
}

/// An immutable published event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub source_id: String,
    pub timestamp_ns: Nanos,
    pub priority: Priority,
    pub payload: EventPayload,
}

impl Event {
    /// Build an event; the kind is taken from the payload variant.
    pub fn new(
        source_id: impl Into<String>,
        timestamp_ns: Nanos,
        priority: Priority,
        payload: EventPayload,
    ) -> Self {
        Self {
            kind: payload.kind(),
            source_id: source_id.into(),
            timestamp_ns,
            priority,
            payload,
        }
    }
}

/// Anything that can accept a published event. Implemented by the bus;
/// taken by the error fabric and other leaf crates so they stay
/// decoupled from bus internals.
pub trait EventSink: Send + Sync {
    /// Enqueue an event. Implementations must not block the caller; a
    /// full queue is handled by the sink's own policy.
    fn emit(&self, event: Event);
}

/// Sink that drops everything. Useful in unit tests.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: Event) {}
}
