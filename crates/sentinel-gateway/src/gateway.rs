//! Secure command gateway
//!
//! Screening order: lockdown gate, role check, then the four anomaly
//! checks (rate, frequency, parameters, behavioral). The checks are
//! independent of each other; severity ≥ 8 anomalies reject the command
//! and lock admission down, severity 5-7 anomalies tighten validation
//! but let compliant traffic keep flowing.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use sentinel_core::clock::Nanos;
use sentinel_core::{
    AnomalyKind, Clock, CommandEnvelope, CommandKind, CommandPayload, Countermeasure, Event,
    EventPayload, EventSink, Priority, RbacTable, Role, SecurityAnomaly,
};

use crate::countermeasure::{CountermeasureSet, LOCKDOWN_KINDS};
use crate::envelope::EnvelopeLearner;

/// Typed admission rejection. The runtime front door folds these into
/// the caller-facing code set together with the ledger rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GatewayRejection {
    /// Role lacks the permission, or a restricted action without Admin.
    #[error("caller is not authorized for this command")]
    Unauthorized,
    /// Source exceeded its rate budget, or admission is locked down.
    #[error("command throttled")]
    Throttled,
    /// Parameters out of bounds or outside the behavioral envelope.
    #[error("command flagged as anomalous")]
    Anomalous,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Sliding-window per-source rate budget, commands per second.
    pub rate_limit_per_sec: usize,
    /// Command-history span consulted by the frequency check.
    pub frequency_window: usize,
    /// Same-kind occurrences allowed inside the frequency window.
    pub frequency_limit: usize,
    /// Envelope tolerance, in standard deviations.
    pub envelope_k_sigma: f64,
    /// Tolerance while `EnhancedValidation` is active.
    pub enhanced_k_sigma: f64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_sec: 20,
            frequency_window: 50,
            frequency_limit: 7,
            envelope_k_sigma: 3.0,
            enhanced_k_sigma: 2.0,
        }
    }
}

/// Navigation bounds; halved while `ParameterLockdown` is active.
const MAX_ALTITUDE_M: f64 = 30_000.0;
const MAX_SPEED_MPS: f64 = 1_000.0;

/// One accepted command as retained for diagnostics and the frequency
/// window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRecord {
    pub kind: CommandKind,
    pub timestamp_ns: Nanos,
    /// Hex SHA-256 over the command kind and its parameter projection.
    pub digest: String,
}

fn command_digest(payload: &CommandPayload) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.kind().label().as_bytes());
    for feature in payload.feature_vector() {
        hasher.update(feature.to_bits().to_be_bytes());
    }
    hex::encode(hasher.finalize())
}

pub struct SecureGateway {
    config: GatewayConfig,
    rbac: RbacTable,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
    /// Last accepted commands, bounded by `frequency_window`.
    history: VecDeque<CommandRecord>,
    rate_windows: HashMap<String, VecDeque<Nanos>>,
    envelopes: HashMap<CommandKind, EnvelopeLearner>,
    countermeasures: CountermeasureSet,
}

impl SecureGateway {
    pub fn new(
        config: GatewayConfig,
        rbac: RbacTable,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            rbac,
            clock,
            sink,
            history: VecDeque::new(),
            rate_windows: HashMap::new(),
            envelopes: HashMap::new(),
            countermeasures: CountermeasureSet::new(),
        }
    }

    pub fn with_defaults(clock: Arc<dyn Clock>, sink: Arc<dyn EventSink>) -> Self {
        Self::new(GatewayConfig::default(), RbacTable::default(), clock, sink)
    }

    /// Screen one command. `Ok(())` admits it toward the ledger.
    pub fn screen(&mut self, cmd: &CommandEnvelope) -> Result<(), GatewayRejection> {
        let now = self.clock.now_ns();
        self.countermeasures.expire(now);

        if self.countermeasures.is_active(Countermeasure::CommandLockdown) {
            debug!(source = %cmd.source_id, "command rejected: lockdown active");
            return Err(GatewayRejection::Throttled);
        }

        self.check_authorization(cmd, now)?;
        self.check_rate(cmd, now)?;
        let frequency_flagged = self.check_frequency(cmd, now);
        self.check_parameters(cmd, now)?;
        self.check_behavior(cmd, now)?;

        // Accepted: fold into history, rate window, and the envelope.
        self.record_accepted(cmd, now);
        if frequency_flagged {
            debug!(kind = ?cmd.kind(), "admitted under enhanced validation");
        }
        Ok(())
    }

    /// Consensus-loss posture: the command link itself is suspect, so
    /// light the beacon and start hopping frequencies.
    pub fn engage_emergency_posture(&mut self) {
        let now = self.clock.now_ns();
        self.countermeasures
            .activate(Countermeasure::EmergencyBeacon, now);
        self.countermeasures
            .activate(Countermeasure::FrequencyHop, now);
    }

    /// Out-of-band Admin action: clear the lockdown pair.
    pub fn clear_lockdown(&mut self, role: Role) -> Result<(), GatewayRejection> {
        if role != Role::Admin {
            return Err(GatewayRejection::Unauthorized);
        }
        self.countermeasures.clear_lockdown();
        Ok(())
    }

    pub fn active_countermeasures(&mut self) -> Vec<Countermeasure> {
        self.countermeasures.expire(self.clock.now_ns());
        self.countermeasures.snapshot()
    }

    /// Accepted-command history depth (diagnostics).
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Recent accepted commands, oldest first.
    pub fn recent_commands(&self) -> Vec<CommandRecord> {
        self.history.iter().cloned().collect()
    }

    // ------------------------------------------------------------------
    // Checks
    // ------------------------------------------------------------------

    fn check_authorization(
        &mut self,
        cmd: &CommandEnvelope,
        now: Nanos,
    ) -> Result<(), GatewayRejection> {
        let (resource, action) = cmd.payload.required_permission();
        let mut authorized = self.rbac.check(cmd.role, resource, action);

        if let CommandPayload::System { action } = &cmd.payload {
            if action.is_restricted() && cmd.role != Role::Admin {
                authorized = false;
            }
        }

        if authorized {
            return Ok(());
        }

        self.raise(
            SecurityAnomaly {
                timestamp_ns: now,
                anomaly_type: AnomalyKind::InvalidParameters,
                severity: 8,
                source_id: cmd.source_id.clone(),
                details: format!("unauthorized {}:{} as {:?}", resource, action, cmd.role),
            },
            now,
        );
        Err(GatewayRejection::Unauthorized)
    }

    fn check_rate(&mut self, cmd: &CommandEnvelope, now: Nanos) -> Result<(), GatewayRejection> {
        let window = Duration::from_secs(1).as_nanos() as u64;
        let entries = self.rate_windows.entry(cmd.source_id.clone()).or_default();
        while entries.front().is_some_and(|&t| now.saturating_sub(t) >= window) {
            entries.pop_front();
        }
        entries.push_back(now);

        if entries.len() <= self.config.rate_limit_per_sec {
            return Ok(());
        }

        let count = entries.len();
        self.raise(
            SecurityAnomaly {
                timestamp_ns: now,
                anomaly_type: AnomalyKind::ExcessiveCommands,
                severity: 8,
                source_id: cmd.source_id.clone(),
                details: format!("{count} commands inside 1 s window"),
            },
            now,
        );
        Err(GatewayRejection::Throttled)
    }

    /// Frequency anomalies tighten validation but do not reject on
    /// their own; steady same-kind traffic is legitimate in mission
    /// phases.
    fn check_frequency(&mut self, cmd: &CommandEnvelope, now: Nanos) -> bool {
        let same_kind = self
            .history
            .iter()
            .rev()
            .take(self.config.frequency_window)
            .filter(|entry| entry.kind == cmd.kind())
            .count();
        if same_kind <= self.config.frequency_limit {
            return false;
        }

        self.raise(
            SecurityAnomaly {
                timestamp_ns: now,
                anomaly_type: AnomalyKind::UnusualPattern,
                severity: 7,
                source_id: cmd.source_id.clone(),
                details: format!(
                    "{same_kind} {} commands in the last {}",
                    cmd.kind().label(),
                    self.config.frequency_window
                ),
            },
            now,
        );
        true
    }

    fn check_parameters(
        &mut self,
        cmd: &CommandEnvelope,
        now: Nanos,
    ) -> Result<(), GatewayRejection> {
        let tightened = self
            .countermeasures
            .is_active(Countermeasure::ParameterLockdown);
        let scale = if tightened { 0.5 } else { 1.0 };

        let violation = match &cmd.payload {
            CommandPayload::Navigation(p) => {
                let altitude_bad = p
                    .altitude_m
                    .is_some_and(|a| !(0.0..=MAX_ALTITUDE_M * scale).contains(&a));
                let speed_bad = p
                    .speed_mps
                    .is_some_and(|s| !(0.0..=MAX_SPEED_MPS * scale).contains(&s));
                if altitude_bad {
                    Some(format!("altitude {:?} outside bounds", p.altitude_m))
                } else if speed_bad {
                    Some(format!("speed {:?} outside bounds", p.speed_mps))
                } else {
                    None
                }
            }
            // Restricted system actions are handled by authorization.
            _ => None,
        };

        let Some(details) = violation else {
            return Ok(());
        };

        // A violation of the tightened envelope renews the lockdown at a
        // lower grade; a hard bounds violation escalates fully.
        let severity = if tightened { 6 } else { 8 };
        self.raise(
            SecurityAnomaly {
                timestamp_ns: now,
                anomaly_type: AnomalyKind::InvalidParameters,
                severity,
                source_id: cmd.source_id.clone(),
                details,
            },
            now,
        );
        Err(GatewayRejection::Anomalous)
    }

    fn check_behavior(&mut self, cmd: &CommandEnvelope, now: Nanos) -> Result<(), GatewayRejection> {
        let k_sigma = if self
            .countermeasures
            .is_active(Countermeasure::EnhancedValidation)
        {
            self.config.enhanced_k_sigma
        } else {
            self.config.envelope_k_sigma
        };

        let features = cmd.payload.feature_vector();
        let matches = self
            .envelopes
            .get(&cmd.kind())
            .map_or(true, |learner| learner.matches(&features, k_sigma));
        if matches {
            return Ok(());
        }

        self.raise(
            SecurityAnomaly {
                timestamp_ns: now,
                anomaly_type: AnomalyKind::UnusualPattern,
                severity: 7,
                source_id: cmd.source_id.clone(),
                details: format!("{} command outside learned envelope", cmd.kind().label()),
            },
            now,
        );
        Err(GatewayRejection::Anomalous)
    }

    fn record_accepted(&mut self, cmd: &CommandEnvelope, now: Nanos) {
        self.history.push_back(CommandRecord {
            kind: cmd.kind(),
            timestamp_ns: now,
            digest: command_digest(&cmd.payload),
        });
        while self.history.len() > self.config.frequency_window {
            self.history.pop_front();
        }
        self.envelopes
            .entry(cmd.kind())
            .or_default()
            .learn(&cmd.payload.feature_vector());
    }

    // ------------------------------------------------------------------
    // Escalation
    // ------------------------------------------------------------------

    fn raise(&mut self, anomaly: SecurityAnomaly, now: Nanos) {
        let fresh = self.escalate(&anomaly, now);
        if !fresh {
            // The ladder is already standing; renewals stay quiet so a
            // burst maps to one violation report.
            return;
        }

        warn!(
            kind = ?anomaly.anomaly_type,
            severity = anomaly.severity,
            source = %anomaly.source_id,
            "security anomaly"
        );
        self.sink.emit(Event::new(
            "command-gateway",
            now,
            if anomaly.severity >= 8 {
                Priority::Critical
            } else {
                Priority::High
            },
            EventPayload::SecurityViolation(anomaly.clone()),
        ));
        self.sink.emit(Event::new(
            "command-gateway",
            now,
            Priority::High,
            EventPayload::AntiHijackingActive {
                countermeasures: self.countermeasures.snapshot(),
            },
        ));
        if anomaly.severity >= 8 {
            self.sink.emit(Event::new(
                "command-gateway",
                now,
                Priority::Critical,
                EventPayload::EmergencyProtocol {
                    reason: format!("{:?}: {}", anomaly.anomaly_type, anomaly.details),
                },
            ));
        }
    }

    /// Walk the countermeasure ladder. Returns true when any mitigation
    /// was freshly activated (as opposed to renewed).
    fn escalate(&mut self, anomaly: &SecurityAnomaly, now: Nanos) -> bool {
        if anomaly.severity >= 8 {
            let mut fresh = false;
            for kind in LOCKDOWN_KINDS {
                fresh |= self.countermeasures.activate(kind, now);
            }
            fresh
        } else if anomaly.severity >= 5 {
            let kind = match anomaly.anomaly_type {
                AnomalyKind::InvalidParameters => Countermeasure::ParameterLockdown,
                _ => Countermeasure::EnhancedValidation,
            };
            self.countermeasures.activate(kind, now)
        } else {
            false
        }
    }
}
