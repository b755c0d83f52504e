//! Typed actuator commands
//!
//! Every command entering the system is one of these variants; the
//! boundary rejects anything else. The gateway validates envelopes, the
//! ledger seals them into blocks, and the dispatcher routes admitted
//! commands to components.

use serde::{Deserialize, Serialize};

use crate::clock::Nanos;
use crate::rbac::Role;

/// Semantic command families, used for frequency analysis and
/// per-kind parameter bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CommandKind {
    Navigation,
    System,
    Mission,
    Sensor,
}

impl CommandKind {
    pub fn label(self) -> &'static str {
        match self {
            CommandKind::Navigation => "navigation",
            CommandKind::System => "system",
            CommandKind::Mission => "mission",
            CommandKind::Sensor => "sensor",
        }
    }
}

/// Navigation setpoints. Absent fields leave the current setpoint
/// untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NavigationParams {
    /// Meters above launch datum.
    pub altitude_m: Option<f64>,
    /// Ground speed, m/s.
    pub speed_mps: Option<f64>,
    /// Heading, degrees clockwise from north.
    pub heading_deg: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemAction {
    Shutdown,
    Reset,
    FirmwareUpdate,
    Diagnose,
    Update,
}

impl SystemAction {
    /// Actions reserved for `Admin` callers.
    pub fn is_restricted(self) -> bool {
        matches!(
            self,
            SystemAction::Shutdown | SystemAction::Reset | SystemAction::FirmwareUpdate
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissionAction {
    Create,
    Execute,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorAction {
    Configure,
    Calibrate,
    Read,
}

/// Command payload, tagged by family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommandPayload {
    Navigation(NavigationParams),
    System { action: SystemAction },
    Mission { action: MissionAction, mission_id: String },
    Sensor { action: SensorAction, sensor_id: String },
}

impl CommandPayload {
    pub fn kind(&self) -> CommandKind {
        match self {
            CommandPayload::Navigation(_) => CommandKind::Navigation,
            CommandPayload::System { .. } => CommandKind::System,
            CommandPayload::Mission { .. } => CommandKind::Mission,
            CommandPayload::Sensor { .. } => CommandKind::Sensor,
        }
    }

    /// The `(resource, action)` pair a caller must hold to issue this
    /// payload.
    pub fn required_permission(&self) -> (&'static str, &'static str) {
        match self {
            CommandPayload::Navigation(_) => ("navigation", "control"),
            CommandPayload::System { action } => match action {
                SystemAction::Diagnose => ("system", "diagnose"),
                _ => ("system", "update"),
            },
            CommandPayload::Mission { action, .. } => match action {
                MissionAction::Create => ("mission", "create"),
                MissionAction::Execute => ("mission", "execute"),
                MissionAction::Abort => ("mission", "abort"),
            },
            CommandPayload::Sensor { action, .. } => match action {
                SensorAction::Configure => ("sensors", "configure"),
                SensorAction::Calibrate => ("sensors", "calibrate"),
                SensorAction::Read => ("sensors", "read"),
            },
        }
    }

    /// Numeric projection of the payload parameters, used by the
    /// behavioral envelope learner. Fixed length per kind.
    pub fn feature_vector(&self) -> Vec<f64> {
        match self {
            CommandPayload::Navigation(p) => vec![
                p.altitude_m.unwrap_or(0.0),
                p.speed_mps.unwrap_or(0.0),
                p.heading_deg.unwrap_or(0.0),
            ],
            CommandPayload::System { action } => vec![*action as u8 as f64],
            CommandPayload::Mission { action, .. } => vec![*action as u8 as f64],
            CommandPayload::Sensor { action, .. } => vec![*action as u8 as f64],
        }
    }
}

/// A command plus its provenance, as accepted at the front boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    /// Issuing node or operator.
    pub source_id: String,
    /// Monotonic issue time.
    pub issued_at_ns: Nanos,
    /// Role the caller authenticated as.
    pub role: Role,
    pub payload: CommandPayload,
}

impl CommandEnvelope {
    pub fn new(
        source_id: impl Into<String>,
        issued_at_ns: Nanos,
        role: Role,
        payload: CommandPayload,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            issued_at_ns,
            role,
            payload,
        }
    }

    pub fn kind(&self) -> CommandKind {
        self.payload.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restricted_system_actions() {
        assert!(SystemAction::Shutdown.is_restricted());
        assert!(SystemAction::Reset.is_restricted());
        assert!(SystemAction::FirmwareUpdate.is_restricted());
        assert!(!SystemAction::Diagnose.is_restricted());
    }

    #[test]
    fn test_permission_mapping() {
        let nav = CommandPayload::Navigation(NavigationParams::default());
        assert_eq!(nav.required_permission(), ("navigation", "control"));

        let abort = CommandPayload::Mission {
            action: MissionAction::Abort,
            mission_id: "m-1".into(),
        };
        assert_eq!(abort.required_permission(), ("mission", "abort"));
    }

    #[test]
    fn test_feature_vector_is_fixed_length_per_kind() {
        let a = CommandPayload::Navigation(NavigationParams {
            altitude_m: Some(100.0),
            ..Default::default()
        });
        let b = CommandPayload::Navigation(NavigationParams::default());
        assert_eq!(a.feature_vector().len(), b.feature_vector().len());
    }
}
