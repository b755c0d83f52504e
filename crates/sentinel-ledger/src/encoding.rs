//! Canonical byte encoding
//!
//! Deterministic encoding used for hashing and signing: fields are
//! written as `(key, value)` pairs sorted lexicographically by key, keys
//! are length-prefixed (u16 BE), values length-prefixed (u32 BE),
//! integers big-endian, floats as IEEE-754 bit patterns. Absent optional
//! fields are omitted entirely, so two equal values always produce
//! identical bytes.

use sentinel_core::{CommandPayload, MissionAction, SensorAction, SystemAction};

/// Sorted key/value accumulator.
#[derive(Default)]
pub struct CanonicalMap {
    fields: Vec<(String, Vec<u8>)>,
}

impl CanonicalMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_bytes(&mut self, key: &str, value: impl Into<Vec<u8>>) -> &mut Self {
        self.fields.push((key.to_string(), value.into()));
        self
    }

    pub fn put_str(&mut self, key: &str, value: &str) -> &mut Self {
        self.put_bytes(key, value.as_bytes().to_vec())
    }

    pub fn put_u64(&mut self, key: &str, value: u64) -> &mut Self {
        self.put_bytes(key, value.to_be_bytes().to_vec())
    }

    pub fn put_u8(&mut self, key: &str, value: u8) -> &mut Self {
        self.put_bytes(key, vec![value])
    }

    pub fn put_f64(&mut self, key: &str, value: f64) -> &mut Self {
        self.put_bytes(key, value.to_bits().to_be_bytes().to_vec())
    }

    pub fn put_opt_f64(&mut self, key: &str, value: Option<f64>) -> &mut Self {
        if let Some(v) = value {
            self.put_f64(key, v);
        }
        self
    }

    /// Serialize: fields sorted by key, each as
    /// `len(key):u16 || key || len(value):u32 || value`.
    pub fn finish(mut self) -> Vec<u8> {
        self.fields.sort_by(|a, b| a.0.cmp(&b.0));
        let mut out = Vec::new();
        for (key, value) in self.fields {
            out.extend_from_slice(&(key.len() as u16).to_be_bytes());
            out.extend_from_slice(key.as_bytes());
            out.extend_from_slice(&(value.len() as u32).to_be_bytes());
            out.extend_from_slice(&value);
        }
        out
    }
}

/// Types with a canonical byte form.
pub trait CanonicalEncode {
    fn canonical_bytes(&self) -> Vec<u8>;
}

impl CanonicalEncode for CommandPayload {
    fn canonical_bytes(&self) -> Vec<u8> {
        let mut map = CanonicalMap::new();
        map.put_str("kind", self.kind().label());
        match self {
            CommandPayload::Navigation(p) => {
                map.put_opt_f64("altitude_m", p.altitude_m);
                map.put_opt_f64("heading_deg", p.heading_deg);
                map.put_opt_f64("speed_mps", p.speed_mps);
            }
            CommandPayload::System { action } => {
                map.put_u8("action", system_action_code(*action));
            }
            CommandPayload::Mission { action, mission_id } => {
                map.put_u8("action", mission_action_code(*action));
                map.put_str("mission_id", mission_id);
            }
            CommandPayload::Sensor { action, sensor_id } => {
                map.put_u8("action", sensor_action_code(*action));
                map.put_str("sensor_id", sensor_id);
            }
        }
        map.finish()
    }
}

fn system_action_code(action: SystemAction) -> u8 {
    match action {
        SystemAction::Shutdown => 0,
        SystemAction::Reset => 1,
        SystemAction::FirmwareUpdate => 2,
        SystemAction::Diagnose => 3,
        SystemAction::Update => 4,
    }
}

fn mission_action_code(action: MissionAction) -> u8 {
    match action {
        MissionAction::Create => 0,
        MissionAction::Execute => 1,
        MissionAction::Abort => 2,
    }
}

fn sensor_action_code(action: SensorAction) -> u8 {
    match action {
        SensorAction::Configure => 0,
        SensorAction::Calibrate => 1,
        SensorAction::Read => 2,
    }
}
