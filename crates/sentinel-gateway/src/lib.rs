//! # Sentinel Gateway
//!
//! Anti-hijack validator in front of every actuator command. Each
//! envelope is screened by four independent checks (frequency, rate,
//! parameters, behavioral envelope) before ledger admission; failed
//! checks raise graded [`sentinel_core::SecurityAnomaly`]s and walk the
//! countermeasure ladder.
//!
//! Severity ≥ 8 locks command admission down entirely until an Admin
//! clears it out of band; severities 5-7 tighten validation for a window
//! instead of blocking traffic.

mod countermeasure;
mod envelope;
mod gateway;

pub use countermeasure::{CountermeasureSet, LOCKDOWN_KINDS};
pub use envelope::EnvelopeLearner;
pub use gateway::{CommandRecord, GatewayConfig, GatewayRejection, SecureGateway};
