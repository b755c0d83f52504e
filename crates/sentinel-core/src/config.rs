//! System configuration
//!
//! Typed view of the recognized options. Loading from disk is the SDK
//! front door's job; this crate only defines the shape, the defaults,
//! and the validation rules.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// Directive string for `tracing_subscriber::EnvFilter`.
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }
}

/// Top-level operating mode of the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemMode {
    Standby,
    Mission,
    Combat,
    /// Entered on consensus loss; actuator dispatch is paused.
    Emergency,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("consensus_threshold {0} outside [0.5, 1.0]")]
    ConsensusThreshold(f64),
    #[error("difficulty_bits {0} outside [1, 32]")]
    DifficultyBits(u8),
    #[error("ai_processing_rate must be positive, got {0}")]
    ProcessingRate(f64),
    #[error("max_concurrent_operations must be at least 1")]
    WorkerCount,
    #[error("timeout_seconds must be positive, got {0}")]
    Timeout(f64),
}

/// Recognized configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub log_level: LogLevel,
    /// Directories scanned for component plugins.
    pub plugin_directories: Vec<PathBuf>,
    /// When false the ledger is disabled; the gateway still runs and
    /// admitted commands dispatch with a synthetic admission record.
    pub enable_blockchain: bool,
    /// Worker pool size for offloaded mining, signature batches, and
    /// fusion linear algebra.
    pub max_concurrent_operations: usize,
    /// Default per-operation timeout.
    pub timeout_seconds: f64,
    /// Update-loop tick rate, Hz.
    pub ai_processing_rate: f64,
    /// Agreement ratio required before a consensus swap.
    pub consensus_threshold: f64,
    /// Proof-of-work leading zero bits.
    pub difficulty_bits: u8,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            plugin_directories: Vec::new(),
            enable_blockchain: true,
            max_concurrent_operations: default_worker_count(),
            timeout_seconds: 5.0,
            ai_processing_rate: 25.0,
            consensus_threshold: 0.66,
            difficulty_bits: 16,
        }
    }
}

/// min(4, hardware_threads - 1), at least 1.
pub fn default_worker_count() -> usize {
    let hw = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(2);
    hw.saturating_sub(1).clamp(1, 4)
}

impl SystemConfig {
    /// Validate option ranges. Fatal at startup; a runtime reload that
    /// fails validation is downgraded to a warning by the caller.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.5..=1.0).contains(&self.consensus_threshold) {
            return Err(ConfigError::ConsensusThreshold(self.consensus_threshold));
        }
        if !(1..=32).contains(&self.difficulty_bits) {
            return Err(ConfigError::DifficultyBits(self.difficulty_bits));
        }
        if self.ai_processing_rate <= 0.0 {
            return Err(ConfigError::ProcessingRate(self.ai_processing_rate));
        }
        if self.max_concurrent_operations == 0 {
            return Err(ConfigError::WorkerCount);
        }
        if self.timeout_seconds <= 0.0 {
            return Err(ConfigError::Timeout(self.timeout_seconds));
        }
        Ok(())
    }

    /// Update-loop period derived from `ai_processing_rate`.
    pub fn tick_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.ai_processing_rate)
    }
}
