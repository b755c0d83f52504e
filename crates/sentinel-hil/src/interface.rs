//! HIL interface contract

use std::time::Duration;

use async_trait::async_trait;
use nalgebra::Matrix4;
use thiserror::Error;

use sentinel_core::SensorKind;
use sentinel_fusion::SensorSample;

/// Budget for `connect`; enforced by the caller with a timeout so a
/// wedged link raises a classified error instead of hanging the loop.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum HilError {
    #[error("interface is not connected")]
    NotConnected,
    #[error("hardware fault: {0}")]
    Hardware(String),
    #[error("operation timed out")]
    Timeout,
}

/// One hardware link producing timestamped samples.
///
/// The sampling rate is fixed per interface and travels with the sample
/// metadata; the stream driver paces reads against it.
#[async_trait]
pub trait HilInterface: Send {
    fn interface_id(&self) -> &str;

    fn sensor_kind(&self) -> SensorKind;

    /// Samples per second this interface produces.
    fn sampling_rate_hz(&self) -> f64;

    /// Establish the link. Returns false when the hardware refused the
    /// handshake without faulting.
    async fn connect(&mut self) -> Result<bool, HilError>;

    async fn disconnect(&mut self) -> Result<(), HilError>;

    /// Read one sample. Requires a connected link.
    async fn read_sample(&mut self) -> Result<SensorSample, HilError>;

    /// Run the hardware's self-calibration and return the rigid-body
    /// transform into the platform frame.
    async fn calibrate(&mut self) -> Result<Matrix4<f64>, HilError>;
}
