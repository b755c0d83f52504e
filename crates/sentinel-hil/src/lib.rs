//! # Sentinel HIL
//!
//! Hardware-in-the-loop interfaces: async sample producers that feed the
//! fusion pipeline. Streams are infinite, restartable, and never block
//! the producer — when the consumer lags, the oldest queued sample is
//! dropped and a `SensorDropped` event is emitted.

mod driver;
mod interface;
mod simulated;

pub use driver::{SampleStream, StreamDriver, DEFAULT_STREAM_DEPTH};
pub use interface::{HilError, HilInterface, CONNECT_TIMEOUT};
pub use simulated::{ImuInterface, SimulatedSensor};
