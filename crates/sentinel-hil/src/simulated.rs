//! Deterministic simulated interfaces
//!
//! Stand-ins for real hardware links in tests and bench rigs. Readings
//! are drawn from seeded distributions, and timestamps advance by the
//! interface's own sampling period, so a fixed seed reproduces the
//! exact sample sequence.

use async_trait::async_trait;
use nalgebra::{Matrix4, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use statrs::distribution::Normal;

use sentinel_core::SensorKind;
use sentinel_fusion::{Pose, SensorReading, SensorSample};

use crate::interface::{HilError, HilInterface};

/// Generic simulated sensor for any kind.
pub struct SimulatedSensor {
    id: String,
    kind: SensorKind,
    rate_hz: f64,
    rng: StdRng,
    noise: Normal,
    connected: bool,
    index: u64,
}

impl SimulatedSensor {
    pub fn new(id: impl Into<String>, kind: SensorKind, rate_hz: f64, seed: u64) -> Self {
        Self {
            id: id.into(),
            kind,
            rate_hz,
            rng: StdRng::seed_from_u64(seed),
            noise: Normal::new(0.0, 1.0).expect("valid normal"),
            connected: false,
            index: 0,
        }
    }

    fn period_ns(&self) -> u64 {
        (1e9 / self.rate_hz.max(1e-3)) as u64
    }

    fn draw(&mut self) -> f64 {
        use rand::distributions::Distribution;
        self.noise.sample(&mut self.rng)
    }

    fn reading(&mut self) -> SensorReading {
        let n = self.draw();
        match self.kind {
            SensorKind::Lidar => SensorReading::Lidar {
                range_m: 120.0 + n * 0.5,
                centroid: Vector3::new(120.0 + n * 0.5, self.draw() * 0.2, 0.0),
                reflectivity: 0.5,
            },
            SensorKind::Magnetic => SensorReading::Magnetic {
                field_t: Vector3::new(4.8e-5 + n * 1e-8, 1e-6, -2e-6),
                gradient_t_m: 1e-7,
            },
            SensorKind::Spectral => {
                let bands = (0..16)
                    .map(|b| 0.6 + 0.05 * (b as f64 / 4.0).sin() + self.draw() * 0.01)
                    .collect();
                SensorReading::Spectral { bands }
            }
            SensorKind::Imu => SensorReading::Imu {
                angular_rate_rad_s: Vector3::new(n * 0.01, self.draw() * 0.01, 0.0),
                acceleration_m_s2: Vector3::new(0.0, 0.0, 9.81 + n * 0.05),
            },
            SensorKind::Rangefinder => SensorReading::Rangefinder {
                range_m: 80.0 + n * 0.2,
            },
            SensorKind::Video => SensorReading::Video {
                mean_luminance: 0.5 + n * 0.02,
                contrast: 0.3,
            },
        }
    }
}

#[async_trait]
impl HilInterface for SimulatedSensor {
    fn interface_id(&self) -> &str {
        &self.id
    }

    fn sensor_kind(&self) -> SensorKind {
        self.kind
    }

    fn sampling_rate_hz(&self) -> f64 {
        self.rate_hz
    }

    async fn connect(&mut self) -> Result<bool, HilError> {
        self.connected = true;
        Ok(true)
    }

    async fn disconnect(&mut self) -> Result<(), HilError> {
        self.connected = false;
        Ok(())
    }

    async fn read_sample(&mut self) -> Result<SensorSample, HilError> {
        if !self.connected {
            return Err(HilError::NotConnected);
        }
        let timestamp_ns = self.index * self.period_ns();
        self.index += 1;
        let reading = self.reading();
        Ok(SensorSample::new(
            self.id.clone(),
            timestamp_ns,
            reading,
            Pose::default(),
            0.95,
        ))
    }

    async fn calibrate(&mut self) -> Result<Matrix4<f64>, HilError> {
        if !self.connected {
            return Err(HilError::NotConnected);
        }
        Ok(Matrix4::identity())
    }
}

/// Simulated inertial unit with explicit bias state and a self-test.
pub struct ImuInterface {
    inner: SimulatedSensor,
    gyro_bias: Vector3<f64>,
    accel_bias: Vector3<f64>,
}

impl ImuInterface {
    pub fn new(id: impl Into<String>, rate_hz: f64, seed: u64) -> Self {
        Self {
            inner: SimulatedSensor::new(id, SensorKind::Imu, rate_hz, seed),
            gyro_bias: Vector3::new(2e-4, -1e-4, 5e-5),
            accel_bias: Vector3::new(0.01, -0.02, 0.005),
        }
    }

    /// Static self-test: with the platform at rest, the specific force
    /// must read close to standard gravity.
    pub async fn self_test(&mut self) -> Result<bool, HilError> {
        let sample = self.inner.read_sample().await?;
        let SensorReading::Imu {
            acceleration_m_s2, ..
        } = sample.reading
        else {
            return Err(HilError::Hardware("imu produced non-imu reading".into()));
        };
        Ok((acceleration_m_s2.norm() - 9.81).abs() < 0.5)
    }
}

#[async_trait]
impl HilInterface for ImuInterface {
    fn interface_id(&self) -> &str {
        self.inner.interface_id()
    }

    fn sensor_kind(&self) -> SensorKind {
        SensorKind::Imu
    }

    fn sampling_rate_hz(&self) -> f64 {
        self.inner.sampling_rate_hz()
    }

    async fn connect(&mut self) -> Result<bool, HilError> {
        self.inner.connect().await
    }

    async fn disconnect(&mut self) -> Result<(), HilError> {
        self.inner.disconnect().await
    }

    async fn read_sample(&mut self) -> Result<SensorSample, HilError> {
        let mut sample = self.inner.read_sample().await?;
        if let SensorReading::Imu {
            angular_rate_rad_s,
            acceleration_m_s2,
        } = &mut sample.reading
        {
            *angular_rate_rad_s -= self.gyro_bias;
            *acceleration_m_s2 -= self.accel_bias;
        }
        Ok(sample)
    }

    async fn calibrate(&mut self) -> Result<Matrix4<f64>, HilError> {
        // Bias re-estimation happens offline; the spatial transform for
        // the IMU is the identity (it defines the body frame).
        self.inner.calibrate().await
    }
}
