//! Device capability traits: geolocation sensor and camera.
//!
//! The pipeline only ever sees these traits; concrete device integrations
//! live behind them, and deterministic mocks ship for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// One raw position report from the device, before provenance tagging.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub latitude: f64,
    pub longitude: f64,
    /// Reported accuracy in meters, when the device provides one.
    pub accuracy: Option<f64>,
}

/// Sensor failure modes. All of them are expected, non-fatal outcomes.
#[derive(Debug, Clone, Error)]
pub enum SensorError {
    #[error("permission denied")]
    Denied,
    #[error("position unavailable")]
    Unavailable,
    #[error("sensor timed out")]
    Timeout,
}

/// Options for a position request, mirroring the device API knobs.
#[derive(Debug, Clone)]
pub struct PositionRequest {
    pub high_accuracy: bool,
    /// Hard ceiling on the read. The resolver also enforces this from the
    /// outside, so a misbehaving sensor cannot hang the pipeline.
    pub timeout: Duration,
}

impl Default for PositionRequest {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Live device geolocation capability.
#[async_trait]
pub trait GeoSensor: Send + Sync {
    /// Read the current position. A single attempt; errors are structured
    /// outcomes the caller branches on, not faults.
    async fn current_position(
        &self,
        request: &PositionRequest,
    ) -> Result<SensorReading, SensorError>;
}

/// Camera device capability. Acquiring yields a stream that holds the
/// hardware lock until released.
#[async_trait]
pub trait CameraSource: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn CameraStream>, SensorError>;
}

/// An acquired camera stream. `release` stops the underlying track and
/// must be idempotent; [`CameraStreamGuard`] guarantees it runs.
#[async_trait]
pub trait CameraStream: Send {
    async fn capture_frame(&mut self) -> Result<Vec<u8>, SensorError>;
    fn release(&mut self);
}

/// Ownership guard for an acquired stream.
///
/// The hardware lock leaks if a stream is dropped without release, so the
/// guard releases on every exit path: successful capture, user cancel,
/// and teardown.
pub struct CameraStreamGuard {
    stream: Box<dyn CameraStream>,
    released: bool,
}

impl CameraStreamGuard {
    pub fn new(stream: Box<dyn CameraStream>) -> Self {
        Self {
            stream,
            released: false,
        }
    }

    pub async fn capture_frame(&mut self) -> Result<Vec<u8>, SensorError> {
        self.stream.capture_frame().await
    }

    /// Explicitly stop the track and give up the hardware.
    pub fn release(mut self) {
        self.stream.release();
        self.released = true;
    }
}

impl Drop for CameraStreamGuard {
    fn drop(&mut self) {
        if !self.released {
            self.stream.release();
        }
    }
}

/// Deterministic geolocation sensor for tests.
pub struct MockGeoSensor {
    outcome: MockSensorOutcome,
}

enum MockSensorOutcome {
    Fix(SensorReading),
    Fail(SensorError),
    /// Sleeps long enough that any reasonable timeout fires first.
    Hang,
}

impl MockGeoSensor {
    pub fn with_fix(latitude: f64, longitude: f64, accuracy: Option<f64>) -> Self {
        Self {
            outcome: MockSensorOutcome::Fix(SensorReading {
                latitude,
                longitude,
                accuracy,
            }),
        }
    }

    pub fn denied() -> Self {
        Self {
            outcome: MockSensorOutcome::Fail(SensorError::Denied),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            outcome: MockSensorOutcome::Fail(SensorError::Unavailable),
        }
    }

    pub fn hanging() -> Self {
        Self {
            outcome: MockSensorOutcome::Hang,
        }
    }
}

#[async_trait]
impl GeoSensor for MockGeoSensor {
    async fn current_position(
        &self,
        _request: &PositionRequest,
    ) -> Result<SensorReading, SensorError> {
        match &self.outcome {
            MockSensorOutcome::Fix(reading) => Ok(reading.clone()),
            MockSensorOutcome::Fail(err) => Err(err.clone()),
            MockSensorOutcome::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(SensorError::Timeout)
            }
        }
    }
}

/// Camera mock whose acquire/release counters let tests assert the
/// hardware lock is always returned.
pub struct MockCamera {
    frame: Vec<u8>,
    acquired: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl MockCamera {
    pub fn new(frame: Vec<u8>) -> Self {
        Self {
            frame,
            acquired: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn acquired_count(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CameraSource for MockCamera {
    async fn acquire(&self) -> Result<Box<dyn CameraStream>, SensorError> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockCameraStream {
            frame: self.frame.clone(),
            released: Arc::clone(&self.released),
            stopped: false,
        }))
    }
}

struct MockCameraStream {
    frame: Vec<u8>,
    released: Arc<AtomicUsize>,
    stopped: bool,
}

#[async_trait]
impl CameraStream for MockCameraStream {
    async fn capture_frame(&mut self) -> Result<Vec<u8>, SensorError> {
        if self.stopped {
            return Err(SensorError::Unavailable);
        }
        Ok(self.frame.clone())
    }

    fn release(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}
