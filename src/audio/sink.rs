//! Audio sink interface consumed by the audio writer
//!
//! A sink is opened and driven by exactly one writer thread. Sinks need
//! not be `Send`; the factory that opens them is.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crate::audio::format::StreamFormat;
use crate::error::AudioError;
use crate::shutdown::Shutdown;

/// Parameters a sink is opened with
#[derive(Debug, Clone, PartialEq)]
pub struct SinkParams {
    pub format: StreamFormat,
    /// Size of one packet; the sink buffers a small multiple of it
    pub buffer_size_bytes: usize,
    pub low_latency: bool,
    /// Output device name, default device when `None`
    pub device: Option<String>,
}

/// Output device handle
pub trait AudioSink {
    /// Start consuming written samples
    fn play(&mut self) -> Result<(), AudioError>;

    /// Write raw wire bytes, blocking until all of them are accepted.
    /// Returns the number of bytes written.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, AudioError>;

    /// Write float samples without blocking.
    /// Returns the number of samples accepted.
    fn write_floats(&mut self, samples: &[f32]) -> Result<usize, AudioError>;

    fn set_volume(&mut self, left: f32, right: f32);

    fn stop(&mut self);

    /// Free the device. The sink is unusable afterwards.
    fn release(&mut self);
}

/// Opens sinks on the thread that will drive them
pub trait SinkFactory: Send + Sync {
    /// `shutdown` lets a blocking write return early when the pipeline stops
    fn open(
        &self,
        params: &SinkParams,
        shutdown: &Shutdown,
    ) -> Result<Box<dyn AudioSink>, AudioError>;

    /// Smallest buffer, in bytes, the device accepts for `format`
    fn min_buffer_size(&self, format: &StreamFormat, device: Option<&str>)
        -> Result<usize, AudioError>;
}

/// Left/right gain shared between a pipeline and its writer
///
/// The pipeline only records the requested gain; the writer applies it to
/// the sink it owns.
#[derive(Debug)]
pub struct StereoVolume {
    left: AtomicU32,
    right: AtomicU32,
    generation: AtomicU64,
}

impl StereoVolume {
    pub fn new(left: f32, right: f32) -> Self {
        Self {
            left: AtomicU32::new(left.to_bits()),
            right: AtomicU32::new(right.to_bits()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn set(&self, left: f32, right: f32) {
        self.left.store(left.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
        self.right.store(right.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
        self.generation.fetch_add(1, Ordering::Release);
    }

    pub fn get(&self) -> (f32, f32) {
        (
            f32::from_bits(self.left.load(Ordering::Relaxed)),
            f32::from_bits(self.right.load(Ordering::Relaxed)),
        )
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl Default for StereoVolume {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}

/// Thread-safe handle to a volume setting
pub type SharedVolume = Arc<StereoVolume>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_generation_and_clamp() {
        let volume = StereoVolume::default();
        assert_eq!(volume.get(), (1.0, 1.0));
        assert_eq!(volume.generation(), 0);

        volume.set(0.1, 1.5);
        assert_eq!(volume.get(), (0.1, 1.0));
        assert_eq!(volume.generation(), 1);
    }
}
