//! In-memory sink
//!
//! Records everything written to it instead of playing it. Useful for
//! headless runs and for checking what a pipeline delivered.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::audio::format::StreamFormat;
use crate::audio::sink::{AudioSink, SinkFactory, SinkParams};
use crate::error::AudioError;
use crate::shutdown::Shutdown;

/// Everything the sinks of one factory have seen
#[derive(Debug, Clone, Default)]
pub struct SinkLog {
    pub opened: Vec<SinkParams>,
    pub bytes: Vec<u8>,
    pub floats: Vec<f32>,
    pub writes: usize,
    pub volumes: Vec<(f32, f32)>,
    pub playing: bool,
    pub stopped: usize,
    pub released: usize,
}

#[derive(Debug, Default)]
struct Shared {
    log: Mutex<SinkLog>,
    fail_open: bool,
    min_buffer: Option<usize>,
}

/// Opens [`MemorySink`]s that share one [`SinkLog`]
#[derive(Debug, Clone, Default)]
pub struct MemorySinkFactory {
    shared: Arc<Shared>,
}

impl MemorySinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory whose `open` always fails
    pub fn failing() -> Self {
        Self {
            shared: Arc::new(Shared {
                fail_open: true,
                ..Shared::default()
            }),
        }
    }

    /// A factory reporting `bytes` as the device minimum buffer
    pub fn with_min_buffer(bytes: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                min_buffer: Some(bytes),
                ..Shared::default()
            }),
        }
    }

    /// Copy of the log so far
    pub fn log(&self) -> SinkLog {
        self.shared.log.lock().clone()
    }
}

impl SinkFactory for MemorySinkFactory {
    fn open(
        &self,
        params: &SinkParams,
        _shutdown: &Shutdown,
    ) -> Result<Box<dyn AudioSink>, AudioError> {
        if self.shared.fail_open {
            return Err(AudioError::StreamError("memory sink refused to open".to_string()));
        }
        self.shared.log.lock().opened.push(params.clone());
        Ok(Box::new(MemorySink {
            shared: self.shared.clone(),
            released: false,
        }))
    }

    fn min_buffer_size(
        &self,
        format: &StreamFormat,
        _device: Option<&str>,
    ) -> Result<usize, AudioError> {
        // 20 ms when no explicit minimum was given
        Ok(self
            .shared
            .min_buffer
            .unwrap_or(format.bytes_per_second() as usize / 50))
    }
}

/// Sink backed by a [`SinkLog`]
pub struct MemorySink {
    shared: Arc<Shared>,
    released: bool,
}

impl MemorySink {
    fn check_open(&self) -> Result<(), AudioError> {
        if self.released {
            Err(AudioError::SinkClosed)
        } else {
            Ok(())
        }
    }
}

impl AudioSink for MemorySink {
    fn play(&mut self) -> Result<(), AudioError> {
        self.check_open()?;
        self.shared.log.lock().playing = true;
        Ok(())
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, AudioError> {
        self.check_open()?;
        let mut log = self.shared.log.lock();
        log.bytes.extend_from_slice(data);
        log.writes += 1;
        Ok(data.len())
    }

    fn write_floats(&mut self, samples: &[f32]) -> Result<usize, AudioError> {
        self.check_open()?;
        let mut log = self.shared.log.lock();
        log.floats.extend_from_slice(samples);
        log.writes += 1;
        Ok(samples.len())
    }

    fn set_volume(&mut self, left: f32, right: f32) {
        self.shared.log.lock().volumes.push((left, right));
    }

    fn stop(&mut self) {
        let mut log = self.shared.log.lock();
        log.playing = false;
        log.stopped += 1;
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.shared.log.lock().released += 1;
        }
    }
}
