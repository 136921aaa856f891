//! cpal-backed audio sink
//!
//! Samples written by the audio writer go into a lock-free sample queue
//! that the device callback drains. The callback outputs silence on
//! underrun and applies the per-channel gain.

use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam::queue::ArrayQueue;
use crossbeam_channel::{bounded, select, Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audio::device::get_output_device;
use crate::audio::format::{SampleFormat, StreamFormat};
use crate::audio::sink::{AudioSink, SinkFactory, SinkParams};
use crate::codec::pcm_to_f32;
use crate::error::AudioError;
use crate::shutdown::Shutdown;

/// Sink buffers this many packets worth of samples
const SINK_BUFFER_PACKETS: usize = 2;

/// Longest a blocking write waits for the device to make room
const WRITE_STALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Fallback minimum buffer when the device does not report one
const FALLBACK_MIN_BUFFER_MS: u64 = 20;

/// Upper bound on one wait for room, so device errors are noticed
const ROOM_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// State shared with the device callback
struct CallbackShared {
    samples: ArrayQueue<f32>,
    playing: AtomicBool,
    left: AtomicU32,
    right: AtomicU32,
    error_flag: AtomicBool,
    underrun_count: AtomicU64,
    /// Pinged by the callback after it frees room in `samples`
    room: Sender<()>,
}

/// Largest whole number of frames, in samples, out of `available` that
/// fits in `room`
fn whole_frames(available: usize, room: usize, channels: usize) -> usize {
    let channels = channels.max(1);
    available.min(room) / channels * channels
}

/// Fill `out` frame by frame from `samples`, applying the channel gains.
///
/// A frame is only taken once all of its samples are queued, so channel
/// order survives underruns. Returns `true` if any frame was silent.
fn fill_frames(
    samples: &ArrayQueue<f32>,
    out: &mut [f32],
    channels: usize,
    left: f32,
    right: f32,
) -> bool {
    let channels = channels.max(1);
    let mut starved = false;

    for frame in out.chunks_mut(channels) {
        if samples.len() < frame.len() {
            frame.fill(0.0);
            starved = true;
            continue;
        }
        for (ch, slot) in frame.iter_mut().enumerate() {
            let gain = if channels == 2 && ch == 1 { right } else { left };
            *slot = samples.pop().unwrap_or(0.0) * gain;
        }
    }
    starved
}

/// Wait until the callback frees room, `timeout` passes or shutdown.
///
/// Returns `false` once shutdown has been triggered.
fn wait_for_room(room: &Receiver<()>, shutdown: &Shutdown, timeout: Duration) -> bool {
    select! {
        recv(room) -> _ => {}
        recv(shutdown.signal()) -> _ => {}
        default(timeout) => {}
    }
    shutdown.is_running()
}

/// Opens [`CpalSink`]s on the default cpal host
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalSinkFactory;

impl SinkFactory for CpalSinkFactory {
    fn open(
        &self,
        params: &SinkParams,
        shutdown: &Shutdown,
    ) -> Result<Box<dyn AudioSink>, AudioError> {
        Ok(Box::new(CpalSink::open(params, shutdown)?))
    }

    fn min_buffer_size(
        &self,
        format: &StreamFormat,
        device: Option<&str>,
    ) -> Result<usize, AudioError> {
        let device = get_output_device(device)?;
        let config = device
            .default_output_config()
            .map_err(|e| AudioError::CpalError(e.to_string()))?;

        let bytes = match config.buffer_size() {
            cpal::SupportedBufferSize::Range { min, .. } => {
                *min as usize * format.bytes_per_frame()
            }
            cpal::SupportedBufferSize::Unknown => {
                (format.bytes_per_second() * FALLBACK_MIN_BUFFER_MS / 1000) as usize
            }
        };
        tracing::debug!("Device minimum buffer: {} bytes", bytes);
        Ok(bytes)
    }
}

/// Output stream on a cpal device
pub struct CpalSink {
    stream: Option<cpal::Stream>,
    shared: Arc<CallbackShared>,
    sample_format: SampleFormat,
    channels: usize,
    scratch: Vec<f32>,
    room: Receiver<()>,
    shutdown: Shutdown,
}

impl CpalSink {
    /// Build the output stream. Playback starts with [`AudioSink::play`].
    ///
    /// Blocking writes give up early once `shutdown` is triggered.
    pub fn open(params: &SinkParams, shutdown: &Shutdown) -> Result<Self, AudioError> {
        let device = get_output_device(params.device.as_deref())?;
        let format = params.format;

        let frames_per_packet = (params.buffer_size_bytes / format.bytes_per_frame().max(1)) as u32;
        let config = cpal::StreamConfig {
            channels: format.channels,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: if params.low_latency {
                cpal::BufferSize::Fixed(frames_per_packet.max(1))
            } else {
                cpal::BufferSize::Default
            },
        };

        let sample_capacity = (params.buffer_size_bytes / format.sample_format.bytes_per_sample())
            .max(1)
            * SINK_BUFFER_PACKETS;
        let (room_tx, room_rx) = bounded(1);
        let shared = Arc::new(CallbackShared {
            samples: ArrayQueue::new(sample_capacity),
            playing: AtomicBool::new(false),
            left: AtomicU32::new(1.0f32.to_bits()),
            right: AtomicU32::new(1.0f32.to_bits()),
            error_flag: AtomicBool::new(false),
            underrun_count: AtomicU64::new(0),
            room: room_tx,
        });

        let channels = format.channels as usize;
        let callback_shared = shared.clone();
        let error_shared = shared.clone();

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let shared = &callback_shared;
                    if !shared.playing.load(Ordering::Relaxed) {
                        data.fill(0.0);
                        return;
                    }

                    let left = f32::from_bits(shared.left.load(Ordering::Relaxed));
                    let right = f32::from_bits(shared.right.load(Ordering::Relaxed));
                    if fill_frames(&shared.samples, data, channels, left, right) {
                        shared.underrun_count.fetch_add(1, Ordering::Relaxed);
                    }
                    let _ = shared.room.try_send(());
                },
                move |err| {
                    tracing::error!("Output stream error: {}", err);
                    error_shared.error_flag.store(true, Ordering::Relaxed);
                },
                None,
            )
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        tracing::info!(
            "Opened output stream: {} Hz, {} channels, {}, buffer {:?}",
            format.sample_rate,
            format.channels,
            format.sample_format,
            config.buffer_size
        );

        Ok(Self {
            stream: Some(stream),
            shared,
            sample_format: format.sample_format,
            channels,
            scratch: Vec::with_capacity(sample_capacity),
            room: room_rx,
            shutdown: shutdown.clone(),
        })
    }

    /// Times the device callback ran out of samples
    pub fn underrun_count(&self) -> u64 {
        self.shared.underrun_count.load(Ordering::Relaxed)
    }

    fn check_stream(&self) -> Result<(), AudioError> {
        if self.stream.is_none() {
            return Err(AudioError::SinkClosed);
        }
        if self.shared.error_flag.load(Ordering::Relaxed) {
            return Err(AudioError::StreamError("device reported an error".to_string()));
        }
        Ok(())
    }

    /// Queue as many whole frames as fit right now
    fn push_available(&self, samples: &[f32]) -> usize {
        let queue = &self.shared.samples;
        let room = queue.capacity().saturating_sub(queue.len());
        let count = whole_frames(samples.len(), room, self.channels);

        // Only the callback pops, so the room measured above can only grow
        samples[..count]
            .iter()
            .take_while(|&&sample| queue.push(sample).is_ok())
            .count()
    }
}

impl AudioSink for CpalSink {
    fn play(&mut self) -> Result<(), AudioError> {
        let stream = self.stream.as_ref().ok_or(AudioError::SinkClosed)?;
        stream
            .play()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;
        self.shared.playing.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, AudioError> {
        self.check_stream()?;

        let mut scratch = std::mem::take(&mut self.scratch);
        pcm_to_f32(data, self.sample_format, &mut scratch);

        let mut written = 0;
        let mut last_progress = Instant::now();
        while written < scratch.len() {
            let pushed = self.push_available(&scratch[written..]);
            if pushed > 0 {
                written += pushed;
                last_progress = Instant::now();
                continue;
            }

            if let Err(e) = self.check_stream() {
                self.scratch = scratch;
                return Err(e);
            }
            if last_progress.elapsed() > WRITE_STALL_TIMEOUT {
                self.scratch = scratch;
                return Err(AudioError::StreamError("device stopped consuming samples".to_string()));
            }
            if !wait_for_room(&self.room, &self.shutdown, ROOM_POLL_INTERVAL) {
                break;
            }
        }

        self.scratch = scratch;
        Ok(written * self.sample_format.bytes_per_sample())
    }

    fn write_floats(&mut self, samples: &[f32]) -> Result<usize, AudioError> {
        self.check_stream()?;
        Ok(self.push_available(samples))
    }

    fn set_volume(&mut self, left: f32, right: f32) {
        self.shared.left.store(left.to_bits(), Ordering::Relaxed);
        self.shared.right.store(right.to_bits(), Ordering::Relaxed);
    }

    fn stop(&mut self) {
        self.shared.playing.store(false, Ordering::Relaxed);
        if let Some(stream) = &self.stream {
            if let Err(e) = stream.pause() {
                tracing::debug!("Failed to pause output stream: {}", e);
            }
        }
    }

    fn release(&mut self) {
        if self.stream.take().is_some() {
            while self.shared.samples.pop().is_some() {}
            tracing::debug!(
                "Released output stream ({} underruns)",
                self.underrun_count()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_of(samples: &[f32], capacity: usize) -> ArrayQueue<f32> {
        let queue = ArrayQueue::new(capacity);
        for &sample in samples {
            queue.push(sample).unwrap();
        }
        queue
    }

    #[test]
    fn test_whole_frames_rounds_down() {
        assert_eq!(whole_frames(8, 5, 2), 4);
        assert_eq!(whole_frames(3, 100, 2), 2);
        assert_eq!(whole_frames(8, 1, 2), 0);
        assert_eq!(whole_frames(7, 5, 1), 5);
    }

    #[test]
    fn test_fill_keeps_channel_order_on_underrun() {
        // One full frame and half of the next
        let queue = queue_of(&[0.1, 0.2, 0.3], 8);
        let mut out = [9.0f32; 4];

        assert!(fill_frames(&queue, &mut out, 2, 1.0, 1.0));
        assert_eq!(out, [0.1, 0.2, 0.0, 0.0]);
        assert_eq!(queue.len(), 1);

        // The rest of the frame arrives; left stays on the left
        queue.push(0.4).unwrap();
        assert!(!fill_frames(&queue, &mut out[..2], 2, 1.0, 1.0));
        assert_eq!(&out[..2], &[0.3, 0.4]);
    }

    #[test]
    fn test_fill_applies_channel_gain() {
        let queue = queue_of(&[1.0, 1.0, 1.0, 1.0], 4);
        let mut out = [0.0f32; 4];

        assert!(!fill_frames(&queue, &mut out, 2, 0.5, 0.25));
        assert_eq!(out, [0.5, 0.25, 0.5, 0.25]);
    }

    #[test]
    fn test_wait_for_room_wakes_on_room_and_shutdown() {
        let (tx, rx) = bounded(1);
        let shutdown = Shutdown::new();

        tx.send(()).unwrap();
        assert!(wait_for_room(&rx, &shutdown, Duration::from_secs(10)));

        let remote = shutdown.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            remote.trigger();
        });
        let start = Instant::now();
        assert!(!wait_for_room(&rx, &shutdown, Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }
}
