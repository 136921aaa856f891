//! Pipeline coordinator
//!
//! A pipeline groups everything one stream needs: packet pool, stream
//! queue, network reader thread, audio writer thread and the sink. It is
//! started from a validated [`StreamConfig`] and stopped fire-and-forget:
//! `stop()` signals both threads and interrupts whatever they block on,
//! but does not join them. Resources are released shortly afterwards, once
//! each thread notices.
//!
//! If the reader gives up (retries disabled or exhausted) while the
//! pipeline is still running, a single [`PipelineEvent::StreamBroken`] is
//! sent to the owner's event channel. The owner handles it on its own
//! event loop, typically by stopping the pipeline.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::audio::buffer::{stream_queue, PacketPool};
use crate::audio::format::StreamFormat;
use crate::audio::packet::{bytes_per_audio_packet, bytes_per_min_buffer_packet};
use crate::audio::sink::{SharedVolume, SinkFactory, SinkParams, StereoVolume};
use crate::audio::writer::AudioWriter;
use crate::config::{RetryConfig, StreamConfig};
use crate::constants::NUM_PACKETS;
use crate::error::{AudioError, Error, Result};
use crate::network::gateway::{ReachabilityProbe, TcpEchoProbe};
use crate::network::reader::{NetworkReader, ReaderExit, ReaderSettings};
use crate::network::tcp::SocketInterrupt;
use crate::shutdown::Shutdown;
use crate::stats::{PipelineStats, StatsSnapshot};

pub type PipelineId = Uuid;

/// Lifecycle of a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Starting,
    Streaming,
    Stopping,
    BrokenShutdown,
}

/// Notifications from a pipeline to its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// The stream ended and will not recover
    StreamBroken { id: PipelineId, endpoint: String },
}

/// Owner side of the event channel
pub type EventSender = UnboundedSender<PipelineEvent>;

struct Lifecycle {
    state: Mutex<PipelineState>,
    live_tasks: AtomicUsize,
    broken_reported: AtomicBool,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            state: Mutex::new(PipelineState::Starting),
            live_tasks: AtomicUsize::new(0),
            broken_reported: AtomicBool::new(false),
        }
    }

    fn get(&self) -> PipelineState {
        *self.state.lock()
    }

    /// Move to `to` if the current state is one of `from`
    fn transition(&self, from: &[PipelineState], to: PipelineState) -> bool {
        let mut state = self.state.lock();
        if from.contains(&state) {
            *state = to;
            true
        } else {
            false
        }
    }

    fn task_started(&self) {
        self.live_tasks.fetch_add(1, Ordering::SeqCst);
    }

    /// The last task to finish returns the pipeline to idle
    fn task_finished(&self) {
        if self.live_tasks.fetch_sub(1, Ordering::SeqCst) == 1 {
            *self.state.lock() = PipelineState::Idle;
        }
    }
}

/// Delivers the broken-stream event at most once
#[derive(Clone)]
struct BrokenNotifier {
    id: PipelineId,
    endpoint: String,
    events: EventSender,
    lifecycle: Arc<Lifecycle>,
    shutdown: Shutdown,
    interrupt: SocketInterrupt,
}

impl BrokenNotifier {
    fn report(&self) {
        if !self.shutdown.is_running() {
            return;
        }
        if self.lifecycle.broken_reported.swap(true, Ordering::SeqCst) {
            return;
        }

        self.lifecycle.transition(
            &[PipelineState::Starting, PipelineState::Streaming],
            PipelineState::BrokenShutdown,
        );
        tracing::warn!("[{}] Unable to stream", self.endpoint);

        let event = PipelineEvent::StreamBroken {
            id: self.id,
            endpoint: self.endpoint.clone(),
        };
        if self.events.send(event).is_err() {
            // Nobody left to stop us
            tracing::warn!("[{}] owner is gone, shutting down", self.endpoint);
            self.shutdown.trigger();
            self.interrupt.interrupt();
        }
    }
}

/// Optional knobs for [`Pipeline::start_with`]
pub struct StartOptions {
    /// Used by gateway discovery
    pub probe: Box<dyn ReachabilityProbe>,
    /// Gain applied before the first packet is played
    pub volume: (f32, f32),
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            probe: Box::new(TcpEchoProbe),
            volume: (1.0, 1.0),
        }
    }
}

/// One running stream
pub struct Pipeline {
    id: PipelineId,
    config: StreamConfig,
    format: StreamFormat,
    packet_size: usize,
    shutdown: Shutdown,
    interrupt: SocketInterrupt,
    volume: SharedVolume,
    stats: Arc<PipelineStats>,
    lifecycle: Arc<Lifecycle>,
}

impl Pipeline {
    /// Start streaming `config` into a sink opened by `factory`.
    ///
    /// Fails synchronously if the configuration is invalid or the sink
    /// cannot be opened.
    pub fn start(
        config: StreamConfig,
        retry: &RetryConfig,
        factory: Arc<dyn SinkFactory>,
        events: EventSender,
    ) -> Result<Self> {
        Self::start_with(config, retry, factory, events, StartOptions::default())
    }

    /// Like [`start`](Self::start) with explicit [`StartOptions`]
    pub fn start_with(
        config: StreamConfig,
        retry: &RetryConfig,
        factory: Arc<dyn SinkFactory>,
        events: EventSender,
        options: StartOptions,
    ) -> Result<Self> {
        config.validate()?;
        retry.validate()?;

        let id = Uuid::new_v4();
        let endpoint = config.endpoint();
        let format = config.stream_format()?;

        let packet_size = if config.use_device_min_buffer {
            let min_buffer = factory.min_buffer_size(&format, config.output_device.as_deref())?;
            bytes_per_min_buffer_packet(&format, min_buffer)
        } else {
            bytes_per_audio_packet(&format, config.buffer_ms)
        };
        tracing::info!(
            "[{}] starting pipeline {}: {} Hz, {}, {} ch, {} bytes/packet",
            endpoint,
            id,
            format.sample_rate,
            format.sample_format,
            format.channels,
            packet_size
        );

        let lifecycle = Arc::new(Lifecycle::new());
        let pool = Arc::new(PacketPool::new(NUM_PACKETS + 2, packet_size));
        let (producer, consumer) = stream_queue(NUM_PACKETS);
        let shutdown = Shutdown::new();
        let interrupt = SocketInterrupt::new();
        let volume: SharedVolume = Arc::new(StereoVolume::default());
        volume.set(options.volume.0, options.volume.1);
        let stats = Arc::new(PipelineStats::new());

        let notifier = BrokenNotifier {
            id,
            endpoint: endpoint.clone(),
            events,
            lifecycle: lifecycle.clone(),
            shutdown: shutdown.clone(),
            interrupt: interrupt.clone(),
        };

        let pipeline = Self {
            id,
            config,
            format,
            packet_size,
            shutdown,
            interrupt,
            volume,
            stats,
            lifecycle,
        };

        // The sink is opened on the writer thread, which then owns it
        let writer = AudioWriter::new(
            format!("audio:{}", endpoint),
            format,
            consumer,
            pool.clone(),
            pipeline.shutdown.clone(),
            pipeline.volume.clone(),
            pipeline.stats.clone(),
        );
        let sink_params = SinkParams {
            format,
            buffer_size_bytes: packet_size,
            low_latency: pipeline.config.low_latency_mode,
            device: pipeline.config.output_device.clone(),
        };
        let (ready_tx, ready_rx) =
            crossbeam_channel::bounded::<std::result::Result<(), AudioError>>(1);
        let writer_lifecycle = pipeline.lifecycle.clone();
        let writer_shutdown = pipeline.shutdown.clone();
        let writer_notifier = notifier.clone();

        pipeline.lifecycle.task_started();
        let spawned = thread::Builder::new()
            .name(format!("audio:{}", endpoint))
            .spawn(move || {
                match factory.open(&sink_params, &writer_shutdown) {
                    Ok(sink) => {
                        let _ = ready_tx.send(Ok(()));
                        if writer.run(sink).is_err() {
                            writer_notifier.report();
                        }
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
                writer_lifecycle.task_finished();
            });
        if let Err(e) = spawned {
            pipeline.lifecycle.task_finished();
            return Err(e.into());
        }

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!("[{}] failed to open audio sink: {}", endpoint, e);
                pipeline.shutdown.trigger();
                return Err(e.into());
            }
            Err(_) => {
                pipeline.shutdown.trigger();
                return Err(Error::Pipeline(
                    "audio thread exited before opening the sink".to_string(),
                ));
            }
        }

        let reader = NetworkReader::new(
            format!("net:{}", endpoint),
            ReaderSettings {
                host: pipeline.config.host.clone(),
                port: pipeline.config.port,
                retry_on_disconnect: pipeline.config.retry_on_disconnect,
                use_gateway_discovery: pipeline.config.use_gateway_discovery,
                retry_tiers: retry.tiers.clone(),
            },
            producer,
            pool,
            pipeline.shutdown.clone(),
            pipeline.interrupt.clone(),
            pipeline.stats.clone(),
            options.probe,
        );
        let reader_lifecycle = pipeline.lifecycle.clone();

        pipeline.lifecycle.task_started();
        let spawned = thread::Builder::new()
            .name(format!("net:{}", endpoint))
            .spawn(move || {
                if reader.run() == ReaderExit::Broken {
                    notifier.report();
                }
                reader_lifecycle.task_finished();
            });
        if let Err(e) = spawned {
            pipeline.lifecycle.task_finished();
            pipeline.shutdown.trigger();
            return Err(e.into());
        }

        pipeline
            .lifecycle
            .transition(&[PipelineState::Starting], PipelineState::Streaming);
        Ok(pipeline)
    }

    /// Signal both threads and interrupt any blocking call. Does not wait.
    pub fn stop(&self) {
        self.lifecycle.transition(
            &[PipelineState::Starting, PipelineState::Streaming],
            PipelineState::Stopping,
        );
        self.shutdown.trigger();
        self.interrupt.interrupt();
    }

    /// Set the output gain; the writer applies it before its next packet
    pub fn set_volume(&self, left: f32, right: f32) {
        self.volume.set(left, right);
    }

    pub fn volume(&self) -> (f32, f32) {
        self.volume.get()
    }

    pub fn id(&self) -> PipelineId {
        self.id
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    pub fn endpoint(&self) -> String {
        self.config.endpoint()
    }

    pub fn state(&self) -> PipelineState {
        self.lifecycle.get()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
