//! Audio writer
//!
//! Drains the stream queue into the sink it owns. Float streams are
//! decoded into a scratch buffer and written without blocking; integer
//! PCM is handed to the sink as raw bytes.

use std::sync::Arc;

use crate::audio::buffer::{QueueConsumer, SharedPacketPool};
use crate::audio::format::StreamFormat;
use crate::audio::sink::{AudioSink, SharedVolume};
use crate::codec::decode_f32_le;
use crate::error::AudioError;
use crate::shutdown::Shutdown;
use crate::stats::PipelineStats;

/// Consumer end of a pipeline
pub struct AudioWriter {
    tag: String,
    format: StreamFormat,
    consumer: QueueConsumer,
    pool: SharedPacketPool,
    shutdown: Shutdown,
    volume: SharedVolume,
    stats: Arc<PipelineStats>,
}

impl AudioWriter {
    pub fn new(
        tag: String,
        format: StreamFormat,
        consumer: QueueConsumer,
        pool: SharedPacketPool,
        shutdown: Shutdown,
        volume: SharedVolume,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            tag,
            format,
            consumer,
            pool,
            shutdown,
            volume,
            stats,
        }
    }

    /// Play until shutdown or a sink error, then stop and release the sink.
    pub fn run(self, mut sink: Box<dyn AudioSink>) -> Result<(), AudioError> {
        tracing::info!("[{}] start", self.tag);

        let result = sink.play().and_then(|()| self.write_loop(sink.as_mut()));
        if let Err(e) = &result {
            tracing::error!("[{}] exception: {}", self.tag, e);
        }

        sink.stop();
        sink.release();
        tracing::info!("[{}] done", self.tag);
        result
    }

    fn write_loop(&self, sink: &mut dyn AudioSink) -> Result<(), AudioError> {
        let mut scratch: Vec<f32> = Vec::with_capacity(self.pool.packet_size() / 4);
        let mut volume_generation = None;

        while let Some(packet) = self.consumer.take(&self.shutdown) {
            let generation = self.volume.generation();
            if volume_generation != Some(generation) {
                let (left, right) = self.volume.get();
                sink.set_volume(left, right);
                volume_generation = Some(generation);
            }

            let result = if self.format.sample_format.is_float() {
                let count = decode_f32_le(packet.as_slice(), &mut scratch);
                sink.write_floats(&scratch).map(|written| {
                    if written < count {
                        PipelineStats::bump(&self.stats.short_writes);
                        tracing::trace!("[{}] sink took {}/{} samples", self.tag, written, count);
                    }
                    written * 4
                })
            } else {
                sink.write_bytes(packet.as_slice())
            };

            self.pool.release(packet);
            result?;
            PipelineStats::bump(&self.stats.packets_written);
        }

        Ok(())
    }
}
