//! Stream controller
//!
//! Owns the running pipelines and handles their events. Several streams
//! may run at once, each with its own socket, queue and sink.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

use crate::audio::sink::SinkFactory;
use crate::config::{RetryConfig, StreamConfig};
use crate::error::Result;
use crate::pipeline::{
    EventSender, Pipeline, PipelineEvent, PipelineId, PipelineState, StartOptions,
};
use crate::stats::StatsSnapshot;

/// Summary of one running stream
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub id: PipelineId,
    pub endpoint: String,
    pub state: PipelineState,
    pub packet_size: usize,
    pub stats: StatsSnapshot,
}

/// Starts, stops and tracks pipelines
pub struct StreamController {
    factory: Arc<dyn SinkFactory>,
    retry: RetryConfig,
    pipelines: DashMap<PipelineId, Pipeline>,
    events: EventSender,
    volume: Mutex<(f32, f32)>,
}

impl StreamController {
    /// Create a controller and the receiver its pipelines report to.
    ///
    /// Feed every received event back into [`handle_event`](Self::handle_event).
    pub fn new(
        factory: Arc<dyn SinkFactory>,
        retry: RetryConfig,
    ) -> (Self, UnboundedReceiver<PipelineEvent>) {
        let (events, receiver) = unbounded_channel();
        let controller = Self {
            factory,
            retry,
            pipelines: DashMap::new(),
            events,
            volume: Mutex::new((1.0, 1.0)),
        };
        (controller, receiver)
    }

    /// Replace whatever is playing with a stream from `config`
    pub fn play(&self, config: StreamConfig) -> Result<PipelineId> {
        self.stop_all();
        self.add_stream(config)
    }

    /// Start a stream alongside the ones already running
    pub fn add_stream(&self, config: StreamConfig) -> Result<PipelineId> {
        let options = StartOptions {
            volume: *self.volume.lock(),
            ..StartOptions::default()
        };
        let pipeline = Pipeline::start_with(
            config,
            &self.retry,
            self.factory.clone(),
            self.events.clone(),
            options,
        )?;

        let id = pipeline.id();
        tracing::info!("Stream {} started for {}", id, pipeline.endpoint());
        self.pipelines.insert(id, pipeline);
        Ok(id)
    }

    /// Stop one stream. Returns `false` if it is not known.
    pub fn stop(&self, id: PipelineId) -> bool {
        match self.pipelines.remove(&id) {
            Some((_, pipeline)) => {
                pipeline.stop();
                tracing::info!("Stream {} stopped", id);
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self) {
        let ids: Vec<PipelineId> = self.pipelines.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            self.stop(id);
        }
    }

    /// Set the gain of every current and future stream
    pub fn set_volume(&self, left: f32, right: f32) {
        *self.volume.lock() = (left, right);
        for entry in self.pipelines.iter() {
            entry.value().set_volume(left, right);
        }
    }

    /// React to a pipeline event. Returns the stream that was stopped.
    pub fn handle_event(&self, event: PipelineEvent) -> Option<PipelineId> {
        match event {
            PipelineEvent::StreamBroken { id, endpoint } => {
                tracing::warn!("Unable to stream from {}", endpoint);
                self.stop(id).then_some(id)
            }
        }
    }

    pub fn state(&self, id: PipelineId) -> Option<PipelineState> {
        self.pipelines.get(&id).map(|entry| entry.value().state())
    }

    pub fn streams(&self) -> Vec<StreamInfo> {
        self.pipelines
            .iter()
            .map(|entry| {
                let pipeline = entry.value();
                StreamInfo {
                    id: pipeline.id(),
                    endpoint: pipeline.endpoint(),
                    state: pipeline.state(),
                    packet_size: pipeline.packet_size(),
                    stats: pipeline.stats(),
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::memory::MemorySinkFactory;
    use std::time::Duration;

    fn closed_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    fn retrying(port: u16) -> StreamConfig {
        let mut config = StreamConfig::new("127.0.0.1", port);
        config.retry_on_disconnect = true;
        config
    }

    #[test]
    fn test_play_replaces_running_stream() {
        let (controller, _events) =
            StreamController::new(Arc::new(MemorySinkFactory::new()), RetryConfig::default());

        let first = controller.play(retrying(closed_port())).unwrap();
        let second = controller.play(retrying(closed_port())).unwrap();

        assert_ne!(first, second);
        assert_eq!(controller.len(), 1);
        assert!(controller.state(first).is_none());
        assert!(controller.state(second).is_some());
    }

    #[test]
    fn test_add_stream_runs_side_by_side() {
        let (controller, _events) =
            StreamController::new(Arc::new(MemorySinkFactory::new()), RetryConfig::default());

        controller.add_stream(retrying(closed_port())).unwrap();
        controller.add_stream(retrying(closed_port())).unwrap();
        assert_eq!(controller.streams().len(), 2);

        controller.stop_all();
        assert!(controller.is_empty());
    }

    #[test]
    fn test_failed_start_is_not_tracked() {
        let (controller, _events) =
            StreamController::new(Arc::new(MemorySinkFactory::failing()), RetryConfig::default());

        assert!(controller.play(retrying(closed_port())).is_err());
        assert!(controller.is_empty());
    }

    #[test]
    fn test_unknown_stream() {
        let (controller, _events) =
            StreamController::new(Arc::new(MemorySinkFactory::new()), RetryConfig::default());
        assert!(!controller.stop(uuid::Uuid::new_v4()));
    }

    #[tokio::test]
    async fn test_broken_event_stops_stream() {
        let (controller, mut events) =
            StreamController::new(Arc::new(MemorySinkFactory::new()), RetryConfig::default());

        let id = controller
            .play(StreamConfig::new("127.0.0.1", closed_port()))
            .unwrap();
        let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(controller.handle_event(event), Some(id));
        assert!(controller.is_empty());
    }

    #[test]
    fn test_volume_applies_to_new_streams() {
        let factory = MemorySinkFactory::new();
        let (controller, _events) =
            StreamController::new(Arc::new(factory.clone()), RetryConfig::default());
        controller.set_volume(0.1, 0.1);

        let id = controller.play(retrying(closed_port())).unwrap();
        let pipeline = controller.pipelines.get(&id).unwrap();
        assert_eq!(pipeline.volume(), (0.1, 0.1));
    }
}
