//! Network reader
//!
//! Owns the TCP socket. Each connection cycle reads fixed-size packets
//! into pool buffers and offers them to the stream queue without blocking;
//! a full queue drops the packet just read and its buffer is reused for
//! the next read. Failed cycles go through the retry backoff.

use std::io::Read;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crate::audio::buffer::{Offer, QueueProducer, SharedPacketPool};
use crate::audio::packet::AudioPacket;
use crate::constants::SOCKET_TIMEOUT_MS;
use crate::error::NetworkError;
use crate::network::gateway::{find_tethered_gateway, ReachabilityProbe};
use crate::network::retry::{RetryDecision, RetryState, RetryTier};
use crate::network::tcp::{self, SocketInterrupt};
use crate::shutdown::Shutdown;
use crate::stats::PipelineStats;

/// Where the reader connects and how it recovers
#[derive(Debug, Clone)]
pub struct ReaderSettings {
    pub host: String,
    pub port: u16,
    pub retry_on_disconnect: bool,
    pub use_gateway_discovery: bool,
    pub retry_tiers: Vec<RetryTier>,
}

/// Why the reader loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderExit {
    /// Shutdown was requested or the writer went away
    Stopped,
    /// Retries are disabled or used up; the stream cannot continue
    Broken,
}

/// Producer end of a pipeline
pub struct NetworkReader {
    tag: String,
    host: String,
    port: u16,
    retry_on_disconnect: bool,
    use_gateway_discovery: bool,
    retry: RetryState,
    producer: QueueProducer,
    pool: SharedPacketPool,
    shutdown: Shutdown,
    interrupt: SocketInterrupt,
    stats: Arc<PipelineStats>,
    probe: Box<dyn ReachabilityProbe>,
    /// Buffer being filled; survives drops and failed reads
    current: Option<AudioPacket>,
    queue_closed: bool,
}

impl NetworkReader {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tag: String,
        settings: ReaderSettings,
        producer: QueueProducer,
        pool: SharedPacketPool,
        shutdown: Shutdown,
        interrupt: SocketInterrupt,
        stats: Arc<PipelineStats>,
        probe: Box<dyn ReachabilityProbe>,
    ) -> Self {
        Self {
            tag,
            host: settings.host,
            port: settings.port,
            retry_on_disconnect: settings.retry_on_disconnect,
            use_gateway_discovery: settings.use_gateway_discovery,
            retry: RetryState::new(settings.retry_tiers),
            producer,
            pool,
            shutdown,
            interrupt,
            stats,
            probe,
            current: None,
            queue_closed: false,
        }
    }

    /// Connect, stream and reconnect until stopped or out of retries
    pub fn run(mut self) -> ReaderExit {
        tracing::info!("[{}] start", self.tag);

        let exit = loop {
            if !self.shutdown.is_running() {
                break ReaderExit::Stopped;
            }

            let connection_made = self.run_once();

            if !self.shutdown.is_running() || self.queue_closed {
                tracing::info!("[{}] not running", self.tag);
                break ReaderExit::Stopped;
            }
            if !self.retry_on_disconnect {
                tracing::info!("[{}] no retries", self.tag);
                break ReaderExit::Broken;
            }
            if connection_made {
                self.retry.on_connected();
                continue;
            }

            match self.retry.on_failure() {
                RetryDecision::GiveUp => {
                    tracing::info!("[{}] retry limit reached", self.tag);
                    break ReaderExit::Broken;
                }
                RetryDecision::Retry(sleep) => {
                    tracing::debug!(
                        "[{}] attempts:{} tier:{} sleeping {:?}",
                        self.tag,
                        self.retry.attempts(),
                        self.retry.tier_index(),
                        sleep
                    );
                    if !self.shutdown.sleep(sleep) {
                        break ReaderExit::Stopped;
                    }
                }
            }
        };

        tracing::info!("[{}] done ({:?})", self.tag, exit);
        exit
    }

    /// One connection cycle. Returns `true` if at least one packet was read.
    pub fn run_once(&mut self) -> bool {
        if self.use_gateway_discovery {
            if let Some(gateway) = find_tethered_gateway(self.probe.as_ref(), &self.shutdown) {
                self.host = gateway.to_string();
            }
        }

        PipelineStats::bump(&self.stats.connection_attempts);
        let mut stream = match tcp::connect(
            &self.host,
            self.port,
            Duration::from_millis(SOCKET_TIMEOUT_MS),
        ) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::info!("[{}] connect failed: {}", self.tag, e);
                return false;
            }
        };

        if let Err(e) = self.interrupt.register(&stream) {
            tracing::warn!("[{}] socket cannot be interrupted: {}", self.tag, e);
        }
        // A stop that raced the connect found nothing to interrupt
        if !self.shutdown.is_running() {
            self.interrupt.clear();
            return false;
        }

        tracing::info!("[{}] running", self.tag);
        let mut connection_made = false;
        let result = self.read_loop(&mut stream, &mut connection_made);

        self.interrupt.clear();
        drop(stream);

        if let Err(e) = result {
            tracing::info!("[{}] connection ended: {}", self.tag, e);
        }
        if connection_made {
            PipelineStats::bump(&self.stats.connections);
        }
        connection_made
    }

    fn read_loop(
        &mut self,
        stream: &mut TcpStream,
        connection_made: &mut bool,
    ) -> Result<(), NetworkError> {
        while self.shutdown.is_running() {
            let mut packet = match self.current.take() {
                Some(packet) => packet,
                None => self.pool.acquire().ok_or(NetworkError::PoolExhausted)?,
            };

            if let Err(e) = stream.read_exact(packet.as_mut_slice()) {
                self.current = Some(packet);
                return Err(NetworkError::ReceiveFailed(e.to_string()));
            }
            *connection_made = true;
            PipelineStats::bump(&self.stats.packets_read);

            match self.producer.offer(packet) {
                Offer::Queued => {}
                Offer::Dropped(packet) => {
                    PipelineStats::bump(&self.stats.packets_dropped);
                    tracing::debug!("[{}] drop {} bytes", self.tag, packet.len());
                    self.current = Some(packet);
                }
                Offer::Closed(packet) => {
                    self.current = Some(packet);
                    self.queue_closed = true;
                    return Err(NetworkError::Interrupted);
                }
            }
        }
        Ok(())
    }
}
