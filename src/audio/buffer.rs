//! Packet pool and the bounded stream queue
//!
//! The pool is a lock-free free list of pre-allocated packets. The queue
//! connects the network reader to the audio writer: pushes never block
//! (a full queue drops the new packet), takes block until a packet or a
//! shutdown arrives.

use crossbeam::queue::ArrayQueue;
use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::audio::packet::AudioPacket;
use crate::shutdown::Shutdown;

/// Fixed set of reusable packets, all of the same size
pub struct PacketPool {
    free: ArrayQueue<AudioPacket>,
    packet_size: usize,
    exhausted_count: AtomicU64,
}

impl PacketPool {
    /// Pre-allocate `count` packets of `packet_size` bytes
    pub fn new(count: usize, packet_size: usize) -> Self {
        let free = ArrayQueue::new(count);
        for _ in 0..count {
            let _ = free.push(AudioPacket::new(packet_size));
        }

        Self {
            free,
            packet_size,
            exhausted_count: AtomicU64::new(0),
        }
    }

    /// Take a free packet, `None` if every packet is in flight
    pub fn acquire(&self) -> Option<AudioPacket> {
        let packet = self.free.pop();
        if packet.is_none() {
            self.exhausted_count.fetch_add(1, Ordering::Relaxed);
        }
        packet
    }

    /// Return a packet once its contents have been consumed
    pub fn release(&self, packet: AudioPacket) {
        debug_assert_eq!(packet.len(), self.packet_size);
        if self.free.push(packet).is_err() {
            tracing::warn!("Packet pool overfilled, discarding packet");
        }
    }

    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    /// Packets currently free
    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn capacity(&self) -> usize {
        self.free.capacity()
    }

    pub fn exhausted_count(&self) -> u64 {
        self.exhausted_count.load(Ordering::Relaxed)
    }
}

/// Thread-safe handle to a packet pool
pub type SharedPacketPool = Arc<PacketPool>;

/// Create a bounded stream queue, returning its two halves
pub fn stream_queue(capacity: usize) -> (QueueProducer, QueueConsumer) {
    let (tx, rx) = bounded(capacity);
    (QueueProducer { tx }, QueueConsumer { rx })
}

/// Outcome of offering a packet to the queue
#[derive(Debug)]
pub enum Offer {
    /// The queue took ownership of the packet
    Queued,
    /// The queue was full; the packet comes back for reuse
    Dropped(AudioPacket),
    /// The consumer is gone
    Closed(AudioPacket),
}

/// Writing half of the stream queue, owned by the network reader
pub struct QueueProducer {
    tx: Sender<AudioPacket>,
}

impl QueueProducer {
    /// Non-blocking push
    pub fn offer(&self, packet: AudioPacket) -> Offer {
        match self.tx.try_send(packet) {
            Ok(()) => Offer::Queued,
            Err(TrySendError::Full(packet)) => Offer::Dropped(packet),
            Err(TrySendError::Disconnected(packet)) => Offer::Closed(packet),
        }
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(0)
    }
}

/// Reading half of the stream queue, owned by the audio writer
pub struct QueueConsumer {
    rx: Receiver<AudioPacket>,
}

impl QueueConsumer {
    /// Block until a packet arrives.
    ///
    /// Returns `None` when shutdown is triggered or the producer is gone
    /// and nothing is left to drain.
    pub fn take(&self, shutdown: &Shutdown) -> Option<AudioPacket> {
        if !shutdown.is_running() {
            return None;
        }
        select! {
            recv(self.rx) -> packet => packet.ok(),
            recv(shutdown.signal()) -> _ => None,
        }
    }

    pub fn try_take(&self) -> Option<AudioPacket> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tagged(tag: u8) -> AudioPacket {
        AudioPacket::from_bytes(&[tag; 4])
    }

    #[test]
    fn test_pool_basic() {
        let pool = PacketPool::new(5, 9600);
        assert_eq!(pool.available(), 5);

        let packets: Vec<_> = (0..5).map(|_| pool.acquire().unwrap()).collect();
        assert!(packets.iter().all(|p| p.len() == 9600));
        assert!(pool.acquire().is_none());
        assert_eq!(pool.exhausted_count(), 1);

        for packet in packets {
            pool.release(packet);
        }
        assert_eq!(pool.available(), 5);
    }

    #[test]
    fn test_fourth_packet_dropped() {
        let (producer, consumer) = stream_queue(3);

        for tag in 1..=3 {
            assert!(matches!(producer.offer(tagged(tag)), Offer::Queued));
        }
        match producer.offer(tagged(4)) {
            Offer::Dropped(packet) => assert_eq!(packet.as_slice(), &[4; 4]),
            other => panic!("expected drop, got {:?}", other),
        }
        assert_eq!(producer.len(), 3);
        assert_eq!(producer.capacity(), 3);

        let shutdown = Shutdown::new();
        for tag in 1..=3 {
            assert_eq!(consumer.take(&shutdown).unwrap().as_slice(), &[tag; 4]);
        }
        assert!(consumer.is_empty());
    }

    #[test]
    fn test_take_wakes_on_shutdown() {
        let (_producer, consumer) = stream_queue(3);
        let shutdown = Shutdown::new();
        let remote = shutdown.clone();

        let handle = std::thread::spawn(move || consumer.take(&remote));
        std::thread::sleep(std::time::Duration::from_millis(50));
        shutdown.trigger();

        assert!(handle.join().unwrap().is_none());
    }

    #[test]
    fn test_offer_after_consumer_gone() {
        let (producer, consumer) = stream_queue(3);
        drop(consumer);
        assert!(matches!(producer.offer(tagged(1)), Offer::Closed(_)));
    }

    proptest! {
        #[test]
        fn queue_never_exceeds_capacity_and_keeps_order(
            ops in prop::collection::vec(any::<bool>(), 1..200),
        ) {
            let (producer, consumer) = stream_queue(3);
            let mut next_tag = 0u8;
            let mut accepted = Vec::new();
            let mut delivered = Vec::new();

            for push in ops {
                if push {
                    let tag = next_tag;
                    next_tag = next_tag.wrapping_add(1);
                    if let Offer::Queued = producer.offer(tagged(tag)) {
                        accepted.push(tag);
                    }
                } else if let Some(packet) = consumer.try_take() {
                    delivered.push(packet.as_slice()[0]);
                }
                prop_assert!(producer.len() <= 3);
            }
            while let Some(packet) = consumer.try_take() {
                delivered.push(packet.as_slice()[0]);
            }
            prop_assert_eq!(accepted, delivered);
        }
    }
}
