//! Audio subsystem module

pub mod buffer;
pub mod device;
pub mod format;
pub mod memory;
pub mod packet;
pub mod playback;
pub mod sink;
pub mod writer;

pub use buffer::{stream_queue, Offer, PacketPool, QueueConsumer, QueueProducer};
pub use device::{get_output_device, list_output_devices, OutputDeviceInfo};
pub use format::{SampleFormat, StreamFormat};
pub use memory::{MemorySink, MemorySinkFactory, SinkLog};
pub use packet::{bytes_per_audio_packet, bytes_per_min_buffer_packet, AudioPacket};
pub use playback::{CpalSink, CpalSinkFactory};
pub use sink::{AudioSink, SinkFactory, SinkParams, StereoVolume};
pub use writer::AudioWriter;
