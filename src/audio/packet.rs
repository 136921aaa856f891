//! Audio packets and packet sizing
//!
//! A packet always holds a whole number of frames so the output device
//! never sees a partial sample.

use crate::audio::format::StreamFormat;
use crate::constants::{DEFAULT_BUFFER_MS, MIN_BUFFER_MS};

/// Fixed-size buffer of raw wire bytes
///
/// Packets are moved between the pool, the reader, the queue and the
/// writer; exactly one of them owns a packet at any time.
#[derive(Debug, PartialEq, Eq)]
pub struct AudioPacket {
    data: Box<[u8]>,
}

impl AudioPacket {
    /// Allocate a zeroed packet of `len` bytes
    pub fn new(len: usize) -> Self {
        Self {
            data: vec![0u8; len].into_boxed_slice(),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Round `bytes` up to a whole number of frames, never below one frame
pub fn align_to_frame(bytes: usize, format: &StreamFormat) -> usize {
    let frame = format.bytes_per_frame().max(1);
    bytes.div_ceil(frame).max(1) * frame
}

/// Packet size for a requested duration.
///
/// Durations of 5 ms or less fall back to the default duration.
pub fn bytes_per_audio_packet(format: &StreamFormat, buffer_ms: u32) -> usize {
    let buffer_ms = if buffer_ms <= MIN_BUFFER_MS {
        DEFAULT_BUFFER_MS
    } else {
        buffer_ms
    };

    let bytes_per_second = format.bytes_per_second();
    let raw = bytes_per_second * buffer_ms as u64 / 1000;
    let size = align_to_frame(raw as usize, format);

    tracing::debug!(
        "bytes_per_audio_packet: {} bytes/s, {} ms -> {} bytes",
        bytes_per_second,
        buffer_ms,
        size
    );
    size
}

/// Packet size derived from the output device's minimum buffer
pub fn bytes_per_min_buffer_packet(format: &StreamFormat, device_min_buffer: usize) -> usize {
    let size = align_to_frame(device_min_buffer, format);
    tracing::debug!(
        "bytes_per_min_buffer_packet: device minimum {} -> {} bytes",
        device_min_buffer,
        size
    );
    size
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::SampleFormat;
    use proptest::prelude::*;

    fn format(sample_rate: u32, bits: u16, channels: u16) -> StreamFormat {
        StreamFormat {
            sample_rate,
            sample_format: SampleFormat::from_bit_depth(bits).unwrap(),
            channels,
        }
    }

    #[test]
    fn test_16bit_stereo_50ms() {
        assert_eq!(bytes_per_audio_packet(&format(48000, 16, 2), 50), 9600);
    }

    #[test]
    fn test_float_stereo_default() {
        // 48000 * 4 * 2 * 50 / 1000
        assert_eq!(bytes_per_audio_packet(&format(48000, 32, 2), 50), 19200);
    }

    #[test]
    fn test_short_duration_uses_default() {
        let f = format(48000, 16, 2);
        assert_eq!(bytes_per_audio_packet(&f, 5), bytes_per_audio_packet(&f, 50));
        assert_eq!(bytes_per_audio_packet(&f, 0), 9600);
        assert_ne!(bytes_per_audio_packet(&f, 6), 9600);
    }

    #[test]
    fn test_rounds_up_to_frame() {
        // 44100 * 3 * 2 * 7 / 1000 = 1852.2 -> 1852, aligned up to 1854
        assert_eq!(bytes_per_audio_packet(&format(44100, 24, 2), 7), 1854);
        // 11025 * 2 * 1 * 7 / 1000 = 154.35 -> 154, already aligned
        assert_eq!(bytes_per_audio_packet(&format(11025, 16, 1), 7), 154);
    }

    #[test]
    fn test_min_buffer_alignment() {
        assert_eq!(bytes_per_min_buffer_packet(&format(48000, 16, 2), 3841), 3844);
        assert_eq!(bytes_per_min_buffer_packet(&format(48000, 16, 1), 3841), 3842);
        assert_eq!(bytes_per_min_buffer_packet(&format(48000, 32, 2), 0), 8);
    }

    proptest! {
        #[test]
        fn packet_is_positive_multiple_of_frame(
            sample_rate in 1u32..=384_000,
            bits in prop::sample::select(vec![8u16, 16, 24, 32]),
            channels in 1u16..=2,
            buffer_ms in 0u32..=2000,
        ) {
            let f = format(sample_rate, bits, channels);
            let size = bytes_per_audio_packet(&f, buffer_ms);
            prop_assert!(size > 0);
            prop_assert_eq!(size % f.bytes_per_frame(), 0);
        }
    }
}
