//! Little-endian PCM decoding into `f32` samples

use crate::audio::format::SampleFormat;

/// Decode little-endian IEEE-754 floats into `out`, replacing its contents.
///
/// Trailing bytes that do not form a whole sample are ignored; packet
/// alignment guarantees there are none.
pub fn decode_f32_le(bytes: &[u8], out: &mut Vec<f32>) -> usize {
    out.clear();
    out.extend(
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
    );
    out.len()
}

/// Convert raw samples of `format` into normalized floats in `out`
pub fn pcm_to_f32(bytes: &[u8], format: SampleFormat, out: &mut Vec<f32>) -> usize {
    out.clear();
    match format {
        SampleFormat::U8 => {
            out.extend(bytes.iter().map(|&b| (b as f32 - 128.0) / 128.0));
        }
        SampleFormat::I16 => {
            out.extend(
                bytes
                    .chunks_exact(2)
                    .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0),
            );
        }
        SampleFormat::I24 => {
            out.extend(bytes.chunks_exact(3).map(|b| {
                // Sign-extend by placing the 24 bits in the top of an i32
                let value = i32::from_le_bytes([0, b[0], b[1], b[2]]) >> 8;
                value as f32 / 8_388_608.0
            }));
        }
        SampleFormat::F32 => {
            decode_f32_le(bytes, out);
        }
    }
    out.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_roundtrip_is_exact() {
        let samples = [
            0.0f32,
            -0.0,
            1.0,
            -1.0,
            0.123_456_79,
            f32::MIN_POSITIVE,
            f32::MAX,
            f32::INFINITY,
            1.0e-40, // subnormal
        ];
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();

        let mut decoded = Vec::new();
        assert_eq!(decode_f32_le(&bytes, &mut decoded), samples.len());
        for (a, b) in samples.iter().zip(&decoded) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_float_nan_stays_nan() {
        let bytes = f32::NAN.to_le_bytes();
        let mut decoded = Vec::new();
        decode_f32_le(&bytes, &mut decoded);
        assert!(decoded[0].is_nan());
    }

    #[test]
    fn test_scratch_buffer_is_reused() {
        let mut scratch = Vec::with_capacity(8);
        decode_f32_le(&[0u8; 32], &mut scratch);
        let ptr = scratch.as_ptr();
        decode_f32_le(&[0u8; 16], &mut scratch);
        assert_eq!(scratch.len(), 4);
        assert_eq!(scratch.as_ptr(), ptr);
    }

    #[test]
    fn test_integer_formats() {
        let mut out = Vec::new();

        pcm_to_f32(&[0, 128, 255], SampleFormat::U8, &mut out);
        assert_eq!(out, vec![-1.0, 0.0, 127.0 / 128.0]);

        pcm_to_f32(&[0x00, 0x80, 0xff, 0x7f], SampleFormat::I16, &mut out);
        assert_eq!(out, vec![-1.0, 32767.0 / 32768.0]);

        pcm_to_f32(&[0x00, 0x00, 0x80, 0x00, 0x00, 0x40], SampleFormat::I24, &mut out);
        assert_eq!(out, vec![-1.0, 0.5]);
    }
}
