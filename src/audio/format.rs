//! Sample formats agreed out-of-band with the sender

use std::fmt;

use crate::error::ConfigError;

/// Encoding of one sample on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Unsigned 8-bit PCM
    U8,
    /// Signed 16-bit little-endian PCM
    I16,
    /// Signed 24-bit little-endian PCM, packed in 3 bytes
    I24,
    /// 32-bit little-endian IEEE-754 float
    F32,
}

impl SampleFormat {
    /// Map a bit depth to its sample format. 32 bits always means float.
    pub fn from_bit_depth(bits: u16) -> Result<Self, ConfigError> {
        match bits {
            8 => Ok(Self::U8),
            16 => Ok(Self::I16),
            24 => Ok(Self::I24),
            32 => Ok(Self::F32),
            other => Err(ConfigError::InvalidBitDepth(other)),
        }
    }

    pub fn bit_depth(self) -> u16 {
        match self {
            Self::U8 => 8,
            Self::I16 => 16,
            Self::I24 => 24,
            Self::F32 => 32,
        }
    }

    /// Bytes occupied by one sample of one channel
    pub fn bytes_per_sample(self) -> usize {
        self.bit_depth() as usize / 8
    }

    pub fn is_float(self) -> bool {
        matches!(self, Self::F32)
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U8 => write!(f, "u8"),
            Self::I16 => write!(f, "s16le"),
            Self::I24 => write!(f, "s24le"),
            Self::F32 => write!(f, "f32le"),
        }
    }
}

/// Sample format plus layout of one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub sample_format: SampleFormat,
    pub channels: u16,
}

impl StreamFormat {
    /// Bytes in one frame (one sample for every channel)
    pub fn bytes_per_frame(&self) -> usize {
        self.sample_format.bytes_per_sample() * self.channels as usize
    }

    pub fn bytes_per_second(&self) -> u64 {
        self.sample_rate as u64 * self.bytes_per_frame() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_depth_mapping() {
        assert_eq!(SampleFormat::from_bit_depth(16).unwrap(), SampleFormat::I16);
        assert!(SampleFormat::from_bit_depth(32).unwrap().is_float());
        assert!(SampleFormat::from_bit_depth(12).is_err());
    }

    #[test]
    fn test_frame_size() {
        let format = StreamFormat {
            sample_rate: 44100,
            sample_format: SampleFormat::I24,
            channels: 2,
        };
        assert_eq!(format.bytes_per_frame(), 6);
        assert_eq!(format.bytes_per_second(), 264_600);
    }
}
