//! Sample decoding
//!
//! The wire carries raw little-endian samples. Float streams are decoded
//! before they reach the sink; integer PCM is converted inside the sink.

pub mod pcm;

pub use pcm::{decode_f32_le, pcm_to_f32};
