//! Audio codec helpers
//!
//! Base64 text for transport, and conversion between raw 16-bit little-endian PCM
//! and normalized floating-point sample buffers. Everything here is pure.

use crate::error::DecodeError;
use base64::engine::general_purpose;
use base64::Engine;

/// Scale between i16 PCM and normalized floats.
const PCM_SCALE: f32 = 32768.0;

/// Decoded PCM, one normalized `f32` sequence per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    pub fn number_of_channels(&self) -> usize {
        self.channels.len()
    }

    /// Frames per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Length in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn channel_data(&self, channel: usize) -> &[f32] {
        self.channels.get(channel).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Encode bytes as standard (padded) base64 text.
pub fn encode_bytes(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

/// Decode standard base64 text back to bytes.
pub fn decode_text(text: &str) -> Result<Vec<u8>, DecodeError> {
    Ok(general_purpose::STANDARD.decode(text)?)
}

/// Interpret `bytes` as interleaved signed 16-bit little-endian samples.
///
/// Produces one channel per `channel_count`, each sample scaled by 1/32768. A trailing
/// partial frame (or odd trailing byte) is dropped.
pub fn pcm_bytes_to_audio_buffer(bytes: &[u8], sample_rate: u32, channel_count: usize) -> AudioBuffer {
    let channel_count = channel_count.max(1);
    let frame_bytes = 2 * channel_count;
    let frame_count = bytes.len() / frame_bytes;

    let mut channels = vec![Vec::with_capacity(frame_count); channel_count];
    for frame in bytes.chunks_exact(frame_bytes) {
        for (channel, sample) in frame.chunks_exact(2).enumerate() {
            let value = i16::from_le_bytes([sample[0], sample[1]]);
            channels[channel].push(value as f32 / PCM_SCALE);
        }
    }

    AudioBuffer { sample_rate, channels }
}

/// Convert normalized float samples to 16-bit little-endian PCM.
///
/// Each sample is scaled by 32768, truncated toward zero and clamped to the i16 range.
pub fn float_samples_to_pcm_bytes(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        // `as` saturates at the i16 bounds and maps NaN to 0
        let value = (sample * PCM_SCALE) as i16;
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Build a `data:` URI around already-encoded base64 text.
pub fn to_data_uri(mime_type: &str, base64_data: &str) -> String {
    format!("data:{};base64,{}", mime_type, base64_data)
}

/// Split a base64 `data:` URI into its MIME type and decoded bytes.
pub fn decode_data_uri(uri: &str) -> Result<(String, Vec<u8>), DecodeError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| DecodeError::DataUri("missing data: prefix".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| DecodeError::DataUri("missing ',' separator".to_string()))?;
    let mime_type = header
        .strip_suffix(";base64")
        .ok_or_else(|| DecodeError::DataUri("only base64 payloads are supported".to_string()))?;

    Ok((mime_type.to_string(), decode_text(payload)?))
}

/// Strip a `data:` URI header if present, leaving the bare base64 payload.
pub fn strip_data_uri(text: &str) -> &str {
    match text.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map_or(text, |(_, payload)| payload),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_base64_round_trip_random() {
        let mut rng = rand::rng();
        for len in [0usize, 1, 2, 3, 4, 255, 4096] {
            let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
            let text = encode_bytes(&bytes);
            assert_eq!(decode_text(&text).unwrap(), bytes);
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode_text("not base64!!"), Err(DecodeError::Base64(_))));
        assert!(decode_text("abc").is_err());
    }

    #[test]
    fn test_pcm_to_float_scaling() {
        let samples = [0i16, 16384, -16384, i16::MAX, i16::MIN];
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let buffer = pcm_bytes_to_audio_buffer(&bytes, 24000, 1);

        assert_eq!(buffer.number_of_channels(), 1);
        assert_eq!(buffer.channel_data(0), &[0.0, 0.5, -0.5, 32767.0 / 32768.0, -1.0]);
    }

    #[test]
    fn test_pcm_deinterleaves_and_truncates_partial_frame() {
        // two stereo frames plus one dangling left sample
        let samples = [1i16, -1, 2, -2, 3];
        let mut bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        bytes.push(0x7f);

        let buffer = pcm_bytes_to_audio_buffer(&bytes, 16000, 2);
        assert_eq!(buffer.frames(), 2);
        assert_eq!(buffer.channel_data(0), &[1.0 / 32768.0, 2.0 / 32768.0]);
        assert_eq!(buffer.channel_data(1), &[-1.0 / 32768.0, -2.0 / 32768.0]);
    }

    #[test]
    fn test_float_to_pcm_clamps() {
        let bytes = float_samples_to_pcm_bytes(&[1.0, -1.0, 2.0, -2.0, 0.0]);
        let values: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        assert_eq!(values, vec![i16::MAX, i16::MIN, i16::MAX, i16::MIN, 0]);
    }

    #[test]
    fn test_pcm_float_pcm_round_trip() {
        let mut rng = rand::rng();
        let samples: Vec<i16> = (0..2048).map(|_| rng.random()).collect();
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();

        let buffer = pcm_bytes_to_audio_buffer(&bytes, 16000, 1);
        let back = float_samples_to_pcm_bytes(buffer.channel_data(0));

        for (a, b) in bytes.chunks_exact(2).zip(back.chunks_exact(2)) {
            let a = i16::from_le_bytes([a[0], a[1]]) as i32;
            let b = i16::from_le_bytes([b[0], b[1]]) as i32;
            assert!((a - b).abs() <= 1, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_silent_capture_block() {
        let block = vec![0.0f32; 4096];
        let bytes = float_samples_to_pcm_bytes(&block);
        assert_eq!(bytes.len(), 8192);
        assert!(bytes.iter().all(|&b| b == 0));

        let decoded = pcm_bytes_to_audio_buffer(&decode_text(&encode_bytes(&bytes)).unwrap(), 16000, 1);
        assert_eq!(decoded.frames(), 4096);
        assert!(decoded.channel_data(0).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_duration() {
        let buffer = pcm_bytes_to_audio_buffer(&vec![0u8; 24000], 24000, 1);
        assert!((buffer.duration() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_data_uri() {
        let uri = to_data_uri("image/png", &encode_bytes(&[9, 8, 7]));
        assert_eq!(uri, "data:image/png;base64,CQgH");

        let (mime, bytes) = decode_data_uri(&uri).unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, vec![9, 8, 7]);

        assert_eq!(strip_data_uri(&uri), "CQgH");
        assert_eq!(strip_data_uri("CQgH"), "CQgH");
        assert!(decode_data_uri("CQgH").is_err());
        assert!(decode_data_uri("data:image/png,CQgH").is_err());
    }
}
