//! PCM codec for the streaming voice API
//!
//! Captured audio is `f32` in `[-1.0, 1.0]`; the wire carries 16-bit signed
//! little-endian PCM wrapped in standard base64.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Capture sample rate expected by the remote service
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of audio returned by the remote service
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Samples per capture block
pub const FRAME_SIZE: usize = 4096;

/// Media type attached to every outbound frame
pub const INPUT_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// Scale between float samples and 16-bit PCM
const PCM_SCALE: f32 = 32768.0;

/// One transport-encoded block of 16-bit PCM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedFrame {
    /// Media type, e.g. `audio/pcm;rate=16000`
    pub mime_type: String,
    /// Base64 of little-endian `i16` samples
    pub data: String,
}

/// Decoded mono playback buffer
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    /// Samples in `[-1.0, 1.0)`
    pub samples: Vec<f32>,
    /// Declared sample rate
    pub sample_rate: u32,
}

impl PcmBuffer {
    /// Number of samples
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the buffer holds no samples
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback duration in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }
}

/// Quantize one float sample to 16-bit PCM
///
/// Out-of-range input saturates to `i16::MIN`/`i16::MAX`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn quantize(sample: f32) -> i16 {
    // NaN maps to 0 through the saturating cast
    (sample * PCM_SCALE).clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
}

/// Encode a block of float samples for transmission
#[must_use]
pub fn encode(samples: &[f32]) -> EncodedFrame {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&quantize(sample).to_le_bytes());
    }

    EncodedFrame {
        mime_type: INPUT_MIME_TYPE.to_string(),
        data: STANDARD.encode(bytes),
    }
}

/// Decode a base64 PCM payload into a playback buffer at `sample_rate`
///
/// A trailing odd byte is dropped.
///
/// # Errors
///
/// Returns error if the payload is not valid base64
pub fn decode(data: &str, sample_rate: u32) -> Result<PcmBuffer> {
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| Error::Decode(e.to_string()))?;

    if bytes.len() % 2 != 0 {
        tracing::debug!(bytes = bytes.len(), "odd-length PCM payload, dropping last byte");
    }

    let samples = bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / PCM_SCALE)
        .collect();

    Ok(PcmBuffer {
        samples,
        sample_rate,
    })
}

/// Parse the `rate=` parameter of a PCM media type
#[must_use]
pub fn mime_sample_rate(mime_type: &str) -> Option<u32> {
    mime_type
        .split(';')
        .skip(1)
        .filter_map(|param| param.trim().split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("rate"))
        .and_then(|(_, value)| value.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm_values(frame: &EncodedFrame) -> Vec<i16> {
        STANDARD
            .decode(&frame.data)
            .unwrap()
            .chunks_exact(2)
            .map(|p| i16::from_le_bytes([p[0], p[1]]))
            .collect()
    }

    #[test]
    fn test_half_scale_quantizes_to_16384() {
        assert_eq!(quantize(0.5), 16384);
        assert_eq!(pcm_values(&encode(&[0.5])), vec![16384]);
    }

    #[test]
    fn test_out_of_range_saturates() {
        assert_eq!(quantize(1.0), i16::MAX);
        assert_eq!(quantize(1.5), i16::MAX);
        assert_eq!(quantize(-1.0), i16::MIN);
        assert_eq!(quantize(-3.0), i16::MIN);
        assert_eq!(quantize(f32::NAN), 0);
    }

    #[test]
    fn test_little_endian_packing() {
        let frame = encode(&[1.0 / 32768.0, -1.0 / 32768.0]);
        let bytes = STANDARD.decode(&frame.data).unwrap();
        assert_eq!(bytes, vec![0x01, 0x00, 0xff, 0xff]);
    }

    #[test]
    fn test_mime_type_tag() {
        let frame = encode(&[0.0; 8]);
        assert_eq!(frame.mime_type, INPUT_MIME_TYPE);
        assert_eq!(mime_sample_rate(&frame.mime_type), Some(INPUT_SAMPLE_RATE));
    }

    #[test]
    fn test_silent_block_survives_roundtrip() {
        let silence = vec![0.0f32; FRAME_SIZE];
        let decoded = decode(&encode(&silence).data, INPUT_SAMPLE_RATE).unwrap();

        assert_eq!(decoded.len(), FRAME_SIZE);
        assert!(decoded.samples.iter().all(|&s| s == 0.0));
        assert!((decoded.duration() - 0.256).abs() < f64::EPSILON);
    }

    #[test]
    fn test_roundtrip_within_one_step() {
        #[allow(clippy::cast_precision_loss)]
        let samples: Vec<f32> = (0..2000)
            .map(|i| ((i as f32) * 0.013).sin() * 0.999)
            .collect();
        let decoded = decode(&encode(&samples).data, OUTPUT_SAMPLE_RATE).unwrap();

        assert_eq!(decoded.len(), samples.len());
        for (orig, back) in samples.iter().zip(&decoded.samples) {
            assert!((orig - back).abs() <= 1.0 / 32768.0, "{orig} vs {back}");
        }
    }

    #[test]
    fn test_odd_length_payload_truncates() {
        let data = STANDARD.encode([0x00, 0x40, 0x7f]);
        let decoded = decode(&data, OUTPUT_SAMPLE_RATE).unwrap();
        assert_eq!(decoded.samples, vec![0.5]);
    }

    #[test]
    fn test_invalid_base64_is_decode_error() {
        let err = decode("not base64!!", OUTPUT_SAMPLE_RATE).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_one_second_at_output_rate() {
        let data = STANDARD.encode(vec![0u8; 48_000]);
        let decoded = decode(&data, OUTPUT_SAMPLE_RATE).unwrap();
        assert_eq!(decoded.len(), 24_000);
        assert!((decoded.duration() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_mime_sample_rate_parsing() {
        assert_eq!(mime_sample_rate("audio/pcm;rate=24000"), Some(24_000));
        assert_eq!(mime_sample_rate("audio/pcm; Rate=16000"), Some(16_000));
        assert_eq!(mime_sample_rate("audio/pcm"), None);
        assert_eq!(mime_sample_rate("audio/pcm;rate=fast"), None);
    }
}
