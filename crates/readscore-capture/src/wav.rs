//! Finalising buffered samples as a WAV recording.

use std::io::Cursor;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hound::{SampleFormat, WavSpec, WavWriter};
use uuid::Uuid;

use readscore_core::error::CaptureError;
use readscore_core::model::AudioRecording;

pub const WAV_MIME_TYPE: &str = "audio/wav";

/// Encode mono `f32` samples as 16-bit PCM WAV.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, CaptureError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            WavWriter::new(&mut cursor, spec).map_err(|e| CaptureError::Encoding(e.to_string()))?;
        for sample in samples {
            let s = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(s)
                .map_err(|e| CaptureError::Encoding(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| CaptureError::Encoding(e.to_string()))?;
    }
    Ok(cursor.into_inner())
}

/// Build the recording artifact for one capture.
pub fn finalize_recording(
    samples: &[f32],
    sample_rate: u32,
    duration: Duration,
    recorded_at: DateTime<Utc>,
) -> Result<AudioRecording, CaptureError> {
    Ok(AudioRecording {
        id: Uuid::new_v4(),
        data: encode_wav(samples, sample_rate)?,
        mime_type: WAV_MIME_TYPE.to_string(),
        duration,
        recorded_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_readable_wav() {
        let samples = vec![0.0, 0.5, -0.5, 1.0, -1.0, 2.0];
        let bytes = encode_wav(&samples, 16_000).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");

        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16_000);
        assert_eq!(spec.bits_per_sample, 16);
        let decoded: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, vec![0, 16383, -16383, 32767, -32767, 32767]);
    }

    #[test]
    fn empty_capture_still_produces_a_header() {
        let bytes = encode_wav(&[], 16_000).unwrap();
        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.len(), 0);
    }

    #[test]
    fn recording_carries_metadata() {
        let rec = finalize_recording(&[0.1; 160], 16_000, Duration::from_millis(10), Utc::now())
            .unwrap();
        assert_eq!(rec.mime_type, "audio/wav");
        assert_eq!(rec.duration, Duration::from_millis(10));
        assert!(rec.file_name().ends_with(".wav"));
        assert!(!rec.data.is_empty());
    }
}
