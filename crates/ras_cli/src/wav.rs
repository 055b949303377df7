//! WAV reading and writing through `hound`.

use std::path::Path;

use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use ras_core::AudioBuffer;

/// Output sample encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// 16-bit signed PCM.
    Pcm16,
    /// 32-bit IEEE float.
    Float32,
}

/// Read a WAV file into planar `f64` samples.
///
/// Accepts 8/16/24/32-bit integer PCM and 32-bit float.
pub fn read_wav(path: &Path) -> Result<AudioBuffer> {
    let mut reader =
        WavReader::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;

    let buffer = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => {
            let samples = reader
                .samples::<f32>()
                .map(|s| s.map(f64::from))
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("Failed to read samples from {}", path.display()))?;
            AudioBuffer::from_interleaved(&samples, channels, spec.sample_rate)?
        }
        (SampleFormat::Int, 8) => {
            // hound hands 8-bit data back re-centred on zero
            let samples = reader
                .samples::<i8>()
                .map(|s| s.map(|v| (v as i16 + 128) as u8))
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("Failed to read samples from {}", path.display()))?;
            AudioBuffer::from_pcm_u8(&samples, channels, spec.sample_rate)?
        }
        (SampleFormat::Int, bits @ (16 | 24 | 32)) => {
            let samples = reader
                .samples::<i32>()
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("Failed to read samples from {}", path.display()))?;
            AudioBuffer::from_pcm_int(&samples, bits, channels, spec.sample_rate)?
        }
        (format, bits) => bail!(
            "Unsupported WAV encoding in {}: {:?} {}-bit",
            path.display(),
            format,
            bits
        ),
    };

    tracing::debug!(
        path = %path.display(),
        channels,
        sample_rate = spec.sample_rate,
        frames = buffer.len(),
        "Read WAV"
    );
    Ok(buffer)
}

/// Write `buffer` as an interleaved WAV file.
///
/// Samples are clipped to `[-1, 1]` before 16-bit conversion.
pub fn write_wav(path: &Path, buffer: &AudioBuffer, format: OutputFormat) -> Result<()> {
    let spec = WavSpec {
        channels: u16::try_from(buffer.channel_count()).context("Too many channels for WAV")?,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: match format {
            OutputFormat::Pcm16 => 16,
            OutputFormat::Float32 => 32,
        },
        sample_format: match format {
            OutputFormat::Pcm16 => SampleFormat::Int,
            OutputFormat::Float32 => SampleFormat::Float,
        },
    };

    let mut writer =
        WavWriter::create(path, spec).with_context(|| format!("Failed to create {}", path.display()))?;
    for sample in buffer.to_interleaved() {
        match format {
            OutputFormat::Pcm16 => writer.write_sample(to_i16(sample))?,
            OutputFormat::Float32 => writer.write_sample(sample as f32)?,
        }
    }
    writer
        .finalize()
        .with_context(|| format!("Failed to finalize {}", path.display()))?;
    Ok(())
}

fn to_i16(sample: f64) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f64).round() as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(len: usize) -> Vec<f64> {
        (0..len).map(|i| 0.5 * (i as f64 * 0.05).sin()).collect()
    }

    #[test]
    fn pcm16_round_trip_within_quantization() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let buffer = AudioBuffer::new(vec![tone(500), tone(500)], 16000).unwrap();

        write_wav(&path, &buffer, OutputFormat::Pcm16).unwrap();
        let back = read_wav(&path).unwrap();

        assert_eq!(back.channel_count(), 2);
        assert_eq!(back.len(), 500);
        assert_eq!(back.sample_rate(), 16000);
        for (a, b) in buffer.channel(1).iter().zip(back.channel(1)) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn float_output_is_exact_to_f32() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone_f32.wav");
        let buffer = AudioBuffer::mono(tone(300), 44100);

        write_wav(&path, &buffer, OutputFormat::Float32).unwrap();
        let back = read_wav(&path).unwrap();
        for (a, b) in buffer.channel(0).iter().zip(back.channel(0)) {
            assert_eq!(*a as f32 as f64, *b);
        }
    }

    #[test]
    fn reads_eight_bit_unsigned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eight.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 8,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for v in [0i8, 64, -128] {
            writer.write_sample(v).unwrap();
        }
        writer.finalize().unwrap();

        let back = read_wav(&path).unwrap();
        assert_eq!(back.channel(0), &[0.0, 0.5, -1.0]);
    }

    #[test]
    fn clipping_on_pcm16() {
        assert_eq!(to_i16(2.0), i16::MAX);
        assert_eq!(to_i16(-2.0), -i16::MAX);
        assert_eq!(to_i16(0.0), 0);
    }

    #[test]
    fn missing_file_is_error() {
        assert!(read_wav(Path::new("/nonexistent/never.wav")).is_err());
    }
}
