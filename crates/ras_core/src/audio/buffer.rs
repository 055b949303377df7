//! Planar multi-channel audio buffer.

use thiserror::Error;

use super::pcm::{int_to_float, u8_to_float};

/// Errors raised while constructing audio buffers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AudioError {
    /// A buffer needs at least one channel.
    #[error("Audio buffer has no channels")]
    NoChannels,

    /// Channels of one buffer must all have the same length.
    #[error("Channel {channel} has {len} samples, expected {expected}")]
    RaggedChannels {
        channel: usize,
        len: usize,
        expected: usize,
    },

    /// Interleaved data length is not a multiple of the channel count.
    #[error("Interleaved length {len} is not a multiple of {channels} channels")]
    BadInterleavedLength { len: usize, channels: usize },

    /// Sample rate must be positive.
    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    /// Integer PCM with an unsupported bit depth.
    #[error("Unsupported bit depth: {0}")]
    UnsupportedBitDepth(u16),
}

/// Immutable audio value: planar `f64` samples plus sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<f64>>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Create a buffer from planar channel data.
    pub fn new(channels: Vec<Vec<f64>>, sample_rate: u32) -> Result<Self, AudioError> {
        if sample_rate == 0 {
            return Err(AudioError::InvalidSampleRate(sample_rate));
        }
        let expected = match channels.first() {
            Some(first) => first.len(),
            None => return Err(AudioError::NoChannels),
        };
        for (channel, data) in channels.iter().enumerate() {
            if data.len() != expected {
                return Err(AudioError::RaggedChannels {
                    channel,
                    len: data.len(),
                    expected,
                });
            }
        }
        Ok(Self {
            channels,
            sample_rate,
        })
    }

    /// Create a single-channel buffer.
    ///
    /// # Panics
    /// Panics if `sample_rate` is zero.
    pub fn mono(samples: Vec<f64>, sample_rate: u32) -> Self {
        assert!(sample_rate > 0, "sample rate must be positive");
        Self {
            channels: vec![samples],
            sample_rate,
        }
    }

    /// Create a buffer from interleaved frames (`L R L R ...`).
    pub fn from_interleaved(
        samples: &[f64],
        channel_count: usize,
        sample_rate: u32,
    ) -> Result<Self, AudioError> {
        if channel_count == 0 {
            return Err(AudioError::NoChannels);
        }
        if samples.len() % channel_count != 0 {
            return Err(AudioError::BadInterleavedLength {
                len: samples.len(),
                channels: channel_count,
            });
        }
        let frames = samples.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (ch, &s) in frame.iter().enumerate() {
                channels[ch].push(s);
            }
        }
        Self::new(channels, sample_rate)
    }

    /// Create a buffer from interleaved signed integer PCM.
    ///
    /// Samples are scaled to `[-1, 1)` by their bit depth.
    pub fn from_pcm_int(
        samples: &[i32],
        bits_per_sample: u16,
        channel_count: usize,
        sample_rate: u32,
    ) -> Result<Self, AudioError> {
        if !(9..=32).contains(&bits_per_sample) {
            return Err(AudioError::UnsupportedBitDepth(bits_per_sample));
        }
        let floats: Vec<f64> = samples
            .iter()
            .map(|&s| int_to_float(s, bits_per_sample))
            .collect();
        Self::from_interleaved(&floats, channel_count, sample_rate)
    }

    /// Create a buffer from interleaved unsigned 8-bit PCM.
    pub fn from_pcm_u8(
        samples: &[u8],
        channel_count: usize,
        sample_rate: u32,
    ) -> Result<Self, AudioError> {
        let floats: Vec<f64> = samples.iter().map(|&s| u8_to_float(s)).collect();
        Self::from_interleaved(&floats, channel_count, sample_rate)
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of frames (samples per channel).
    pub fn len(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    /// Check if the buffer holds no frames.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.len() as f64 / self.sample_rate as f64
    }

    /// Samples of one channel.
    pub fn channel(&self, index: usize) -> &[f64] {
        &self.channels[index]
    }

    /// All channels.
    pub fn channels(&self) -> &[Vec<f64>] {
        &self.channels
    }

    /// Interleave channels into `L R L R ...` order.
    pub fn to_interleaved(&self) -> Vec<f64> {
        let channel_count = self.channel_count();
        let mut out = Vec::with_capacity(self.len() * channel_count);
        for i in 0..self.len() {
            for ch in &self.channels {
                out.push(ch[i]);
            }
        }
        out
    }

    /// Mean mixdown of all channels.
    pub fn mono_samples(&self) -> Vec<f64> {
        if self.channels.len() == 1 {
            return self.channels[0].clone();
        }
        let scale = 1.0 / self.channels.len() as f64;
        (0..self.len())
            .map(|i| self.channels.iter().map(|ch| ch[i]).sum::<f64>() * scale)
            .collect()
    }

    /// Mean mixdown as a single-channel buffer.
    pub fn to_mono(&self) -> AudioBuffer {
        AudioBuffer {
            channels: vec![self.mono_samples()],
            sample_rate: self.sample_rate,
        }
    }

    /// Peak absolute sample value across all channels.
    pub fn peak(&self) -> f64 {
        self.channels
            .iter()
            .flat_map(|ch| ch.iter())
            .fold(0.0_f64, |acc, &s| acc.max(s.abs()))
    }

    /// Apply a per-channel transform that may change the channel length.
    ///
    /// All channels must come back with the same length; `f` is applied to
    /// each channel independently.
    pub fn map_channels<F>(&self, mut f: F) -> AudioBuffer
    where
        F: FnMut(&[f64]) -> Vec<f64>,
    {
        let channels: Vec<Vec<f64>> = self.channels.iter().map(|ch| f(ch)).collect();
        debug_assert!(channels.windows(2).all(|w| w[0].len() == w[1].len()));
        AudioBuffer {
            channels,
            sample_rate: self.sample_rate,
        }
    }

    /// Fallible version of [`map_channels`](Self::map_channels).
    pub fn try_map_channels<F, E>(&self, mut f: F) -> Result<AudioBuffer, E>
    where
        F: FnMut(&[f64]) -> Result<Vec<f64>, E>,
    {
        let channels = self
            .channels
            .iter()
            .map(|ch| f(ch))
            .collect::<Result<Vec<_>, E>>()?;
        Ok(AudioBuffer {
            channels,
            sample_rate: self.sample_rate,
        })
    }

    /// Resolve this buffer to another channel layout.
    ///
    /// - same count: unchanged
    /// - target mono: mean mixdown
    /// - otherwise: channel `i` takes source channel `i % source_count`
    ///   (mono sources are duplicated)
    pub fn with_channel_count(&self, count: usize) -> AudioBuffer {
        let count = count.max(1);
        if count == self.channel_count() {
            return self.clone();
        }
        if count == 1 {
            return self.to_mono();
        }
        let channels = (0..count)
            .map(|i| self.channels[i % self.channel_count()].clone())
            .collect();
        AudioBuffer {
            channels,
            sample_rate: self.sample_rate,
        }
    }

    /// Truncate or zero-pad every channel to `len` frames.
    pub fn with_len(&self, len: usize) -> AudioBuffer {
        self.map_channels(|ch| {
            let mut out = ch[..ch.len().min(len)].to_vec();
            out.resize(len, 0.0);
            out
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_ragged_channels() {
        let err = AudioBuffer::new(vec![vec![0.0; 4], vec![0.0; 3]], 48000).unwrap_err();
        assert_eq!(
            err,
            AudioError::RaggedChannels {
                channel: 1,
                len: 3,
                expected: 4
            }
        );
    }

    #[test]
    fn rejects_empty_channel_set() {
        assert_eq!(
            AudioBuffer::new(vec![], 48000).unwrap_err(),
            AudioError::NoChannels
        );
    }

    #[test]
    fn interleaved_round_trip() {
        let data = vec![1.0, -1.0, 2.0, -2.0, 3.0, -3.0];
        let buffer = AudioBuffer::from_interleaved(&data, 2, 1000).unwrap();
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.channel(0), &[1.0, 2.0, 3.0]);
        assert_eq!(buffer.channel(1), &[-1.0, -2.0, -3.0]);
        assert_eq!(buffer.to_interleaved(), data);
    }

    #[test]
    fn interleaved_length_must_divide() {
        assert!(AudioBuffer::from_interleaved(&[0.0; 5], 2, 1000).is_err());
    }

    #[test]
    fn pcm_int_scales_by_bit_depth() {
        let buffer = AudioBuffer::from_pcm_int(&[-32768, 16384], 16, 1, 8000).unwrap();
        assert_eq!(buffer.channel(0), &[-1.0, 0.5]);
        assert!(AudioBuffer::from_pcm_int(&[0], 8, 1, 8000).is_err());
    }

    #[test]
    fn mono_mixdown_averages() {
        let buffer = AudioBuffer::new(vec![vec![1.0, 0.0], vec![0.0, 1.0]], 1000).unwrap();
        assert_eq!(buffer.mono_samples(), vec![0.5, 0.5]);
    }

    #[test]
    fn channel_layout_resolution() {
        let mono = AudioBuffer::mono(vec![1.0, 2.0], 1000);
        let stereo = mono.with_channel_count(2);
        assert_eq!(stereo.channel_count(), 2);
        assert_eq!(stereo.channel(1), &[1.0, 2.0]);

        let back = stereo.with_channel_count(1);
        assert_eq!(back.channel(0), &[1.0, 2.0]);
    }

    #[test]
    fn with_len_pads_and_truncates() {
        let buffer = AudioBuffer::mono(vec![1.0, 2.0, 3.0], 1000);
        assert_eq!(buffer.with_len(2).channel(0), &[1.0, 2.0]);
        assert_eq!(buffer.with_len(5).channel(0), &[1.0, 2.0, 3.0, 0.0, 0.0]);
    }
}
