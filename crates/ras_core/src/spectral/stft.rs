//! Short-time Fourier transform and its weighted overlap-add inverse.

use rustfft::{num_complex::Complex, FftPlanner};

use super::window::WindowKind;

/// One-sided STFT of a real signal.
///
/// `frames[t][k]` is bin `k` (of `n_fft / 2 + 1`) of frame `t`. With
/// centering, frame `t` is centred on sample `t * hop`.
#[derive(Debug, Clone)]
pub struct SpectralFrame {
    /// Complex spectrum per frame.
    pub frames: Vec<Vec<Complex<f64>>>,
    /// FFT size.
    pub n_fft: usize,
    /// Hop length in samples.
    pub hop: usize,
    /// Window applied before each transform.
    pub window: WindowKind,
    /// Whether frames were centred (signal padded by `n_fft / 2`).
    pub center: bool,
    /// Length of the analysed signal.
    pub signal_len: usize,
}

impl SpectralFrame {
    /// Number of frames.
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// Number of one-sided bins.
    pub fn num_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Centre frequency (Hz) of bin `k`.
    pub fn bin_frequency(&self, k: usize, sample_rate: u32) -> f64 {
        k as f64 * sample_rate as f64 / self.n_fft as f64
    }

    /// Power spectrogram `|X|^2`, indexed `[frame][bin]`.
    pub fn power(&self) -> Vec<Vec<f64>> {
        self.frames
            .iter()
            .map(|frame| frame.iter().map(|c| c.norm_sqr()).collect())
            .collect()
    }
}

/// Compute the STFT of `samples`.
///
/// With `center`, the signal is zero-padded by `n_fft / 2` on each side so
/// that frame `t` is centred on sample `t * hop`; otherwise frames start at
/// `t * hop` and a signal shorter than `n_fft` yields one zero-padded frame.
pub fn stft(
    samples: &[f64],
    n_fft: usize,
    hop: usize,
    window: WindowKind,
    center: bool,
) -> SpectralFrame {
    let hop = hop.max(1);
    let n_fft = n_fft.max(2);
    let win = window.coefficients(n_fft);

    let padded: Vec<f64> = if center {
        let pad = n_fft / 2;
        let mut p = vec![0.0; samples.len() + 2 * pad];
        p[pad..pad + samples.len()].copy_from_slice(samples);
        p
    } else {
        samples.to_vec()
    };

    let num_frames = if samples.is_empty() {
        0
    } else if padded.len() <= n_fft {
        1
    } else {
        1 + (padded.len() - n_fft) / hop
    };

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n_fft);
    let num_bins = n_fft / 2 + 1;

    let mut frames = Vec::with_capacity(num_frames);
    let mut buffer = vec![Complex::new(0.0, 0.0); n_fft];
    for t in 0..num_frames {
        let start = t * hop;
        for (i, slot) in buffer.iter_mut().enumerate() {
            let s = padded.get(start + i).copied().unwrap_or(0.0);
            *slot = Complex::new(s * win[i], 0.0);
        }
        fft.process(&mut buffer);
        frames.push(buffer[..num_bins].to_vec());
    }

    SpectralFrame {
        frames,
        n_fft,
        hop,
        window,
        center,
        signal_len: samples.len(),
    }
}

/// Invert a (possibly modified) STFT by weighted overlap-add.
///
/// Each frame is inverse transformed, multiplied by the synthesis window and
/// summed; the sum is divided by the accumulated squared window wherever it
/// is non-negligible. The result has exactly `spec.signal_len` samples.
pub fn istft(spec: &SpectralFrame) -> Vec<f64> {
    let n_fft = spec.n_fft;
    let hop = spec.hop;
    let win = spec.window.coefficients(n_fft);
    let num_bins = spec.num_bins();

    let total = if spec.frames.is_empty() {
        0
    } else {
        n_fft + hop * (spec.frames.len() - 1)
    };
    let mut output = vec![0.0; total];
    let mut weight = vec![0.0; total];

    let mut planner = FftPlanner::<f64>::new();
    let ifft = planner.plan_fft_inverse(n_fft);
    let scale = 1.0 / n_fft as f64;

    let mut buffer = vec![Complex::new(0.0, 0.0); n_fft];
    for (t, frame) in spec.frames.iter().enumerate() {
        // Rebuild the full conjugate-symmetric spectrum
        for k in 0..n_fft {
            buffer[k] = if k < num_bins {
                frame[k]
            } else {
                frame[n_fft - k].conj()
            };
        }
        ifft.process(&mut buffer);

        let start = t * hop;
        for i in 0..n_fft {
            output[start + i] += buffer[i].re * scale * win[i];
            weight[start + i] += win[i] * win[i];
        }
    }

    for (o, w) in output.iter_mut().zip(&weight) {
        if *w > 1e-11 {
            *o /= w;
        }
    }

    let offset = if spec.center { n_fft / 2 } else { 0 };
    let mut signal: Vec<f64> = output.into_iter().skip(offset).take(spec.signal_len).collect();
    signal.resize(spec.signal_len, 0.0);
    signal
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn chirp(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let t = i as f64 / 8000.0;
                (2.0 * PI * (200.0 + 400.0 * t) * t).sin() * 0.5
            })
            .collect()
    }

    #[test]
    fn centred_frame_count() {
        let spec = stft(&vec![0.0; 4096], 1024, 256, WindowKind::Hann, true);
        assert_eq!(spec.num_frames(), 1 + 4096 / 256);
        assert_eq!(spec.num_bins(), 513);
    }

    #[test]
    fn short_signal_gives_one_frame() {
        let spec = stft(&[1.0, 2.0, 3.0], 16, 4, WindowKind::Hann, false);
        assert_eq!(spec.num_frames(), 1);
        assert!(stft(&[], 16, 4, WindowKind::Hann, true).frames.is_empty());
    }

    #[test]
    fn round_trip_reconstructs_signal() {
        let x = chirp(8000);
        let spec = stft(&x, 1024, 256, WindowKind::Hann, true);
        let y = istft(&spec);
        assert_eq!(y.len(), x.len());
        let err: f64 = x.iter().zip(&y).map(|(a, b)| (a - b).powi(2)).sum();
        let energy: f64 = x.iter().map(|a| a * a).sum();
        assert!(err / energy < 1e-20, "relative error {}", err / energy);
    }

    #[test]
    fn tone_peaks_at_its_bin() {
        let sr = 8000;
        let x: Vec<f64> = (0..8000)
            .map(|i| (2.0 * PI * 1000.0 * i as f64 / sr as f64).sin())
            .collect();
        let spec = stft(&x, 512, 128, WindowKind::Hann, true);
        let power = spec.power();
        let mid = &power[power.len() / 2];
        let peak_bin = mid
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(k, _)| k)
            .unwrap();
        assert!((spec.bin_frequency(peak_bin, sr) - 1000.0).abs() < sr as f64 / 512.0);
    }
}
