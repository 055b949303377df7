//! Thin helpers over rustfft for real-valued signals.

use rustfft::{num_complex::Complex, FftPlanner};

/// Smallest power of two `>= n` (at least 1).
pub fn next_pow2(n: usize) -> usize {
    n.max(1).next_power_of_two()
}

/// Full complex spectrum of `samples` zero-padded (or truncated) to `fft_len`.
pub fn forward_real(samples: &[f64], fft_len: usize) -> Vec<Complex<f64>> {
    let mut buffer: Vec<Complex<f64>> = samples
        .iter()
        .take(fft_len)
        .map(|&x| Complex::new(x, 0.0))
        .collect();
    buffer.resize(fft_len, Complex::new(0.0, 0.0));

    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_forward(fft_len).process(&mut buffer);
    buffer
}

/// Inverse transform keeping the real part, scaled by `1/N`.
pub fn inverse_real(mut spectrum: Vec<Complex<f64>>) -> Vec<f64> {
    let n = spectrum.len();
    if n == 0 {
        return Vec::new();
    }
    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_inverse(n).process(&mut spectrum);
    let scale = 1.0 / n as f64;
    spectrum.iter().map(|c| c.re * scale).collect()
}

/// Signed frequency index of bin `k` in an `n`-point FFT.
///
/// Bins above `n/2` map to negative frequencies. The Nyquist bin (even `n`)
/// is reported as `n/2`.
pub fn signed_bin(k: usize, n: usize) -> f64 {
    if k <= n / 2 {
        k as f64
    } else {
        k as f64 - n as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_pow2_values() {
        assert_eq!(next_pow2(0), 1);
        assert_eq!(next_pow2(1), 1);
        assert_eq!(next_pow2(1000), 1024);
        assert_eq!(next_pow2(1024), 1024);
    }

    #[test]
    fn forward_inverse_restores_signal() {
        let x = vec![0.5, -1.0, 0.25, 2.0, 0.0];
        let spectrum = forward_real(&x, 8);
        let back = inverse_real(spectrum);
        for (a, b) in x.iter().zip(&back) {
            assert!((a - b).abs() < 1e-12);
        }
        assert!(back[5..].iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn signed_bins() {
        assert_eq!(signed_bin(0, 8), 0.0);
        assert_eq!(signed_bin(4, 8), 4.0);
        assert_eq!(signed_bin(5, 8), -3.0);
        assert_eq!(signed_bin(7, 8), -1.0);
    }
}
