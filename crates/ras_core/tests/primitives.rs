//! Properties of the individual DSP stages on synthetic signals.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ras_core::analysis::GccPhat;
use ras_core::cancel::cancel;
use ras_core::expander::{expand, ExpanderParams};
use ras_core::shift::apply_lag;
use ras_core::AudioBuffer;

fn noise(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(-0.5..0.5)).collect()
}

fn energy(x: &[f64]) -> f64 {
    x.iter().map(|v| v * v).sum()
}

#[test]
fn zero_lag_shift_is_identity() {
    let x = noise(3000, 1);
    assert_eq!(apply_lag(&x, 0, 0.0, x.len()), x);
}

#[test]
fn integer_shift_round_trip_loses_only_the_edges() {
    let x = noise(2000, 2);
    for lag in [1i64, -1, 17, -250] {
        let there = apply_lag(&x, lag, 0.0, x.len());
        let back = apply_lag(&there, -lag, 0.0, x.len());
        let edge = lag.unsigned_abs() as usize;
        if lag > 0 {
            assert_eq!(&back[..x.len() - edge], &x[..x.len() - edge]);
        } else {
            assert_eq!(&back[edge..], &x[edge..]);
        }
    }
}

#[test]
fn fractional_shift_preserves_energy() {
    // Smooth signal so the band-limited shift has nothing to lose
    let x: Vec<f64> = (0..4096)
        .map(|i| {
            let t = i as f64;
            let window = (std::f64::consts::PI * t / 4096.0).sin().powi(2);
            window * ((t * 0.05).sin() + 0.5 * (t * 0.13).cos())
        })
        .collect();
    for delta in [0.25, -0.4, 0.49] {
        let shifted = apply_lag(&x, 0, delta, x.len());
        let ratio = energy(&shifted) / energy(&x);
        assert!((ratio - 1.0).abs() < 1e-3, "delta {delta}: energy ratio {ratio}");
    }
}

#[test]
fn gcc_phat_is_antisymmetric_under_swap() {
    let x = noise(8000, 3);
    let y = apply_lag(&x, 123, 0.0, x.len());
    let gcc = GccPhat::default();

    let forward = gcc.estimate(&x, &y).unwrap().estimate;
    let backward = gcc.estimate(&y, &x).unwrap().estimate;

    assert_eq!(forward.integer, 123);
    assert_eq!(backward.integer, -123);
    assert!((forward.total() + backward.total()).abs() < 0.05);
}

#[test]
fn canceller_with_zero_alpha_is_identity() {
    let target = AudioBuffer::new(vec![noise(9000, 4), noise(9000, 5)], 16000).unwrap();
    let reference = AudioBuffer::mono(noise(9000, 6), 16000);
    let out = cancel(&reference, &target, 0.0, 0.2).unwrap();
    for ch in 0..2 {
        for (a, b) in out.channel(ch).iter().zip(target.channel(ch)) {
            assert!((a - b).abs() < 1e-9);
        }
    }
}

#[test]
fn expander_steady_state_gain_is_the_ratio() {
    let sr = 16000;
    // -60 dBFS constant, well below the -45 dB threshold
    let quiet = AudioBuffer::mono(vec![0.001; 8 * sr as usize], sr);
    let params = ExpanderParams::default();
    let out = expand(&quiet, &params);
    // Release has long settled in the last second
    let tail = &out.channel(0)[7 * sr as usize..];
    for s in tail {
        assert!((s / 0.001 - params.ratio).abs() < 1e-5);
    }
}

#[test]
fn expander_leaves_loud_signal_untouched() {
    let sr = 16000;
    let loud = AudioBuffer::mono(vec![0.5; sr as usize], sr);
    let out = expand(&loud, &ExpanderParams::default());
    for s in out.channel(0) {
        assert!((s - 0.5).abs() < 1e-9);
    }
}
