//! Dynamic Time Warping distance between feature slices.
//!
//! Both slices are z-scored with their global mean and standard deviation
//! (over all frames and dimensions) so the distance ignores level and
//! timbre offsets. The warping path is confined to a Sakoe-Chiba band and
//! the accumulated Euclidean cost is normalized by path length.

use super::features::FeatureMatrix;
use super::types::{AnalysisError, AnalysisResult};

/// Z-score a slice with its global statistics.
///
/// Zero-variance slices are degenerate.
pub fn zscore(slice: &[Vec<f64>]) -> AnalysisResult<FeatureMatrix> {
    let count: usize = slice.iter().map(Vec::len).sum();
    if count == 0 {
        return Err(AnalysisError::NumericalDegenerate("empty feature slice".to_string()));
    }
    let mean = slice.iter().flatten().sum::<f64>() / count as f64;
    let variance = slice.iter().flatten().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
    let std = variance.sqrt();
    if !std.is_finite() || std < 1e-12 {
        return Err(AnalysisError::NumericalDegenerate(
            "feature slice has zero variance".to_string(),
        ));
    }
    Ok(slice
        .iter()
        .map(|frame| frame.iter().map(|v| (v - mean) / std).collect())
        .collect())
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Banded DTW distance normalized by warping path length.
///
/// Cell `(i, j)` is reachable only when `|i * m / n - j| <= band_radius`.
/// Returns `None` when either sequence is empty or the band admits no path.
pub fn dtw_distance(x: &[Vec<f64>], y: &[Vec<f64>], band_radius: usize) -> Option<f64> {
    let n = x.len();
    let m = y.len();
    if n == 0 || m == 0 {
        return None;
    }

    // Band must at least cover the diagonal slope for unequal lengths
    let radius = band_radius.max(n.abs_diff(m));

    // Rolling rows of (accumulated cost, path length)
    let inf = (f64::INFINITY, 0usize);
    let mut prev = vec![inf; m];
    let mut curr = vec![inf; m];

    for i in 0..n {
        curr.iter_mut().for_each(|c| *c = inf);
        let diag = (i * m) / n;
        let lo = diag.saturating_sub(radius);
        let hi = (diag + radius).min(m - 1);
        for j in lo..=hi {
            let cost = euclidean(&x[i], &y[j]);
            if i == 0 && j == 0 {
                curr[j] = (cost, 1);
                continue;
            }
            let mut best = inf;
            if i > 0 && j > 0 && prev[j - 1].0 < best.0 {
                best = prev[j - 1];
            }
            if i > 0 && prev[j].0 < best.0 {
                best = prev[j];
            }
            if j > 0 && curr[j - 1].0 < best.0 {
                best = curr[j - 1];
            }
            if best.0.is_finite() {
                curr[j] = (best.0 + cost, best.1 + 1);
            }
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    let (total, steps) = prev[m - 1];
    if total.is_finite() && steps > 0 {
        Some(total / steps as f64)
    } else {
        None
    }
}
