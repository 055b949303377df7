//! Trimmed L1 integer lag search.
//!
//! Compares the reference with the target at every integer lag around a
//! starting point and keeps only the smallest `keep_ratio` share of the
//! absolute differences. Loud foreground material in the target (voice
//! over the reference) lands in the discarded tail, so it does not pull
//! the minimum away from the true lag.

/// Parameters of the trimmed L1 search.
#[derive(Debug, Clone)]
pub struct RobustSearch {
    /// Lags `center - range ..= center + range` are evaluated.
    pub search_range: i64,
    /// Fraction of smallest differences that are summed.
    pub keep_ratio: f64,
    /// Only the first `compare_len` reference samples are compared.
    pub compare_len: usize,
}

impl Default for RobustSearch {
    fn default() -> Self {
        Self {
            search_range: 200,
            keep_ratio: 0.7,
            compare_len: 30 * 16000,
        }
    }
}

/// Best lag and its trimmed cost.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobustLag {
    /// Lag in samples (positive = target delayed).
    pub lag: i64,
    /// Trimmed L1 cost at that lag.
    pub cost: f64,
}

impl RobustSearch {
    /// Search around `center`.
    ///
    /// Target samples outside its bounds count as zero. Returns `None` when
    /// nothing can be compared (empty reference or zero keep count).
    pub fn search(&self, reference: &[f64], target: &[f64], center: i64) -> Option<RobustLag> {
        let compare_len = reference.len().min(self.compare_len);
        let keep = (compare_len as f64 * self.keep_ratio.clamp(0.0, 1.0)) as usize;
        if compare_len == 0 || keep == 0 {
            return None;
        }
        let reference = &reference[..compare_len];

        let mut best: Option<RobustLag> = None;
        let mut diffs = vec![0.0; compare_len];
        for lag in (center - self.search_range)..=(center + self.search_range) {
            for (n, d) in diffs.iter_mut().enumerate() {
                let idx = n as i64 + lag;
                let t = if idx >= 0 && (idx as usize) < target.len() {
                    target[idx as usize]
                } else {
                    0.0
                };
                *d = (t - reference[n]).abs();
            }
            let cost = trimmed_sum(&mut diffs, keep);
            // Strictly smaller keeps the first (most negative) lag on ties
            if best.map_or(true, |b| cost < b.cost) {
                best = Some(RobustLag { lag, cost });
            }
        }
        best
    }
}

/// Sum of the `keep` smallest values (reorders `values`).
fn trimmed_sum(values: &mut [f64], keep: usize) -> f64 {
    if keep >= values.len() {
        return values.iter().sum();
    }
    values.select_nth_unstable_by(keep, |a, b| a.total_cmp(b));
    values[..keep].iter().sum()
}
