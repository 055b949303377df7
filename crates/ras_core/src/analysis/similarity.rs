//! Sliding similarity between feature sequences and peak selection.

use super::features::FeatureMatrix;

/// Frame-normalized cosine similarity of `needle` placed at `offset` in
/// `haystack`.
///
/// `sum_t <N_t, H_{o+t}> / sqrt(sum_t |N_t|^2 * sum_t |H_{o+t}|^2)`.
/// Returns `None` when either side has no energy or the needle does not
/// fit at `offset`.
pub fn cosine_at(haystack: &FeatureMatrix, needle: &FeatureMatrix, offset: usize) -> Option<f64> {
    if needle.is_empty() || offset + needle.len() > haystack.len() {
        return None;
    }
    let mut dot = 0.0;
    let mut needle_energy = 0.0;
    let mut hay_energy = 0.0;
    for (n, h) in needle.iter().zip(&haystack[offset..offset + needle.len()]) {
        for (a, b) in n.iter().zip(h) {
            dot += a * b;
            needle_energy += a * a;
            hay_energy += b * b;
        }
    }
    let denom = (needle_energy * hay_energy).sqrt();
    if denom <= 1e-12 || !denom.is_finite() {
        return None;
    }
    Some(dot / denom)
}

/// Candidate offsets `0, stride, 2*stride, ...` up to and including the
/// last valid offset.
pub fn candidate_offsets(haystack_frames: usize, needle_frames: usize, stride: usize) -> Vec<usize> {
    if needle_frames == 0 || needle_frames > haystack_frames {
        return Vec::new();
    }
    let last = haystack_frames - needle_frames;
    let stride = stride.max(1);
    let mut offsets: Vec<usize> = (0..=last).step_by(stride).collect();
    if offsets.last() != Some(&last) {
        offsets.push(last);
    }
    offsets
}

/// Scored candidate offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scored {
    /// Frame offset into the haystack.
    pub offset: usize,
    /// Score (orientation given by the caller).
    pub score: f64,
}

/// Non-maximum suppression.
///
/// Visits candidates best first; each kept peak suppresses every candidate
/// within `radius` frames of it. Returns up to `max_peaks` peaks, best first.
pub fn non_max_suppression(
    candidates: &[Scored],
    radius: usize,
    higher_is_better: bool,
    max_peaks: usize,
) -> Vec<Scored> {
    let mut order: Vec<&Scored> = candidates.iter().filter(|c| c.score.is_finite()).collect();
    order.sort_by(|a, b| {
        let cmp = b.score.total_cmp(&a.score);
        let cmp = if higher_is_better { cmp } else { cmp.reverse() };
        cmp.then(a.offset.cmp(&b.offset))
    });

    let mut peaks: Vec<Scored> = Vec::with_capacity(max_peaks);
    for candidate in order {
        if peaks.len() >= max_peaks {
            break;
        }
        let suppressed = peaks
            .iter()
            .any(|p| p.offset.abs_diff(candidate.offset) <= radius);
        if !suppressed {
            peaks.push(*candidate);
        }
    }
    peaks
}

/// Suppression radius for a needle of `needle_frames` frames.
pub fn nms_radius(needle_frames: usize, nms_ratio: f64) -> usize {
    ((needle_frames as f64 * nms_ratio) as usize).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(values: &[[f64; 2]]) -> FeatureMatrix {
        values.iter().map(|v| v.to_vec()).collect()
    }

    #[test]
    fn cosine_is_one_at_true_offset() {
        let haystack = seq(&[[0.0, 1.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [1.0, 0.0]]);
        let needle = seq(&[[1.0, 0.0], [1.0, 1.0]]);
        assert!((cosine_at(&haystack, &needle, 1).unwrap() - 1.0).abs() < 1e-12);
        assert!(cosine_at(&haystack, &needle, 0).unwrap() < 1.0);
        assert!(cosine_at(&haystack, &needle, 4).is_none());
    }

    #[test]
    fn zero_energy_is_none() {
        let haystack = seq(&[[0.0, 0.0], [0.0, 0.0]]);
        let needle = seq(&[[1.0, 0.0]]);
        assert!(cosine_at(&haystack, &needle, 0).is_none());
    }

    #[test]
    fn offsets_include_last() {
        assert_eq!(candidate_offsets(10, 4, 4), vec![0, 4, 6]);
        assert_eq!(candidate_offsets(10, 4, 1).len(), 7);
        assert!(candidate_offsets(3, 4, 1).is_empty());
    }

    #[test]
    fn nms_keeps_separated_peaks() {
        let scores: Vec<Scored> = [0.1, 0.9, 0.85, 0.2, 0.3, 0.7, 0.1]
            .iter()
            .enumerate()
            .map(|(offset, &score)| Scored { offset, score })
            .collect();
        let peaks = non_max_suppression(&scores, 2, true, 2);
        assert_eq!(peaks.len(), 2);
        assert_eq!(peaks[0].offset, 1);
        assert_eq!(peaks[1].offset, 5);
    }

    #[test]
    fn nms_lower_is_better() {
        let scores = vec![
            Scored { offset: 0, score: 3.0 },
            Scored { offset: 5, score: 1.0 },
            Scored { offset: 9, score: 2.0 },
        ];
        let peaks = non_max_suppression(&scores, 1, false, 2);
        assert_eq!(peaks[0].offset, 5);
        assert_eq!(peaks[1].offset, 9);
    }

    #[test]
    fn radius_is_at_least_one() {
        assert_eq!(nms_radius(1, 0.6), 1);
        assert_eq!(nms_radius(10, 0.5), 5);
    }
}
