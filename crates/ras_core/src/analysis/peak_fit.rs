//! Peak fitting for sub-sample accuracy.
//!
//! Uses quadratic (parabolic) interpolation through the peak and its two
//! neighbours to find the true peak position.

/// Sub-sample offset of a parabola's vertex relative to the middle point.
///
/// Solving `y = ax^2 + bx + c` through `(-1, y0)`, `(0, y1)`, `(1, y2)`
/// gives `x = -b / 2a`. The result is clamped to `[-0.5, 0.5]`; a flat
/// neighbourhood yields 0.
pub fn parabolic_offset(y0: f64, y1: f64, y2: f64) -> f64 {
    let a = (y0 + y2) / 2.0 - y1;
    let b = (y2 - y0) / 2.0;
    if a.abs() <= 1e-12 {
        return 0.0;
    }
    (-b / (2.0 * a)).clamp(-0.5, 0.5)
}

/// Refine the discrete peak at `peak_index`.
///
/// Returns the fractional index of the vertex. Peaks on the array edge are
/// returned unchanged.
pub fn fit_peak(values: &[f64], peak_index: usize) -> f64 {
    if peak_index == 0 || peak_index + 1 >= values.len() {
        return peak_index as f64;
    }
    let delta = parabolic_offset(
        values[peak_index - 1],
        values[peak_index],
        values[peak_index + 1],
    );
    peak_index as f64 + delta
}

/// Index of the maximum value (first one on ties). `None` for empty input.
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        if !v.is_finite() {
            continue;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}
