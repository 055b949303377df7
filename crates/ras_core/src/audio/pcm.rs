//! Integer PCM to floating-point conversion.

/// Convert a signed integer PCM sample to `[-1, 1)` based on its bit depth.
///
/// Works for 16, 24 and 32-bit audio (24-bit samples arrive sign-extended
/// in an `i32`).
pub fn int_to_float(sample: i32, bits_per_sample: u16) -> f64 {
    let full_scale = (1u64 << (bits_per_sample.clamp(2, 32) - 1)) as f64;
    sample as f64 / full_scale
}

/// Convert an unsigned 8-bit PCM sample (midpoint 128) to `[-1, 1)`.
pub fn u8_to_float(sample: u8) -> f64 {
    (sample as f64 - 128.0) / 128.0
}
