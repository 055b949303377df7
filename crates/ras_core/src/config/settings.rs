//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Each section can be updated independently for atomic section-level updates.

use serde::{Deserialize, Serialize};

use crate::analysis::{FeatureKind, SimilarityScoring, StrategyKind};
use crate::logging::LogLevel;
use crate::refine::IntegerCorrection;

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Copies used for estimation.
    #[serde(default)]
    pub preprocess: PreprocessSettings,

    /// Coarse lag search.
    #[serde(default)]
    pub coarse: CoarseSettings,

    /// Fine lag refinement.
    #[serde(default)]
    pub refine: RefineSettings,

    /// Fractional shifting.
    #[serde(default)]
    pub shift: ShiftSettings,

    /// Background cancellation.
    #[serde(default)]
    pub cancel: CancelSettings,

    /// Post expander.
    #[serde(default)]
    pub expand: ExpandSettings,

    /// Threading and output options.
    #[serde(default)]
    pub runtime: RuntimeSettings,
}

impl Settings {
    /// Check value ranges that serde cannot express.
    ///
    /// Returns the first problem found as `section.field: reason`.
    pub fn validate(&self) -> Result<(), String> {
        let p = &self.preprocess;
        if p.band_low_hz <= 0.0 || p.band_high_hz <= p.band_low_hz {
            return Err(format!(
                "preprocess.band: need 0 < low < high, got {} - {}",
                p.band_low_hz, p.band_high_hz
            ));
        }
        if p.filter_order == 0 {
            return Err("preprocess.filter_order: must be at least 1".to_string());
        }

        let c = &self.coarse;
        if c.hop == 0 || c.hop > c.n_fft {
            return Err(format!("coarse.hop: must be in 1..={}, got {}", c.n_fft, c.hop));
        }
        if !(0.0..=1.0).contains(&c.nms_ratio) {
            return Err(format!("coarse.nms_ratio: must be in [0, 1], got {}", c.nms_ratio));
        }
        if c.candidate_stride == 0 {
            return Err("coarse.candidate_stride: must be at least 1".to_string());
        }

        let r = &self.refine;
        if r.window_secs <= 0.0 {
            return Err(format!("refine.window_secs: must be positive, got {}", r.window_secs));
        }
        if r.hop == 0 || r.hop > r.frame_len {
            return Err(format!("refine.hop: must be in 1..={}, got {}", r.frame_len, r.hop));
        }
        if !(0.0..=1.0).contains(&r.keep_ratio) {
            return Err(format!("refine.keep_ratio: must be in [0, 1], got {}", r.keep_ratio));
        }

        let k = &self.cancel;
        if k.alpha < 0.0 {
            return Err(format!("cancel.alpha: must be >= 0, got {}", k.alpha));
        }
        if !(0.0..=1.0).contains(&k.beta) {
            return Err(format!("cancel.beta: must be in [0, 1], got {}", k.beta));
        }
        if k.hop == 0 || k.hop > k.n_fft {
            return Err(format!("cancel.hop: must be in 1..={}, got {}", k.n_fft, k.hop));
        }

        let e = &self.expand;
        if !(0.0..=1.0).contains(&e.ratio) {
            return Err(format!("expand.ratio: must be in [0, 1], got {}", e.ratio));
        }
        if e.release_ms < 0.0 {
            return Err(format!("expand.release_ms: must be >= 0, got {}", e.release_ms));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Minimum level for the run logger.
    #[serde(default)]
    pub level: LogLevel,

    /// Use compact log format (filtered progress).
    #[serde(default = "default_true")]
    pub compact: bool,

    /// Number of recent lines kept for the failure dump.
    #[serde(default = "default_error_tail")]
    pub error_tail: u32,

    /// Progress update step percentage.
    #[serde(default = "default_progress_step")]
    pub progress_step: u32,

    /// Prefix run log lines with a wall-clock timestamp.
    #[serde(default = "default_true")]
    pub show_timestamps: bool,
}

fn default_error_tail() -> u32 {
    20
}

fn default_progress_step() -> u32 {
    20
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            compact: true,
            error_tail: default_error_tail(),
            progress_step: default_progress_step(),
            show_timestamps: true,
        }
    }
}

/// Preparation of the mono copies used for estimation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessSettings {
    /// Peak-normalize before filtering.
    #[serde(default = "default_true")]
    pub normalize: bool,

    /// Apply the rumble high-pass and matching band-pass.
    #[serde(default = "default_true")]
    pub match_filter: bool,

    /// Rumble high-pass cutoff (Hz).
    #[serde(default = "default_highpass_hz")]
    pub highpass_hz: f64,

    /// Matching band low edge (Hz).
    #[serde(default = "default_band_low_hz")]
    pub band_low_hz: f64,

    /// Matching band high edge (Hz).
    #[serde(default = "default_band_high_hz")]
    pub band_high_hz: f64,

    /// Butterworth order of each stage.
    #[serde(default = "default_filter_order")]
    pub filter_order: usize,
}

fn default_highpass_hz() -> f64 {
    40.0
}

fn default_band_low_hz() -> f64 {
    80.0
}

fn default_band_high_hz() -> f64 {
    9000.0
}

fn default_filter_order() -> usize {
    4
}

impl Default for PreprocessSettings {
    fn default() -> Self {
        Self {
            normalize: true,
            match_filter: true,
            highpass_hz: default_highpass_hz(),
            band_low_hz: default_band_low_hz(),
            band_high_hz: default_band_high_hz(),
            filter_order: default_filter_order(),
        }
    }
}

/// Coarse lag search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoarseSettings {
    /// Search strategy.
    #[serde(default)]
    pub strategy: StrategyKind,

    /// Feature used when `auto` picks (or falls back to) the similarity search.
    #[serde(default)]
    pub auto_feature: FeatureKind,

    /// Scoring used when `auto` picks (or falls back to) the similarity search.
    #[serde(default)]
    pub auto_scoring: SimilarityScoring,

    /// `auto` uses GCC-PHAT when the length difference is at most this.
    #[serde(default = "default_auto_max_length_delta_secs")]
    pub auto_max_length_delta_secs: f64,

    /// GCC-PHAT inputs are truncated to this many seconds.
    #[serde(default = "default_max_window_secs")]
    pub max_window_secs: f64,

    /// GCC-PHAT inputs shorter than this give an unreliable estimate.
    #[serde(default = "default_min_window_samples")]
    pub min_window_samples: usize,

    /// Feature STFT size.
    #[serde(default = "default_feature_n_fft")]
    pub n_fft: usize,

    /// Feature hop length (one frame = this many samples of lag).
    #[serde(default = "default_feature_hop")]
    pub hop: usize,

    /// Mel bands for MFCC.
    #[serde(default = "default_n_mels")]
    pub n_mels: usize,

    /// MFCC coefficients.
    #[serde(default = "default_n_mfcc")]
    pub n_mfcc: usize,

    /// Non-maximum suppression radius as a share of the needle length.
    #[serde(default = "default_nms_ratio")]
    pub nms_ratio: f64,

    /// Shorter feature sequences give an unreliable estimate.
    #[serde(default = "default_min_needle_frames")]
    pub min_needle_frames: usize,

    /// Visit every n-th candidate offset.
    #[serde(default = "default_candidate_stride")]
    pub candidate_stride: usize,

    /// Sakoe-Chiba band radius (frames) for DTW scoring.
    #[serde(default = "default_dtw_band_radius")]
    pub dtw_band_radius: usize,

    /// DTW needle is capped at this many frames.
    #[serde(default = "default_dtw_max_needle_frames")]
    pub dtw_max_needle_frames: usize,

    /// Try the other strategy when the first one has zero confidence.
    #[serde(default = "default_true")]
    pub allow_fallback: bool,

    /// Confidence below this is reported as a warning.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

fn default_auto_max_length_delta_secs() -> f64 {
    1.0
}

fn default_max_window_secs() -> f64 {
    120.0
}

fn default_min_window_samples() -> usize {
    1024
}

fn default_feature_n_fft() -> usize {
    2048
}

fn default_feature_hop() -> usize {
    512
}

fn default_n_mels() -> usize {
    40
}

fn default_n_mfcc() -> usize {
    13
}

fn default_nms_ratio() -> f64 {
    0.6
}

fn default_min_needle_frames() -> usize {
    8
}

fn default_candidate_stride() -> usize {
    1
}

fn default_dtw_band_radius() -> usize {
    16
}

fn default_dtw_max_needle_frames() -> usize {
    600
}

fn default_min_confidence() -> f64 {
    10.0
}

impl Default for CoarseSettings {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            auto_feature: FeatureKind::default(),
            auto_scoring: SimilarityScoring::default(),
            auto_max_length_delta_secs: default_auto_max_length_delta_secs(),
            max_window_secs: default_max_window_secs(),
            min_window_samples: default_min_window_samples(),
            n_fft: default_feature_n_fft(),
            hop: default_feature_hop(),
            n_mels: default_n_mels(),
            n_mfcc: default_n_mfcc(),
            nms_ratio: default_nms_ratio(),
            min_needle_frames: default_min_needle_frames(),
            candidate_stride: default_candidate_stride(),
            dtw_band_radius: default_dtw_band_radius(),
            dtw_max_needle_frames: default_dtw_max_needle_frames(),
            allow_fallback: true,
            min_confidence: default_min_confidence(),
        }
    }
}

/// Fine refinement configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefineSettings {
    /// Length of the comparison window (seconds).
    #[serde(default = "default_window_secs")]
    pub window_secs: f64,

    /// Local integer correction method.
    #[serde(default)]
    pub integer_correction: IntegerCorrection,

    /// GCC-PHAT corrections larger than this are rejected.
    #[serde(default = "default_max_integer_correction")]
    pub max_integer_correction: i64,

    /// Range of the trimmed L1 search (samples).
    #[serde(default = "default_search_range")]
    pub search_range: i64,

    /// Share of smallest differences kept by the trimmed L1 search.
    #[serde(default = "default_keep_ratio")]
    pub keep_ratio: f64,

    /// Phase-slope frame length.
    #[serde(default = "default_frame_len")]
    pub frame_len: usize,

    /// Phase-slope hop.
    #[serde(default = "default_refine_hop")]
    pub hop: usize,

    /// Lowest frequency used in the regression (Hz).
    #[serde(default = "default_timing_low_hz")]
    pub band_low_hz: f64,

    /// Highest frequency used in the regression (Hz).
    #[serde(default = "default_timing_high_hz")]
    pub band_high_hz: f64,

    /// Frame delay spread (MAD, samples) above which a warning is raised.
    #[serde(default = "default_max_spread_samples")]
    pub max_spread_samples: f64,
}

fn default_window_secs() -> f64 {
    3.0
}

fn default_max_integer_correction() -> i64 {
    64
}

fn default_search_range() -> i64 {
    200
}

fn default_keep_ratio() -> f64 {
    0.7
}

fn default_frame_len() -> usize {
    4096
}

fn default_refine_hop() -> usize {
    2048
}

fn default_timing_low_hz() -> f64 {
    200.0
}

fn default_timing_high_hz() -> f64 {
    4000.0
}

fn default_max_spread_samples() -> f64 {
    2.0
}

impl Default for RefineSettings {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            integer_correction: IntegerCorrection::default(),
            max_integer_correction: default_max_integer_correction(),
            search_range: default_search_range(),
            keep_ratio: default_keep_ratio(),
            frame_len: default_frame_len(),
            hop: default_refine_hop(),
            band_low_hz: default_timing_low_hz(),
            band_high_hz: default_timing_high_hz(),
            max_spread_samples: default_max_spread_samples(),
        }
    }
}

/// Fractional shift configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftSettings {
    /// Zeros padded on both sides before the FFT phase ramp.
    #[serde(default = "default_pad_margin")]
    pub pad_margin: usize,
}

fn default_pad_margin() -> usize {
    2048
}

impl Default for ShiftSettings {
    fn default() -> Self {
        Self {
            pad_margin: default_pad_margin(),
        }
    }
}

/// Background cancellation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelSettings {
    /// Run the canceller.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Power gain of the reference estimate that is subtracted.
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    /// Spectral floor as a share of the target power.
    #[serde(default = "default_beta")]
    pub beta: f64,

    /// STFT size.
    #[serde(default = "default_cancel_n_fft")]
    pub n_fft: usize,

    /// STFT hop.
    #[serde(default = "default_cancel_hop")]
    pub hop: usize,
}

fn default_alpha() -> f64 {
    0.5
}

fn default_beta() -> f64 {
    0.2
}

fn default_cancel_n_fft() -> usize {
    4096
}

fn default_cancel_hop() -> usize {
    512
}

impl Default for CancelSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            alpha: default_alpha(),
            beta: default_beta(),
            n_fft: default_cancel_n_fft(),
            hop: default_cancel_hop(),
        }
    }
}

/// Post expander configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpandSettings {
    /// Run the expander.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Gate threshold (dBFS).
    #[serde(default = "default_threshold_db")]
    pub threshold_db: f64,

    /// Gain applied below the threshold.
    #[serde(default = "default_ratio")]
    pub ratio: f64,

    /// Gain release time (ms).
    #[serde(default = "default_release_ms")]
    pub release_ms: f64,

    /// Envelope follower release time (ms).
    #[serde(default = "default_envelope_release_ms")]
    pub envelope_release_ms: f64,

    /// Moving-average length applied to the gain curve.
    #[serde(default = "default_smoothing_samples")]
    pub smoothing_samples: usize,
}

fn default_threshold_db() -> f64 {
    -45.0
}

fn default_ratio() -> f64 {
    0.2
}

fn default_release_ms() -> f64 {
    400.0
}

fn default_envelope_release_ms() -> f64 {
    10.0
}

fn default_smoothing_samples() -> usize {
    500
}

impl Default for ExpandSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_db: default_threshold_db(),
            ratio: default_ratio(),
            release_ms: default_release_ms(),
            envelope_release_ms: default_envelope_release_ms(),
            smoothing_samples: default_smoothing_samples(),
        }
    }
}

/// Threading and output options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Candidate search threads (0 = available cores).
    #[serde(default)]
    pub workers: usize,

    /// Peak-normalize the full-channel inputs before shifting and
    /// cancellation.
    #[serde(default = "default_true")]
    pub normalize_inputs: bool,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            workers: 0,
            normalize_inputs: true,
        }
    }
}

impl RuntimeSettings {
    /// Worker count for the candidate pool (`None` = automatic).
    pub fn worker_count(&self) -> Option<usize> {
        (self.workers > 0).then_some(self.workers)
    }
}

/// Names of config sections for targeted updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigSection {
    Logging,
    Preprocess,
    Coarse,
    Refine,
    Shift,
    Cancel,
    Expand,
    Runtime,
}

impl ConfigSection {
    /// All sections in file order.
    pub const ALL: [ConfigSection; 8] = [
        ConfigSection::Logging,
        ConfigSection::Preprocess,
        ConfigSection::Coarse,
        ConfigSection::Refine,
        ConfigSection::Shift,
        ConfigSection::Cancel,
        ConfigSection::Expand,
        ConfigSection::Runtime,
    ];

    /// Get the TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Logging => "logging",
            ConfigSection::Preprocess => "preprocess",
            ConfigSection::Coarse => "coarse",
            ConfigSection::Refine => "refine",
            ConfigSection::Shift => "shift",
            ConfigSection::Cancel => "cancel",
            ConfigSection::Expand => "expand",
            ConfigSection::Runtime => "runtime",
        }
    }

    /// Comment written above the table in generated files.
    pub fn comment(&self) -> &'static str {
        match self {
            ConfigSection::Logging => "Logging configuration",
            ConfigSection::Preprocess => "Filtering of the copies used for lag estimation",
            ConfigSection::Coarse => "Coarse lag search (gcc-phat, chroma, mfcc, *-dtw or auto)",
            ConfigSection::Refine => "Sub-sample refinement by phase-slope regression",
            ConfigSection::Shift => "Integer and fractional shifting",
            ConfigSection::Cancel => "Reference bleed-through cancellation (Wiener soft mask)",
            ConfigSection::Expand => "Soft expander applied after cancellation",
            ConfigSection::Runtime => "Threading and output options",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        assert_eq!(Settings::default().validate(), Ok(()));
    }

    #[test]
    fn validation_names_the_field() {
        let mut settings = Settings::default();
        settings.refine.hop = 8192;
        let err = settings.validate().unwrap_err();
        assert!(err.starts_with("refine.hop"), "{err}");

        let mut settings = Settings::default();
        settings.expand.ratio = 2.0;
        assert!(settings.validate().unwrap_err().starts_with("expand.ratio"));
    }

    #[test]
    fn default_settings_serializes() {
        let settings = Settings::default();
        let toml = toml::to_string_pretty(&settings).unwrap();
        assert!(toml.contains("[coarse]"));
        assert!(toml.contains("[cancel]"));
        assert!(toml.contains("alpha"));
    }

    #[test]
    fn settings_round_trip() {
        let settings = Settings::default();
        let toml = toml::to_string_pretty(&settings).unwrap();
        let parsed: Settings = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.cancel.alpha, settings.cancel.alpha);
        assert_eq!(parsed.coarse.strategy, settings.coarse.strategy);
        assert_eq!(parsed.refine.integer_correction, settings.refine.integer_correction);
    }

    #[test]
    fn missing_fields_use_defaults() {
        let minimal = "[cancel]\nalpha = 0.8\n\n[coarse]\nstrategy = \"mfcc-dtw\"\n";
        let parsed: Settings = toml::from_str(minimal).unwrap();
        assert_eq!(parsed.cancel.alpha, 0.8);
        assert_eq!(parsed.cancel.beta, 0.2);
        assert_eq!(parsed.coarse.strategy, StrategyKind::MfccDtw);
        assert_eq!(parsed.expand.threshold_db, -45.0);
        assert_eq!(parsed.refine.window_secs, 3.0);
        assert!(parsed.expand.enabled);
    }

    #[test]
    fn worker_count_zero_is_auto() {
        assert_eq!(RuntimeSettings::default().worker_count(), None);
        let runtime = RuntimeSettings {
            workers: 4,
            ..RuntimeSettings::default()
        };
        assert_eq!(runtime.worker_count(), Some(4));
    }
}
