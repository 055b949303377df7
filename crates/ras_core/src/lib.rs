//! RAS Core - Backend logic for Reaction Audio Sync
//!
//! This crate aligns an independently captured "reaction" recording to a
//! reference recording and removes the reference's bleed-through from it.
//! It has no file or UI dependencies; loading and saving audio is left to
//! the caller (see the `ras_cli` crate).

pub mod analysis;
pub mod audio;
pub mod cancel;
pub mod config;
pub mod expander;
pub mod logging;
pub mod orchestrator;
pub mod preprocess;
pub mod refine;
pub mod shift;
pub mod spectral;

pub use audio::{AudioBuffer, AudioError};
pub use orchestrator::{AlignmentResult, SyncOrchestrator};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_returns_value() {
        assert!(!version().is_empty());
    }
}
