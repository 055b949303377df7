//! Pipeline stage implementations.
//!
//! Each step handles one stage of the sync pipeline.

mod cancel;
mod coarse;
mod expand;
mod refine;
mod shift;

pub use cancel::CancelStep;
pub use coarse::CoarseStep;
pub use expand::ExpandStep;
pub use refine::RefineStep;
pub use shift::ShiftStep;
