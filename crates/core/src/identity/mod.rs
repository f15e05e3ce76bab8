//! Identity subsystem: scar-document loading, topology validation/repair,
//! and the standalone drift detector (§4.4, §4.5).

pub mod drift_detector;
pub mod loader;
pub mod topology;

pub use drift_detector::StandaloneDriftDetector;
pub use topology::{DriftSignals, IdentityTopology};
