//! Pentagram cognitive core: five vertices vote on every experience, a
//! Tension Analyzer surfaces where they disagree, and the Kernel
//! synthesizes a decision while feeding the Identity Topology and
//! Development Monitor subsystems.

pub mod config;
pub mod identity;
pub mod kernel;
pub mod metrics;
pub mod monitor;
pub mod schema;
pub mod tension;
pub mod vertex;

pub use config::AppConfig;
pub use identity::{DriftSignals, IdentityTopology, StandaloneDriftDetector};
pub use kernel::Kernel;
pub use metrics::{build_metrics_sink, MetricsSink, NoopMetricsSink, PentagramMetrics};
pub use monitor::DevelopmentMonitor;
pub use schema::{PentagramResult, VertexName};
pub use tension::TensionAnalyzer;
