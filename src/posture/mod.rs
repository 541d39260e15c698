pub mod landmarks;
pub mod metrics;

pub use landmarks::{LandmarkError, LandmarkSet};
pub use metrics::{analyze_pose, MetricsError, PostureAnalysisResult, Thresholds};
