pub mod batcher;
pub mod client;
pub mod models;

pub use batcher::{EventBatcher, FlushOutcome};
pub use client::{AggregatorClient, TelemetryClient};
pub use models::{posture_score, QueuedEvent, SessionLifecycle, SessionSummary};
