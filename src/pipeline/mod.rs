// src/pipeline/mod.rs

pub mod frame_publisher;
pub mod metrics;
pub mod shared_state;
pub mod shutdown;
pub mod tasks;

pub use frame_publisher::{CountingDetector, FramePublisher};
pub use metrics::{PipelineMetrics, StreamGuard};
pub use shared_state::{SharedHandle, SharedState};
pub use shutdown::Shutdown;
pub use tasks::{spawn_analytics_recorder, spawn_signal_scheduler};
