//! # StudyTrack Core Library
//!
//! This library provides the client-side performance telemetry engine used by
//! the StudyTrack dashboards. The CLI binary and any UI shell are thin layers
//! over the same collector.
//!
//! ## Architecture
//!
//! - **Metric Store**: two capacity-bounded FIFO streams, one for raw
//!   performance metrics and one for user-experience events
//! - **Instrumentation**: timing wrappers for async operations, page loads,
//!   interactions and errors
//! - **Summaries**: time-windowed aggregates (latency, error rate, grades)
//! - **Observer Bridge**: feeds navigation and measure entries from an
//!   injected timing platform into the store
//! - **Storage**: TOML-based configuration
//!
//! ## Key Components
//!
//! - [`TelemetryCollector`]: the shared collector handle
//! - [`MetricsSummary`]: aggregate view over a time window
//! - [`TimingPlatform`]: injectable clock and mark/measure/observe capability
//! - [`Config`]: application configuration management

pub mod error;
pub mod storage;
pub mod telemetry;

pub use error::{ConfigError, CoreError, ValidationError};
pub use storage::Config;
pub use telemetry::{
    summarize, Clock, EntryType, ErrorCount, ErrorInfo, GradeCounts, InProcessTimeline,
    ManualClock, Metadata, MetadataValue, MetricType, MetricsExport, MetricsSummary, NewMetric,
    NewUxMetric, PerformanceEntry, PerformanceGrade, PerformanceMetric, SystemClock,
    TelemetryCollector, TelemetryConfig, TimeRange, TimingPlatform, UxEvent, UxMetric,
};
