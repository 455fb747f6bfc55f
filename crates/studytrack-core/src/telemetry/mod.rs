//! Client-side performance telemetry.
//!
//! This module provides the collector behind the performance dashboard:
//! - Bounded FIFO storage of performance metrics and UX events
//! - Timing wrappers for async calls with guaranteed mark cleanup
//! - Windowed summaries (average/percentile latency, error rate, grades)
//! - A bridge from timing platform entries into the store
//!
//! ## Usage
//! ```rust,ignore
//! use studytrack_core::telemetry::{TelemetryCollector, TimeRange};
//!
//! let collector = TelemetryCollector::new();
//!
//! let decks = collector
//!     .track_api_call("fetch-decks", || api.fetch_decks(), None)
//!     .await?;
//! collector.track_page_load("flashcards", 840.0);
//!
//! let summary = collector.summary_for_last(chrono::Duration::hours(1));
//! println!("avg: {}ms, errors: {}%", summary.average_response_time, summary.error_rate);
//! ```

mod collector;
mod config;
mod instrument;
mod observer;
mod platform;
mod store;
mod summary;
mod types;

pub use collector::TelemetryCollector;
pub use config::{TelemetryConfig, DEFAULT_SLOW_THRESHOLD_MS, MAX_RECORDS_PER_STREAM};
pub use observer::ObserverBridge;
pub use platform::{
    Clock, EntryCallback, EntryType, InProcessTimeline, ManualClock, PerformanceEntry,
    SubscriptionId, SystemClock, TimingPlatform,
};
pub use store::MetricStore;
pub use summary::{summarize, ErrorCount, GradeCounts, MetricsSummary, UNKNOWN_ERROR_NAME};
pub use types::{
    ErrorInfo, Metadata, MetadataValue, MetricType, MetricsExport, NewMetric, NewUxMetric,
    PerformanceGrade, PerformanceMetric, TimeRange, UxEvent, UxMetric, PAGE_LOAD_BUDGET_MS,
};
