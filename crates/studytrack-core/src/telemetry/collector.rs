//! The collector handle shared across the application.

use chrono::Duration;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use super::config::TelemetryConfig;
use super::observer::ObserverBridge;
use super::platform::{InProcessTimeline, TimingPlatform};
use super::store::MetricStore;
use super::summary::{summarize, MetricsSummary};
use super::types::{MetricsExport, NewMetric, NewUxMetric, PerformanceMetric, TimeRange, UxMetric};

pub(super) struct CollectorInner {
    pub(super) store: Arc<MetricStore>,
    pub(super) platform: Arc<dyn TimingPlatform>,
    pub(super) observer: ObserverBridge,
    pub(super) config: TelemetryConfig,
    pub(super) call_seq: AtomicU64,
}

/// Telemetry collector for one application session.
///
/// Construct one at the composition root and hand out clones; every clone
/// shares the same store and observers. Observers are disconnected when
/// [`TelemetryCollector::destroy`] is called or the last clone is dropped.
#[derive(Clone)]
pub struct TelemetryCollector {
    pub(super) inner: Arc<CollectorInner>,
}

impl TelemetryCollector {
    /// Collector on the system clock with default configuration.
    pub fn new() -> Self {
        Self::with_config(TelemetryConfig::default())
    }

    pub fn with_config(config: TelemetryConfig) -> Self {
        Self::with_platform(Arc::new(InProcessTimeline::new()), config)
    }

    /// Collector on an injected timing platform.
    pub fn with_platform(platform: Arc<dyn TimingPlatform>, config: TelemetryConfig) -> Self {
        let store = Arc::new(MetricStore::new(Arc::clone(&platform), &config));
        let observer = ObserverBridge::attach(Arc::clone(&platform), Arc::clone(&store), &config);
        tracing::debug!(session_id = store.session_id(), "telemetry collector started");

        Self {
            inner: Arc::new(CollectorInner {
                store,
                platform,
                observer,
                config,
                call_seq: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.inner.config
    }

    pub fn platform(&self) -> &Arc<dyn TimingPlatform> {
        &self.inner.platform
    }

    pub fn session_id(&self) -> &str {
        self.inner.store.session_id()
    }

    /// Stamp future records with this user. `None` clears it.
    pub fn set_user_id(&self, user_id: Option<String>) {
        self.inner.store.set_user_id(user_id);
    }

    pub fn record_metric(&self, metric: NewMetric) -> PerformanceMetric {
        self.inner.store.record_metric(metric)
    }

    pub fn record_ux_metric(&self, metric: NewUxMetric) -> UxMetric {
        self.inner.store.record_ux_metric(metric)
    }

    /// Owned snapshot of both streams.
    pub fn export_metrics(&self) -> MetricsExport {
        self.inner.store.export()
    }

    /// Summary over `range`, or over everything recorded when `None`.
    pub fn metrics_summary(&self, range: Option<TimeRange>) -> MetricsSummary {
        let threshold = self.inner.config.slow_call_threshold_ms;
        self.inner
            .store
            .read(|performance, user_experience| {
                summarize(performance, user_experience, range.as_ref(), threshold)
            })
    }

    /// Summary over the `span` ending now.
    pub fn summary_for_last(&self, span: Duration) -> MetricsSummary {
        let now = self.inner.platform.timestamp();
        self.metrics_summary(Some(TimeRange::ending_at(now, span)))
    }

    /// Drop every stored record.
    pub fn clear(&self) {
        self.inner.store.clear();
    }

    /// Stop automatic recording from the timing platform. Manual recording
    /// keeps working.
    pub fn destroy(&self) {
        self.inner.observer.destroy();
    }

    pub fn is_observing(&self) -> bool {
        self.inner.observer.is_active()
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::platform::ManualClock;
    use crate::telemetry::types::MetricType;

    #[test]
    fn clones_share_state() {
        let collector = TelemetryCollector::new();
        let handle = collector.clone();
        handle.record_metric(NewMetric::new(MetricType::ApiCall, 12.0));

        assert_eq!(collector.export_metrics().performance.len(), 1);
        assert_eq!(collector.session_id(), handle.session_id());
    }

    #[test]
    fn summary_for_last_uses_platform_clock() {
        let clock = ManualClock::default();
        let collector = TelemetryCollector::with_platform(
            Arc::new(InProcessTimeline::with_clock(clock.clone())),
            TelemetryConfig::default(),
        );

        collector.record_metric(NewMetric::new(MetricType::ApiCall, 100.0));
        clock.advance_ms(120_000);
        collector.record_metric(NewMetric::new(MetricType::ApiCall, 300.0));

        let summary = collector.summary_for_last(Duration::minutes(1));
        assert_eq!(summary.total_metrics, 1);
        assert_eq!(summary.average_response_time, 300.0);

        assert_eq!(collector.metrics_summary(None).total_metrics, 2);
    }

    #[test]
    fn destroy_keeps_manual_recording() {
        let collector = TelemetryCollector::new();
        collector.destroy();
        assert!(!collector.is_observing());

        collector.record_metric(NewMetric::new(MetricType::UserAction, 1.0));
        assert_eq!(collector.export_metrics().performance.len(), 1);
    }

    #[test]
    fn clear_resets_summary() {
        let collector = TelemetryCollector::new();
        collector.record_metric(NewMetric::new(MetricType::Error, 1.0));
        collector.clear();
        assert_eq!(collector.metrics_summary(None).total_metrics, 0);
    }
}
