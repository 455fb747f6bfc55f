//! Feeds platform timeline entries into the metric store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::config::TelemetryConfig;
use super::platform::{EntryType, PerformanceEntry, SubscriptionId, TimingPlatform};
use super::store::MetricStore;
use super::types::{MetricType, NewMetric};

/// Subscriptions held on behalf of one collector.
pub struct ObserverBridge {
    platform: Arc<dyn TimingPlatform>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
    active: Arc<AtomicBool>,
}

impl ObserverBridge {
    /// Subscribe to the entry types enabled in `config`.
    pub fn attach(
        platform: Arc<dyn TimingPlatform>,
        store: Arc<MetricStore>,
        config: &TelemetryConfig,
    ) -> Self {
        let active = Arc::new(AtomicBool::new(true));
        let mut subscriptions = Vec::new();

        let wanted = [
            (EntryType::Navigation, config.observe_navigation),
            (EntryType::Measure, config.observe_measures),
        ];
        for (entry_type, enabled) in wanted {
            if !enabled {
                continue;
            }

            let store = Arc::clone(&store);
            let active = Arc::clone(&active);
            let callback = Arc::new(move |entry: &PerformanceEntry| {
                // Entries already queued by the platform are ignored after destroy.
                if active.load(Ordering::Acquire) {
                    if let Some(metric) = metric_for_entry(entry) {
                        store.record_metric(metric);
                    }
                }
            });

            match platform.observe(entry_type, callback) {
                Some(id) => {
                    tracing::debug!(?entry_type, "observing timeline entries");
                    subscriptions.push(id);
                }
                None => {
                    tracing::warn!(?entry_type, "timing platform cannot observe entry type");
                }
            }
        }

        Self {
            platform,
            subscriptions: Mutex::new(subscriptions),
            active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Disconnect every subscription. Safe to call more than once.
    pub fn destroy(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }

        let ids: Vec<SubscriptionId> = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for id in &ids {
            self.platform.disconnect(*id);
        }
        tracing::info!(subscriptions = ids.len(), "telemetry observers disconnected");
    }
}

impl Drop for ObserverBridge {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Map one timeline entry to the metric it produces.
fn metric_for_entry(entry: &PerformanceEntry) -> Option<NewMetric> {
    match entry.entry_type {
        EntryType::Navigation => {
            let load_time =
                entry.load_event_end.unwrap_or(0.0) - entry.load_event_start.unwrap_or(0.0);
            Some(NewMetric::new(MetricType::RenderTime, load_time).with("name", entry.name.as_str()))
        }
        EntryType::Measure => Some(
            NewMetric::new(MetricType::ResponseTime, entry.duration)
                .with("name", entry.name.as_str()),
        ),
        EntryType::Mark => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::platform::{EntryCallback, InProcessTimeline, ManualClock};
    use chrono::{DateTime, Utc};

    struct NoObservePlatform(InProcessTimeline);

    impl TimingPlatform for NoObservePlatform {
        fn now(&self) -> f64 {
            self.0.now()
        }
        fn timestamp(&self) -> DateTime<Utc> {
            self.0.timestamp()
        }
        fn mark(&self, name: &str) {
            self.0.mark(name)
        }
        fn measure(
            &self,
            name: &str,
            start_mark: &str,
            end_mark: Option<&str>,
        ) -> Option<PerformanceEntry> {
            self.0.measure(name, start_mark, end_mark)
        }
        fn clear_marks(&self, name: Option<&str>) {
            self.0.clear_marks(name)
        }
        fn clear_measures(&self, name: Option<&str>) {
            self.0.clear_measures(name)
        }
        fn observe(&self, _: EntryType, _: EntryCallback) -> Option<SubscriptionId> {
            None
        }
        fn disconnect(&self, _: SubscriptionId) {}
    }

    fn setup(config: &TelemetryConfig) -> (Arc<InProcessTimeline>, Arc<MetricStore>, ObserverBridge) {
        let timeline = Arc::new(InProcessTimeline::with_clock(ManualClock::default()));
        let store = Arc::new(MetricStore::new(timeline.clone(), config));
        let bridge = ObserverBridge::attach(timeline.clone(), Arc::clone(&store), config);
        (timeline, store, bridge)
    }

    #[test]
    fn navigation_entries_become_render_time() {
        let (timeline, store, _bridge) = setup(&TelemetryConfig::default());
        timeline.record_navigation("https://app.local/dashboard", 1200.0, 1450.0);

        let export = store.export();
        assert_eq!(export.performance.len(), 1);
        let metric = &export.performance[0];
        assert_eq!(metric.metric_type, MetricType::RenderTime);
        assert_eq!(metric.value, 250.0);
        assert_eq!(
            metric.metadata["name"].as_str(),
            Some("https://app.local/dashboard")
        );
    }

    #[test]
    fn measure_entries_become_response_time() {
        let (timeline, store, _bridge) = setup(&TelemetryConfig::default());
        timeline.mark("a");
        timeline.mark("b");
        timeline.measure("fetch-flashcards", "a", Some("b"));

        let export = store.export();
        assert_eq!(export.performance.len(), 1);
        assert_eq!(export.performance[0].metric_type, MetricType::ResponseTime);
        assert_eq!(
            export.performance[0].metadata["name"].as_str(),
            Some("fetch-flashcards")
        );
    }

    #[test]
    fn destroy_is_idempotent_and_stops_recording() {
        let (timeline, store, bridge) = setup(&TelemetryConfig::default());
        assert_eq!(timeline.subscriber_count(), 2);

        bridge.destroy();
        bridge.destroy();
        assert!(!bridge.is_active());
        assert_eq!(timeline.subscriber_count(), 0);

        timeline.record_navigation("/", 0.0, 10.0);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn disabled_entry_types_are_not_observed() {
        let config = TelemetryConfig {
            observe_measures: false,
            ..Default::default()
        };
        let (timeline, _store, _bridge) = setup(&config);
        assert_eq!(timeline.subscriber_count(), 1);
    }

    #[test]
    fn unsupported_platform_still_attaches() {
        let platform = Arc::new(NoObservePlatform(InProcessTimeline::new()));
        let config = TelemetryConfig::default();
        let store = Arc::new(MetricStore::new(platform.clone(), &config));
        let bridge = ObserverBridge::attach(platform, store, &config);
        assert!(bridge.is_active());
        bridge.destroy();
    }

    #[test]
    fn dropping_bridge_disconnects() {
        let (timeline, _store, bridge) = setup(&TelemetryConfig::default());
        drop(bridge);
        assert_eq!(timeline.subscriber_count(), 0);
    }
}
