//! Instrumentation wrappers: timed async calls, page loads, interactions and
//! errors.

use std::fmt;
use std::future::Future;
use std::sync::atomic::Ordering;

use super::collector::TelemetryCollector;
use super::platform::TimingPlatform;
use super::types::{
    ErrorInfo, Metadata, MetricType, NewMetric, NewUxMetric, PerformanceGrade, UxEvent,
    PAGE_LOAD_BUDGET_MS,
};

/// Clears the marks it tracks when dropped, on every exit path.
struct MarkGuard<'a> {
    platform: &'a dyn TimingPlatform,
    marks: Vec<String>,
}

impl<'a> MarkGuard<'a> {
    fn new(platform: &'a dyn TimingPlatform) -> Self {
        Self {
            platform,
            marks: Vec::with_capacity(2),
        }
    }

    fn mark(&mut self, name: String) {
        self.platform.mark(&name);
        self.marks.push(name);
    }
}

impl Drop for MarkGuard<'_> {
    fn drop(&mut self) {
        for name in &self.marks {
            self.platform.clear_marks(Some(name));
        }
    }
}

impl TelemetryCollector {
    /// Time `operation`, record the outcome and hand back its result
    /// unchanged.
    ///
    /// Success records an `api_call` metric with the elapsed milliseconds.
    /// Failure records an `error` metric and an `error_encountered` UX event,
    /// then returns the original error. Any displayable error works,
    /// including `Box<dyn Error + Send + Sync>`. Timing marks are cleared
    /// even if the returned future is dropped before completion.
    pub async fn track_api_call<T, E, F, Fut>(
        &self,
        name: &str,
        operation: F,
        metadata: Option<Metadata>,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display + 'static,
    {
        let platform = self.inner.platform.as_ref();
        let call_id = self.inner.call_seq.fetch_add(1, Ordering::Relaxed);
        let mut marks = MarkGuard::new(platform);

        let start = platform.now();
        marks.mark(format!("{name}-{call_id}-start"));

        let outcome = operation().await;

        let duration = (platform.now() - start).max(0.0);
        marks.mark(format!("{name}-{call_id}-end"));

        let mut tags = Metadata::new();
        tags.insert("name".into(), name.into());
        if let Some(extra) = metadata {
            tags.extend(extra);
        }

        match &outcome {
            Ok(_) => {
                if duration > self.inner.config.slow_call_threshold_ms {
                    tracing::warn!(
                        call = name,
                        duration_ms = duration,
                        threshold_ms = self.inner.config.slow_call_threshold_ms,
                        "slow tracked call"
                    );
                    tags.insert("slow".into(), true.into());
                }
                self.record_metric(NewMetric::new(MetricType::ApiCall, duration).with_metadata(tags));
            }
            Err(err) => {
                let info = ErrorInfo::from_failure(err);
                tracing::debug!(call = name, error = %info.message, "tracked call failed");
                tags.insert("duration".into(), duration.into());
                self.record_failure(&info, duration, tags);
            }
        }

        outcome
    }

    /// Record a UI interaction such as a button press.
    pub fn track_user_interaction(&self, action: &str, element: &str, metadata: Option<Metadata>) {
        let mut event = NewUxMetric::new(UxEvent::Interaction)
            .success(true)
            .with("action", action)
            .with("element", element);
        if let Some(extra) = metadata {
            event = event.with_metadata(extra);
        }
        self.record_ux_metric(event);
    }

    /// Record a page load and grade it. Loads at or over 3s are failures.
    pub fn track_page_load(&self, page_name: &str, load_time_ms: f64) -> PerformanceGrade {
        let grade = PerformanceGrade::from_load_time(load_time_ms);
        self.record_ux_metric(
            NewUxMetric::new(UxEvent::PageLoad)
                .duration(load_time_ms)
                .success(load_time_ms < PAGE_LOAD_BUDGET_MS)
                .with("page", page_name)
                .with("performanceGrade", grade.as_str()),
        );
        grade
    }

    /// Record an error raised outside a tracked call.
    pub fn track_error(&self, error: &ErrorInfo, context: Option<&str>, metadata: Option<Metadata>) {
        let mut tags = Metadata::new();
        if let Some(context) = context {
            tags.insert("context".into(), context.into());
        }
        if let Some(extra) = metadata {
            tags.extend(extra);
        }
        self.record_failure(error, 1.0, tags);
    }

    fn record_failure(&self, error: &ErrorInfo, value: f64, tags: Metadata) {
        let mut metric = NewMetric::new(MetricType::Error, value)
            .with("errorName", error.name.as_str())
            .with("errorMessage", error.message.as_str());
        if let Some(stack) = &error.stack {
            metric = metric.with("errorStack", stack.as_str());
        }
        self.record_metric(metric.with_metadata(tags));

        self.record_ux_metric(
            NewUxMetric::new(UxEvent::ErrorEncountered)
                .failed(error.name.as_str())
                .with("errorMessage", error.message.as_str()),
        );
    }
}
