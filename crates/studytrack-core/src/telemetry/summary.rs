//! Time-windowed aggregates over the metric streams.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::types::{
    MetricType, MetricsExport, PerformanceGrade, PerformanceMetric, TimeRange, UxEvent, UxMetric,
};

/// Label used for error metrics without an `errorName`.
pub const UNKNOWN_ERROR_NAME: &str = "Unknown";

/// Occurrences of one error name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorCount {
    pub error_name: String,
    pub count: u64,
}

/// Page-load grade histogram.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeCounts {
    pub excellent: u64,
    pub good: u64,
    pub fair: u64,
    pub poor: u64,
}

impl GradeCounts {
    fn bump(&mut self, grade: PerformanceGrade) {
        match grade {
            PerformanceGrade::Excellent => self.excellent += 1,
            PerformanceGrade::Good => self.good += 1,
            PerformanceGrade::Fair => self.fair += 1,
            PerformanceGrade::Poor => self.poor += 1,
        }
    }

    pub fn get(&self, grade: PerformanceGrade) -> u64 {
        match grade {
            PerformanceGrade::Excellent => self.excellent,
            PerformanceGrade::Good => self.good,
            PerformanceGrade::Fair => self.fair,
            PerformanceGrade::Poor => self.poor,
        }
    }

    pub fn total(&self) -> u64 {
        self.excellent + self.good + self.fair + self.poor
    }
}

/// Aggregate view over one time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    /// Performance metrics inside the window.
    pub total_metrics: u64,
    /// Mean latency (ms) over timing metrics; 0 when there are none.
    pub average_response_time: f64,
    pub p50_response_time: f64,
    pub p95_response_time: f64,
    pub p99_response_time: f64,
    /// Percentage of metrics that are errors; 0 for an empty window.
    pub error_rate: f64,
    /// Error names by descending count.
    pub top_errors: Vec<ErrorCount>,
    pub performance_grades: GradeCounts,
    /// API calls slower than the slow-call threshold.
    pub slow_calls: u64,
    /// UX events inside the window.
    pub ux_events: u64,
    /// Percentage of successful UX events; 0 for an empty window.
    pub ux_success_rate: f64,
    /// Oldest and newest summarized performance timestamps.
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
}

/// Summarize the given streams. `range = None` covers all recorded time.
///
/// Pure: the same inputs always produce the same summary.
pub fn summarize<'a>(
    performance: impl IntoIterator<Item = &'a PerformanceMetric>,
    user_experience: impl IntoIterator<Item = &'a UxMetric>,
    range: Option<&TimeRange>,
    slow_threshold_ms: f64,
) -> MetricsSummary {
    let in_range = |at: DateTime<Utc>| range.map_or(true, |r| r.contains(at));

    let metrics: Vec<&PerformanceMetric> = performance
        .into_iter()
        .filter(|m| in_range(m.timestamp))
        .collect();
    let total = metrics.len() as u64;

    let mut latencies: Vec<f64> = metrics
        .iter()
        .filter(|m| m.metric_type.is_timing())
        .map(|m| m.value)
        .collect();
    latencies.sort_unstable_by(f64::total_cmp);
    let average_response_time = if latencies.is_empty() {
        0.0
    } else {
        latencies.iter().sum::<f64>() / latencies.len() as f64
    };

    let mut error_counts: HashMap<&str, u64> = HashMap::new();
    for metric in metrics.iter().filter(|m| m.metric_type == MetricType::Error) {
        let name = metric
            .metadata
            .get("errorName")
            .and_then(|v| v.as_str())
            .unwrap_or(UNKNOWN_ERROR_NAME);
        *error_counts.entry(name).or_insert(0) += 1;
    }
    let error_total: u64 = error_counts.values().sum();
    let error_rate = if total == 0 {
        0.0
    } else {
        error_total as f64 / total as f64 * 100.0
    };

    let mut top_errors: Vec<ErrorCount> = error_counts
        .into_iter()
        .map(|(name, count)| ErrorCount {
            error_name: name.to_string(),
            count,
        })
        .collect();
    top_errors.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.error_name.cmp(&b.error_name))
    });

    let slow_calls = metrics
        .iter()
        .filter(|m| m.metric_type == MetricType::ApiCall && m.value > slow_threshold_ms)
        .count() as u64;

    let mut performance_grades = GradeCounts::default();
    let mut ux_events = 0u64;
    let mut ux_successes = 0u64;
    for event in user_experience.into_iter().filter(|e| in_range(e.timestamp)) {
        ux_events += 1;
        if event.success {
            ux_successes += 1;
        }
        if event.event == UxEvent::PageLoad {
            if let Some(grade) = event
                .metadata
                .get("performanceGrade")
                .and_then(|v| v.as_str())
                .and_then(PerformanceGrade::parse)
            {
                performance_grades.bump(grade);
            }
        }
    }
    let ux_success_rate = if ux_events == 0 {
        0.0
    } else {
        ux_successes as f64 / ux_events as f64 * 100.0
    };

    MetricsSummary {
        total_metrics: total,
        average_response_time,
        p50_response_time: percentile(&latencies, 50),
        p95_response_time: percentile(&latencies, 95),
        p99_response_time: percentile(&latencies, 99),
        error_rate,
        top_errors,
        performance_grades,
        slow_calls,
        ux_events,
        ux_success_rate,
        window_start: metrics.iter().map(|m| m.timestamp).min(),
        window_end: metrics.iter().map(|m| m.timestamp).max(),
    }
}

impl MetricsExport {
    /// Summarize an exported snapshot offline.
    pub fn summarize(&self, range: Option<&TimeRange>, slow_threshold_ms: f64) -> MetricsSummary {
        summarize(
            &self.performance,
            &self.user_experience,
            range,
            slow_threshold_ms,
        )
    }
}

/// Calculate percentile from sorted data.
fn percentile(sorted_data: &[f64], p: usize) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let idx = sorted_data.len() * p / 100;
    sorted_data[idx.min(sorted_data.len() - 1)]
}
