//! Capacity-bounded storage for the two record streams.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use uuid::Uuid;

use super::config::TelemetryConfig;
use super::platform::TimingPlatform;
use super::types::{MetricsExport, NewMetric, NewUxMetric, PerformanceMetric, UxMetric};

/// Push while keeping at most `max_size` entries, dropping from the front.
pub(crate) trait BoundedPush<T> {
    /// Returns how many entries were evicted.
    fn push_bounded(&mut self, value: T, max_size: usize) -> usize;
}

impl<T> BoundedPush<T> for VecDeque<T> {
    #[inline]
    fn push_bounded(&mut self, value: T, max_size: usize) -> usize {
        self.push_back(value);
        let mut evicted = 0;
        while self.len() > max_size {
            self.pop_front();
            evicted += 1;
        }
        evicted
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Append-only store of performance metrics and UX events.
///
/// Each stream is guarded by its own mutex; push and trim happen under one
/// lock so concurrent appends are never lost.
pub struct MetricStore {
    session_id: String,
    user_id: RwLock<Option<String>>,
    performance: Mutex<VecDeque<PerformanceMetric>>,
    user_experience: Mutex<VecDeque<UxMetric>>,
    max_performance: usize,
    max_ux: usize,
    enabled: bool,
    platform: Arc<dyn TimingPlatform>,
}

impl MetricStore {
    pub fn new(platform: Arc<dyn TimingPlatform>, config: &TelemetryConfig) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            user_id: RwLock::new(None),
            performance: Mutex::new(VecDeque::new()),
            user_experience: Mutex::new(VecDeque::new()),
            max_performance: config.max_performance_metrics.max(1),
            max_ux: config.max_ux_metrics.max(1),
            enabled: config.enabled,
            platform,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn user_id(&self) -> Option<String> {
        self.user_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stamp future records with `user_id`. Existing records keep theirs.
    pub fn set_user_id(&self, user_id: Option<String>) {
        *self.user_id.write().unwrap_or_else(PoisonError::into_inner) = user_id;
    }

    /// Fill in id, timestamp, session and user, then append.
    pub fn record_metric(&self, metric: NewMetric) -> PerformanceMetric {
        let record = PerformanceMetric {
            id: Uuid::new_v4().to_string(),
            metric_type: metric.metric_type,
            value: metric.value,
            timestamp: self.platform.timestamp(),
            session_id: self.session_id.clone(),
            user_id: self.user_id(),
            metadata: metric.metadata,
        };

        if self.enabled {
            let evicted = lock(&self.performance).push_bounded(record.clone(), self.max_performance);
            if evicted > 0 {
                tracing::debug!(evicted, "performance stream at capacity");
            }
        }
        record
    }

    /// Fill in timestamp, session and user, then append. Missing `success`
    /// is recorded as `true`.
    pub fn record_ux_metric(&self, metric: NewUxMetric) -> UxMetric {
        let record = UxMetric {
            event: metric.event,
            duration: metric.duration,
            success: metric.success.unwrap_or(true),
            error_type: metric.error_type,
            timestamp: self.platform.timestamp(),
            session_id: self.session_id.clone(),
            user_id: self.user_id(),
            metadata: metric.metadata,
        };

        if self.enabled {
            let evicted = lock(&self.user_experience).push_bounded(record.clone(), self.max_ux);
            if evicted > 0 {
                tracing::debug!(evicted, "user experience stream at capacity");
            }
        }
        record
    }

    /// Owned copy of both streams.
    pub fn export(&self) -> MetricsExport {
        self.read(|performance, user_experience| MetricsExport {
            performance: performance.iter().cloned().collect(),
            user_experience: user_experience.iter().cloned().collect(),
        })
    }

    /// Run `f` over both streams while holding both locks.
    pub(crate) fn read<R>(
        &self,
        f: impl FnOnce(&VecDeque<PerformanceMetric>, &VecDeque<UxMetric>) -> R,
    ) -> R {
        // Lock order is always performance, then user experience.
        let performance = lock(&self.performance);
        let user_experience = lock(&self.user_experience);
        f(&performance, &user_experience)
    }

    /// Number of stored performance metrics.
    pub fn len(&self) -> usize {
        lock(&self.performance).len()
    }

    /// True when no performance metrics are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ux_len(&self) -> usize {
        lock(&self.user_experience).len()
    }

    /// Drop every stored record.
    pub fn clear(&self) {
        lock(&self.performance).clear();
        lock(&self.user_experience).clear();
    }
}
