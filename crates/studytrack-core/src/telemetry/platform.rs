//! Timing platform capability.
//!
//! The collector never touches a global timer. It talks to a
//! [`TimingPlatform`]: a high-resolution clock plus named marks, measures and
//! entry observation. [`InProcessTimeline`] is the in-process implementation,
//! parameterized over a [`Clock`] so tests can drive time by hand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Category of a timeline entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Navigation,
    Mark,
    Measure,
}

/// One entry on the performance timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceEntry {
    pub name: String,
    pub entry_type: EntryType,
    /// Milliseconds since the timeline origin.
    pub start_time: f64,
    pub duration: f64,
    /// Navigation entries only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_event_start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_event_end: Option<f64>,
}

/// Observer callback invoked for each delivered entry.
pub type EntryCallback = Arc<dyn Fn(&PerformanceEntry) + Send + Sync>;

/// Handle returned by [`TimingPlatform::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Time source.
pub trait Clock: Send + Sync {
    /// Monotonic milliseconds since an arbitrary origin.
    fn now(&self) -> f64;
    /// Wall-clock time used to stamp records.
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Host timing facility injected into the collector.
pub trait TimingPlatform: Send + Sync {
    /// Monotonic milliseconds since the timeline origin.
    fn now(&self) -> f64;

    /// Wall-clock time used to stamp records.
    fn timestamp(&self) -> DateTime<Utc>;

    /// Create a named mark at the current time.
    fn mark(&self, name: &str);

    /// Create a measure between two marks. `end_mark = None` measures up to
    /// now. Returns `None` when a referenced mark does not exist.
    fn measure(&self, name: &str, start_mark: &str, end_mark: Option<&str>)
        -> Option<PerformanceEntry>;

    /// Remove marks with this name, or all marks for `None`.
    fn clear_marks(&self, name: Option<&str>);

    /// Remove measures with this name, or all measures for `None`.
    fn clear_measures(&self, name: Option<&str>);

    /// Subscribe to entries of one type. `None` means the platform cannot
    /// observe that type.
    fn observe(&self, entry_type: EntryType, callback: EntryCallback) -> Option<SubscriptionId>;

    /// Drop a subscription. Unknown ids are ignored.
    fn disconnect(&self, id: SubscriptionId);
}

/// Real clock backed by [`Instant`] and the system wall clock.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }

    fn timestamp(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: DateTime<Utc>,
    elapsed_us: Arc<AtomicU64>,
}

impl ManualClock {
    /// Start at `origin` with zero elapsed time.
    pub fn starting_at(origin: DateTime<Utc>) -> Self {
        Self {
            origin,
            elapsed_us: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.elapsed_us
            .fetch_add(by.as_micros() as u64, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::starting_at(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.elapsed_us.load(Ordering::SeqCst) as f64 / 1000.0
    }

    fn timestamp(&self) -> DateTime<Utc> {
        let elapsed = self.elapsed_us.load(Ordering::SeqCst) as i64;
        self.origin + chrono::Duration::microseconds(elapsed)
    }
}

struct Subscription {
    id: SubscriptionId,
    entry_type: EntryType,
    callback: EntryCallback,
}

/// In-process performance timeline.
///
/// Keeps marks and measures in memory and delivers new entries
/// synchronously to subscribers. The host application reports page loads
/// with [`InProcessTimeline::record_navigation`].
pub struct InProcessTimeline {
    clock: Box<dyn Clock>,
    marks: Mutex<Vec<PerformanceEntry>>,
    measures: Mutex<Vec<PerformanceEntry>>,
    subscriptions: Mutex<Vec<Subscription>>,
    next_subscription: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InProcessTimeline {
    pub fn new() -> Self {
        Self::with_clock(SystemClock::new())
    }

    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self {
            clock: Box::new(clock),
            marks: Mutex::new(Vec::new()),
            measures: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    /// Report a finished navigation (page load) to observers.
    pub fn record_navigation(&self, name: &str, load_event_start: f64, load_event_end: f64) {
        let entry = PerformanceEntry {
            name: name.to_string(),
            entry_type: EntryType::Navigation,
            start_time: 0.0,
            duration: load_event_end,
            load_event_start: Some(load_event_start),
            load_event_end: Some(load_event_end),
        };
        self.dispatch(&entry);
    }

    /// Current marks, oldest first.
    pub fn marks(&self) -> Vec<PerformanceEntry> {
        lock(&self.marks).clone()
    }

    /// Current measures, oldest first.
    pub fn measures(&self) -> Vec<PerformanceEntry> {
        lock(&self.measures).clone()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscriptions).len()
    }

    fn find_mark(&self, name: &str) -> Option<f64> {
        lock(&self.marks)
            .iter()
            .rev()
            .find(|m| m.name == name)
            .map(|m| m.start_time)
    }

    fn dispatch(&self, entry: &PerformanceEntry) {
        // Callbacks run outside the lock so they may call back into the timeline.
        let callbacks: Vec<EntryCallback> = lock(&self.subscriptions)
            .iter()
            .filter(|s| s.entry_type == entry.entry_type)
            .map(|s| Arc::clone(&s.callback))
            .collect();

        for callback in callbacks {
            callback(entry);
        }
    }
}

impl Default for InProcessTimeline {
    fn default() -> Self {
        Self::new()
    }
}

impl TimingPlatform for InProcessTimeline {
    fn now(&self) -> f64 {
        self.clock.now()
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.clock.timestamp()
    }

    fn mark(&self, name: &str) {
        let entry = PerformanceEntry {
            name: name.to_string(),
            entry_type: EntryType::Mark,
            start_time: self.clock.now(),
            duration: 0.0,
            load_event_start: None,
            load_event_end: None,
        };
        lock(&self.marks).push(entry.clone());
        self.dispatch(&entry);
    }

    fn measure(
        &self,
        name: &str,
        start_mark: &str,
        end_mark: Option<&str>,
    ) -> Option<PerformanceEntry> {
        let start = self.find_mark(start_mark)?;
        let end = match end_mark {
            Some(mark) => self.find_mark(mark)?,
            None => self.clock.now(),
        };

        let entry = PerformanceEntry {
            name: name.to_string(),
            entry_type: EntryType::Measure,
            start_time: start,
            duration: (end - start).max(0.0),
            load_event_start: None,
            load_event_end: None,
        };
        lock(&self.measures).push(entry.clone());
        self.dispatch(&entry);
        Some(entry)
    }

    fn clear_marks(&self, name: Option<&str>) {
        let mut marks = lock(&self.marks);
        match name {
            Some(name) => marks.retain(|m| m.name != name),
            None => marks.clear(),
        }
    }

    fn clear_measures(&self, name: Option<&str>) {
        let mut measures = lock(&self.measures);
        match name {
            Some(name) => measures.retain(|m| m.name != name),
            None => measures.clear(),
        }
    }

    fn observe(&self, entry_type: EntryType, callback: EntryCallback) -> Option<SubscriptionId> {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        lock(&self.subscriptions).push(Subscription {
            id,
            entry_type,
            callback,
        });
        Some(id)
    }

    fn disconnect(&self, id: SubscriptionId) {
        lock(&self.subscriptions).retain(|s| s.id != id);
    }
}
