//! Record types shared by the store, the instrumentation wrappers and the
//! summaries.
//!
//! Everything here serializes to the JSON shape the dashboard export button
//! writes (camelCase keys, `type` for the metric kind).

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::error::Error;
use std::fmt;

use crate::error::ValidationError;

/// Page loads at or above this duration (ms) count as failed.
pub const PAGE_LOAD_BUDGET_MS: f64 = 3000.0;

/// Ordered key-value bag attached to every record.
pub type Metadata = IndexMap<String, MetadataValue>;

/// A single metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Object(IndexMap<String, MetadataValue>),
}

impl MetadataValue {
    /// Borrow the value as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetadataValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Number(value)
    }
}

impl From<u64> for MetadataValue {
    fn from(value: u64) -> Self {
        MetadataValue::Number(value as f64)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Number(value as f64)
    }
}

impl From<Metadata> for MetadataValue {
    fn from(value: Metadata) -> Self {
        MetadataValue::Object(value)
    }
}

/// Kind of performance metric. Unknown kinds are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MetricType {
    ResponseTime,
    ApiCall,
    RenderTime,
    Error,
    UserAction,
    Custom(String),
}

impl MetricType {
    pub fn as_str(&self) -> &str {
        match self {
            MetricType::ResponseTime => "response_time",
            MetricType::ApiCall => "api_call",
            MetricType::RenderTime => "render_time",
            MetricType::Error => "error",
            MetricType::UserAction => "user_action",
            MetricType::Custom(name) => name,
        }
    }

    /// Whether `value` is a latency in milliseconds.
    pub fn is_timing(&self) -> bool {
        matches!(
            self,
            MetricType::ResponseTime | MetricType::ApiCall | MetricType::RenderTime
        )
    }
}

impl From<String> for MetricType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "response_time" => MetricType::ResponseTime,
            "api_call" => MetricType::ApiCall,
            "render_time" => MetricType::RenderTime,
            "error" => MetricType::Error,
            "user_action" => MetricType::UserAction,
            _ => MetricType::Custom(value),
        }
    }
}

impl From<MetricType> for String {
    fn from(value: MetricType) -> Self {
        match value {
            MetricType::Custom(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of user-experience event. Unknown kinds are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UxEvent {
    PageLoad,
    Interaction,
    ErrorEncountered,
    Custom(String),
}

impl UxEvent {
    pub fn as_str(&self) -> &str {
        match self {
            UxEvent::PageLoad => "page_load",
            UxEvent::Interaction => "interaction",
            UxEvent::ErrorEncountered => "error_encountered",
            UxEvent::Custom(name) => name,
        }
    }
}

impl From<String> for UxEvent {
    fn from(value: String) -> Self {
        match value.as_str() {
            "page_load" => UxEvent::PageLoad,
            "interaction" => UxEvent::Interaction,
            "error_encountered" => UxEvent::ErrorEncountered,
            _ => UxEvent::Custom(value),
        }
    }
}

impl From<UxEvent> for String {
    fn from(value: UxEvent) -> Self {
        match value {
            UxEvent::Custom(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for UxEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored performance sample. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetric {
    pub id: String,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A stored user-experience event. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UxMetric {
    pub event: UxEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// A performance metric before the store stamps id, time and session.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMetric {
    pub metric_type: MetricType,
    pub value: f64,
    pub metadata: Metadata,
}

impl NewMetric {
    pub fn new(metric_type: MetricType, value: f64) -> Self {
        Self {
            metric_type,
            value,
            metadata: Metadata::new(),
        }
    }

    /// Add one metadata entry.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Merge a metadata bag; later keys win.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata.extend(metadata);
        self
    }
}

/// A UX event before the store stamps time and session.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUxMetric {
    pub event: UxEvent,
    pub duration: Option<f64>,
    /// `None` is recorded as success.
    pub success: Option<bool>,
    pub error_type: Option<String>,
    pub metadata: Metadata,
}

impl NewUxMetric {
    pub fn new(event: UxEvent) -> Self {
        Self {
            event,
            duration: None,
            success: None,
            error_type: None,
            metadata: Metadata::new(),
        }
    }

    pub fn duration(mut self, duration_ms: f64) -> Self {
        self.duration = Some(duration_ms);
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    /// Mark the event failed with a known error classification.
    pub fn failed(mut self, error_type: impl Into<String>) -> Self {
        self.success = Some(false);
        self.error_type = Some(error_type.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata.extend(metadata);
        self
    }
}

/// Page-load quality bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceGrade {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl PerformanceGrade {
    pub fn from_load_time(load_time_ms: f64) -> Self {
        if load_time_ms < 1000.0 {
            PerformanceGrade::Excellent
        } else if load_time_ms < 2000.0 {
            PerformanceGrade::Good
        } else if load_time_ms < PAGE_LOAD_BUDGET_MS {
            PerformanceGrade::Fair
        } else {
            PerformanceGrade::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PerformanceGrade::Excellent => "excellent",
            PerformanceGrade::Good => "good",
            PerformanceGrade::Fair => "fair",
            PerformanceGrade::Poor => "poor",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "excellent" => Some(PerformanceGrade::Excellent),
            "good" => Some(PerformanceGrade::Good),
            "fair" => Some(PerformanceGrade::Fair),
            "poor" => Some(PerformanceGrade::Poor),
            _ => None,
        }
    }
}

impl fmt::Display for PerformanceGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive time window for summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Build a validated range.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTimeRange`] when `end` is before `start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ValidationError> {
        if end < start {
            return Err(ValidationError::InvalidTimeRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// The window of length `span` ending at `end`.
    pub fn ending_at(end: DateTime<Utc>, span: Duration) -> Self {
        Self {
            start: end
                .checked_sub_signed(span)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            end,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

/// Snapshot of both streams, as written by the dashboard export.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsExport {
    pub performance: Vec<PerformanceMetric>,
    pub user_experience: Vec<UxMetric>,
}

impl MetricsExport {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Name, message and cause chain of a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
}

impl ErrorInfo {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    /// Describe an error value. The name is the error's type name without
    /// its module path; the stack is the chain of `source()` causes.
    pub fn from_error<E: Error + ?Sized>(err: &E) -> Self {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }

        Self {
            name: short_type_name(std::any::type_name::<E>()),
            message: err.to_string(),
            stack: if causes.is_empty() {
                None
            } else {
                Some(format!("caused by: {}", causes.join("\ncaused by: ")))
            },
        }
    }

    /// Describe the error side of a tracked call.
    ///
    /// Boxed trait objects (`Box<dyn Error + Send + Sync>`, `Box<dyn Error>`)
    /// keep their cause chain. Other values only carry their type name and
    /// `Display` text.
    pub fn from_failure<E: fmt::Display + 'static>(err: &E) -> Self {
        let any: &dyn Any = err;
        if let Some(boxed) = any.downcast_ref::<Box<dyn Error + Send + Sync>>() {
            return Self::from_error(boxed.as_ref());
        }
        if let Some(boxed) = any.downcast_ref::<Box<dyn Error + Send>>() {
            return Self::from_error(boxed.as_ref());
        }
        if let Some(boxed) = any.downcast_ref::<Box<dyn Error>>() {
            return Self::from_error(boxed.as_ref());
        }

        Self {
            name: short_type_name(std::any::type_name::<E>()),
            message: err.to_string(),
            stack: None,
        }
    }
}

/// `alloc::boxed::Box<dyn core::error::Error>` -> `Box`,
/// `dyn core::error::Error + core::marker::Send` -> `Error`,
/// `std::io::error::Error` -> `Error`.
fn short_type_name(full: &str) -> String {
    let full = full.trim_start_matches("dyn ");
    let base = full.split('<').next().unwrap_or(full);
    let base = base.split(" + ").next().unwrap_or(base);
    base.rsplit("::").next().unwrap_or(base).trim().to_string()
}
