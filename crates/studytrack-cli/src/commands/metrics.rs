//! Metrics subcommand: summarize exported files, grade page loads and run an
//! instrumented demo workload.

use chrono::{DateTime, Duration, Utc};
use clap::Subcommand;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use studytrack_core::telemetry::{
    InProcessTimeline, Metadata, MetricsExport, PerformanceGrade, TelemetryCollector, TimeRange,
    TimingPlatform,
};
use studytrack_core::Config;

#[derive(Subcommand)]
pub enum MetricsAction {
    /// Summarize an exported metrics file (dashboard "Export" JSON)
    Summary {
        /// Path to the exported JSON file
        file: PathBuf,
        /// Only include records at or after this RFC 3339 time
        #[arg(long)]
        since: Option<DateTime<Utc>>,
        /// Only include records at or before this RFC 3339 time
        #[arg(long)]
        until: Option<DateTime<Utc>>,
        /// Only include the last N minutes up to the newest record in the file
        #[arg(long, conflicts_with_all = ["since", "until"])]
        last_minutes: Option<i64>,
    },
    /// Print the performance grade for a page load time
    Grade {
        /// Load time in milliseconds
        load_time_ms: f64,
    },
    /// Run an instrumented demo workload and print its export
    Demo {
        /// Number of tracked calls
        #[arg(long, default_value_t = 10)]
        calls: u32,
        /// Make every Nth call fail (0 disables failures)
        #[arg(long, default_value_t = 4)]
        fail_every: u32,
        /// Write the export here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error("study session service unavailable (request {0})")]
    Unavailable(u32),
}

pub fn run(action: MetricsAction, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        MetricsAction::Summary {
            file,
            since,
            until,
            last_minutes,
        } => summarize_file(&file, since, until, last_minutes, config),
        MetricsAction::Grade { load_time_ms } => {
            if !load_time_ms.is_finite() || load_time_ms < 0.0 {
                return Err(format!("invalid load time: {load_time_ms}").into());
            }
            println!("{}", PerformanceGrade::from_load_time(load_time_ms));
            Ok(())
        }
        MetricsAction::Demo {
            calls,
            fail_every,
            out,
        } => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()?;
            let export = runtime.block_on(run_demo(calls, fail_every, config));
            let json = export.to_json_pretty()?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    println!("exported {} metrics to {}", export.performance.len(), path.display());
                }
                None => println!("{json}"),
            }
            Ok(())
        }
    }
}

fn summarize_file(
    file: &Path,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    last_minutes: Option<i64>,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(file)
        .map_err(|e| format!("cannot read {}: {e}", file.display()))?;
    let export = MetricsExport::from_json(&content)?;

    let range = match (since, until, last_minutes) {
        (_, _, Some(minutes)) => {
            let newest = export
                .performance
                .iter()
                .map(|m| m.timestamp)
                .chain(export.user_experience.iter().map(|e| e.timestamp))
                .max()
                .unwrap_or_else(Utc::now);
            let start = Duration::try_minutes(minutes)
                .filter(|span| *span > Duration::zero())
                .and_then(|span| newest.checked_sub_signed(span))
                .ok_or_else(|| format!("invalid --last-minutes value: {minutes}"))?;
            Some(TimeRange::new(start, newest)?)
        }
        (None, None, None) => None,
        (since, until, None) => Some(TimeRange::new(
            since.unwrap_or(DateTime::<Utc>::MIN_UTC),
            until.unwrap_or(DateTime::<Utc>::MAX_UTC),
        )?),
    };

    tracing::debug!(
        file = %file.display(),
        performance = export.performance.len(),
        user_experience = export.user_experience.len(),
        "summarizing export"
    );
    let summary = export.summarize(range.as_ref(), config.telemetry.slow_call_threshold_ms);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Simulated backend request: latency grows with `index`, every
/// `fail_every`th request fails.
async fn simulated_request(index: u32, fail_every: u32) -> Result<u32, DemoError> {
    tokio::time::sleep(std::time::Duration::from_millis(u64::from(index % 5) * 3)).await;
    if fail_every > 0 && index % fail_every == 0 {
        Err(DemoError::Unavailable(index))
    } else {
        Ok(index)
    }
}

async fn run_demo(calls: u32, fail_every: u32, config: &Config) -> MetricsExport {
    let timeline = Arc::new(InProcessTimeline::new());
    let collector = TelemetryCollector::with_platform(timeline.clone(), config.telemetry.clone());
    collector.set_user_id(Some("demo-student".into()));

    let started = timeline.now();
    for index in 1..=calls {
        let mut meta = Metadata::new();
        meta.insert("endpoint".into(), "/study-sessions".into());
        meta.insert("attempt".into(), u64::from(index).into());

        match collector
            .track_api_call(
                "fetch-study-sessions",
                || simulated_request(index, fail_every),
                Some(meta),
            )
            .await
        {
            Ok(_) => tracing::debug!(index, "demo call succeeded"),
            Err(err) => tracing::info!(index, error = %err, "demo call failed"),
        }
    }

    timeline.mark("dashboard-render-start");
    collector.track_user_interaction("click", "refresh-dashboard", None);
    timeline.mark("dashboard-render-end");
    timeline.measure(
        "dashboard-render",
        "dashboard-render-start",
        Some("dashboard-render-end"),
    );
    timeline.clear_marks(None);
    timeline.clear_measures(None);

    let load_time = timeline.now() - started;
    timeline.record_navigation("/dashboard", 0.0, load_time);
    collector.track_page_load("dashboard", load_time);

    collector.destroy();
    collector.export_metrics()
}
