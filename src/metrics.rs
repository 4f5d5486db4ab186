//! Run metrics.
//!
//! Per-table counters and histograms go through the `metrics` facade into an
//! in-process Prometheus recorder. A batch job is too short-lived to scrape,
//! so the recorded series are rendered and pushed along with the run summary.

use crate::runner::BatchSummary;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::{info, warn};

static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the process-wide Prometheus recorder. Idempotent.
///
/// Returns `None` when a different recorder already owns the process.
pub fn init_metrics() -> Option<&'static PrometheusHandle> {
    if let Some(handle) = HANDLE.get() {
        return Some(handle);
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            info!("Prometheus recorder installed");
            Some(HANDLE.get_or_init(|| handle))
        }
        Err(e) => {
            warn!("Failed to install Prometheus recorder: {}", e);
            None
        }
    }
}

/// Summary plus every series recorded through the facade
pub fn render_push_body(summary: &BatchSummary, finished_at_secs: i64, recorded: Option<&PrometheusHandle>) -> String {
    let mut body = render_summary(summary, finished_at_secs);
    if let Some(handle) = recorded {
        body.push_str(&handle.render());
    }
    body
}

/// Prometheus text exposition of a run summary
pub fn render_summary(summary: &BatchSummary, finished_at_secs: i64) -> String {
    format!(
        "# TYPE cbs_bronze_runs_total counter\n\
         cbs_bronze_runs_total 1\n\
         # TYPE cbs_bronze_tables_written_total counter\n\
         cbs_bronze_tables_written_total {}\n\
         # TYPE cbs_bronze_tables_skipped_total counter\n\
         cbs_bronze_tables_skipped_total {}\n\
         # TYPE cbs_bronze_tables_failed_total counter\n\
         cbs_bronze_tables_failed_total {}\n\
         # TYPE cbs_bronze_run_duration_seconds gauge\n\
         cbs_bronze_run_duration_seconds {}\n\
         # TYPE cbs_bronze_last_run_timestamp_seconds gauge\n\
         cbs_bronze_last_run_timestamp_seconds {}\n",
        summary.written(),
        summary.skipped(),
        summary.failed(),
        summary.duration_secs,
        finished_at_secs
    )
}

/// Push the run summary to a Prometheus Pushgateway. Failures are logged, never returned.
pub async fn push_summary(
    base_url: &str,
    instance: &str,
    summary: &BatchSummary,
    recorded: Option<&PrometheusHandle>,
) {
    let push_url = format!(
        "{}/metrics/job/{}/instance/{}",
        base_url.trim_end_matches('/'),
        env!("CARGO_PKG_NAME"),
        instance
    );
    let body = render_push_body(summary, chrono::Utc::now().timestamp(), recorded);

    let res = reqwest::Client::new()
        .post(&push_url)
        .header("Content-Type", "text/plain; version=0.0.4")
        .body(body)
        .send()
        .await;

    match res {
        Ok(r) if r.status().is_success() => {
            info!("Pushed run metrics to Pushgateway instance={}", instance);
        }
        Ok(r) => {
            warn!("Pushgateway push responded with status {} for instance={}", r.status().as_u16(), instance);
        }
        Err(e) => {
            warn!("Failed to push metrics to Pushgateway for instance={}: {}", instance, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TableOutcome;
    use std::path::PathBuf;

    #[test]
    fn test_render_summary_counts() {
        let summary = BatchSummary {
            outcomes: vec![
                TableOutcome::Written {
                    table: "a".into(),
                    path: PathBuf::from("a.parquet"),
                    rows: 3,
                },
                TableOutcome::Skipped { reason: "missing".into() },
                TableOutcome::Failed {
                    table: "b".into(),
                    error: "boom".into(),
                },
            ],
            duration_secs: 1.5,
        };
        let text = render_summary(&summary, 1_700_000_000);
        assert!(text.contains("cbs_bronze_tables_written_total 1\n"));
        assert!(text.contains("cbs_bronze_tables_skipped_total 1\n"));
        assert!(text.contains("cbs_bronze_tables_failed_total 1\n"));
        assert!(text.contains("cbs_bronze_run_duration_seconds 1.5\n"));
        assert!(text.contains("cbs_bronze_last_run_timestamp_seconds 1700000000\n"));
    }

    #[test]
    fn test_push_body_includes_recorded_series() {
        let handle = init_metrics().expect("recorder installs once per test binary");
        assert!(std::ptr::eq(handle, init_metrics().unwrap()));

        ::metrics::counter!("cbs_tables_total", "outcome" => "written").increment(2);
        ::metrics::histogram!("cbs_rows_written").record(3.0);

        let body = render_push_body(&BatchSummary::default(), 1_700_000_000, Some(handle));
        assert!(body.starts_with("# TYPE cbs_bronze_runs_total counter\n"));
        assert!(body.contains("cbs_tables_total{outcome=\"written\"} 2"));
        assert!(body.contains("cbs_rows_written_count 1"));

        let summary_only = render_push_body(&BatchSummary::default(), 1_700_000_000, None);
        assert!(!summary_only.contains("cbs_tables_total"));
    }
}
