use crate::error::{IngestError, Result};
use crate::manifest::Manifest;
use crate::pipeline::TableProcessor;
use crate::types::{FailurePolicy, TableOutcome};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

/// Outcomes of every table in one run, in completion order
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub outcomes: Vec<TableOutcome>,
    pub duration_secs: f64,
}

impl BatchSummary {
    pub fn written(&self) -> usize {
        self.count(|o| matches!(o, TableOutcome::Written { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, TableOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(TableOutcome::is_failed)
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    fn count(&self, pred: impl Fn(&TableOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|&o| pred(o)).count()
    }
}

/// Fans manifest entries out to a bounded pool of table workers
pub struct BatchRunner {
    processor: Arc<TableProcessor>,
    max_workers: usize,
    failure_policy: FailurePolicy,
}

impl BatchRunner {
    pub fn new(processor: TableProcessor, max_workers: usize, failure_policy: FailurePolicy) -> Self {
        Self {
            processor: Arc::new(processor),
            max_workers: max_workers.max(1),
            failure_policy,
        }
    }

    /// Read the manifest and process every entry.
    ///
    /// Manifest errors abort before any table runs and are left to the caller
    /// to report. With
    /// [`FailurePolicy::Abort`], the first failed table cancels the rest and
    /// the run returns [`IngestError::Aborted`].
    #[instrument(skip(self, manifest_path), fields(manifest = %manifest_path.display()))]
    pub async fn run(&self, manifest_path: &Path) -> Result<BatchSummary> {
        let manifest = Manifest::load(manifest_path)?;
        self.run_manifest(manifest).await
    }

    pub async fn run_manifest(&self, manifest: Manifest) -> Result<BatchSummary> {
        let started = Instant::now();
        info!(
            "Processing {} tables using {} workers",
            manifest.tables.len(),
            self.max_workers
        );

        let permits = Arc::new(Semaphore::new(self.max_workers));
        let mut workers = JoinSet::new();
        for descriptor in manifest.tables {
            let processor = Arc::clone(&self.processor);
            let permits = Arc::clone(&permits);
            workers.spawn(async move {
                // The semaphore is never closed while workers run
                let _permit = permits.acquire_owned().await.ok();
                processor.process(&descriptor).await
            });
        }

        let mut summary = BatchSummary::default();
        while let Some(joined) = workers.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) if e.is_cancelled() => continue,
                Err(e) => {
                    error!("Table worker panicked: {}", e);
                    TableOutcome::Failed {
                        table: "<unknown>".to_string(),
                        error: e.to_string(),
                    }
                }
            };

            if let (FailurePolicy::Abort, TableOutcome::Failed { table, error }) =
                (self.failure_policy, &outcome)
            {
                warn!("Aborting batch: {} table(s) still outstanding", workers.len());
                workers.abort_all();
                return Err(IngestError::Aborted {
                    table: table.clone(),
                    reason: error.clone(),
                });
            }
            summary.outcomes.push(outcome);
        }

        summary.duration_secs = started.elapsed().as_secs_f64();
        info!(
            "✅ Batch finished: {} written, {} skipped, {} failed in {:.1}s",
            summary.written(),
            summary.skipped(),
            summary.failed(),
            summary.duration_secs
        );
        Ok(summary)
    }
}
