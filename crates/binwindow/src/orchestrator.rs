//! # Scan orchestration
//!
//! Runs probes and extractions over many files with a bounded worker pool.
//!
//! ```text
//!                  ┌──────────┐
//!   files ───────▶ │ job queue│ ◀── shared by all workers
//!                  └────┬─────┘
//!           ┌───────────┼───────────┐
//!           ▼           ▼           ▼
//!       worker 0    worker 1    worker W-1    each job opens its own stream
//!           │           │           │
//!           └───────────┼───────────┘
//!                       ▼
//!                result channel ──▶ sort by file name ──▶ filter / pool
//! ```
//!
//! Completion order never leaks into the result: everything is re-sorted by
//! file name before any order-dependent decision is made.

use crate::common::{
    ChangeEvent, FileTimeRange, LogFileDescriptor, Result, RetryPolicy, ScanPhase, SkippedFile,
    TimeWindow,
};
use crate::extractor::EventExtractor;
use crate::locator::FileLocator;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// Result of the locate phase.
#[derive(Debug, Clone, Default)]
pub struct LocateOutcome {
    /// Every successfully probed file, by name.
    pub ranges: Vec<FileTimeRange>,
    /// Files to extract, by name.
    pub selected: Vec<FileTimeRange>,
    pub skipped: Vec<SkippedFile>,
}

/// Result of the extract phase.
#[derive(Debug, Clone, Default)]
pub struct ExtractOutcome {
    /// Records of all files, concatenated in file-name order.
    pub events: Vec<ChangeEvent>,
    pub skipped: Vec<SkippedFile>,
}

/// Drives the locator and extractor over a file list.
#[derive(Debug, Clone)]
pub struct ScanOrchestrator {
    locator: FileLocator,
    extractor: EventExtractor,
    workers: usize,
    retry: RetryPolicy,
}

impl ScanOrchestrator {
    pub fn new(
        locator: FileLocator,
        extractor: EventExtractor,
        workers: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            locator,
            extractor,
            workers,
            retry,
        }
    }

    pub fn locator(&self) -> &FileLocator {
        &self.locator
    }

    /// Per-file probe budget: the standalone one when probing one file at a
    /// time, the short pool one otherwise.
    pub fn probe_budget(&self) -> Duration {
        let config = self.locator.config();
        if self.workers <= 1 {
            config.standalone_probe_budget
        } else {
            config.probe_budget
        }
    }

    /// Probe `files` and select the ones that may overlap `window`.
    pub async fn locate(&self, files: &[LogFileDescriptor], window: &TimeWindow) -> LocateOutcome {
        if self.workers <= 1 {
            self.locate_sequential(files, window).await
        } else {
            self.locate_concurrent(files, window).await
        }
    }

    /// One file at a time in name order, stopping at the first file that
    /// starts after the window.
    pub async fn locate_sequential(
        &self,
        files: &[LogFileDescriptor],
        window: &TimeWindow,
    ) -> LocateOutcome {
        let budget = self.probe_budget();
        let mut outcome = LocateOutcome::default();

        for file in sorted(files) {
            let range = match probe_with_retry(&self.locator, &self.retry, &file, budget).await {
                Ok(range) => range,
                Err(skipped) => {
                    outcome.skipped.push(skipped);
                    continue;
                }
            };
            let done = self.locator.starts_after(&range, window);
            outcome.ranges.push(range);
            if done {
                break;
            }
        }

        outcome.selected = self.locator.select(&outcome.ranges, window);
        info!(
            "Sequential probe: {} of {} files selected",
            outcome.selected.len(),
            files.len()
        );
        outcome
    }

    /// Probe every file on the worker pool, then select in name order.
    pub async fn locate_concurrent(
        &self,
        files: &[LogFileDescriptor],
        window: &TimeWindow,
    ) -> LocateOutcome {
        let (ranges, skipped) = self.probe_all(files).await;
        let selected = self.locator.select(&ranges, window);
        info!(
            "Concurrent probe: {} of {} files selected",
            selected.len(),
            files.len()
        );
        LocateOutcome {
            ranges,
            selected,
            skipped,
        }
    }

    /// Probe every file on the worker pool without any early stop.
    pub async fn probe_all(
        &self,
        files: &[LogFileDescriptor],
    ) -> (Vec<FileTimeRange>, Vec<SkippedFile>) {
        let budget = self.probe_budget();
        let locator = self.locator.clone();
        let retry = self.retry.clone();

        let results = run_pool(files.to_vec(), self.workers, move |file| {
            let locator = locator.clone();
            let retry = retry.clone();
            async move { probe_with_retry(&locator, &retry, &file, budget).await }
        })
        .await;

        let mut ranges = Vec::with_capacity(results.len());
        let mut skipped = Vec::new();
        for (_, result) in results {
            match result {
                Ok(range) => ranges.push(range),
                Err(skip) => skipped.push(skip),
            }
        }
        (ranges, skipped)
    }

    /// Extract every candidate file. Extraction is not retried.
    pub async fn extract(&self, files: &[LogFileDescriptor], window: &TimeWindow) -> ExtractOutcome {
        let extractor = self.extractor.clone();
        let window = *window;

        let results = run_pool(files.to_vec(), self.workers, move |file| {
            let extractor = extractor.clone();
            async move { extractor.extract(&file, &window).await }
        })
        .await;

        let mut outcome = ExtractOutcome::default();
        for (file, result) in results {
            match result {
                Ok(events) => {
                    debug!("{}: {} records", file.name, events.len());
                    outcome.events.extend(events);
                }
                Err(skipped) => {
                    warn!("Skipping {}", skipped);
                    outcome.skipped.push(skipped);
                }
            }
        }
        info!(
            "Extracted {} records from {} files",
            outcome.events.len(),
            files.len() - outcome.skipped.len()
        );
        outcome
    }
}

async fn probe_with_retry(
    locator: &FileLocator,
    retry: &RetryPolicy,
    file: &LogFileDescriptor,
    budget: Duration,
) -> std::result::Result<FileTimeRange, SkippedFile> {
    let what = format!("probe of {}", file.name);
    let result: Result<FileTimeRange> = retry.run(&what, || locator.probe(file, budget)).await;
    result.map_err(|e| {
        warn!("Abandoning {}: {}", file.name, e);
        SkippedFile::new(&file.name, ScanPhase::Probe, &e)
    })
}

fn sorted(files: &[LogFileDescriptor]) -> Vec<LogFileDescriptor> {
    let mut files = files.to_vec();
    files.sort_by(|a, b| a.name.cmp(&b.name));
    files
}

/// Run `job` once per file on `max(1, min(workers, files))` tasks pulling
/// from a shared queue. Results come back sorted by file name.
pub async fn run_pool<T, F, Fut>(
    files: Vec<LogFileDescriptor>,
    workers: usize,
    job: F,
) -> Vec<(LogFileDescriptor, T)>
where
    F: Fn(LogFileDescriptor) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let worker_count = workers.min(files.len()).max(1);
    let (job_tx, job_rx) = mpsc::unbounded_channel();
    for file in files {
        // The receiver is alive until the workers finish.
        let _ = job_tx.send(file);
    }
    drop(job_tx);

    let jobs = Arc::new(Mutex::new(job_rx));
    let (result_tx, mut result_rx) = mpsc::unbounded_channel();
    let job = Arc::new(job);

    let mut handles = Vec::with_capacity(worker_count);
    for worker_id in 0..worker_count {
        let jobs = jobs.clone();
        let result_tx = result_tx.clone();
        let job = job.clone();
        handles.push(tokio::spawn(async move {
            let mut done = 0usize;
            loop {
                let next = jobs.lock().await.recv().await;
                let Some(file) = next else { break };
                let output = job(file.clone()).await;
                done += 1;
                if result_tx.send((file, output)).is_err() {
                    break;
                }
            }
            debug!("Worker {} finished after {} jobs", worker_id, done);
        }));
    }
    drop(result_tx);

    for handle in handles {
        if let Err(e) = handle.await {
            warn!("Scan worker failed: {}", e);
        }
    }

    let mut results = Vec::new();
    while let Some(result) = result_rx.recv().await {
        results.push(result);
    }
    results.sort_by(|a, b| a.0.name.cmp(&b.0.name));
    results
}
