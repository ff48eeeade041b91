use crate::convert::OutputRow;
use crate::enrich::copy::{ListingCopy, copy_request, parse_listing_copy};
use crate::enrich::images::ImageFetcher;
use crate::enrich::progress::{LifecycleEvent, ProgressEvent, ProgressReporter};
use crate::enrich::retry::{RetryOutcome, RetryPolicy, retry_with_backoff};
use crate::llm::{GenerativeModel, LlmError};
use crate::taxonomy::{CategorySelection, CategorySelector};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Semaphore, mpsc};
use tracing::{info, trace, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Model(#[from] LlmError),
    #[error("model returned no usable listing copy")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Downloading,
    Generating,
    Categorizing,
    Done,
    Failed,
}

/// Outcome of one row's task, keyed by the row's position in the batch.
#[derive(Debug, Clone)]
pub struct EnrichmentResult {
    pub row: usize,
    pub state: TaskState,
    pub copy: Option<ListingCopy>,
    pub category: Option<CategorySelection>,
    pub attempts: u32,
    pub error: Option<String>,
}

impl EnrichmentResult {
    fn failed(job: &RowJob, attempts: u32, reason: String) -> Self {
        Self {
            row: job.row,
            state: TaskState::Failed,
            copy: None,
            category: None,
            attempts,
            error: Some(reason),
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == TaskState::Done
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowRef {
    pub row: usize,
    pub sku: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowFailure {
    pub row: usize,
    pub sku: String,
    pub attempts: u32,
    pub reason: String,
}

/// Batch summary: per-field gaps across eligible rows after the merge, plus
/// the rows whose task failed outright.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnrichmentReport {
    pub total_products: usize,
    pub total_processed: usize,
    pub missing_title: Vec<RowRef>,
    pub missing_description: Vec<RowRef>,
    pub missing_tags: Vec<RowRef>,
    pub missing_category: Vec<RowRef>,
    pub failures: Vec<RowFailure>,
}

impl EnrichmentReport {
    pub fn missing_fields(&self) -> usize {
        self.missing_title.len()
            + self.missing_description.len()
            + self.missing_tags.len()
            + self.missing_category.len()
    }

    pub fn summary(&self) -> String {
        if self.total_products == 0 {
            return "No products with an image found".to_string();
        }
        let errors = self.missing_fields();
        if errors == 0 {
            format!("{} products processed without errors", self.total_processed)
        } else {
            format!(
                "{} products processed with {errors} errors",
                self.total_processed
            )
        }
    }
}

#[derive(Debug, Clone)]
struct RowJob {
    row: usize,
    sku: String,
    image_url: String,
}

/// Bounded worker pool that writes listing copy and a category for every
/// row carrying a primary photo.
#[derive(Clone)]
pub struct Enricher {
    model: Arc<dyn GenerativeModel>,
    fetcher: Arc<dyn ImageFetcher>,
    selector: Option<Arc<CategorySelector>>,
    concurrency: usize,
    retry: RetryPolicy,
    delimiter: String,
}

impl Enricher {
    pub fn new(
        model: Arc<dyn GenerativeModel>,
        fetcher: Arc<dyn ImageFetcher>,
        selector: Option<Arc<CategorySelector>>,
        concurrency: usize,
        retry: RetryPolicy,
    ) -> Self {
        let delimiter = selector
            .as_ref()
            .map(|selector| selector.catalog().delimiter().to_string())
            .unwrap_or_else(|| " > ".to_string());
        Self {
            model,
            fetcher,
            selector,
            concurrency: concurrency.max(1),
            retry,
            delimiter,
        }
    }

    /// Enriches `rows` in place and returns the batch report. Progress goes
    /// to `events`; the last message sent is always the `complete` summary.
    pub async fn run(
        &self,
        rows: &mut [OutputRow],
        run_id: Uuid,
        events: mpsc::Sender<ProgressEvent>,
    ) -> EnrichmentReport {
        let jobs: Vec<RowJob> = rows
            .iter()
            .enumerate()
            .filter_map(|(row, output)| {
                output.primary_photo().map(|url| RowJob {
                    row,
                    sku: output.label_sku().to_string(),
                    image_url: url.to_string(),
                })
            })
            .collect();
        let total = jobs.len();
        info!(
            target = "forge.enrich",
            run_id = %run_id,
            rows = rows.len(),
            eligible = total,
            concurrency = self.concurrency,
            "enrichment_started"
        );

        let (lifecycle, lifecycle_rx) = mpsc::unbounded_channel();
        let reporter = ProgressReporter::new(run_id, total, self.delimiter.clone())
            .spawn(lifecycle_rx, events);
        let _ = lifecycle.send(LifecycleEvent::Started { total });

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(total);
        for job in &jobs {
            let worker = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let lifecycle = lifecycle.clone();
            let task_job = job.clone();
            let handle = tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return EnrichmentResult::failed(&task_job, 0, "worker pool closed".into());
                };
                worker.process_row(&task_job, &lifecycle).await
            });
            handles.push((job, handle));
        }

        let mut slots: Vec<Option<EnrichmentResult>> = vec![None; rows.len()];
        for (job, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(err) => {
                    warn!(target = "forge.enrich", row = job.row, error = %err, "enrichment_task_aborted");
                    let reason = format!("task aborted: {err}");
                    let _ = lifecycle.send(LifecycleEvent::Failed {
                        row: job.row,
                        sku: job.sku.clone(),
                        reason: reason.clone(),
                    });
                    EnrichmentResult::failed(job, 0, reason)
                }
            };
            let row = result.row;
            slots[row] = Some(result);
        }

        merge_results(rows, &slots);
        let report = build_report(rows, &jobs, &slots);
        info!(
            target = "forge.enrich",
            run_id = %run_id,
            processed = report.total_processed,
            failed = report.failures.len(),
            missing = report.missing_fields(),
            "enrichment_finished"
        );

        let _ = lifecycle.send(LifecycleEvent::BatchComplete {
            report: report.clone(),
        });
        drop(lifecycle);
        if let Err(err) = reporter.await {
            warn!(target = "forge.enrich", run_id = %run_id, error = %err, "progress_reporter_failed");
        }
        report
    }

    async fn process_row(
        &self,
        job: &RowJob,
        lifecycle: &mpsc::UnboundedSender<LifecycleEvent>,
    ) -> EnrichmentResult {
        transition(job, TaskState::Queued);
        let _ = lifecycle.send(LifecycleEvent::TaskStarted {
            row: job.row,
            sku: job.sku.clone(),
        });

        transition(job, TaskState::Downloading);
        let image = match self.fetcher.fetch(&job.image_url).await {
            Ok(image) => image,
            Err(err) => {
                warn!(target = "forge.enrich", row = job.row, sku = %job.sku, error = %err, "image_download_failed");
                let reason = format!("image download failed: {err}");
                let _ = lifecycle.send(LifecycleEvent::Failed {
                    row: job.row,
                    sku: job.sku.clone(),
                    reason: reason.clone(),
                });
                transition(job, TaskState::Failed);
                return EnrichmentResult::failed(job, 0, reason);
            }
        };

        transition(job, TaskState::Generating);
        let outcome = retry_with_backoff(
            self.retry,
            |attempt| {
                let _ = lifecycle.send(LifecycleEvent::Generating {
                    row: job.row,
                    sku: job.sku.clone(),
                    attempt,
                });
                let model = Arc::clone(&self.model);
                let parts = copy_request(&image);
                async move {
                    let response = model.generate(parts).await.map_err(GenerationError::from)?;
                    parse_listing_copy(&response.text).ok_or(GenerationError::Empty)
                }
            },
            |attempt, err, delay| {
                warn!(
                    target = "forge.enrich",
                    row = job.row,
                    sku = %job.sku,
                    attempt,
                    delay_secs = delay.as_secs(),
                    error = %err,
                    "generation_retry"
                );
                let _ = lifecycle.send(LifecycleEvent::Retrying {
                    row: job.row,
                    sku: job.sku.clone(),
                    attempt,
                    delay,
                    error: err.to_string(),
                });
            },
        )
        .await;

        let (copy, attempts) = match outcome {
            RetryOutcome::Succeeded { value, attempts } => (value, attempts),
            RetryOutcome::Exhausted {
                last_error,
                attempts,
            } => {
                warn!(target = "forge.enrich", row = job.row, sku = %job.sku, attempts, error = %last_error, "generation_failed");
                let reason = format!("generation failed after {attempts} attempts: {last_error}");
                let _ = lifecycle.send(LifecycleEvent::Failed {
                    row: job.row,
                    sku: job.sku.clone(),
                    reason: reason.clone(),
                });
                transition(job, TaskState::Failed);
                return EnrichmentResult::failed(job, attempts, reason);
            }
        };

        let category = match &self.selector {
            Some(selector) => {
                transition(job, TaskState::Categorizing);
                Some(selector.select_category(&copy.title, &copy.description).await)
            }
            None => None,
        };

        transition(job, TaskState::Done);
        let _ = lifecycle.send(LifecycleEvent::Succeeded {
            row: job.row,
            sku: job.sku.clone(),
            category: category.as_ref().map(|selection| selection.category.clone()),
        });
        EnrichmentResult {
            row: job.row,
            state: TaskState::Done,
            copy: Some(copy),
            category,
            attempts,
            error: None,
        }
    }
}

fn transition(job: &RowJob, state: TaskState) {
    trace!(target = "forge.enrich", row = job.row, sku = %job.sku, state = ?state, "task_state");
}

/// Writes non-empty generated fields back onto their rows. Each slot belongs
/// to exactly one row, so no row is written twice.
pub fn merge_results(rows: &mut [OutputRow], slots: &[Option<EnrichmentResult>]) {
    for result in slots.iter().flatten() {
        let Some(row) = rows.get_mut(result.row) else {
            continue;
        };
        if let Some(copy) = &result.copy {
            set_if_present(&mut row.title, &copy.title);
            set_if_present(&mut row.description, &copy.description);
            set_if_present(&mut row.tags, &copy.tags);
        }
        if let Some(selection) = &result.category {
            set_if_present(&mut row.category, &selection.category);
        }
    }
}

fn set_if_present(target: &mut String, value: &str) {
    if !value.trim().is_empty() {
        *target = value.to_string();
    }
}

fn build_report(
    rows: &[OutputRow],
    jobs: &[RowJob],
    slots: &[Option<EnrichmentResult>],
) -> EnrichmentReport {
    let mut report = EnrichmentReport {
        total_products: jobs.len(),
        ..EnrichmentReport::default()
    };
    for job in jobs {
        let reference = || RowRef {
            row: job.row,
            sku: job.sku.clone(),
        };
        match slots.get(job.row).and_then(Option::as_ref) {
            Some(result) if result.is_done() => report.total_processed += 1,
            Some(result) => report.failures.push(RowFailure {
                row: job.row,
                sku: job.sku.clone(),
                attempts: result.attempts,
                reason: result.error.clone().unwrap_or_default(),
            }),
            None => report.failures.push(RowFailure {
                row: job.row,
                sku: job.sku.clone(),
                attempts: 0,
                reason: "no result".into(),
            }),
        }
        let row = &rows[job.row];
        if row.title.trim().is_empty() {
            report.missing_title.push(reference());
        }
        if row.description.trim().is_empty() {
            report.missing_description.push(reference());
        }
        if row.tags.trim().is_empty() {
            report.missing_tags.push(reference());
        }
        if row.category.trim().is_empty() {
            report.missing_category.push(reference());
        }
    }
    report
}
