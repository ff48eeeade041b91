use crate::enrich::orchestrator::EnrichmentReport;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_with::skip_serializing_none;
use std::time::Duration;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Starting,
    Processing,
    Generating,
    Warning,
    Success,
    Error,
    Complete,
    Done,
}

/// One message on the progress stream.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub status: ProgressStatus,
    pub message: String,
    pub progress: Option<u8>,
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub row: Option<usize>,
    pub sku: Option<String>,
    pub category: Option<String>,
    pub attempt: Option<u32>,
    pub report: Option<EnrichmentReport>,
    pub products_count: Option<usize>,
    pub csv: Option<String>,
}

impl ProgressEvent {
    pub fn new(run_id: Uuid, status: ProgressStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            progress: None,
            run_id,
            timestamp: Utc::now(),
            row: None,
            sku: None,
            category: None,
            attempt: None,
            report: None,
            products_count: None,
            csv: None,
        }
    }

    fn for_row(mut self, row: usize, sku: &str) -> Self {
        self.row = Some(row);
        if !sku.is_empty() {
            self.sku = Some(sku.to_string());
        }
        self
    }

    fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Terminal message carrying the finished document.
    pub fn done(run_id: Uuid, products_count: usize, csv: String) -> Self {
        let mut event = Self::new(run_id, ProgressStatus::Done, "Enriched file ready")
            .with_progress(100);
        event.products_count = Some(products_count);
        event.csv = Some(csv);
        event
    }

    pub fn error(run_id: Uuid, message: impl Into<String>) -> Self {
        Self::new(run_id, ProgressStatus::Error, message)
    }
}

/// What the workers report while processing rows.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    Started { total: usize },
    TaskStarted { row: usize, sku: String },
    Generating { row: usize, sku: String, attempt: u32 },
    Retrying { row: usize, sku: String, attempt: u32, delay: Duration, error: String },
    Succeeded { row: usize, sku: String, category: Option<String> },
    Failed { row: usize, sku: String, reason: String },
    BatchComplete { report: EnrichmentReport },
}

/// Turns lifecycle events into progress messages. The reporter task owns
/// the completed counter and bumps it once per finished task, so
/// percentages leave it in non-decreasing order.
#[derive(Debug)]
pub struct ProgressReporter {
    run_id: Uuid,
    total: usize,
    completed: usize,
    delimiter: String,
}

impl ProgressReporter {
    pub fn new(run_id: Uuid, total: usize, delimiter: impl Into<String>) -> Self {
        Self {
            run_id,
            total,
            completed: 0,
            delimiter: delimiter.into(),
        }
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn percentage(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        let done = self.completed().min(self.total);
        (done * 100 / self.total) as u8
    }

    fn finish_one(&mut self) -> u8 {
        self.completed += 1;
        self.percentage()
    }

    pub fn render(&mut self, event: LifecycleEvent) -> ProgressEvent {
        let run_id = self.run_id;
        match event {
            LifecycleEvent::Started { total } => ProgressEvent::new(
                run_id,
                ProgressStatus::Starting,
                format!("Enhancing {total} products"),
            )
            .with_progress(0),
            LifecycleEvent::TaskStarted { row, sku } => ProgressEvent::new(
                run_id,
                ProgressStatus::Processing,
                format!("Downloading image for {}", label(row, &sku)),
            )
            .for_row(row, &sku)
            .with_progress(self.percentage()),
            LifecycleEvent::Generating { row, sku, attempt } => {
                let mut event = ProgressEvent::new(
                    run_id,
                    ProgressStatus::Generating,
                    format!("Writing listing copy for {}", label(row, &sku)),
                )
                .for_row(row, &sku)
                .with_progress(self.percentage());
                event.attempt = Some(attempt);
                event
            }
            LifecycleEvent::Retrying {
                row,
                sku,
                attempt,
                delay,
                error,
            } => {
                let mut event = ProgressEvent::new(
                    run_id,
                    ProgressStatus::Warning,
                    format!(
                        "Attempt {attempt} failed for {} ({error}), retrying in {}s",
                        label(row, &sku),
                        delay.as_secs()
                    ),
                )
                .for_row(row, &sku)
                .with_progress(self.percentage());
                event.attempt = Some(attempt);
                event
            }
            LifecycleEvent::Succeeded { row, sku, category } => {
                let progress = self.finish_one();
                let suffix = category
                    .as_deref()
                    .filter(|value| !value.is_empty())
                    .map(|value| format!(" → {}", self.short_name(value)))
                    .unwrap_or_default();
                let mut event = ProgressEvent::new(
                    run_id,
                    ProgressStatus::Success,
                    format!("Optimised {}{suffix}", label(row, &sku)),
                )
                .for_row(row, &sku)
                .with_progress(progress);
                event.category = category.filter(|value| !value.is_empty());
                event
            }
            LifecycleEvent::Failed { row, sku, reason } => {
                let progress = self.finish_one();
                ProgressEvent::new(
                    run_id,
                    ProgressStatus::Error,
                    format!("Skipped {}: {reason}", label(row, &sku)),
                )
                .for_row(row, &sku)
                .with_progress(progress)
            }
            LifecycleEvent::BatchComplete { report } => {
                let message = report.summary();
                let mut event = ProgressEvent::new(run_id, ProgressStatus::Complete, message)
                    .with_progress(100);
                event.products_count = Some(report.total_processed);
                event.report = Some(report);
                event
            }
        }
    }

    fn short_name<'a>(&self, path: &'a str) -> &'a str {
        path.rsplit(self.delimiter.as_str()).next().unwrap_or(path)
    }

    /// Single consumer task: renders lifecycle events in arrival order and
    /// forwards them. Keeps draining if the output side has gone away.
    pub fn spawn(
        mut self,
        mut lifecycle: mpsc::UnboundedReceiver<LifecycleEvent>,
        output: mpsc::Sender<ProgressEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut listening = true;
            while let Some(event) = lifecycle.recv().await {
                if !listening {
                    continue;
                }
                let rendered = self.render(event);
                if output.send(rendered).await.is_err() {
                    debug!(target = "forge.enrich", run_id = %self.run_id, "progress_consumer_gone");
                    listening = false;
                }
            }
        })
    }
}

fn label(row: usize, sku: &str) -> String {
    if sku.is_empty() {
        format!("row {}", row + 1)
    } else {
        format!("SKU {sku}")
    }
}
