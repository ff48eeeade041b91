use crate::config::{ConversionConfig, PipelineConfig, checked_multiplier};
use crate::convert::{ExpandOptions, OutputRow, SkuSequence, read_output_rows, write_output_rows};
use crate::enrich::{
    EnrichmentReport, Enricher, HttpImageFetcher, ImageFetcher, ProgressEvent, RetryPolicy,
};
use crate::llm::{GenerativeModel, LlmClient, LlmConfig};
use crate::models::{ConvertRequest, StageReport};
use crate::taxonomy::{CategoryCatalog, CategorySelector};
use serde_json::Value;
use std::{future::Future, sync::Arc, time::Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct Pipeline {
    pub config: Arc<PipelineConfig>,
    llm: Arc<dyn GenerativeModel>,
    llm_ready: bool,
    fetcher: Arc<dyn ImageFetcher>,
    selector: Option<Arc<CategorySelector>>,
}

/// Result of a conversion run.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub products_count: usize,
    pub rows: Vec<OutputRow>,
    pub csv: String,
    pub stages: Vec<StageReport>,
}

#[derive(Debug, Clone)]
pub struct Enhancement {
    pub report: EnrichmentReport,
    pub csv: String,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        llm: Arc<dyn GenerativeModel>,
        llm_ready: bool,
        fetcher: Arc<dyn ImageFetcher>,
        selector: Option<Arc<CategorySelector>>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            llm,
            llm_ready,
            fetcher,
            selector,
        }
    }

    /// Wires the HTTP model client, the image fetcher and, when the catalog
    /// loads, the category selector. A missing catalog disables
    /// categorisation instead of failing startup.
    pub fn from_env(config: PipelineConfig) -> Self {
        let client = LlmClient::new(LlmConfig::from_env());
        let llm_ready = client.is_configured();
        let llm: Arc<dyn GenerativeModel> = Arc::new(client);
        let fetcher = Arc::new(HttpImageFetcher::new(
            config.enrichment.image_timeout,
            config.enrichment.image_width_hint,
        ));
        let taxonomy = &config.taxonomy;
        let selector = match CategoryCatalog::load(&taxonomy.catalog_path, &taxonomy.delimiter) {
            Ok(catalog) => Some(Arc::new(CategorySelector::new(
                Arc::new(catalog),
                Arc::clone(&llm),
                taxonomy.candidate_limit,
            ))),
            Err(err) => {
                warn!(target = "forge.taxonomy", error = %err, "category_selector_disabled");
                None
            }
        };
        if !llm_ready {
            warn!(target = "forge.llm", "generative_model_not_configured");
        }
        Self::new(config, llm, llm_ready, fetcher, selector)
    }

    pub fn model_ready(&self) -> bool {
        self.llm_ready
    }

    pub fn has_selector(&self) -> bool {
        self.selector.is_some()
    }

    /// Source export → listing rows, one timed stage per step.
    pub async fn convert(&self, request: &ConvertRequest) -> Result<Conversion, PipelineError> {
        let conversion = self.conversion_settings(request)?;
        let options = ExpandOptions::from_config(&conversion);
        let mut stages = Vec::new();

        let source = self
            .capture_stage("parse_source", &mut stages, async {
                stages::parse_source(&request.csv)
            })
            .await?;

        let grouped = self
            .capture_stage("group_products", &mut stages, async move {
                stages::group_products(source)
            })
            .await?;

        let mut skus = SkuSequence::new(conversion.sku_width);
        let rows = self
            .capture_stage("expand_rows", &mut stages, async {
                stages::expand_rows(&grouped, &options, &mut skus)
            })
            .await?;

        let csv = write_output_rows(&rows)
            .map_err(|err| PipelineError::internal("write_rows", err.to_string()))?;
        info!(
            target = "forge.convert",
            products = grouped.len(),
            rows = rows.len(),
            "conversion_finished"
        );
        Ok(Conversion {
            products_count: grouped.len(),
            rows,
            csv,
            stages,
        })
    }

    /// Validates an enhancement request before any streaming starts.
    pub fn prepare_enhance(&self, csv: &str) -> Result<Vec<OutputRow>, PipelineError> {
        if !self.llm_ready {
            return Err(PipelineError::invalid_input(
                "enhance",
                "generative model is not configured",
            ));
        }
        read_output_rows(csv).map_err(|err| PipelineError::invalid_input("read_rows", err.to_string()))
    }

    /// Enriches every eligible row, then sends the `done` event with the
    /// rewritten document.
    pub async fn enhance(
        &self,
        mut rows: Vec<OutputRow>,
        run_id: Uuid,
        events: mpsc::Sender<ProgressEvent>,
    ) -> Result<Enhancement, PipelineError> {
        let started = Instant::now();
        let settings = &self.config.enrichment;
        let enricher = Enricher::new(
            Arc::clone(&self.llm),
            Arc::clone(&self.fetcher),
            self.selector.clone(),
            settings.concurrency,
            RetryPolicy::new(settings.max_retries, settings.backoff_unit),
        );
        let report = enricher.run(&mut rows, run_id, events.clone()).await;
        crate::metrics::enrichment_finished(
            report.total_processed,
            report.failures.len(),
            started.elapsed().as_millis(),
        );

        let csv = match write_output_rows(&rows) {
            Ok(csv) => csv,
            Err(err) => {
                let error = PipelineError::internal("write_rows", err.to_string());
                let _ = events.send(ProgressEvent::error(run_id, error.to_string())).await;
                return Err(error);
            }
        };
        let _ = events
            .send(ProgressEvent::done(run_id, report.total_processed, csv.clone()))
            .await;
        Ok(Enhancement { report, csv })
    }

    fn conversion_settings(&self, request: &ConvertRequest) -> Result<ConversionConfig, PipelineError> {
        let mut conversion = self.config.conversion.clone();
        if let Some(multiplier) = request.price_multiplier {
            conversion.price_multiplier = checked_multiplier(multiplier).map_err(|_| {
                PipelineError::invalid_input(
                    "convert",
                    format!("price_multiplier must be a positive number, got {multiplier}"),
                )
            })?;
        }
        if let Some(category) = &request.category {
            conversion.default_category = category.trim().to_string();
        }
        if let Some(product_type) = request.product_type.as_deref().map(str::trim)
            && !product_type.is_empty()
        {
            conversion.default_product_type = product_type.to_string();
        }
        Ok(conversion)
    }

    async fn capture_stage<T, Fut>(
        &self,
        name: &'static str,
        stages: &mut Vec<StageReport>,
        fut: Fut,
    ) -> Result<T, PipelineError>
    where
        Fut: Future<Output = Result<StageOutcome<T>, PipelineError>>,
    {
        let started = Instant::now();
        let outcome = fut.await?;
        let elapsed_ms = started.elapsed().as_millis();
        crate::metrics::stage_elapsed(name, elapsed_ms);
        stages.push(StageReport::new(name, elapsed_ms, outcome.output));
        Ok(outcome.value)
    }
}

pub mod stages {
    use super::{PipelineError, StageOutcome};
    use crate::convert::models::SourceRow;
    use crate::convert::{
        ExpandOptions, GroupedProducts, OutputRow, SkuSequence, expand_all, group_rows,
        read_source_rows,
    };
    use serde_json::json;

    pub fn parse_source(csv: &str) -> Result<StageOutcome<Vec<SourceRow>>, PipelineError> {
        let rows = read_source_rows(csv)
            .map_err(|err| PipelineError::invalid_input("parse_source", err.to_string()))?;
        let output = json!({ "rows": rows.len() });
        Ok(StageOutcome::new(rows, output))
    }

    pub fn group_products(
        rows: Vec<SourceRow>,
    ) -> Result<StageOutcome<GroupedProducts>, PipelineError> {
        let grouped = group_rows(rows);
        if grouped.is_empty() {
            tracing::warn!(target = "forge.convert", "no_products_found");
        }
        let output = json!({
            "products": grouped.len(),
            "variants": grouped.variant_count(),
        });
        Ok(StageOutcome::new(grouped, output))
    }

    pub fn expand_rows(
        grouped: &GroupedProducts,
        options: &ExpandOptions<'_>,
        skus: &mut SkuSequence,
    ) -> Result<StageOutcome<Vec<OutputRow>>, PipelineError> {
        let rows = expand_all(grouped, options, skus);
        let output = json!({
            "rows": rows.len(),
            "skus_issued": skus.issued(),
            "price_multiplier": options.price_multiplier,
        });
        Ok(StageOutcome::new(rows, output))
    }
}

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct PipelineError {
    stage: &'static str,
    message: String,
    kind: PipelineErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    InvalidInput,
    Internal,
}

impl PipelineError {
    pub fn invalid_input(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: PipelineErrorKind::InvalidInput,
        }
    }

    pub fn internal(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: PipelineErrorKind::Internal,
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> PipelineErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

#[derive(Debug)]
pub struct StageOutcome<T> {
    pub value: T,
    pub output: Value,
}

impl<T> StageOutcome<T> {
    fn new(value: T, output: Value) -> Self {
        Self { value, output }
    }
}
