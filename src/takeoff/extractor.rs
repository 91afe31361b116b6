//! Chunked takeoff extraction
//!
//! An LLM cannot reliably return a whole drawing set's element table in one
//! response, so extraction iterates page by page over the stored per-page
//! text. Pages run strictly sequentially with a pacing delay between calls;
//! this keeps rate limits happy and aggregate cost predictable.

use crate::config::{RetryConfig, TakeoffConfig};
use crate::error::{EngineError, Result};
use crate::llm::metrics::{MetricsSink, UsageRecord};
use crate::llm::provider::{GenerationOptions, LlmProvider};
use crate::llm::retry::with_retries;
use crate::llm::user_message;
use crate::rag::document_store::DocumentStore;
use crate::rag::types::{DocumentStatus, TakeoffElement, TakeoffExtraction, Trade};
use crate::takeoff::prompts::build_page_prompt;
use crate::takeoff::schema::{completeness_score, sanitize_specs, validate_specs};
use crate::takeoff::table::{
    is_valid_row, parse_table, row_page_number, row_to_specifications,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of a takeoff run
#[derive(Debug, Clone)]
pub struct TakeoffRunResult {
    pub success: bool,
    pub extraction_id: Option<Uuid>,
    pub element_count: usize,
    pub pages_processed: usize,
    pub total_cost_usd: f64,
    pub processing_time_ms: i64,
    pub error: Option<String>,
}

/// Page-by-page LLM takeoff extraction service
pub struct ChunkedTakeoffExtractor {
    document_store: Arc<DocumentStore>,
    provider: Arc<dyn LlmProvider>,
    metrics: Arc<dyn MetricsSink>,
    config: TakeoffConfig,
    retry: RetryConfig,
}

impl ChunkedTakeoffExtractor {
    pub fn new(
        document_store: Arc<DocumentStore>,
        provider: Arc<dyn LlmProvider>,
        metrics: Arc<dyn MetricsSink>,
        config: TakeoffConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            document_store,
            provider,
            metrics,
            config,
            retry,
        }
    }

    /// Extract elements from a document's stored pages
    pub async fn extract_elements(
        &self,
        document_id: Uuid,
        trade: Trade,
        pages: Option<Vec<u32>>,
    ) -> TakeoffRunResult {
        self.extract_elements_with_cancel(document_id, trade, pages, CancellationToken::new())
            .await
    }

    /// Extract elements with an external cancel signal
    pub async fn extract_elements_with_cancel(
        &self,
        document_id: Uuid,
        trade: Trade,
        pages: Option<Vec<u32>>,
        cancel: CancellationToken,
    ) -> TakeoffRunResult {
        let started = Instant::now();

        // Create the extraction record up front so failures are auditable
        let extraction = TakeoffExtraction {
            id: Uuid::new_v4(),
            document_id,
            trade,
            extraction_method: "ai_assisted".to_string(),
            status: DocumentStatus::Processing,
            processing_error: String::new(),
            processing_time_ms: 0,
            extraction_cost_usd: 0.0,
            created_at: chrono::Utc::now(),
        };
        if let Err(e) = self.document_store.create_takeoff_extraction(&extraction).await {
            return TakeoffRunResult {
                success: false,
                extraction_id: None,
                element_count: 0,
                pages_processed: 0,
                total_cost_usd: 0.0,
                processing_time_ms: started.elapsed().as_millis() as i64,
                error: Some(e.to_string()),
            };
        }

        match self
            .run_extraction(document_id, extraction.id, trade, pages, cancel)
            .await
        {
            Ok(run) => {
                let processing_time_ms = started.elapsed().as_millis() as i64;
                if let Err(e) = self
                    .document_store
                    .complete_takeoff_extraction(extraction.id, processing_time_ms, run.total_cost)
                    .await
                {
                    warn!("Failed to finalize extraction record: {}", e);
                }

                TakeoffRunResult {
                    success: true,
                    extraction_id: Some(extraction.id),
                    element_count: run.element_count,
                    pages_processed: run.pages_processed,
                    total_cost_usd: run.total_cost,
                    processing_time_ms,
                    error: None,
                }
            }
            Err(e) => {
                let message = e.to_string();
                self.document_store
                    .fail_takeoff_extraction(extraction.id, &message)
                    .await
                    .ok();

                TakeoffRunResult {
                    success: false,
                    extraction_id: Some(extraction.id),
                    element_count: 0,
                    pages_processed: 0,
                    total_cost_usd: 0.0,
                    processing_time_ms: started.elapsed().as_millis() as i64,
                    error: Some(message),
                }
            }
        }
    }

    async fn run_extraction(
        &self,
        document_id: Uuid,
        extraction_id: Uuid,
        trade: Trade,
        pages: Option<Vec<u32>>,
        cancel: CancellationToken,
    ) -> Result<RunTotals> {
        let mut document_pages = self.document_store.get_pages(document_id).await?;
        if let Some(wanted) = &pages {
            document_pages.retain(|p| wanted.contains(&p.page_number));
        }
        document_pages.truncate(self.config.max_pages);

        if document_pages.is_empty() {
            return Err(EngineError::NotFound(format!(
                "no pages stored for document {}",
                document_id
            )));
        }

        let total_pages = document_pages.len();
        info!(
            "Starting page-by-page takeoff extraction for document {} ({} pages)",
            document_id, total_pages
        );

        let mut elements: Vec<TakeoffElement> = Vec::new();
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut total_cost = 0.0f64;

        for (index, page) in document_pages.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            info!(
                "Processing page {} ({}/{}), {} elements so far",
                page.page_number,
                index + 1,
                total_pages,
                elements.len()
            );

            let prompt =
                build_page_prompt(&page.page_text, page.page_number, total_pages, trade);
            let options = GenerationOptions {
                max_tokens: Some(self.config.max_output_tokens),
                temperature: Some(0.1),
            };

            let generation = with_retries(&self.retry, "takeoff_page", || {
                let provider = self.provider.clone();
                let messages = vec![user_message(prompt.clone())];
                let options = options.clone();
                async move { provider.generate(&messages, &options).await }
            })
            .await?;

            total_cost += generation.cost_usd;
            self.metrics.log_usage(UsageRecord {
                provider: self.provider.name().to_string(),
                model: generation.model.clone(),
                tokens_input: generation.tokens_input,
                tokens_output: generation.tokens_output,
                image_count: 0,
                cost_usd: generation.cost_usd,
                latency_ms: generation.latency_ms,
                task: "takeoff_extraction".to_string(),
                page: Some(page.page_number),
            });

            let parsed = parse_table(&generation.text);
            if parsed.no_elements {
                info!("No elements found on page {}", page.page_number);
            } else {
                let mut new_on_page = 0usize;
                for row in &parsed.rows {
                    if !is_valid_row(row) {
                        debug!("Rejected junk row: {:?}", row.value("ID"));
                        continue;
                    }

                    let element_id = row.value("ID").unwrap_or_default().to_string();
                    // Duplicates across pages keep their first occurrence
                    if !seen_ids.insert(element_id.clone()) {
                        debug!("Skipping duplicate element: {}", element_id);
                        continue;
                    }

                    if let Some(element) =
                        self.build_element(row, extraction_id, document_id, page.page_number)
                    {
                        elements.push(element);
                        new_on_page += 1;
                    }
                }
                info!(
                    "Page {} contributed {} new elements",
                    page.page_number, new_on_page
                );
            }

            // Pacing delay between pages, skipped after the last one
            if index + 1 < total_pages && self.config.page_delay_secs > 0 {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                    _ = tokio::time::sleep(std::time::Duration::from_secs(
                        self.config.page_delay_secs,
                    )) => {}
                }
            }
        }

        info!(
            "Extraction complete: {} elements across {} pages (${:.4})",
            elements.len(),
            total_pages,
            total_cost
        );

        self.document_store
            .replace_takeoff_elements(extraction_id, &elements)
            .await?;

        Ok(RunTotals {
            element_count: elements.len(),
            pages_processed: total_pages,
            total_cost,
        })
    }

    /// Normalize a table row into a validated element, or drop it
    fn build_element(
        &self,
        row: &crate::takeoff::table::TakeoffRow,
        extraction_id: Uuid,
        document_id: Uuid,
        fallback_page: u32,
    ) -> Option<TakeoffElement> {
        let element_id = row.value("ID")?.to_string();
        let element_type = row.value("TYPE")?.to_string();
        let (specifications, mut extraction_notes) = row_to_specifications(row);

        let (valid, errors) = validate_specs(&element_type, &specifications);
        let specifications = if valid {
            specifications
        } else {
            // Sanitize and keep the row when the cleaned output conforms;
            // otherwise the row is dropped
            let sanitized = sanitize_specs(&element_type, &specifications);
            let (sanitized_ok, _) = validate_specs(&element_type, &sanitized);
            if !sanitized_ok {
                warn!(
                    "Dropping element {} ({}): {:?}",
                    element_id, element_type, errors
                );
                return None;
            }
            if let Some(warnings) = extraction_notes
                .get_mut("validation_warnings")
                .and_then(|v| v.as_array_mut())
            {
                for error in &errors {
                    warnings.push(json!(error));
                }
            }
            sanitized
        };

        let completeness = completeness_score(&element_type, &specifications);
        let page_number = if row.value("PAGE").is_some() {
            row_page_number(row)
        } else {
            fallback_page
        };

        Some(TakeoffElement {
            id: Uuid::new_v4(),
            extraction_id,
            document_id,
            element_id,
            element_type,
            page_number,
            confidence_score: 1.0,
            specifications,
            extraction_notes,
            completeness,
        })
    }
}

struct RunTotals {
    element_count: usize,
    pages_processed: usize,
    total_cost: f64,
}
