//! Unified extraction service
//!
//! Combines multiple extraction tasks into a single vision-LLM call per page,
//! eliminating duplicate model calls across layout, table, entity, and visual
//! element extraction. Pages run concurrently; results merge in page order so
//! the output is identical regardless of completion order.

use crate::config::{RetryConfig, VisionConfig};
use crate::error::{EngineError, LlmError, Result};
use crate::extraction::prompts::{ExtractionTask, MultiTaskPrompts};
use crate::extraction::{
    normalize_element_type, DrawingMetadata, ElementGroup, Entity, ExtractedTable, LayoutBlock,
    ScheduleValidation, VisualElements,
};
use crate::llm::metrics::{MetricsSink, UsageRecord};
use crate::llm::provider::{GenerationOptions, LlmProvider, ProviderType};
use crate::llm::retry::with_retries;
use crate::llm::router::{
    CredentialResolver, ModelRouter, OptimizationStrategy, RequestContext, RouteDecision,
};
use crate::llm::Message;
use crate::pdf::raster::{PageImage, Rasterizer};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Quality priority for model selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityPriority {
    Cost,
    Balanced,
    Quality,
}

impl Default for QualityPriority {
    fn default() -> Self {
        Self::Balanced
    }
}

impl From<QualityPriority> for OptimizationStrategy {
    fn from(priority: QualityPriority) -> Self {
        match priority {
            QualityPriority::Cost => OptimizationStrategy::Cost,
            QualityPriority::Balanced => OptimizationStrategy::Balanced,
            QualityPriority::Quality => OptimizationStrategy::Quality,
        }
    }
}

/// Request for unified extraction
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub file_path: String,
    pub tasks: Vec<ExtractionTask>,
    /// Organization token for provider-key selection
    pub organization: Option<String>,
    /// 1-indexed pages to process (None = all)
    pub page_range: Option<Vec<u32>>,
    pub max_pages: Option<usize>,
    pub quality_priority: QualityPriority,
    /// Per-call budget; the router only selects models priced within it
    pub max_cost_usd: f64,
    /// Specialized prompt injected ahead of the task sections
    pub specialized_prompt: Option<String>,
}

impl ExtractionRequest {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            tasks: vec![ExtractionTask::All],
            organization: None,
            page_range: None,
            max_pages: None,
            quality_priority: QualityPriority::Balanced,
            max_cost_usd: 1.0,
            specialized_prompt: None,
        }
    }
}

/// Response from unified extraction
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResponse {
    pub text: String,
    pub layout_blocks: Vec<LayoutBlock>,
    pub tables: Vec<ExtractedTable>,
    pub entities: Vec<Entity>,
    pub summary: String,
    pub visual_elements: Option<VisualElements>,
    pub drawing_metadata: Option<DrawingMetadata>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub cost_usd: f64,
    pub processing_time_ms: u64,
    pub model_used: String,
    pub provider_used: String,
    pub success: bool,
    pub error: Option<String>,
    pub warnings: Vec<String>,
}

impl ExtractionResponse {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Raw per-page results as returned by the model; missing keys mean empty
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageExtraction {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub layout: Vec<LayoutBlock>,
    #[serde(default)]
    pub tables: Vec<RawTable>,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub visual_elements: Option<RawVisualElements>,
    #[serde(default)]
    pub drawing_metadata: Option<DrawingMetadata>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Table as emitted by the model, before typing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTable {
    #[serde(default)]
    pub table_type: String,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub bounding_box: Option<crate::extraction::PixelBox>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub contains_reference_quantities: bool,
    #[serde(default)]
    pub element_types_to_count: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawVisualElements {
    #[serde(default)]
    pub element_groups: Vec<ElementGroup>,
}

/// Builds a provider client from a routing decision and resolved key
pub trait ProviderFactory: Send + Sync {
    fn create(&self, decision: &RouteDecision, api_key: String) -> Arc<dyn LlmProvider>;
}

/// Default factory constructing the built-in providers
pub struct DefaultProviderFactory {
    pub timeout_secs: u64,
}

impl ProviderFactory for DefaultProviderFactory {
    fn create(&self, decision: &RouteDecision, api_key: String) -> Arc<dyn LlmProvider> {
        let config = crate::llm::provider::ProviderConfig {
            provider: decision.provider,
            name: decision.provider.to_string(),
            priority: 10,
            api_key: Some(api_key),
            base_url: None,
            text_model: decision.model.clone(),
            embedding_model: None,
            supports_vision: true,
            max_tokens: 4000,
            temperature: 0.1,
            timeout: self.timeout_secs,
            input_cost_per_1k: 0.0,
            output_cost_per_1k: 0.0,
            options: serde_json::Value::Null,
        };

        match decision.provider {
            ProviderType::Anthropic => crate::llm::providers::AnthropicProvider::create(config),
            ProviderType::OpenAI | ProviderType::OpenAICompatible => {
                crate::llm::providers::OpenAIProvider::create(config)
            }
        }
    }
}

/// Unified extraction service: one vision call per page covering every
/// requested task
pub struct UnifiedExtractor {
    rasterizer: Arc<dyn Rasterizer>,
    router: Arc<dyn ModelRouter>,
    credentials: Arc<dyn CredentialResolver>,
    provider_factory: Arc<dyn ProviderFactory>,
    metrics: Arc<dyn MetricsSink>,
    vision: VisionConfig,
    retry: RetryConfig,
}

impl UnifiedExtractor {
    pub fn new(
        rasterizer: Arc<dyn Rasterizer>,
        router: Arc<dyn ModelRouter>,
        credentials: Arc<dyn CredentialResolver>,
        provider_factory: Arc<dyn ProviderFactory>,
        metrics: Arc<dyn MetricsSink>,
        vision: VisionConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            rasterizer,
            router,
            credentials,
            provider_factory,
            metrics,
            vision,
            retry,
        }
    }

    /// Perform unified extraction on a document
    pub async fn extract(&self, request: ExtractionRequest) -> ExtractionResponse {
        self.extract_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Perform unified extraction with an external cancel signal
    pub async fn extract_with_cancel(
        &self,
        request: ExtractionRequest,
        cancel: CancellationToken,
    ) -> ExtractionResponse {
        // Convert file to images
        let mut images = match self.rasterizer.rasterize(&request.file_path).await {
            Ok(images) => images,
            Err(e) => return ExtractionResponse::failed(e.to_string()),
        };

        // Filter to specific pages if requested
        if let Some(range) = &request.page_range {
            images.retain(|img| range.contains(&img.page_number));
        }

        // Limit number of pages to process
        let max_pages = request.max_pages.unwrap_or(self.vision.max_pages);
        images.truncate(max_pages);

        // An empty document extracts to an empty response at zero cost
        if images.is_empty() {
            return ExtractionResponse {
                success: true,
                ..Default::default()
            };
        }

        // Select a vision model
        let context = RequestContext {
            entity_type: "unified_extraction".to_string(),
            session_id: Some(format!(
                "unified_{}",
                std::path::Path::new(&request.file_path)
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default()
            )),
            organization_id: request.organization.clone(),
            max_tokens: Some(self.vision.max_tokens),
            max_cost_usd: Some(request.max_cost_usd),
            metadata: Default::default(),
        };

        let Some(decision) = self
            .router
            .route_request(
                request.organization.as_deref(),
                0.7,
                "vision",
                &context,
                request.quality_priority.into(),
            )
            .await
        else {
            return ExtractionResponse::failed(LlmError::NoModelAvailable.to_string());
        };

        // Resolve the provider API key
        let Some(api_key) = self
            .credentials
            .resolve(decision.provider, request.organization.as_deref())
        else {
            return ExtractionResponse::failed(
                LlmError::NoCredentials(decision.provider.to_string()).to_string(),
            );
        };

        let provider = self.provider_factory.create(&decision, api_key);

        let mut response = ExtractionResponse {
            success: true,
            model_used: decision.model.clone(),
            provider_used: decision.provider.to_string(),
            ..Default::default()
        };
        response.metadata.insert(
            "file_path".to_string(),
            serde_json::Value::String(request.file_path.clone()),
        );
        response.metadata.insert(
            "page_count".to_string(),
            serde_json::Value::Number(images.len().into()),
        );

        // Build the combined prompt once; it is identical for every page
        let base_prompt = MultiTaskPrompts::build_unified_prompt(&request.tasks);
        let prompt = match &request.specialized_prompt {
            Some(specialized) => MultiTaskPrompts::with_specialized_prompt(&base_prompt, specialized),
            None => base_prompt,
        };

        // Process pages concurrently; page numbers keep the merge deterministic
        let page_futures: Vec<_> = images
            .iter()
            .map(|image| {
                let provider = provider.clone();
                let prompt = prompt.clone();
                let cancel = cancel.clone();
                async move {
                    let outcome = self
                        .extract_page(provider, &prompt, image, cancel)
                        .await;
                    (image.page_number, outcome)
                }
            })
            .collect();

        let mut page_results = join_all(page_futures).await;
        page_results.sort_by_key(|(page_number, _)| *page_number);

        let mut cancelled = false;
        let mut fatal_error: Option<String> = None;

        for (page_number, outcome) in page_results {
            match outcome {
                Ok(page_outcome) => {
                    response.cost_usd += page_outcome.cost_usd;
                    response.processing_time_ms += page_outcome.latency_ms;
                    match page_outcome.parsed {
                        Ok(page) => merge_page_results(&mut response, page, page_number),
                        Err(parse_error) => {
                            // A malformed page never voids the run
                            warn!(
                                "Failed to parse response for page {}: {}",
                                page_number, parse_error
                            );
                            response
                                .warnings
                                .push(format!("Failed to parse response for page {}", page_number));
                        }
                    }
                }
                Err(EngineError::Cancelled) => cancelled = true,
                Err(e) => {
                    fatal_error = Some(e.to_string());
                }
            }
        }

        // Schedule-vs-drawing validation is a computed property of the merge
        let expanded = ExtractionTask::expand(&request.tasks);
        if expanded.contains(&ExtractionTask::Tables)
            && expanded.contains(&ExtractionTask::VisualElements)
        {
            apply_schedule_validation(&mut response);
        }

        if cancelled {
            response.success = false;
            response.error = Some("Cancelled".to_string());
        } else if let Some(error) = fatal_error {
            response.success = false;
            response.error = Some(error);
        }

        info!(
            "Unified extraction finished: success={}, cost=${:.4}, {} warnings",
            response.success,
            response.cost_usd,
            response.warnings.len()
        );

        response
    }

    async fn extract_page(
        &self,
        provider: Arc<dyn LlmProvider>,
        prompt: &str,
        image: &PageImage,
        cancel: CancellationToken,
    ) -> Result<PageOutcome> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let message = Message::user_with_image(
            prompt,
            image.format.mime_type(),
            image.to_base64(),
        );
        let options = GenerationOptions {
            max_tokens: Some(self.vision.max_tokens),
            temperature: Some(0.1),
        };

        let generation = tokio::select! {
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            result = with_retries(&self.retry, "unified_extraction_page", || {
                let provider = provider.clone();
                let messages = vec![message.clone()];
                let options = options.clone();
                async move { provider.generate(&messages, &options).await }
            }) => result?,
        };

        self.metrics.log_usage(UsageRecord {
            provider: provider.name().to_string(),
            model: generation.model.clone(),
            tokens_input: generation.tokens_input,
            tokens_output: generation.tokens_output,
            image_count: 1,
            cost_usd: generation.cost_usd,
            latency_ms: generation.latency_ms,
            task: "unified_extraction".to_string(),
            page: Some(image.page_number),
        });

        debug!(
            "Page {} extracted in {}ms (${:.4})",
            image.page_number, generation.latency_ms, generation.cost_usd
        );

        Ok(PageOutcome {
            cost_usd: generation.cost_usd,
            latency_ms: generation.latency_ms,
            parsed: parse_page_json(&generation.text),
        })
    }
}

struct PageOutcome {
    cost_usd: f64,
    latency_ms: u64,
    parsed: std::result::Result<PageExtraction, String>,
}

/// Parse a page response into structured results, tolerating code fences
pub fn parse_page_json(raw: &str) -> std::result::Result<PageExtraction, String> {
    let trimmed = raw.trim();
    let body = if let Some(stripped) = trimmed.strip_prefix("```json") {
        stripped.trim_end_matches("```").trim()
    } else if let Some(stripped) = trimmed.strip_prefix("```") {
        stripped.trim_end_matches("```").trim()
    } else {
        trimmed
    };

    serde_json::from_str(body).map_err(|e| e.to_string())
}

/// Merge results from a single page into the overall response
pub fn merge_page_results(response: &mut ExtractionResponse, page: PageExtraction, page_num: u32) {
    // Merge text with page separators
    if let Some(text) = page.text {
        if !text.is_empty() {
            if !response.text.is_empty() {
                response.text.push_str(&format!("\n\n--- Page {} ---\n\n", page_num));
            }
            response.text.push_str(&text);
        }
    }

    // Layout blocks adopt the page number
    for mut block in page.layout {
        block.page = page_num;
        response.layout_blocks.push(block);
    }

    // Tables become typed records; header-less or row-less tables are dropped
    for raw in page.tables {
        if raw.headers.is_empty() || raw.rows.is_empty() {
            continue;
        }
        response.tables.push(ExtractedTable {
            table_type: raw.table_type,
            caption: raw.caption,
            headers: raw.headers,
            rows: raw.rows,
            position: raw.position,
            bounding_box: raw.bounding_box,
            notes: raw.notes,
            contains_reference_quantities: raw.contains_reference_quantities,
            element_types_to_count: raw.element_types_to_count,
            page: page_num,
        });
    }

    // Entities adopt the page number
    for mut entity in page.entities {
        entity.page = page_num;
        response.entities.push(entity);
    }

    // Visual element groups accumulate
    if let Some(visual) = page.visual_elements {
        let target = response.visual_elements.get_or_insert_with(Default::default);
        for mut group in visual.element_groups {
            group.page = page_num;
            target.element_groups.push(group);
        }
    }

    // Drawing metadata: first page wins, later pages fill missing fields only
    if let Some(incoming) = page.drawing_metadata {
        match &mut response.drawing_metadata {
            None => response.drawing_metadata = Some(incoming),
            Some(existing) => {
                for (key, value) in incoming {
                    if !existing.contains_key(&key) && !value.is_null() {
                        existing.insert(key, value);
                    }
                }
            }
        }
    }

    // Summaries concatenate, labelled by page
    if let Some(summary) = page.summary {
        if !summary.is_empty() {
            if !response.summary.is_empty() {
                response.summary.push_str(&format!("\n\nPage {}: ", page_num));
            } else {
                response.summary.push_str(&format!("Page {}: ", page_num));
            }
            response.summary.push_str(&summary);
        }
    }
}

/// Compute schedule-vs-drawing validation from merged tables and groups
///
/// For every element type a schedule lists with a quantity, compare the
/// required quantity with the count found in the drawing. This never fails
/// the extraction; it is advisory data for the consumer.
pub fn apply_schedule_validation(response: &mut ExtractionResponse) {
    let Some(visual) = &response.visual_elements else {
        return;
    };

    // Count drawing occurrences per normalized element type
    let mut found: BTreeMap<String, u32> = BTreeMap::new();
    for group in &visual.element_groups {
        *found
            .entry(normalize_element_type(&group.element_type))
            .or_insert(0) += group.count;
    }

    let mut validation: BTreeMap<String, ScheduleValidation> = BTreeMap::new();

    for table in &response.tables {
        if !table.is_schedule() {
            continue;
        }
        let Some(qty_col) = table.column_index(&["QUANTITY", "QTY", "COUNT"]) else {
            continue;
        };
        let type_col = table.column_index(&["TYPE", "DESCRIPTION", "ITEM"]);
        let size_col = table.column_index(&["SIZE"]);

        for row in &table.rows {
            let Some(required) = row
                .get(qty_col)
                .and_then(|q| q.trim().parse::<u32>().ok())
            else {
                continue;
            };

            let mut label = String::new();
            if let Some(col) = type_col {
                if let Some(value) = row.get(col) {
                    label.push_str(value);
                }
            }
            if let Some(col) = size_col {
                if let Some(value) = row.get(col) {
                    if !value.trim().is_empty() {
                        label.push(' ');
                        label.push_str(value);
                    }
                }
            }
            if label.trim().is_empty() {
                continue;
            }

            let key = normalize_element_type(&label);
            let found_count = found.get(&key).copied().unwrap_or(0);
            validation.insert(
                key,
                ScheduleValidation {
                    required_quantity: required,
                    found_in_drawing: found_count,
                    matches: required == found_count,
                },
            );
        }
    }

    if !validation.is_empty() {
        response
            .visual_elements
            .get_or_insert_with(Default::default)
            .validation = validation;
    }
}
