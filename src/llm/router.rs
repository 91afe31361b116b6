//! Model routing and credential resolution
//!
//! The router picks a (provider, model) pair for a request; the credential
//! resolver turns that decision into an API key. Both are resolved once per
//! request and read-only afterwards.

use crate::llm::provider::ProviderType;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Optimization strategy for model selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationStrategy {
    Cost,
    Balanced,
    Quality,
}

impl Default for OptimizationStrategy {
    fn default() -> Self {
        Self::Balanced
    }
}

/// Context passed through to routing; hints are forwarded unchanged
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub entity_type: String,
    pub session_id: Option<String>,
    pub organization_id: Option<String>,
    pub max_tokens: Option<u32>,
    /// Caller's per-call budget; models priced above it are not eligible
    pub max_cost_usd: Option<f64>,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// A routing decision
#[derive(Debug, Clone, PartialEq)]
pub struct RouteDecision {
    pub provider: ProviderType,
    pub model: String,
}

/// Routes requests to an appropriate model
#[async_trait]
pub trait ModelRouter: Send + Sync {
    /// Pick a provider/model for the request, or None when nothing fits
    async fn route_request(
        &self,
        organization: Option<&str>,
        complexity_score: f64,
        content_type: &str,
        context: &RequestContext,
        strategy: OptimizationStrategy,
    ) -> Option<RouteDecision>;
}

/// An entry in the static routing table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub provider: ProviderType,
    pub model: String,
    /// Whether the model accepts image input
    #[serde(default)]
    pub vision: bool,
    /// Relative quality rank; higher is better
    #[serde(default)]
    pub quality_rank: u8,
    /// Relative cost rank; higher is more expensive
    #[serde(default)]
    pub cost_rank: u8,
    /// Estimated cost of one page-sized call in USD; 0 means unpriced
    #[serde(default)]
    pub cost_per_page_usd: f64,
}

/// Static routing table over configured models
///
/// Filters by content type ("vision" requires a vision-capable model) and by
/// the caller's budget (priced entries above `max_cost_usd` are excluded),
/// then orders by strategy: Cost prefers the cheapest entry, Quality the
/// highest quality rank, Balanced the best quality-per-cost.
pub struct StaticModelRouter {
    entries: Vec<ModelEntry>,
}

impl StaticModelRouter {
    pub fn new(entries: Vec<ModelEntry>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl ModelRouter for StaticModelRouter {
    async fn route_request(
        &self,
        _organization: Option<&str>,
        _complexity_score: f64,
        content_type: &str,
        context: &RequestContext,
        strategy: OptimizationStrategy,
    ) -> Option<RouteDecision> {
        let mut candidates: Vec<&ModelEntry> = self
            .entries
            .iter()
            .filter(|e| content_type != "vision" || e.vision)
            .filter(|e| match context.max_cost_usd {
                Some(budget) => e.cost_per_page_usd == 0.0 || e.cost_per_page_usd <= budget,
                None => true,
            })
            .collect();

        if candidates.is_empty() {
            return None;
        }

        match strategy {
            OptimizationStrategy::Cost => {
                candidates.sort_by_key(|e| (e.cost_rank, std::cmp::Reverse(e.quality_rank)));
            }
            OptimizationStrategy::Quality => {
                candidates.sort_by_key(|e| (std::cmp::Reverse(e.quality_rank), e.cost_rank));
            }
            OptimizationStrategy::Balanced => {
                candidates.sort_by(|a, b| {
                    let score_a = a.quality_rank as i32 - a.cost_rank as i32;
                    let score_b = b.quality_rank as i32 - b.cost_rank as i32;
                    score_b
                        .cmp(&score_a)
                        .then(b.quality_rank.cmp(&a.quality_rank))
                });
            }
        }

        let chosen = candidates[0];
        Some(RouteDecision {
            provider: chosen.provider,
            model: chosen.model.clone(),
        })
    }
}

/// Resolves API keys per provider and organization
pub trait CredentialResolver: Send + Sync {
    fn resolve(&self, provider: ProviderType, organization: Option<&str>) -> Option<String>;
}

/// Resolves credentials from process environment variables
pub struct EnvCredentialResolver;

impl CredentialResolver for EnvCredentialResolver {
    fn resolve(&self, provider: ProviderType, _organization: Option<&str>) -> Option<String> {
        let var = match provider {
            ProviderType::Anthropic => "ANTHROPIC_API_KEY",
            ProviderType::OpenAI => "OPENAI_API_KEY",
            ProviderType::OpenAICompatible => "LLM_API_KEY",
        };
        std::env::var(var).ok()
    }
}

/// Fixed credential table, mainly for tests
pub struct StaticCredentialResolver {
    keys: HashMap<ProviderType, String>,
}

impl StaticCredentialResolver {
    pub fn new(keys: HashMap<ProviderType, String>) -> Self {
        Self { keys }
    }
}

impl CredentialResolver for StaticCredentialResolver {
    fn resolve(&self, provider: ProviderType, _organization: Option<&str>) -> Option<String> {
        self.keys.get(&provider).cloned()
    }
}
