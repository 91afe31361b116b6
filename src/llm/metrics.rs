//! Usage metrics for LLM calls

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::info;

/// One logged LLM usage record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub provider: String,
    pub model: String,
    pub tokens_input: u32,
    pub tokens_output: u32,
    pub image_count: u32,
    pub cost_usd: f64,
    pub latency_ms: u64,
    pub task: String,
    pub page: Option<u32>,
}

/// Sink for LLM usage records
pub trait MetricsSink: Send + Sync {
    fn log_usage(&self, record: UsageRecord);
}

/// Default sink that emits structured log events
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn log_usage(&self, record: UsageRecord) {
        info!(
            provider = %record.provider,
            model = %record.model,
            tokens_input = record.tokens_input,
            tokens_output = record.tokens_output,
            cost_usd = record.cost_usd,
            latency_ms = record.latency_ms,
            task = %record.task,
            "llm usage"
        );
    }
}

/// In-memory sink that collects records, mainly for tests
#[derive(Default)]
pub struct MemoryMetricsSink {
    records: Mutex<Vec<UsageRecord>>,
}

impl MemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<UsageRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn total_cost(&self) -> f64 {
        self.records.lock().unwrap().iter().map(|r| r.cost_usd).sum()
    }
}

impl MetricsSink for MemoryMetricsSink {
    fn log_usage(&self, record: UsageRecord) {
        self.records.lock().unwrap().push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_collects() {
        let sink = MemoryMetricsSink::new();
        sink.log_usage(UsageRecord {
            provider: "anthropic".to_string(),
            model: "claude".to_string(),
            tokens_input: 100,
            tokens_output: 50,
            image_count: 1,
            cost_usd: 0.01,
            latency_ms: 900,
            task: "unified_extraction".to_string(),
            page: Some(1),
        });
        sink.log_usage(UsageRecord {
            provider: "anthropic".to_string(),
            model: "claude".to_string(),
            tokens_input: 80,
            tokens_output: 40,
            image_count: 1,
            cost_usd: 0.02,
            latency_ms: 700,
            task: "unified_extraction".to_string(),
            page: Some(2),
        });

        assert_eq!(sink.records().len(), 2);
        assert!((sink.total_cost() - 0.03).abs() < 1e-9);
    }
}
