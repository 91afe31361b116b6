//! Job progress reporting
//!
//! Push interface for live execution updates. Delivery is at-most-once best
//! effort; sinks are passed explicitly to the components that report, never
//! looked up from process-global state.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Status of a reported execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// One progress update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionUpdate {
    pub execution_id: String,
    pub status: ExecutionStatus,
    /// Percentage in [0, 100]
    pub progress: u8,
    pub error: Option<String>,
}

/// A tool-execution event grouped under an execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionUpdate {
    pub execution_id: String,
    pub tool_name: String,
    pub payload: serde_json::Value,
}

/// Compute a clamped progress percentage from step counts
pub fn progress_percent(completed_steps: u64, total_steps: u64) -> u8 {
    if total_steps == 0 {
        return 0;
    }
    ((completed_steps * 100) / total_steps).min(100) as u8
}

/// Push interface for execution progress
pub trait ProgressSink: Send + Sync {
    fn send_execution_update(&self, update: ExecutionUpdate);

    fn send_tool_execution_update(&self, update: ToolExecutionUpdate);
}

/// Sink that drops everything (default)
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn send_execution_update(&self, update: ExecutionUpdate) {
        debug!(
            "execution {} -> {:?} ({}%)",
            update.execution_id, update.status, update.progress
        );
    }

    fn send_tool_execution_update(&self, _update: ToolExecutionUpdate) {}
}

/// Sink that forwards updates over a channel; receivers may lag or drop
pub struct ChannelProgressSink {
    sender: tokio::sync::mpsc::UnboundedSender<ExecutionUpdate>,
}

impl ChannelProgressSink {
    pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<ExecutionUpdate>) {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ProgressSink for ChannelProgressSink {
    fn send_execution_update(&self, update: ExecutionUpdate) {
        // Best effort: a closed receiver is not an error
        self.sender.send(update).ok();
    }

    fn send_tool_execution_update(&self, _update: ToolExecutionUpdate) {}
}
