use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Phases of one chat turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LoopState {
    AwaitingModel,
    ToolsRequested { count: usize },
    ExecutingTools,
    Done { reason: StopReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model replied without tool calls.
    Answered,
    /// The iteration cap was hit while the model still requested tools.
    IterationCap,
}

/// One executed tool call, as reported back to the chat client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: usize,
    pub tool: String,
    pub input: Value,
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnReport {
    /// Model text plus the step ledger and any cap notice.
    pub message: String,
    pub steps: Vec<StepRecord>,
    pub iterations: u32,
    pub stop: StopReason,
}
