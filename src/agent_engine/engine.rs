use std::sync::Arc;

use serde_json::Value;

use crate::agent_engine::history::{HistoryEntry, SessionHistory};
use crate::agent_engine::loop_control::LoopController;
use crate::agent_engine::state::{LoopState, StepRecord, StopReason, TurnReport};
use crate::agent_engine::tools::{ToolExecutor, ToolResult};
use crate::errors::NavResult;
use crate::llm::provider::LlmProvider;
use crate::llm::types::{CallConfig, ChatMessage, ToolCall, ToolDef};

pub const DEFAULT_MAX_ITERATIONS: u32 = 25;
pub const EMPTY_ANSWER: &str = "I understand. How can I help you?";

pub const SYSTEM_PROMPT: &str = "\
You are an assistant that operates a running application through its registered UI components.

Response format: be concise. Confirm successful actions in one or two sentences; when an action \
fails, explain what went wrong and what you tried.

Rules:
- Always call `get_ui_state` or `find_component` first to discover component ids.
- Then act with the discovered ids. Never invent an id.
- Sliders and other rich controls expose custom actions (`setValue`, `increase`, `decrease`); \
use `execute_custom_action` for them.
- If a click fails, check the component's available actions and try an alternative.
- Use `execute_navigation_path` for fixed multi-step sequences.";

/// Drives one chat turn: model call, tool execution, repeat, bounded by the iteration cap.
pub struct AgentLoop {
    provider: Arc<dyn LlmProvider>,
    call: CallConfig,
    tools: Vec<ToolDef>,
    executor: Arc<dyn ToolExecutor>,
    max_iterations: u32,
    history: Option<SessionHistory>,
    state: LoopState,
}

impl AgentLoop {
    pub fn new(provider: Arc<dyn LlmProvider>, call: CallConfig, executor: Arc<dyn ToolExecutor>) -> Self {
        Self {
            provider,
            call,
            tools: Vec::new(),
            executor,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            history: None,
            state: LoopState::AwaitingModel,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDef>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_history(mut self, history: SessionHistory) -> Self {
        self.history = Some(history);
        self
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    fn transition(&mut self, next: LoopState) {
        tracing::debug!(from = ?self.state, to = ?next, "loop state");
        self.state = next;
    }

    /// Runs the loop over `transcript` (user/assistant messages, oldest first).
    ///
    /// Model errors abort the turn; tool failures and argument errors are fed
    /// back to the model as failure results.
    pub async fn run_turn(&mut self, transcript: Vec<ChatMessage>) -> NavResult<TurnReport> {
        if let Some(last) = transcript.iter().rev().find(|m| m.role == "user") {
            let content = last.content.clone();
            self.record(HistoryEntry::now("user", Some(content), None));
        }

        let mut messages = Vec::with_capacity(transcript.len() + 1);
        messages.push(ChatMessage::system(SYSTEM_PROMPT));
        messages.extend(transcript);

        let mut ctrl = LoopController::new(self.max_iterations);
        let mut answer = String::new();
        let mut steps: Vec<StepRecord> = Vec::new();
        let mut still_requesting = false;

        self.transition(LoopState::AwaitingModel);
        while ctrl.begin_iteration() {
            tracing::info!(
                iteration = ctrl.iterations(),
                messages = messages.len(),
                "calling model"
            );
            let response = self
                .provider
                .chat(messages.clone(), self.tools.clone(), &self.call)
                .await?;

            let text = response.content.trim();
            if !text.is_empty() {
                if !answer.is_empty() {
                    answer.push_str("\n\n");
                }
                answer.push_str(text);
            }

            if response.tool_calls.is_empty() {
                still_requesting = false;
                messages.push(ChatMessage::assistant(response.content.clone()));
                self.record(HistoryEntry::now("assistant", Some(response.content), None));
                break;
            }

            still_requesting = true;
            self.transition(LoopState::ToolsRequested {
                count: response.tool_calls.len(),
            });
            messages.push(ChatMessage::assistant_with_tools(
                response.content.clone(),
                response.tool_calls.clone(),
            ));

            self.transition(LoopState::ExecutingTools);
            for call in &response.tool_calls {
                let (input, result) = self.execute_call(call).await;
                if !result.success {
                    ctrl.record_failure();
                }
                tracing::info!(
                    tool = %call.function.name,
                    success = result.success,
                    message = %result.message,
                    "tool executed"
                );
                self.record(HistoryEntry::now(
                    "tool",
                    Some(result.message.clone()),
                    Some(serde_json::json!({
                        "tool": call.function.name,
                        "input": input,
                        "success": result.success,
                    })),
                ));
                messages.push(ChatMessage::tool(call.id.clone(), result.to_message_content()));
                steps.push(StepRecord {
                    step: steps.len() + 1,
                    tool: call.function.name.clone(),
                    input,
                    success: result.success,
                    message: result.message,
                });
            }
            self.transition(LoopState::AwaitingModel);
        }

        let stop = if still_requesting {
            tracing::warn!(
                iterations = ctrl.iterations(),
                failures = ctrl.failures(),
                "iteration cap reached with tools still requested"
            );
            StopReason::IterationCap
        } else {
            StopReason::Answered
        };
        self.transition(LoopState::Done { reason: stop });

        let message = compose_message(answer, &steps, stop, ctrl.max_iterations());
        Ok(TurnReport {
            message,
            steps,
            iterations: ctrl.iterations(),
            stop,
        })
    }

    async fn execute_call(&self, call: &ToolCall) -> (Value, ToolResult) {
        let raw = call.function.arguments.trim();
        let parsed = if raw.is_empty() {
            Ok(Value::Object(serde_json::Map::new()))
        } else {
            serde_json::from_str::<Value>(raw)
        };
        match parsed {
            Ok(input) => {
                let result = self.executor.execute(&call.function.name, input.clone()).await;
                (input, result)
            }
            Err(e) => {
                tracing::warn!(tool = %call.function.name, error = %e, "unparseable tool arguments");
                let result = ToolResult::fail(format!("Invalid arguments for {}", call.function.name))
                    .with_error(e.to_string());
                (Value::String(raw.to_string()), result)
            }
        }
    }

    fn record(&mut self, entry: HistoryEntry) {
        if let Some(history) = self.history.as_mut() {
            history.record(entry);
        }
    }
}

fn compose_message(answer: String, steps: &[StepRecord], stop: StopReason, cap: u32) -> String {
    let mut message = answer;
    if stop == StopReason::IterationCap {
        message.push_str(&format!("\n\n⚠️ Task too complex, stopped after {cap} tool executions."));
    }
    if message.trim().is_empty() {
        message = EMPTY_ANSWER.to_string();
    }
    if !steps.is_empty() {
        message.push_str("\n\n**Steps executed:**");
        for step in steps {
            let mark = if step.success { '✓' } else { '✗' };
            let name = step.tool.replace('_', " ");
            let input = ledger_input(&step.tool, &step.input);
            if input.is_empty() {
                message.push_str(&format!("\n{}. {mark} {name}", step.step));
            } else {
                message.push_str(&format!("\n{}. {mark} {name}: {input}", step.step));
            }
        }
    }
    message
}

fn ledger_input(tool: &str, input: &Value) -> String {
    let field = |key: &str| match input.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    match tool {
        "get_ui_state" | "get_component_sitemap" => String::new(),
        "click_component" | "find_component" => {
            let id = field("componentId");
            if id.is_empty() {
                field("query")
            } else {
                id
            }
        }
        "type_text" => format!("\"{}\" → {}", field("text"), field("componentId")),
        "execute_custom_action" => format!(
            "{}({}) → {}",
            field("actionName"),
            field("actionValue"),
            field("componentId")
        ),
        _ => input.to_string(),
    }
}
