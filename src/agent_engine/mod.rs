pub mod engine;
pub mod history;
pub mod loop_control;
pub mod state;
pub mod tools;

pub use engine::AgentLoop;
pub use state::{LoopState, StepRecord, StopReason, TurnReport};
pub use tools::{ToolExecutor, ToolResult};
