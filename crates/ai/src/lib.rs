pub mod history;
pub mod injector;
pub mod orchestrator;
pub mod prompt;
pub mod tools;

// Re export the important bits
pub use history::ConversationHistory;
pub use injector::inject_defaults;
pub use orchestrator::{ChatOrchestrator, OrchestratorConfig, TurnError, EMPTY_ANSWER_REPLY, LOOP_EXHAUSTED_REPLY};
pub use prompt::system_prompt;
pub use tools::{DispatchError, Tool, ToolContext, ToolError, ToolName, ToolRegistry, UnknownTool};
