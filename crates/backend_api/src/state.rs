use ai::ChatOrchestrator;
use std::sync::Arc;

use crate::repository::BudgetRepository;

/// Shared handler state. `chat` is `None` when no model API key is configured.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn BudgetRepository>,
    pub chat: Option<Arc<ChatOrchestrator>>,
}
