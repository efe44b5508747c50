use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use database::PeriodQuery;
use models::{AvailablePeriods, CategoryDrilldown, ConversationMessage, Filters, TransactionKey, TurnResponse};
use serde::Deserialize;
use serde_json::json;

use crate::{error::ApiError, state::AppState, Result};

/// GET /health
/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "budget-assistant-api",
        "chat_enabled": state.chat.is_some(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_history: Vec<ConversationMessage>,
    #[serde(default)]
    pub filters: Filters,
}

/// POST /chat
/// Runs one conversation turn. Model and tool failures still answer 200 with an apology.
pub async fn chat(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Result<Json<TurnResponse>> {
    let orchestrator = state.chat.as_ref().ok_or(ApiError::ChatUnavailable)?;

    let message = request.message.trim();
    if message.is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".to_string()));
    }

    tracing::info!(
        history = request.conversation_history.len(),
        period = request.filters.period.as_str(),
        "Chat request"
    );

    let turn = orchestrator
        .process_message(message, &request.conversation_history, &request.filters)
        .await;
    Ok(Json(turn))
}

/// GET /users
pub async fn get_users(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let users = state.repo.list_users().await?;
    Ok(Json(json!({ "users": users })))
}

/// GET /categories-with-limits
pub async fn get_categories_with_limits(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let categories = state.repo.categories_with_limits().await?;
    Ok(Json(json!({ "categories": categories })))
}

/// Dashboard query string. Blank values count as absent.
#[derive(Debug, Default, Deserialize)]
pub struct PeriodParams {
    pub period: Option<String>,
    pub month: Option<String>,
    pub year: Option<String>,
    pub user: Option<String>,
}

impl PeriodParams {
    fn into_query(self) -> PeriodQuery {
        let present = |value: Option<String>| value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        PeriodQuery {
            period: present(self.period),
            month: present(self.month),
            year: present(self.year),
            user: present(self.user),
            ..PeriodQuery::default()
        }
    }
}

/// GET /transactions
/// Category totals for the period with a summary; `summary` is `{}` when nothing was spent.
pub async fn get_transactions(
    State(state): State<AppState>,
    Query(params): Query<PeriodParams>,
) -> Result<impl IntoResponse> {
    let (data, summary) = state.repo.period_totals(params.into_query()).await?;
    let body = match summary {
        Some(summary) => json!({ "data": data, "summary": summary }),
        None => json!({ "data": [], "summary": {} }),
    };
    Ok(Json(body))
}

/// GET /categories
pub async fn get_categories(
    State(state): State<AppState>,
    Query(params): Query<PeriodParams>,
) -> Result<impl IntoResponse> {
    let categories = state.repo.category_stats(params.into_query()).await?;
    Ok(Json(json!({ "categories": categories })))
}

/// GET /raw-transactions
pub async fn get_raw_transactions(
    State(state): State<AppState>,
    Query(params): Query<PeriodParams>,
) -> Result<impl IntoResponse> {
    let data = state.repo.raw_transactions(params.into_query()).await?;
    Ok(Json(json!({ "data": data })))
}

/// GET /periods
pub async fn get_periods(State(state): State<AppState>) -> Result<Json<AvailablePeriods>> {
    Ok(Json(state.repo.available_periods().await?))
}

/// GET /categories-list
pub async fn get_categories_list(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let categories = state.repo.category_names().await?;
    Ok(Json(json!({ "categories": categories })))
}

#[derive(Debug, Deserialize)]
pub struct CategoryTransactionsParams {
    pub category: String,
    #[serde(flatten)]
    pub period: PeriodParams,
}

/// GET /category-transactions
pub async fn get_category_transactions(
    State(state): State<AppState>,
    Query(params): Query<CategoryTransactionsParams>,
) -> Result<Json<CategoryDrilldown>> {
    let category = params.category.trim().to_string();
    if category.is_empty() {
        return Err(ApiError::BadRequest("category must not be empty".to_string()));
    }

    tracing::debug!(category = %category, "Category drill-down");
    let drilldown = state
        .repo
        .category_transactions(category, params.period.into_query())
        .await?;
    Ok(Json(drilldown))
}

#[derive(Debug, Deserialize)]
pub struct UpdateLimitRequest {
    pub category_name: String,
    pub new_limit: f64,
}

/// PUT /category/limit
pub async fn update_category_limit(
    State(state): State<AppState>,
    Json(request): Json<UpdateLimitRequest>,
) -> Result<impl IntoResponse> {
    validate_limit(request.new_limit)?;
    state
        .repo
        .update_category_limit(request.category_name.clone(), request.new_limit)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "category_name": request.category_name,
        "spending_limit": request.new_limit,
    })))
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub category_name: String,
    pub spending_limit: f64,
}

/// POST /category
pub async fn create_category(
    State(state): State<AppState>,
    Json(request): Json<CreateCategoryRequest>,
) -> Result<impl IntoResponse> {
    let name = request.category_name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::BadRequest("category_name must not be empty".to_string()));
    }
    validate_limit(request.spending_limit)?;

    state.repo.create_category(name.clone(), request.spending_limit).await?;
    tracing::info!(category = %name, limit = request.spending_limit, "Category created");

    Ok((
        axum::http::StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "category_name": name,
            "spending_limit": request.spending_limit,
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct UpdateTransactionCategoryRequest {
    pub transaction_date: String,
    pub merchant_name: String,
    pub amount: f64,
    pub person: String,
    pub new_category: String,
}

/// PUT /transaction/category
pub async fn update_transaction_category(
    State(state): State<AppState>,
    Json(request): Json<UpdateTransactionCategoryRequest>,
) -> Result<impl IntoResponse> {
    if request.new_category.trim().is_empty() {
        return Err(ApiError::BadRequest("new_category must not be empty".to_string()));
    }

    let key = TransactionKey {
        transaction_date: request.transaction_date,
        merchant_name: request.merchant_name,
        amount: request.amount,
        person: request.person,
    };
    let updated = state
        .repo
        .update_transaction_category(key, request.new_category.clone())
        .await?;

    Ok(Json(json!({
        "status": "success",
        "updated": updated,
        "new_category": request.new_category,
    })))
}

fn validate_limit(limit: f64) -> Result<()> {
    if !limit.is_finite() || limit < 0.0 {
        return Err(ApiError::BadRequest(format!(
            "spending limit must be a non-negative number, got {limit}"
        )));
    }
    Ok(())
}
