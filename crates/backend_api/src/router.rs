use axum::{
    http::HeaderValue,
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{handlers, state::AppState};

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter(|o| o.as_str() != "*")
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let origin = if allowed.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(allowed)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Create the main application router with all API endpoints
pub fn create_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Chat assistant
        .route("/chat", post(handlers::chat))
        // Dashboard data
        .route("/transactions", get(handlers::get_transactions))
        .route("/categories", get(handlers::get_categories))
        .route("/raw-transactions", get(handlers::get_raw_transactions))
        .route("/category-transactions", get(handlers::get_category_transactions))
        .route("/periods", get(handlers::get_periods))
        // Lookups
        .route("/users", get(handlers::get_users))
        .route("/categories-list", get(handlers::get_categories_list))
        .route("/categories-with-limits", get(handlers::get_categories_with_limits))
        // Admin
        .route("/category", post(handlers::create_category))
        .route("/category/limit", put(handlers::update_category_limit))
        .route("/transaction/category", put(handlers::update_transaction_category))
        // Add shared state
        .with_state(state)
        // Add middleware
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
}
