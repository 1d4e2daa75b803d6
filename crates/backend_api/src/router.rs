use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{handlers, state::AppState};

/// Create the main application router with all API endpoints
pub fn create_router(state: AppState) -> Router {
    // Create CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the router
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Bank link
        .route("/api/link/exchange", post(handlers::exchange_link_token))
        // User profile
        .route("/api/users/:user_id", get(handlers::get_profile))
        .route("/api/users/:user_id", put(handlers::update_profile))
        // Bank data
        .route("/api/users/:user_id/accounts", get(handlers::list_accounts))
        .route(
            "/api/users/:user_id/transactions",
            get(handlers::list_transactions),
        )
        .route(
            "/api/users/:user_id/institution",
            get(handlers::get_institution),
        )
        // Ingestion and classification
        .route("/api/sync", post(handlers::sync_transactions))
        .route("/api/classify", post(handlers::classify_expense))
        // Account removal
        .route("/api/accounts/:account_id", delete(handlers::remove_account))
        // Add shared state
        .with_state(state)
        // Add middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
