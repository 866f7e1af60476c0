//! HTTP gateway (axum)

pub mod handlers;
pub mod identity;
pub mod openapi;
pub mod response;
pub mod state;
pub mod types;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::GatewayConfig;
pub use identity::Caller;
pub use response::{ApiError, ApiResponse, ApiResult};
pub use state::AppState;

/// Full application router, including Swagger UI at `/docs`.
pub fn router(state: AppState) -> Router {
    let state = Arc::new(state);

    let token_routes = Router::new()
        .route("/subject", post(handlers::issue_subject_token))
        .route("/counter", post(handlers::issue_counter_token))
        .route("/validate", post(handlers::validate_token))
        .route("/details", post(handlers::token_details));

    let meal_routes = Router::new()
        .route("/redeem", post(handlers::redeem_meal))
        .route("/history", get(handlers::meal_history));

    let wallet_routes = Router::new()
        .route("/balance", get(handlers::get_balance))
        .route("/summary", get(handlers::get_summary))
        .route("/ledger", get(handlers::get_ledger))
        .route("/topup", post(handlers::top_up))
        .route("/mess-fee", post(handlers::pay_mess_fee));

    let settlement_routes = Router::new()
        .route("/", post(handlers::create_settlement))
        .route("/summary", post(handlers::summarize_settlement))
        .route(
            "/{settlement_id}/paid",
            post(handlers::mark_settlement_paid),
        );

    let vendor_routes = Router::new()
        .route(
            "/{vendor_id}/transactions",
            get(handlers::vendor_transactions),
        )
        .route("/{vendor_id}/settlements", get(handlers::list_settlements));

    Router::new()
        .route("/api/v1/health", get(handlers::health_check))
        .nest("/api/v1/tokens", token_routes)
        .nest("/api/v1/meals", meal_routes)
        .nest("/api/v1/wallet", wallet_routes)
        .nest("/api/v1/settlements", settlement_routes)
        .nest("/api/v1/vendors", vendor_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
}

/// Bind and serve until Ctrl-C.
pub async fn run_server(config: &GatewayConfig, state: AppState) -> anyhow::Result<()> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {} (port already in use?)", addr))?;

    tracing::info!("Gateway listening on http://{}", addr);
    tracing::info!("API Docs: http://{}/docs", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
