use crate::cron_handler;
use crate::handlers::{self, AppState};
use crate::unsubscribe_handler;
use crate::webhook_handler;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

/// Request size limit: 5MB max payload
pub const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

/// API routes, without the health check and without rate limiting.
///
/// `main` wraps these in the per-IP governor; tests drive them directly.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/catalog", get(handlers::get_catalog))
        .route("/api/quote", post(handlers::create_quote))
        .route(
            "/api/leads",
            post(handlers::create_lead).patch(handlers::patch_lead),
        )
        .route(
            "/api/wizard-sessions/:token",
            get(handlers::get_wizard_session),
        )
        .route(
            "/api/wizard-sessions/:token/actions",
            post(handlers::apply_wizard_action),
        )
        .route(
            "/api/wizard-sessions/:token/beacon",
            post(handlers::wizard_beacon),
        )
        .route("/api/unsubscribe", get(unsubscribe_handler::unsubscribe))
        .route(
            "/api/cron/email-sequences",
            get(cron_handler::run_email_sequences).post(cron_handler::run_email_sequences),
        )
        .route(
            "/api/cron/wizard-sessions",
            get(cron_handler::sweep_wizard_sessions).post(cron_handler::sweep_wizard_sessions),
        )
        .route("/api/webhooks/crm", post(webhook_handler::crm_webhook))
        .layer(ServiceBuilder::new().layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES)))
}

/// Final app: `/health` merged with `api`, plus tracing and CORS.
pub fn app(state: Arc<AppState>, api: Router<Arc<AppState>>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .merge(api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
