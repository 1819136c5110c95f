use crate::errors::AppError;
use crate::followup::{FollowUpJob, FollowUpSummary};
use crate::handlers::AppState;
use crate::signing::constant_time_compare;
use axum::{extract::State, http::HeaderMap, Json};
use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;

/// In-progress wizard sessions idle this long are marked abandoned.
pub const SESSION_IDLE_MINUTES: i64 = 30;

/// Checks `Authorization: Bearer <CRON_SECRET>`.
fn validate_cron_secret(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("Missing cron bearer token".to_string()))?;

    if !constant_time_compare(token.trim(), &state.config.cron_secret) {
        return Err(AppError::Unauthorized("Invalid cron bearer token".to_string()));
    }
    Ok(())
}

/// GET|POST /api/cron/email-sequences
///
/// Runs one follow-up sweep and returns its summary.
pub async fn run_email_sequences(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<FollowUpSummary>, AppError> {
    validate_cron_secret(&state, &headers)?;

    let crm = state
        .crm
        .as_ref()
        .ok_or_else(|| AppError::InternalError("CRM not configured".to_string()))?;

    let job = FollowUpJob {
        store: state.store.as_ref(),
        mail: crm,
        public_base_url: &state.config.public_base_url,
        signing_secret: &state.config.signing_secret,
        batch_size: state.config.followup_batch_size,
    };
    let summary = job.run(Utc::now()).await?;
    Ok(Json(summary))
}

/// GET|POST /api/cron/wizard-sessions
pub async fn sweep_wizard_sessions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    validate_cron_secret(&state, &headers)?;

    let cutoff = Utc::now() - Duration::minutes(SESSION_IDLE_MINUTES);
    let abandoned = state.store.abandon_stale_sessions(cutoff).await?;
    if abandoned > 0 {
        tracing::info!("Marked {} wizard session(s) abandoned", abandoned);
    }

    Ok(Json(json!({ "abandoned": abandoned })))
}
