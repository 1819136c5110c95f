//! `GET /api/unsubscribe?lead=&token=` - one-click opt-out from follow-up emails.
//!
//! Answers with a small HTML page rather than JSON, since the link is opened
//! from an email client. Repeating the request is harmless.

use crate::handlers::AppState;
use crate::signing;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Html,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct UnsubscribeQuery {
    pub lead: Option<String>,
    pub token: Option<String>,
}

fn page(title: &str, message: &str) -> Html<String> {
    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><meta name="viewport" content="width=device-width, initial-scale=1"><title>{title}</title></head>
<body style="font-family:sans-serif;max-width:480px;margin:64px auto;text-align:center">
<h1>{title}</h1>
<p>{message}</p>
</body>
</html>"#
    ))
}

fn invalid_link() -> (StatusCode, Html<String>) {
    (
        StatusCode::BAD_REQUEST,
        page(
            "Invalid link",
            "This unsubscribe link is invalid or has expired. Please use the link in our latest email.",
        ),
    )
}

pub async fn unsubscribe(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UnsubscribeQuery>,
) -> (StatusCode, Html<String>) {
    let (Some(lead), Some(token)) = (query.lead, query.token) else {
        return invalid_link();
    };
    let Ok(lead_id) = Uuid::parse_str(lead.trim()) else {
        return invalid_link();
    };

    if let Err(e) =
        signing::verify_lead_token(&state.config.signing_secret, &token, &lead_id.to_string(), Utc::now())
    {
        tracing::warn!("Rejected unsubscribe for lead {}: {}", lead_id, e);
        return invalid_link();
    }

    match state.store.find_lead_by_id(lead_id).await {
        Ok(Some(lead)) if lead.opted_out => {
            tracing::debug!("Lead {} already unsubscribed", lead_id);
        }
        Ok(Some(_)) => {
            if let Err(e) = state.store.set_opted_out(lead_id).await {
                tracing::error!("Failed to unsubscribe lead {}: {}", lead_id, e);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    page("Something went wrong", "Please try again in a few minutes."),
                );
            }
            tracing::info!("✓ Lead {} unsubscribed", lead_id);
        }
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                page("Not found", "We could not find your details."),
            );
        }
        Err(e) => {
            tracing::error!("Unsubscribe lookup failed for {}: {}", lead_id, e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                page("Something went wrong", "Please try again in a few minutes."),
            );
        }
    }

    (
        StatusCode::OK,
        page(
            "You have been unsubscribed",
            "You will not receive any more follow-up emails about your solar quote.",
        ),
    )
}
