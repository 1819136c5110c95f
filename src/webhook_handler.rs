use crate::dedup::{self, LeadMatch, MatchTier};
use crate::errors::AppError;
use crate::handlers::AppState;
use crate::models::{Lead, LeadFields, LeadLookup};
use crate::scoring::calculate_lead_priority;
use crate::signing::constant_time_compare;
use crate::webhook_models::{CrmLeadEvent, CrmWebhookPayload, CrmWebhookResponse};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// CRM Webhook Handler
///
/// Receives lead create/edit events from the CRM and reconciles each one with
/// the store through the dedup ladder: a match is updated (and gets the CRM id
/// backfilled), anything else is inserted. A match already linked to another
/// CRM record is never overwritten.
///
/// Expected payload: Single event object OR array of events
/// Authentication: X-Webhook-Token header must match WEBHOOK_SECRET env var
pub async fn crm_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CrmWebhookPayload>,
) -> Result<(StatusCode, Json<CrmWebhookResponse>), AppError> {
    tracing::info!("Received CRM webhook");

    validate_webhook_secret(&state, &headers)?;

    let events = payload.into_events();
    let received = events.len();
    tracing::info!("Processing {} CRM event(s)", received);

    let mut response = CrmWebhookResponse {
        status: "received".to_string(),
        received,
        created: 0,
        updated: 0,
        stale: 0,
        conflicts: 0,
        failed: 0,
    };

    for event in events {
        let crm_id = event.id.clone();
        match process_crm_event(&state, event).await {
            Ok(SyncResult::Created) => response.created += 1,
            Ok(SyncResult::Updated) => response.updated += 1,
            Ok(SyncResult::Stale) => {
                response.stale += 1;
                tracing::debug!("Skipped stale CRM event for {}", crm_id);
            }
            Ok(SyncResult::Conflict) => response.conflicts += 1,
            Err(e) => {
                response.failed += 1;
                // Continue processing other events even if one fails
                tracing::error!("Failed to sync CRM lead {}: {}", crm_id, e);
            }
        }
    }

    tracing::info!(
        "CRM sync complete: {} received, {} created, {} updated, {} stale, {} conflicts, {} failed",
        response.received,
        response.created,
        response.updated,
        response.stale,
        response.conflicts,
        response.failed
    );

    Ok((StatusCode::OK, Json(response)))
}

/// Validate webhook secret from X-Webhook-Token header
fn validate_webhook_secret(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    // If no secret is configured, skip validation (warn was already logged at startup)
    let Some(ref expected_secret) = state.config.webhook_secret else {
        return Ok(());
    };

    let token = headers
        .get("x-webhook-token")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing X-Webhook-Token header".to_string()))?;

    if !constant_time_compare(token, expected_secret) {
        tracing::warn!("Invalid webhook token received");
        return Err(AppError::Unauthorized("Invalid webhook token".to_string()));
    }

    Ok(())
}

#[derive(Debug, PartialEq)]
enum SyncResult {
    Created,
    Updated,
    Stale,
    Conflict,
}

/// What to do with the lead the dedup ladder returned for a CRM event.
#[derive(Debug)]
enum Resolution {
    Merge(Lead),
    Insert,
    Conflict(Lead),
}

/// A lead linked to a different CRM record belongs to someone else. Such a
/// name match (or one with a different email) becomes an insert; email and
/// phone matches are reported as conflicts.
fn resolve_match(found: LeadMatch, event_id: &str, fields: &LeadFields) -> Resolution {
    if found.tier == MatchTier::ExternalId {
        return Resolution::Merge(found.lead);
    }

    let linked_elsewhere = found
        .lead
        .crm_lead_id
        .as_deref()
        .is_some_and(|id| id != event_id);
    let other_email = matches!(
        (&found.lead.email, &fields.email),
        (Some(stored), Some(incoming)) if stored != incoming
    );

    match found.tier {
        MatchTier::Name if linked_elsewhere || other_email => Resolution::Insert,
        _ if linked_elsewhere => Resolution::Conflict(found.lead),
        _ => Resolution::Merge(found.lead),
    }
}

/// Parse timestamp string to DateTime<Utc>
fn parse_timestamp(timestamp_str: &str) -> Result<DateTime<Utc>, AppError> {
    chrono::DateTime::parse_from_rfc3339(timestamp_str)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::DateTime::parse_from_str(timestamp_str, "%Y-%m-%d %H:%M:%S%.f %z")
                .map(|dt| dt.with_timezone(&Utc))
        })
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(timestamp_str, "%Y-%m-%d %H:%M:%S%.f")
                .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
        })
        .map_err(|e| {
            AppError::BadRequest(format!(
                "Invalid timestamp format '{}': {}. Expected ISO 8601 (RFC3339)",
                timestamp_str, e
            ))
        })
}

/// Store columns carried by a CRM event.
fn event_fields(event: &CrmLeadEvent) -> LeadFields {
    let phone = event.phone_number();
    LeadFields {
        name: event.name(),
        email: event
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_lowercase),
        phone: phone.and_then(dedup::normalize_phone),
        address: event.street.clone().filter(|s| !s.trim().is_empty()),
        status: event.status(),
        notes: event.description.clone().filter(|d| !d.trim().is_empty()),
        crm_lead_id: Some(event.id.clone()),
        ..LeadFields::default()
    }
}

/// Reconcile one CRM event with the store
async fn process_crm_event(state: &AppState, event: CrmLeadEvent) -> Result<SyncResult, AppError> {
    let modified_at = event
        .modified_time
        .as_deref()
        .map(parse_timestamp)
        .transpose()?;
    let mut fields = event_fields(&event);
    fields.crm_modified_at = modified_at;

    tracing::debug!(
        "CRM event: id={}, action={:?}, modified={:?}",
        event.id,
        event.action,
        modified_at
    );

    let lookup = LeadLookup {
        external_id: Some(event.id.clone()),
        email: fields.email.clone(),
        phone: event.phone_number().map(str::to_string),
        name: fields.name.clone(),
    };

    let resolution = match dedup::find_existing_lead(state.store.as_ref(), &lookup).await? {
        Some(found) => resolve_match(found, &event.id, &fields),
        None => Resolution::Insert,
    };

    match resolution {
        Resolution::Merge(lead) => {
            // Ordered by CRM time only; local writes do not make an event stale.
            if let (Some(modified_at), Some(applied)) = (modified_at, lead.crm_modified_at) {
                if applied >= modified_at {
                    return Ok(SyncResult::Stale);
                }
            }
            if lead.crm_lead_id.as_deref() != Some(event.id.as_str()) {
                tracing::info!("Linking CRM lead {} to lead {}", event.id, lead.id);
            }
            let priority = calculate_lead_priority(&lead.to_fields().merge(fields.clone()));
            fields.priority_score = Some(priority.score);
            fields.priority_level = Some(priority.level);
            state.store.update_lead(lead.id, &fields).await?;
            Ok(SyncResult::Updated)
        }
        Resolution::Conflict(lead) => {
            tracing::warn!(
                "⚠️ CRM lead {} matches lead {}, which is linked to CRM lead {:?}; not merged",
                event.id,
                lead.id,
                lead.crm_lead_id
            );
            Ok(SyncResult::Conflict)
        }
        Resolution::Insert => {
            if fields.name.is_none() {
                return Err(AppError::BadRequest(format!(
                    "CRM lead {} has no name",
                    event.id
                )));
            }
            fields.source = Some("crm".to_string());
            let priority = calculate_lead_priority(&fields);
            fields.priority_score = Some(priority.score);
            fields.priority_level = Some(priority.level);
            let lead = state.store.insert_lead(&fields).await?;
            tracing::info!("✓ Imported CRM lead {} as {}", event.id, lead.id);
            Ok(SyncResult::Created)
        }
    }
}
