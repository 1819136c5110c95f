use crate::catalog::{BATTERY_OPTIONS, SYSTEM_PACKAGES};
use crate::config::Config;
use crate::crm_client::CrmClient;
use crate::dedup;
use crate::errors::AppError;
use crate::grant_scheme::GrantScheme;
use crate::models::*;
use crate::notifications::{ChatNotifier, LeadNotice, WebhookNotifier};
use crate::quote::{self, Quote, QuoteInput};
use crate::scoring::calculate_lead_priority;
use crate::session_writer::SessionWriter;
use crate::side_effects::{SideEffect, SideEffectQueue};
use crate::store::LeadStore;
use crate::validation::{is_valid_email, validate_mt_phone};
use crate::wizard::{self, WizardAction, WizardState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Shared application state injected into handlers.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Lead, communication and wizard-session storage.
    pub store: Arc<dyn LeadStore>,
    /// CRM client (optional; mirroring is skipped without it).
    pub crm: Option<CrmClient>,
    /// Grant scheme new quotes are priced against.
    pub scheme: &'static GrantScheme,
    /// Debounced wizard-session writer.
    pub sessions: SessionWriter,
    /// Best-effort background notifications and session linkage.
    pub side_effects: SideEffectQueue,
}

impl AppState {
    /// Builds the state and starts the side-effect worker.
    ///
    /// Chat and webhook notifiers come from `config`; the CRM client is passed
    /// in so tests can point it at a mock server.
    pub fn new(
        config: Config,
        store: Arc<dyn LeadStore>,
        crm: Option<CrmClient>,
    ) -> Result<(Arc<Self>, JoinHandle<()>), AppError> {
        let chat = config.chat.clone().map(ChatNotifier::new).transpose()?;
        let webhook = config
            .lead_webhook_url
            .clone()
            .map(WebhookNotifier::new)
            .transpose()?;
        let (side_effects, worker) = SideEffectQueue::spawn(store.clone(), chat, webhook);
        let sessions = SessionWriter::new(
            store.clone(),
            Duration::from_millis(config.wizard_debounce_ms),
        );

        let state = Arc::new(Self {
            config,
            store,
            crm,
            scheme: crate::grant_scheme::CURRENT,
            sessions,
            side_effects,
        });
        Ok((state, worker))
    }
}

/// Health check endpoint.
///
/// # Returns
///
/// * `(StatusCode, Json<serde_json::Value>)` - HTTP 200 OK with health status JSON.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "solar-leads",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// GET /api/catalog
///
/// Static system packages and battery options, with the financing terms of
/// the active grant scheme.
pub async fn get_catalog(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "scheme_year": state.scheme.year,
        "systems": SYSTEM_PACKAGES,
        "batteries": BATTERY_OPTIONS,
        "loan_rate_percent": state.scheme.loan_rate_percent,
        "loan_terms_months": state.scheme.loan_terms_months,
    }))
}

/// POST /api/quote
///
/// Prices a selection without storing anything.
///
/// # Returns
///
/// * `Result<Json<Quote>, AppError>` - The quote, or 400 for unknown catalog ids.
pub async fn create_quote(
    State(state): State<Arc<AppState>>,
    Json(input): Json<QuoteInput>,
) -> Result<Json<Quote>, AppError> {
    if !input.monthly_bill.is_finite() {
        return Err(AppError::BadRequest("monthly_bill must be a number".to_string()));
    }
    let quote = quote::build_quote(state.scheme, &input)?;
    tracing::debug!(
        "Quote: {:?} + {:?} → total {} grant {} net {}",
        quote.system.as_ref().map(|s| s.id),
        quote.battery.as_ref().map(|b| b.id),
        quote.total_price,
        quote.grant_amount,
        quote.net_price
    );
    Ok(Json(quote))
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Stored form of a submitted phone: the E.164 form of a valid Maltese
/// number, else `+` and the digits. `None` when there are no digits.
fn contact_phone(raw: &str) -> Option<String> {
    match validate_mt_phone(raw) {
        (true, e164) => Some(e164),
        (false, detail) => {
            tracing::debug!("Phone '{}' failed MT validation ({}), keeping digits", raw, detail);
            dedup::normalize_phone(raw)
        }
    }
}

/// Required-field and format checks. Lists every failing field.
fn validate_submission(submission: &LeadSubmission) -> Result<(), AppError> {
    let mut invalid = Vec::new();

    if trimmed(&submission.name).is_none() {
        invalid.push("name".to_string());
    }
    match trimmed(&submission.email) {
        None => invalid.push("email".to_string()),
        Some(email) if !is_valid_email(&email.to_lowercase()) => invalid.push("email".to_string()),
        Some(_) => {}
    }
    if trimmed(&submission.phone).and_then(|p| contact_phone(&p)).is_none() {
        invalid.push("phone".to_string());
    }
    if submission.monthly_bill.is_some_and(|b| !b.is_finite()) {
        invalid.push("monthly_bill".to_string());
    }

    if invalid.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(invalid))
    }
}

/// Typed write set for a validated submission: normalised contact fields,
/// server-side pricing and the priority score.
fn submission_fields(
    scheme: &GrantScheme,
    submission: &LeadSubmission,
) -> Result<LeadFields, AppError> {
    let mut fields = LeadFields {
        name: trimmed(&submission.name),
        email: trimmed(&submission.email).map(|e| e.to_lowercase()),
        phone: trimmed(&submission.phone).and_then(|p| contact_phone(&p)),
        address: trimmed(&submission.address),
        latitude: submission.latitude,
        longitude: submission.longitude,
        location: submission.location,
        household_size: submission.household_size,
        monthly_bill: submission.monthly_bill,
        system_id: trimmed(&submission.system_id),
        battery_id: trimmed(&submission.battery_id),
        grant_type: submission.grant_type,
        payment_method: submission.payment_method,
        loan_term_months: submission.loan_term_months.map(|t| t as i32),
        notes: trimmed(&submission.notes),
        source: trimmed(&submission.source).or_else(|| Some("website".to_string())),
        crm_lead_id: trimmed(&submission.crm_lead_id),
        wizard_session_token: trimmed(&submission.wizard_session_token),
        ..LeadFields::default()
    };

    if let Some(monthly_bill) = submission.monthly_bill {
        let input = QuoteInput {
            monthly_bill,
            household_size: submission.household_size.unwrap_or(1),
            location: submission.location.unwrap_or_default(),
            system_id: fields.system_id.clone(),
            battery_id: fields.battery_id.clone(),
            grant_type: submission.grant_type.unwrap_or_default(),
            include_pv: submission.include_pv.unwrap_or(true),
            payment_method: submission.payment_method,
            loan_term_months: submission.loan_term_months,
        };
        let quote = quote::build_quote(scheme, &input)?;
        fields = fields.merge(quote.to_lead_fields(&input));
    }

    let priority = calculate_lead_priority(&fields);
    fields.priority_score = Some(priority.score);
    fields.priority_level = Some(priority.level);
    Ok(fields)
}

/// Mirrors a write to the CRM: update when a CRM id is known, else create.
async fn mirror_to_crm(
    crm: Option<&CrmClient>,
    known_crm_id: Option<String>,
    fields: &LeadFields,
) -> (Option<String>, WriteOutcome) {
    let Some(crm) = crm else {
        return (known_crm_id, WriteOutcome::skipped("CRM not configured"));
    };

    // Reuse a CRM record created earlier for the same email.
    let known_crm_id = match (known_crm_id, fields.email.as_deref()) {
        (Some(id), _) => Some(id),
        (None, Some(email)) => match crm.search_by_email(email).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("⚠️ CRM search failed, creating a new record: {}", e);
                None
            }
        },
        (None, None) => None,
    };

    match known_crm_id {
        Some(crm_id) => match crm.update_lead(&crm_id, fields).await {
            Ok(()) => (Some(crm_id), WriteOutcome::success()),
            Err(e) => {
                tracing::warn!("⚠️ CRM update failed for {}: {}", crm_id, e);
                (Some(crm_id), WriteOutcome::failed(e))
            }
        },
        None => match crm.create_lead(fields).await {
            Ok(crm_id) => (Some(crm_id), WriteOutcome::success()),
            Err(e) => {
                tracing::warn!("⚠️ CRM create failed: {}", e);
                (None, WriteOutcome::failed(e))
            }
        },
    }
}

/// POST /api/leads
///
/// Validates the submission, writes it to the store (insert, or update when
/// the CRM reference is already known) and mirrors it to the CRM. The two
/// writes are independent; the call fails with 502 only when both fail.
/// Chat, webhook and wizard-session linkage are queued after the writes and
/// never change the response.
///
/// # Returns
///
/// * `201` on insert, `200` on update, `502` when both writes failed.
pub async fn create_lead(
    State(state): State<Arc<AppState>>,
    Json(submission): Json<LeadSubmission>,
) -> Result<(StatusCode, Json<LeadResponse>), AppError> {
    validate_submission(&submission)?;
    let fields = submission_fields(state.scheme, &submission)?;
    tracing::info!(
        "POST /api/leads - {} (priority {:?})",
        fields.email.as_deref().unwrap_or("-"),
        fields.priority_score
    );

    let existing = match fields.crm_lead_id.as_deref() {
        Some(crm_id) => match state.store.find_lead_by_crm_id(crm_id).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("⚠️ Lookup by CRM id {} failed: {}", crm_id, e);
                None
            }
        },
        None => None,
    };
    let updated = existing.is_some();

    let write = match &existing {
        Some(lead) => state.store.update_lead(lead.id, &fields).await,
        None => state.store.insert_lead(&fields).await,
    };
    let (mut stored, store_outcome) = match write {
        Ok(lead) => (Some(lead), WriteOutcome::success()),
        Err(e) => {
            tracing::error!("Store write failed: {}", e);
            (None, WriteOutcome::failed(&e))
        }
    };

    let known_crm_id = fields
        .crm_lead_id
        .clone()
        .or_else(|| existing.as_ref().and_then(|l| l.crm_lead_id.clone()));
    let (crm_lead_id, crm_outcome) =
        mirror_to_crm(state.crm.as_ref(), known_crm_id, &fields).await;

    // Keep the CRM id on the stored lead so later submissions update in place.
    let backfill = match (&stored, &crm_lead_id) {
        (Some(lead), Some(crm_id)) if lead.crm_lead_id.as_deref() != Some(crm_id.as_str()) => {
            Some((lead.id, crm_id.clone()))
        }
        _ => None,
    };
    if let Some((lead_id, crm_id)) = backfill {
        let fields = LeadFields {
            crm_lead_id: Some(crm_id.clone()),
            ..LeadFields::default()
        };
        match state.store.update_lead(lead_id, &fields).await {
            Ok(lead) => stored = Some(lead),
            Err(e) => tracing::warn!("⚠️ Failed to store CRM id {}: {}", crm_id, e),
        }
    }

    let notice = LeadNotice {
        lead_id: stored.as_ref().map(|l| l.id),
        crm_lead_id: crm_lead_id.clone(),
        updated,
        fields: stored
            .as_ref()
            .map(|l| l.to_fields())
            .unwrap_or_else(|| fields.clone()),
    };
    if store_outcome.ok || crm_outcome.ok {
        state
            .side_effects
            .enqueue(SideEffect::NotifyChat(notice.clone()));
        state.side_effects.enqueue(SideEffect::NotifyWebhook(notice));
    }
    if let (Some(token), Some(lead)) = (&fields.wizard_session_token, &stored) {
        state.side_effects.enqueue(SideEffect::LinkWizardSession {
            token: token.clone(),
            lead_id: lead.id,
        });
    }

    let success = store_outcome.ok || crm_outcome.ok;
    let status = match (success, updated) {
        (false, _) => StatusCode::BAD_GATEWAY,
        (true, true) => StatusCode::OK,
        (true, false) => StatusCode::CREATED,
    };

    Ok((
        status,
        Json(LeadResponse {
            success,
            lead_id: stored.map(|l| l.id),
            crm_lead_id,
            updated,
            store: store_outcome,
            crm: crm_outcome,
        }),
    ))
}

/// Validated write set of a patch against the stored lead.
///
/// Contact fields get the same checks as a submission. When a pricing input
/// changes, the quote is rebuilt from the stored inputs overlaid with the
/// patch, so prices and grant never go stale.
fn patch_fields(
    scheme: &GrantScheme,
    existing: &Lead,
    patch: &LeadPatch,
) -> Result<LeadFields, AppError> {
    let mut invalid = Vec::new();

    let name = match &patch.name {
        Some(_) => {
            let name = trimmed(&patch.name);
            if name.is_none() {
                invalid.push("name".to_string());
            }
            name
        }
        None => None,
    };
    let email = match trimmed(&patch.email).map(|e| e.to_lowercase()) {
        Some(email) if !is_valid_email(&email) => {
            invalid.push("email".to_string());
            None
        }
        email => email,
    };
    let phone = match trimmed(&patch.phone) {
        Some(raw) => {
            let phone = contact_phone(&raw);
            if phone.is_none() {
                invalid.push("phone".to_string());
            }
            phone
        }
        None => None,
    };
    if patch.monthly_bill.is_some_and(|b| !b.is_finite()) {
        invalid.push("monthly_bill".to_string());
    }
    if !invalid.is_empty() {
        return Err(AppError::Validation(invalid));
    }

    let mut fields = LeadFields {
        name,
        email,
        phone,
        address: trimmed(&patch.address),
        latitude: patch.latitude,
        longitude: patch.longitude,
        status: patch.status,
        notes: trimmed(&patch.notes),
        ..LeadFields::default()
    };

    if patch.changes_pricing() {
        let monthly_bill = patch
            .monthly_bill
            .or(existing.monthly_bill)
            .ok_or_else(|| AppError::Validation(vec!["monthly_bill".to_string()]))?;
        let input = QuoteInput {
            monthly_bill,
            household_size: patch.household_size.or(existing.household_size).unwrap_or(1),
            location: patch.location.or(existing.location).unwrap_or_default(),
            system_id: trimmed(&patch.system_id).or_else(|| existing.system_id.clone()),
            battery_id: trimmed(&patch.battery_id).or_else(|| existing.battery_id.clone()),
            grant_type: patch.grant_type.or(existing.grant_type).unwrap_or_default(),
            include_pv: patch
                .include_pv
                .unwrap_or(existing.system_id.is_some() || existing.battery_id.is_none()),
            payment_method: patch.payment_method.or(existing.payment_method),
            loan_term_months: patch.loan_term_months.or_else(|| {
                existing
                    .loan_term_months
                    .and_then(|t| u32::try_from(t).ok())
            }),
        };
        let quote = quote::build_quote(scheme, &input)?;
        fields = fields.merge(quote.to_lead_fields(&input));
    }

    let priority = calculate_lead_priority(&existing.to_fields().merge(fields.clone()));
    fields.priority_score = Some(priority.score);
    fields.priority_level = Some(priority.level);
    Ok(fields)
}

/// PATCH /api/leads
///
/// Locates the lead by `id`, else by `email`, validates and applies the
/// patch, re-prices and re-scores it and mirrors the change to the CRM when
/// the lead has a CRM id.
pub async fn patch_lead(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<LeadPatch>,
) -> Result<Json<LeadResponse>, AppError> {
    let email = trimmed(&patch.email).map(|e| e.to_lowercase());
    let existing = match (patch.id, &email) {
        (Some(id), _) => state.store.find_lead_by_id(id).await?,
        (None, Some(email)) => state.store.find_lead_by_email(email).await?,
        (None, None) => {
            return Err(AppError::Validation(vec!["id".to_string(), "email".to_string()]))
        }
    }
    .ok_or_else(|| AppError::NotFound("Lead not found".to_string()))?;
    tracing::info!("PATCH /api/leads - lead {}", existing.id);

    let changes = patch_fields(state.scheme, &existing, &patch)?;
    let lead = state.store.update_lead(existing.id, &changes).await?;

    let crm_outcome = match (&state.crm, lead.crm_lead_id.as_deref()) {
        (Some(crm), Some(crm_id)) => match crm.update_lead(crm_id, &changes).await {
            Ok(()) => WriteOutcome::success(),
            Err(e) => {
                tracing::warn!("⚠️ CRM update failed for {}: {}", crm_id, e);
                WriteOutcome::failed(e)
            }
        },
        (None, _) => WriteOutcome::skipped("CRM not configured"),
        (_, None) => WriteOutcome::skipped("Lead has no CRM id"),
    };

    Ok(Json(LeadResponse {
        success: true,
        lead_id: Some(lead.id),
        crm_lead_id: lead.crm_lead_id.clone(),
        updated: true,
        store: WriteOutcome::success(),
        crm: crm_outcome,
    }))
}

/// Wizard session as returned to the client.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub token: String,
    pub current_step: i32,
    pub highest_step: i32,
    pub status: SessionStatus,
    pub state: WizardState,
}

impl From<SessionSnapshot> for SessionView {
    fn from(s: SessionSnapshot) -> Self {
        Self {
            token: s.token,
            current_step: s.current_step,
            highest_step: s.highest_step,
            status: s.status,
            state: s.state,
        }
    }
}

impl From<WizardSession> for SessionView {
    fn from(s: WizardSession) -> Self {
        Self {
            token: s.token,
            current_step: s.current_step,
            highest_step: s.highest_step,
            status: s.status,
            state: s.state,
        }
    }
}

fn check_session_token(token: &str) -> Result<(), AppError> {
    let valid = !token.is_empty()
        && token.len() <= 128
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(AppError::BadRequest("Invalid session token".to_string()))
    }
}

/// Latest known session: the pending debounced write wins over the stored row.
async fn load_session(state: &AppState, token: &str) -> Result<Option<SessionView>, AppError> {
    if let Some(pending) = state.sessions.pending(token).await {
        return Ok(Some(pending.into()));
    }
    Ok(state.store.get_session(token).await?.map(SessionView::from))
}

/// GET /api/wizard-sessions/:token
pub async fn get_wizard_session(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<SessionView>, AppError> {
    check_session_token(&token)?;
    load_session(&state, &token)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Wizard session not found".to_string()))
}

/// POST /api/wizard-sessions/:token/actions
///
/// Applies one reducer action and schedules a debounced write. Unknown tokens
/// start a fresh session.
pub async fn apply_wizard_action(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(action): Json<WizardAction>,
) -> Result<Json<SessionView>, AppError> {
    check_session_token(&token)?;

    let current = match load_session(&state, &token).await? {
        Some(session) if session.status == SessionStatus::ConvertedToLead => {
            return Err(AppError::BadRequest(
                "Wizard session was already converted to a lead".to_string(),
            ));
        }
        Some(session) => session.state,
        None => WizardState::default(),
    };

    let next = wizard::apply_action(&current, action, state.scheme);
    let snapshot = next.snapshot(&token);
    state.sessions.schedule(snapshot.clone()).await;

    Ok(Json(snapshot.into()))
}

#[derive(Debug, Deserialize)]
pub struct BeaconPayload {
    pub state: WizardState,
}

/// POST /api/wizard-sessions/:token/beacon
///
/// Page-unload flush. With a body, that state replaces whatever is pending;
/// without one, the pending write (if any) goes out now.
pub async fn wizard_beacon(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    payload: Option<Json<BeaconPayload>>,
) -> Result<StatusCode, AppError> {
    check_session_token(&token)?;

    match payload {
        Some(Json(BeaconPayload { state: wizard_state })) => {
            if let Some(session) = state.store.get_session(&token).await? {
                if session.status == SessionStatus::ConvertedToLead {
                    return Ok(StatusCode::NO_CONTENT);
                }
            }
            let mut wizard_state = wizard_state;
            wizard_state.refresh_quote(state.scheme);
            state
                .sessions
                .write_now(wizard_state.snapshot(&token))
                .await?;
        }
        None => {
            state.sessions.flush(&token).await?;
        }
    }

    Ok(StatusCode::NO_CONTENT)
}
