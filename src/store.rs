//! Storage abstraction over the `leads`, `communications` and `wizard_sessions` tables.
//!
//! Handlers and jobs only see `Arc<dyn LeadStore>`; production wires in
//! [`crate::db_storage::PgStore`], tests use [`crate::memory_store::MemoryStore`].
//! Every lookup ignores soft-deleted leads and returns the most recently
//! created match.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{Communication, Lead, LeadFields, NewCommunication, SessionSnapshot, WizardSession};

#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn find_lead_by_id(&self, id: Uuid) -> Result<Option<Lead>, AppError>;

    async fn find_lead_by_crm_id(&self, crm_lead_id: &str) -> Result<Option<Lead>, AppError>;

    /// Exact match; callers pass the lower-cased address.
    async fn find_lead_by_email(&self, email: &str) -> Result<Option<Lead>, AppError>;

    /// Exact match on the stored phone string.
    async fn find_lead_by_phone(&self, phone: &str) -> Result<Option<Lead>, AppError>;

    /// Leads whose stored phone, reduced to digits, ends with `digits`.
    async fn find_lead_by_phone_suffix(&self, digits: &str) -> Result<Option<Lead>, AppError>;

    /// Case-insensitive substring match on the name.
    async fn find_lead_by_name(&self, name: &str) -> Result<Option<Lead>, AppError>;

    /// Inserts a lead. `name` is required.
    async fn insert_lead(&self, fields: &LeadFields) -> Result<Lead, AppError>;

    /// Applies every `Some` field; `None` keeps the stored value.
    async fn update_lead(&self, id: Uuid, fields: &LeadFields) -> Result<Lead, AppError>;

    /// Flags the lead as opted out. Already opted-out leads are returned untouched.
    async fn set_opted_out(&self, id: Uuid) -> Result<Lead, AppError>;

    /// Leads in a follow-up status, not opted out, created after `created_after`.
    /// Oldest first.
    async fn list_followup_candidates(
        &self,
        created_after: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Lead>, AppError>;

    /// Templates already logged for a lead.
    async fn sent_templates(&self, lead_id: Uuid) -> Result<Vec<String>, AppError>;

    async fn record_communication(
        &self,
        communication: &NewCommunication,
    ) -> Result<Communication, AppError>;

    async fn get_session(&self, token: &str) -> Result<Option<WizardSession>, AppError>;

    /// Upserts a snapshot. Converted sessions are frozen and ignore writes.
    async fn save_session(&self, snapshot: &SessionSnapshot) -> Result<(), AppError>;

    /// Marks the session `converted_to_lead` and links it to the lead.
    /// Returns `false` when the token is unknown or was already converted.
    async fn convert_session(&self, token: &str, lead_id: Uuid) -> Result<bool, AppError>;

    /// Moves `in_progress` sessions idle since before `idle_before` to `abandoned`.
    async fn abandon_stale_sessions(&self, idle_before: DateTime<Utc>) -> Result<u64, AppError>;
}
