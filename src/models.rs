use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ============ Domain Enums ============

/// Island the installation is on. Battery grant caps differ per island.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum Location {
    Malta,
    Gozo,
}

impl Default for Location {
    fn default() -> Self {
        Self::Malta
    }
}

/// Grant path chosen by the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum GrantType {
    /// No grant: the customer keeps the higher feed-in tariff.
    None,
    PvOnly,
    PvBattery,
}

impl GrantType {
    pub fn takes_grant(self) -> bool {
        !matches!(self, GrantType::None)
    }
}

impl Default for GrantType {
    fn default() -> Self {
        Self::PvOnly
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Loan,
}

/// Sales pipeline status. Leads are never deleted, only moved or soft-flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    Quoted,
    Signed,
    Installed,
    Lost,
}

impl LeadStatus {
    /// Statuses the follow-up sequence keeps emailing.
    pub const FOLLOW_UP: [LeadStatus; 3] =
        [LeadStatus::New, LeadStatus::Contacted, LeadStatus::Qualified];

    pub fn as_str(self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Quoted => "quoted",
            LeadStatus::Signed => "signed",
            LeadStatus::Installed => "installed",
            LeadStatus::Lost => "lost",
        }
    }
}

impl Default for LeadStatus {
    fn default() -> Self {
        Self::New
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum PriorityLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Abandoned,
    Completed,
    ConvertedToLead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum Channel {
    Email,
    Chat,
    Webhook,
}

// ============ Database Models ============

/// A prospective customer record (`leads` table).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker. Flagged leads are invisible to lookups.
    pub deleted_at: Option<DateTime<Utc>>,
    pub name: String,
    /// Lower-cased.
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location: Option<Location>,
    /// 0 marks a business customer.
    pub household_size: Option<i32>,
    pub monthly_bill: Option<f64>,
    /// Estimated monthly consumption in kWh.
    pub consumption_kwh: Option<f64>,
    pub system_id: Option<String>,
    pub system_size_kw: Option<f64>,
    pub battery_id: Option<String>,
    pub battery_kwh: Option<f64>,
    pub grant_type: Option<GrantType>,
    pub total_price: Option<f64>,
    pub grant_amount: Option<f64>,
    pub net_price: Option<f64>,
    pub annual_savings: Option<f64>,
    pub payback_years: Option<f64>,
    pub payment_method: Option<PaymentMethod>,
    pub loan_term_months: Option<i32>,
    pub monthly_payment: Option<f64>,
    pub status: LeadStatus,
    pub priority_score: Option<i32>,
    pub priority_level: Option<PriorityLevel>,
    pub source: Option<String>,
    /// Lead id in the external CRM.
    pub crm_lead_id: Option<String>,
    /// `Modified_Time` of the last CRM event applied to this lead.
    pub crm_modified_at: Option<DateTime<Utc>>,
    pub opted_out: bool,
    pub opted_out_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub wizard_session_token: Option<String>,
}

/// Writable lead columns. Used both for inserts and for partial updates:
/// on update, `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadFields {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location: Option<Location>,
    pub household_size: Option<i32>,
    pub monthly_bill: Option<f64>,
    pub consumption_kwh: Option<f64>,
    pub system_id: Option<String>,
    pub system_size_kw: Option<f64>,
    pub battery_id: Option<String>,
    pub battery_kwh: Option<f64>,
    pub grant_type: Option<GrantType>,
    pub total_price: Option<f64>,
    pub grant_amount: Option<f64>,
    pub net_price: Option<f64>,
    pub annual_savings: Option<f64>,
    pub payback_years: Option<f64>,
    pub payment_method: Option<PaymentMethod>,
    pub loan_term_months: Option<i32>,
    pub monthly_payment: Option<f64>,
    pub status: Option<LeadStatus>,
    pub priority_score: Option<i32>,
    pub priority_level: Option<PriorityLevel>,
    pub source: Option<String>,
    pub crm_lead_id: Option<String>,
    pub crm_modified_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub wizard_session_token: Option<String>,
}

impl Lead {
    /// Copy of the stored values as a write set, e.g. to mirror into the CRM.
    pub fn to_fields(&self) -> LeadFields {
        LeadFields {
            name: Some(self.name.clone()),
            email: self.email.clone(),
            phone: self.phone.clone(),
            address: self.address.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
            location: self.location,
            household_size: self.household_size,
            monthly_bill: self.monthly_bill,
            consumption_kwh: self.consumption_kwh,
            system_id: self.system_id.clone(),
            system_size_kw: self.system_size_kw,
            battery_id: self.battery_id.clone(),
            battery_kwh: self.battery_kwh,
            grant_type: self.grant_type,
            total_price: self.total_price,
            grant_amount: self.grant_amount,
            net_price: self.net_price,
            annual_savings: self.annual_savings,
            payback_years: self.payback_years,
            payment_method: self.payment_method,
            loan_term_months: self.loan_term_months,
            monthly_payment: self.monthly_payment,
            status: Some(self.status),
            priority_score: self.priority_score,
            priority_level: self.priority_level,
            source: self.source.clone(),
            crm_lead_id: self.crm_lead_id.clone(),
            crm_modified_at: self.crm_modified_at,
            notes: self.notes.clone(),
            wizard_session_token: self.wizard_session_token.clone(),
        }
    }
}

impl LeadFields {
    /// Overlays `other` on top of `self`: every `Some` in `other` wins.
    pub fn merge(mut self, other: LeadFields) -> LeadFields {
        macro_rules! overlay {
            ($($field:ident),* $(,)?) => {
                $( if other.$field.is_some() { self.$field = other.$field; } )*
            };
        }
        overlay!(
            name, email, phone, address, latitude, longitude, location, household_size,
            monthly_bill, consumption_kwh, system_id, system_size_kw, battery_id, battery_kwh,
            grant_type, total_price, grant_amount, net_price, annual_savings, payback_years,
            payment_method, loan_term_months, monthly_payment, status, priority_score,
            priority_level, source, crm_lead_id, crm_modified_at, notes, wizard_session_token,
        );
        self
    }
}

/// One outbound message (`communications` table). Append-only.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Communication {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub channel: Channel,
    pub template: Option<String>,
    pub external_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCommunication {
    pub lead_id: Uuid,
    pub channel: Channel,
    pub template: Option<String>,
    pub external_message_id: Option<String>,
}

/// Persisted wizard session (`wizard_sessions` table).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WizardSession {
    pub token: String,
    pub current_step: i32,
    pub highest_step: i32,
    #[sqlx(json)]
    pub state: crate::wizard::WizardState,
    pub status: SessionStatus,
    pub lead_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub converted_at: Option<DateTime<Utc>>,
}

/// One debounced wizard write: the latest reducer output for a token.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub token: String,
    pub current_step: i32,
    pub highest_step: i32,
    pub state: crate::wizard::WizardState,
    /// `Completed` once the summary step is reached, else `InProgress`.
    pub status: SessionStatus,
}

// ============ API Request/Response Models ============

/// Lookup keys for the dedup ladder.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadLookup {
    pub external_id: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub name: Option<String>,
}

/// Body of `POST /api/leads`. Validated before any other work.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadSubmission {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location: Option<Location>,
    pub household_size: Option<i32>,
    pub monthly_bill: Option<f64>,
    pub system_id: Option<String>,
    pub include_pv: Option<bool>,
    pub battery_id: Option<String>,
    pub grant_type: Option<GrantType>,
    pub payment_method: Option<PaymentMethod>,
    pub loan_term_months: Option<u32>,
    pub notes: Option<String>,
    pub source: Option<String>,
    /// External CRM reference of a prefilled lead; decides update vs insert.
    pub crm_lead_id: Option<String>,
    pub wizard_session_token: Option<String>,
}

/// Body of `PATCH /api/leads`: the lead is located by `id`, else by `email`.
///
/// Only customer-editable columns. Prices, grant, savings and the priority
/// score are derived server-side; unknown keys such as `grant_amount` are
/// ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadPatch {
    pub id: Option<Uuid>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location: Option<Location>,
    pub household_size: Option<i32>,
    pub monthly_bill: Option<f64>,
    pub system_id: Option<String>,
    pub include_pv: Option<bool>,
    pub battery_id: Option<String>,
    pub grant_type: Option<GrantType>,
    pub payment_method: Option<PaymentMethod>,
    pub loan_term_months: Option<u32>,
    pub status: Option<LeadStatus>,
    pub notes: Option<String>,
}

impl LeadPatch {
    /// Whether the patch touches an input of the stored quote.
    pub fn changes_pricing(&self) -> bool {
        self.location.is_some()
            || self.household_size.is_some()
            || self.monthly_bill.is_some()
            || self.system_id.is_some()
            || self.include_pv.is_some()
            || self.battery_id.is_some()
            || self.grant_type.is_some()
            || self.payment_method.is_some()
            || self.loan_term_months.is_some()
    }
}

/// Outcome of one leg of the store/CRM dual write.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WriteOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WriteOutcome {
    pub fn success() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            ok: false,
            error: Some(error.to_string()),
        }
    }

    pub fn skipped(reason: &str) -> Self {
        Self {
            ok: false,
            error: Some(reason.to_string()),
        }
    }
}

/// Response of `POST /api/leads` and `PATCH /api/leads`.
#[derive(Debug, Serialize)]
pub struct LeadResponse {
    pub success: bool,
    pub lead_id: Option<Uuid>,
    pub crm_lead_id: Option<String>,
    /// `true` when an existing lead was updated instead of inserted.
    pub updated: bool,
    pub store: WriteOutcome,
    pub crm: WriteOutcome,
}
