use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::LeadStatus;

/// CRM webhook body - can be a single event or an array
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CrmWebhookPayload {
    Single(CrmLeadEvent),
    Batch(Vec<CrmLeadEvent>),
}

impl CrmWebhookPayload {
    /// Convert to a vec of events for uniform processing
    pub fn into_events(self) -> Vec<CrmLeadEvent> {
        match self {
            CrmWebhookPayload::Single(event) => vec![event],
            CrmWebhookPayload::Batch(events) => events,
        }
    }
}

/// One lead create/edit notification from the CRM workflow rule.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CrmLeadEvent {
    /// CRM record id
    pub id: String,

    /// e.g. "lead.created", "lead.updated"
    #[serde(default)]
    pub action: Option<String>,

    /// CRM-side modification time. Events not newer than the stored lead are ignored.
    #[serde(default, alias = "Modified_Time")]
    pub modified_time: Option<String>,

    #[serde(default, alias = "Full_Name")]
    pub full_name: Option<String>,
    #[serde(default, alias = "First_Name")]
    pub first_name: Option<String>,
    #[serde(default, alias = "Last_Name")]
    pub last_name: Option<String>,
    #[serde(default, alias = "Email")]
    pub email: Option<String>,
    #[serde(default, alias = "Phone")]
    pub phone: Option<String>,
    #[serde(default, alias = "Mobile")]
    pub mobile: Option<String>,
    #[serde(default, alias = "Street")]
    pub street: Option<String>,
    #[serde(default, alias = "Lead_Status")]
    pub lead_status: Option<String>,
    #[serde(default, alias = "Description")]
    pub description: Option<String>,

    /// Remaining CRM fields, kept for logging
    #[serde(flatten)]
    pub raw: Value,
}

impl CrmLeadEvent {
    /// Full name, else first and last name joined.
    pub fn name(&self) -> Option<String> {
        let full = self.full_name.as_deref().map(str::trim).filter(|n| !n.is_empty());
        if let Some(full) = full {
            return Some(full.to_string());
        }
        let joined = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        (!joined.is_empty()).then_some(joined)
    }

    /// Phone, falling back to mobile.
    pub fn phone_number(&self) -> Option<&str> {
        self.phone
            .as_deref()
            .or(self.mobile.as_deref())
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    /// Pipeline status for the CRM's lead status picklist value, when it maps to one.
    pub fn status(&self) -> Option<LeadStatus> {
        let value = self.lead_status.as_deref()?.trim().to_lowercase();
        match value.as_str() {
            "not contacted" | "new" => Some(LeadStatus::New),
            "contacted" | "attempted to contact" | "contact in future" => {
                Some(LeadStatus::Contacted)
            }
            "pre-qualified" | "qualified" => Some(LeadStatus::Qualified),
            "quoted" => Some(LeadStatus::Quoted),
            "signed" | "converted" => Some(LeadStatus::Signed),
            "installed" => Some(LeadStatus::Installed),
            "lost lead" | "junk lead" | "not qualified" | "lost" => Some(LeadStatus::Lost),
            _ => None,
        }
    }
}

/// Response sent back to the CRM webhook
#[derive(Debug, Serialize)]
pub struct CrmWebhookResponse {
    pub status: String,
    pub received: usize,
    pub created: usize,
    pub updated: usize,
    /// Events not newer than the stored lead.
    pub stale: usize,
    /// Events matching a lead already linked to another CRM record.
    pub conflicts: usize,
    pub failed: usize,
}
