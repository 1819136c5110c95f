//! In-process [`LeadStore`] for tests and local runs without Postgres.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{
    Communication, Lead, LeadFields, LeadStatus, NewCommunication, SessionSnapshot, SessionStatus,
    WizardSession,
};
use crate::store::LeadStore;

#[derive(Default)]
struct Tables {
    leads: Vec<Lead>,
    communications: Vec<Communication>,
    sessions: HashMap<String, WizardSession>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

fn apply(lead: &mut Lead, f: &LeadFields) {
    macro_rules! set {
        ($($field:ident),* $(,)?) => {
            $( if let Some(value) = &f.$field { lead.$field = Some(value.clone()); } )*
        };
    }
    set!(
        email, phone, address, latitude, longitude, location, household_size, monthly_bill,
        consumption_kwh, system_id, system_size_kw, battery_id, battery_kwh, grant_type,
        total_price, grant_amount, net_price, annual_savings, payback_years, payment_method,
        loan_term_months, monthly_payment, priority_score, priority_level, source, crm_lead_id,
        crm_modified_at, notes, wizard_session_token,
    );
    if let Some(name) = &f.name {
        lead.name = name.clone();
    }
    if let Some(status) = f.status {
        lead.status = status;
    }
}

fn phone_digits(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts with an explicit creation time.
    pub async fn insert_lead_at(
        &self,
        fields: &LeadFields,
        created_at: DateTime<Utc>,
    ) -> Result<Lead, AppError> {
        let name = fields
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| AppError::BadRequest("Lead name is required".to_string()))?;

        let mut lead = Lead {
            id: Uuid::new_v4(),
            created_at,
            updated_at: created_at,
            deleted_at: None,
            name: name.to_string(),
            email: None,
            phone: None,
            address: None,
            latitude: None,
            longitude: None,
            location: None,
            household_size: None,
            monthly_bill: None,
            consumption_kwh: None,
            system_id: None,
            system_size_kw: None,
            battery_id: None,
            battery_kwh: None,
            grant_type: None,
            total_price: None,
            grant_amount: None,
            net_price: None,
            annual_savings: None,
            payback_years: None,
            payment_method: None,
            loan_term_months: None,
            monthly_payment: None,
            status: LeadStatus::New,
            priority_score: None,
            priority_level: None,
            source: None,
            crm_lead_id: None,
            crm_modified_at: None,
            opted_out: false,
            opted_out_at: None,
            notes: None,
            wizard_session_token: None,
        };
        apply(&mut lead, fields);

        self.tables.lock().await.leads.push(lead.clone());
        Ok(lead)
    }

    /// Soft-deletes a lead.
    pub async fn soft_delete(&self, id: Uuid) {
        let mut tables = self.tables.lock().await;
        if let Some(lead) = tables.leads.iter_mut().find(|l| l.id == id) {
            lead.deleted_at = Some(Utc::now());
        }
    }

    pub async fn communications(&self, lead_id: Uuid) -> Vec<Communication> {
        let tables = self.tables.lock().await;
        tables
            .communications
            .iter()
            .filter(|c| c.lead_id == lead_id)
            .cloned()
            .collect()
    }

    async fn find_latest<F>(&self, predicate: F) -> Option<Lead>
    where
        F: Fn(&Lead) -> bool + Send,
    {
        let tables = self.tables.lock().await;
        tables
            .leads
            .iter()
            .filter(|l| l.deleted_at.is_none() && predicate(l))
            .max_by_key(|l| l.created_at)
            .cloned()
    }
}

#[async_trait]
impl LeadStore for MemoryStore {
    async fn find_lead_by_id(&self, id: Uuid) -> Result<Option<Lead>, AppError> {
        Ok(self.find_latest(|l| l.id == id).await)
    }

    async fn find_lead_by_crm_id(&self, crm_lead_id: &str) -> Result<Option<Lead>, AppError> {
        Ok(self
            .find_latest(|l| l.crm_lead_id.as_deref() == Some(crm_lead_id))
            .await)
    }

    async fn find_lead_by_email(&self, email: &str) -> Result<Option<Lead>, AppError> {
        Ok(self.find_latest(|l| l.email.as_deref() == Some(email)).await)
    }

    async fn find_lead_by_phone(&self, phone: &str) -> Result<Option<Lead>, AppError> {
        Ok(self.find_latest(|l| l.phone.as_deref() == Some(phone)).await)
    }

    async fn find_lead_by_phone_suffix(&self, digits: &str) -> Result<Option<Lead>, AppError> {
        Ok(self
            .find_latest(|l| {
                l.phone
                    .as_deref()
                    .is_some_and(|p| phone_digits(p).ends_with(digits))
            })
            .await)
    }

    async fn find_lead_by_name(&self, name: &str) -> Result<Option<Lead>, AppError> {
        let needle = name.to_lowercase();
        Ok(self
            .find_latest(|l| l.name.to_lowercase().contains(&needle))
            .await)
    }

    async fn insert_lead(&self, fields: &LeadFields) -> Result<Lead, AppError> {
        self.insert_lead_at(fields, Utc::now()).await
    }

    async fn update_lead(&self, id: Uuid, fields: &LeadFields) -> Result<Lead, AppError> {
        let mut tables = self.tables.lock().await;
        let lead = tables
            .leads
            .iter_mut()
            .find(|l| l.id == id && l.deleted_at.is_none())
            .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", id)))?;
        apply(lead, fields);
        lead.updated_at = Utc::now();
        Ok(lead.clone())
    }

    async fn set_opted_out(&self, id: Uuid) -> Result<Lead, AppError> {
        let mut tables = self.tables.lock().await;
        let lead = tables
            .leads
            .iter_mut()
            .find(|l| l.id == id && l.deleted_at.is_none())
            .ok_or_else(|| AppError::NotFound(format!("Lead {} not found", id)))?;
        if !lead.opted_out {
            let now = Utc::now();
            lead.opted_out = true;
            lead.opted_out_at = Some(now);
            lead.updated_at = now;
        }
        Ok(lead.clone())
    }

    async fn list_followup_candidates(
        &self,
        created_after: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Lead>, AppError> {
        let tables = self.tables.lock().await;
        let mut leads: Vec<Lead> = tables
            .leads
            .iter()
            .filter(|l| {
                l.deleted_at.is_none()
                    && !l.opted_out
                    && LeadStatus::FOLLOW_UP.contains(&l.status)
                    && l.created_at >= created_after
            })
            .cloned()
            .collect();
        leads.sort_by_key(|l| l.created_at);
        leads.truncate(limit.max(0) as usize);
        Ok(leads)
    }

    async fn sent_templates(&self, lead_id: Uuid) -> Result<Vec<String>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .communications
            .iter()
            .filter(|c| c.lead_id == lead_id)
            .filter_map(|c| c.template.clone())
            .collect())
    }

    async fn record_communication(
        &self,
        communication: &NewCommunication,
    ) -> Result<Communication, AppError> {
        let row = Communication {
            id: Uuid::new_v4(),
            lead_id: communication.lead_id,
            channel: communication.channel,
            template: communication.template.clone(),
            external_message_id: communication.external_message_id.clone(),
            created_at: Utc::now(),
        };
        self.tables.lock().await.communications.push(row.clone());
        Ok(row)
    }

    async fn get_session(&self, token: &str) -> Result<Option<WizardSession>, AppError> {
        Ok(self.tables.lock().await.sessions.get(token).cloned())
    }

    async fn save_session(&self, snapshot: &SessionSnapshot) -> Result<(), AppError> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();
        match tables.sessions.get_mut(&snapshot.token) {
            Some(session) if session.status == SessionStatus::ConvertedToLead => {}
            Some(session) => {
                session.current_step = snapshot.current_step;
                session.highest_step = session.highest_step.max(snapshot.highest_step);
                session.state = snapshot.state.clone();
                session.status = snapshot.status;
                session.updated_at = now;
            }
            None => {
                tables.sessions.insert(
                    snapshot.token.clone(),
                    WizardSession {
                        token: snapshot.token.clone(),
                        current_step: snapshot.current_step,
                        highest_step: snapshot.highest_step,
                        state: snapshot.state.clone(),
                        status: snapshot.status,
                        lead_id: None,
                        created_at: now,
                        updated_at: now,
                        converted_at: None,
                    },
                );
            }
        }
        Ok(())
    }

    async fn convert_session(&self, token: &str, lead_id: Uuid) -> Result<bool, AppError> {
        let mut tables = self.tables.lock().await;
        match tables.sessions.get_mut(token) {
            Some(session) if session.status != SessionStatus::ConvertedToLead => {
                let now = Utc::now();
                session.status = SessionStatus::ConvertedToLead;
                session.lead_id = Some(lead_id);
                session.converted_at = Some(now);
                session.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn abandon_stale_sessions(&self, idle_before: DateTime<Utc>) -> Result<u64, AppError> {
        let mut tables = self.tables.lock().await;
        let mut swept = 0;
        for session in tables.sessions.values_mut() {
            if session.status == SessionStatus::InProgress && session.updated_at < idle_before {
                session.status = SessionStatus::Abandoned;
                swept += 1;
            }
        }
        Ok(swept)
    }
}
