//! Wizard step controller.
//!
//! [`apply_action`] is a pure reducer: it merges the action into the state,
//! moves the step counter and recomputes the derived quote. Persistence lives
//! in [`crate::session_writer`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::grant_scheme::GrantScheme;
use crate::models::{GrantType, LeadFields, Location, PaymentMethod, SessionSnapshot, SessionStatus};
use crate::quote::{self, QuoteInput};

pub const TOTAL_STEPS: i32 = 7;

pub const STEP_LOCATION: i32 = 1;
pub const STEP_CONSUMPTION: i32 = 2;
pub const STEP_SYSTEM: i32 = 3;
pub const STEP_FINANCING: i32 = 4;
pub const STEP_CONTACT: i32 = 5;
pub const STEP_PREFERENCES: i32 = 6;
pub const STEP_SUMMARY: i32 = 7;

/// Pricing derived from the current selections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedQuote {
    pub consumption_kwh: f64,
    pub system_id: Option<String>,
    pub system_size_kw: f64,
    pub battery_kwh: f64,
    pub grant_type: GrantType,
    pub total_price: f64,
    pub grant_amount: f64,
    pub net_price: f64,
    pub annual_savings: f64,
    pub payback_years: f64,
    pub lifetime_savings: f64,
    pub monthly_payment: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WizardState {
    pub current_step: i32,
    pub highest_step: i32,
    /// Loaded from an existing lead: contact and preference steps are skipped.
    pub prefilled: bool,
    pub lead_id: Option<Uuid>,

    pub location: Option<Location>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    pub monthly_bill: Option<f64>,
    pub household_size: Option<i32>,

    pub system_id: Option<String>,
    pub include_pv: bool,
    pub battery_id: Option<String>,
    pub grant_type: Option<GrantType>,

    pub payment_method: Option<PaymentMethod>,
    pub loan_term_months: Option<u32>,

    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,

    pub contact_preference: Option<String>,
    pub installation_timeline: Option<String>,
    pub notes: Option<String>,

    pub quote: Option<DerivedQuote>,
}

impl Default for WizardState {
    fn default() -> Self {
        Self {
            current_step: STEP_LOCATION,
            highest_step: STEP_LOCATION,
            prefilled: false,
            lead_id: None,
            location: None,
            address: None,
            latitude: None,
            longitude: None,
            monthly_bill: None,
            household_size: None,
            system_id: None,
            include_pv: true,
            battery_id: None,
            grant_type: None,
            payment_method: None,
            loan_term_months: None,
            name: None,
            email: None,
            phone: None,
            contact_preference: None,
            installation_timeline: None,
            notes: None,
            quote: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WizardAction {
    SetStep {
        step: i32,
    },
    NextStep,
    PrevStep,
    SetLocation {
        location: Option<Location>,
        address: Option<String>,
        latitude: Option<f64>,
        longitude: Option<f64>,
    },
    SetConsumption {
        monthly_bill: Option<f64>,
        household_size: Option<i32>,
    },
    /// `system_id: None` goes back to the recommended package.
    SetSystem {
        system_id: Option<String>,
        include_pv: Option<bool>,
    },
    /// `battery_id: None` removes the battery.
    SetBattery {
        battery_id: Option<String>,
    },
    SetGrantType {
        grant_type: GrantType,
    },
    SetFinancing {
        payment_method: Option<PaymentMethod>,
        loan_term_months: Option<u32>,
    },
    SetContact {
        name: Option<String>,
        email: Option<String>,
        phone: Option<String>,
    },
    SetPreferences {
        contact_preference: Option<String>,
        installation_timeline: Option<String>,
        notes: Option<String>,
    },
    Prefill {
        lead_id: Option<Uuid>,
        #[serde(default)]
        lead: LeadFields,
    },
    Reset,
}

fn merge<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

fn clamp_step(step: i32) -> i32 {
    step.clamp(STEP_LOCATION, TOTAL_STEPS)
}

fn next_step(state: &WizardState) -> i32 {
    if state.prefilled && state.current_step == STEP_FINANCING {
        return STEP_SUMMARY;
    }
    clamp_step(state.current_step + 1)
}

fn prev_step(state: &WizardState) -> i32 {
    if state.prefilled && state.current_step == STEP_SUMMARY {
        return STEP_FINANCING;
    }
    clamp_step(state.current_step - 1)
}

fn prefill(state: &mut WizardState, lead_id: Option<Uuid>, lead: LeadFields) {
    state.prefilled = true;
    merge(&mut state.lead_id, lead_id);
    merge(&mut state.location, lead.location);
    merge(&mut state.address, lead.address);
    merge(&mut state.latitude, lead.latitude);
    merge(&mut state.longitude, lead.longitude);
    merge(&mut state.monthly_bill, lead.monthly_bill);
    merge(&mut state.household_size, lead.household_size);
    merge(&mut state.system_id, lead.system_id);
    merge(&mut state.battery_id, lead.battery_id);
    merge(&mut state.grant_type, lead.grant_type);
    merge(&mut state.payment_method, lead.payment_method);
    merge(
        &mut state.loan_term_months,
        lead.loan_term_months.and_then(|t| u32::try_from(t).ok()),
    );
    merge(&mut state.name, lead.name);
    merge(&mut state.email, lead.email);
    merge(&mut state.phone, lead.phone);
    merge(&mut state.notes, lead.notes);
}

/// Applies one action without touching the derived quote.
pub fn reduce(state: &WizardState, action: WizardAction) -> WizardState {
    let mut next = state.clone();
    match action {
        WizardAction::SetStep { step } => next.current_step = clamp_step(step),
        WizardAction::NextStep => next.current_step = next_step(state),
        WizardAction::PrevStep => next.current_step = prev_step(state),
        WizardAction::SetLocation {
            location,
            address,
            latitude,
            longitude,
        } => {
            merge(&mut next.location, location);
            merge(&mut next.address, address);
            merge(&mut next.latitude, latitude);
            merge(&mut next.longitude, longitude);
        }
        WizardAction::SetConsumption {
            monthly_bill,
            household_size,
        } => {
            merge(&mut next.monthly_bill, monthly_bill);
            merge(&mut next.household_size, household_size);
        }
        WizardAction::SetSystem {
            system_id,
            include_pv,
        } => {
            next.system_id = system_id;
            if let Some(include_pv) = include_pv {
                next.include_pv = include_pv;
            }
        }
        WizardAction::SetBattery { battery_id } => next.battery_id = battery_id,
        WizardAction::SetGrantType { grant_type } => next.grant_type = Some(grant_type),
        WizardAction::SetFinancing {
            payment_method,
            loan_term_months,
        } => {
            merge(&mut next.payment_method, payment_method);
            merge(&mut next.loan_term_months, loan_term_months);
        }
        WizardAction::SetContact { name, email, phone } => {
            merge(&mut next.name, name);
            merge(&mut next.email, email);
            merge(&mut next.phone, phone);
        }
        WizardAction::SetPreferences {
            contact_preference,
            installation_timeline,
            notes,
        } => {
            merge(&mut next.contact_preference, contact_preference);
            merge(&mut next.installation_timeline, installation_timeline);
            merge(&mut next.notes, notes);
        }
        WizardAction::Prefill { lead_id, lead } => prefill(&mut next, lead_id, lead),
        WizardAction::Reset => return WizardState::default(),
    }
    next.highest_step = next.highest_step.max(next.current_step);
    next
}

impl WizardState {
    /// Quote input once the consumption step has data.
    pub fn quote_input(&self) -> Option<QuoteInput> {
        Some(QuoteInput {
            monthly_bill: self.monthly_bill?,
            household_size: self.household_size.unwrap_or(1),
            location: self.location.unwrap_or_default(),
            system_id: self.system_id.clone(),
            battery_id: self.battery_id.clone(),
            grant_type: self.grant_type.unwrap_or_default(),
            include_pv: self.include_pv,
            payment_method: self.payment_method,
            loan_term_months: self.loan_term_months,
        })
    }

    /// Recomputes [`WizardState::quote`] from the selections.
    pub fn refresh_quote(&mut self, scheme: &GrantScheme) {
        self.quote = self.quote_input().and_then(|input| {
            match quote::build_quote(scheme, &input) {
                Ok(q) => Some(DerivedQuote {
                    consumption_kwh: q.consumption_kwh,
                    system_id: q.system.as_ref().map(|s| s.id.to_string()),
                    system_size_kw: q.system.as_ref().map_or(0.0, |s| s.size_kw),
                    battery_kwh: q.battery.as_ref().map_or(0.0, |b| b.capacity_kwh),
                    grant_type: q.grant_type,
                    total_price: q.total_price,
                    grant_amount: q.grant_amount,
                    net_price: q.net_price,
                    annual_savings: q.annual_savings,
                    payback_years: q.payback_years,
                    lifetime_savings: q.lifetime_savings,
                    monthly_payment: q.monthly_payment,
                }),
                Err(e) => {
                    tracing::debug!("No quote for current wizard selections: {}", e);
                    None
                }
            }
        });
    }

    /// Session row for this state.
    pub fn snapshot(&self, token: &str) -> SessionSnapshot {
        SessionSnapshot {
            token: token.to_string(),
            current_step: self.current_step,
            highest_step: self.highest_step,
            state: self.clone(),
            status: if self.current_step >= STEP_SUMMARY {
                SessionStatus::Completed
            } else {
                SessionStatus::InProgress
            },
        }
    }
}

/// Reduces and refreshes the derived quote.
pub fn apply_action(state: &WizardState, action: WizardAction, scheme: &GrantScheme) -> WizardState {
    let mut next = reduce(state, action);
    next.refresh_quote(scheme);
    next
}
