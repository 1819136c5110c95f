//! Builds the derived pricing fields shown in the wizard and stored on a lead.

use serde::{Deserialize, Serialize};

use crate::catalog::{self, BatteryOption, SystemPackage};
use crate::errors::AppError;
use crate::financing::{self, FinancingOption};
use crate::grant_scheme::GrantScheme;
use crate::models::{GrantType, LeadFields, Location, PaymentMethod};
use crate::tariff;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuoteInput {
    pub monthly_bill: f64,
    /// 0 marks a business customer.
    pub household_size: i32,
    #[serde(default)]
    pub location: Location,
    /// Catalog package. Recommended from consumption when absent.
    pub system_id: Option<String>,
    pub battery_id: Option<String>,
    #[serde(default)]
    pub grant_type: GrantType,
    /// `false` prices a battery retrofit without panels.
    #[serde(default = "default_include_pv")]
    pub include_pv: bool,
    pub payment_method: Option<PaymentMethod>,
    pub loan_term_months: Option<u32>,
}

fn default_include_pv() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub consumption_kwh: f64,
    pub annual_consumption_kwh: f64,
    pub system: Option<SystemPackage>,
    pub battery: Option<BatteryOption>,
    pub grant_type: GrantType,
    pub total_price: f64,
    pub grant_amount: f64,
    pub net_price: f64,
    pub annual_production_kwh: f64,
    pub annual_savings: f64,
    pub payback_years: f64,
    pub lifetime_savings: f64,
    pub financing_options: Vec<FinancingOption>,
    /// Set when the customer chose a loan.
    pub monthly_payment: Option<f64>,
    pub loan_term_months: Option<u32>,
}

impl Quote {
    /// Pricing columns of a lead carrying this quote.
    pub fn to_lead_fields(&self, input: &QuoteInput) -> LeadFields {
        LeadFields {
            location: Some(input.location),
            household_size: Some(input.household_size),
            monthly_bill: Some(input.monthly_bill),
            consumption_kwh: Some(self.consumption_kwh),
            system_id: self.system.as_ref().map(|s| s.id.to_string()),
            system_size_kw: self.system.as_ref().map(|s| s.size_kw),
            battery_id: self.battery.as_ref().map(|b| b.id.to_string()),
            battery_kwh: self.battery.as_ref().map(|b| b.capacity_kwh),
            grant_type: Some(self.grant_type),
            total_price: Some(self.total_price),
            grant_amount: Some(self.grant_amount),
            net_price: Some(self.net_price),
            annual_savings: Some(self.annual_savings),
            payback_years: Some(self.payback_years),
            payment_method: input.payment_method,
            loan_term_months: self.loan_term_months.map(|t| t as i32),
            monthly_payment: self.monthly_payment,
            ..LeadFields::default()
        }
    }
}

pub fn build_quote(scheme: &GrantScheme, input: &QuoteInput) -> Result<Quote, AppError> {
    let consumption_kwh = tariff::estimate_consumption(scheme, input.monthly_bill, input.household_size);
    let annual_consumption_kwh = consumption_kwh * 12.0;

    let system = if input.include_pv {
        match input.system_id.as_deref() {
            Some(id) => Some(
                catalog::find_system(id)
                    .ok_or_else(|| AppError::BadRequest(format!("Unknown system package '{}'", id)))?,
            ),
            None => Some(catalog::recommend_system(annual_consumption_kwh, scheme.specific_yield)),
        }
    } else {
        None
    };

    let battery = match input.battery_id.as_deref() {
        Some(id) => Some(
            catalog::find_battery(id)
                .ok_or_else(|| AppError::BadRequest(format!("Unknown battery option '{}'", id)))?,
        ),
        None => None,
    };

    if system.is_none() && battery.is_none() {
        return Err(AppError::BadRequest(
            "A battery is required when no PV system is quoted".to_string(),
        ));
    }

    // A battery grant needs a battery; fall back to the PV-only path without one.
    let grant_type = match (input.grant_type, battery) {
        (GrantType::PvBattery, None) => GrantType::PvOnly,
        (grant_type, _) => grant_type,
    };

    let system_kw = system.map(|s| s.size_kw).unwrap_or(0.0);
    let battery_kwh = battery.map(|b| b.capacity_kwh).unwrap_or(0.0);
    let total_price = system.map(|s| s.list_price).unwrap_or(0.0)
        + battery.map(|b| b.list_price).unwrap_or(0.0);

    let grant_amount = tariff::calculate_grant_amount(
        scheme,
        system_kw,
        battery_kwh,
        grant_type,
        input.location,
        system.map(|s| s.eligible_price),
        battery.map(|b| b.eligible_price),
    );
    let net_price = (total_price - grant_amount).max(0.0);

    let annual_production_kwh = tariff::annual_production_kwh(scheme, system_kw);
    let annual_savings = if system.is_some() {
        tariff::calculate_annual_savings_with_grant(scheme, annual_production_kwh, grant_type)
    } else {
        tariff::calculate_battery_only_savings(scheme, battery_kwh, annual_consumption_kwh)
    };

    let financing_options = financing::get_financing_options(scheme, net_price)?;
    let (monthly_payment, loan_term_months) = match input.payment_method {
        Some(PaymentMethod::Loan) => {
            let term = input
                .loan_term_months
                .or_else(|| scheme.loan_terms_months.last().copied())
                .unwrap_or(120);
            (
                Some(financing::calculate_monthly_payment(
                    net_price,
                    scheme.loan_rate_percent,
                    term,
                )?),
                Some(term),
            )
        }
        _ => (None, None),
    };

    Ok(Quote {
        consumption_kwh,
        annual_consumption_kwh,
        system: system.cloned(),
        battery: battery.cloned(),
        grant_type,
        total_price,
        grant_amount,
        net_price,
        annual_production_kwh,
        annual_savings,
        payback_years: tariff::calculate_payback_years(net_price, annual_savings),
        lifetime_savings: tariff::calculate_25_year_savings(scheme, annual_savings),
        financing_options,
        monthly_payment,
        loan_term_months,
    })
}
