//! Matching an incoming submission against existing leads.
//!
//! Tiers run in a fixed order and the first tier with a hit wins; signals from
//! different tiers are never combined.

use crate::errors::AppError;
use crate::models::{Lead, LeadLookup};
use crate::store::LeadStore;

/// Country calling code prepended to bare 8-digit Maltese numbers.
pub const COUNTRY_CODE: &str = "356";

/// Digits compared by the suffix tier.
pub const PHONE_SUFFIX_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    ExternalId,
    Email,
    PhoneNormalized,
    PhoneRaw,
    PhoneSuffix,
    Name,
}

#[derive(Debug, Clone)]
pub struct LeadMatch {
    pub lead: Lead,
    pub tier: MatchTier,
}

fn digits(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// `+` and the digits of `raw`, with the country code prepended to bare
/// 8-digit numbers. `None` when there are no digits.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits = digits(raw);
    if digits.is_empty() {
        return None;
    }
    if digits.len() == PHONE_SUFFIX_LEN {
        Some(format!("+{}{}", COUNTRY_CODE, digits))
    } else {
        Some(format!("+{}", digits))
    }
}

/// Last 8 digits of `raw`, or `None` for shorter inputs.
pub fn phone_suffix(raw: &str) -> Option<String> {
    let digits = digits(raw);
    if digits.len() < PHONE_SUFFIX_LEN {
        return None;
    }
    Some(digits[digits.len() - PHONE_SUFFIX_LEN..].to_string())
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Finds the lead a submission refers to.
///
/// Order: CRM id, email (lower-cased), phone (normalised, raw, last-8-digit
/// suffix), name substring.
pub async fn find_existing_lead(
    store: &dyn LeadStore,
    lookup: &LeadLookup,
) -> Result<Option<LeadMatch>, AppError> {
    let found = |lead: Lead, tier: MatchTier| {
        tracing::debug!("Dedup hit on {:?}: lead {}", tier, lead.id);
        Ok(Some(LeadMatch { lead, tier }))
    };

    if let Some(external_id) = non_empty(&lookup.external_id) {
        if let Some(lead) = store.find_lead_by_crm_id(external_id).await? {
            return found(lead, MatchTier::ExternalId);
        }
    }

    if let Some(email) = non_empty(&lookup.email) {
        if let Some(lead) = store.find_lead_by_email(&email.to_lowercase()).await? {
            return found(lead, MatchTier::Email);
        }
    }

    if let Some(phone) = non_empty(&lookup.phone) {
        if let Some(normalized) = normalize_phone(phone) {
            if let Some(lead) = store.find_lead_by_phone(&normalized).await? {
                return found(lead, MatchTier::PhoneNormalized);
            }
        }
        if let Some(lead) = store.find_lead_by_phone(phone).await? {
            return found(lead, MatchTier::PhoneRaw);
        }
        if let Some(suffix) = phone_suffix(phone) {
            if let Some(lead) = store.find_lead_by_phone_suffix(&suffix).await? {
                return found(lead, MatchTier::PhoneSuffix);
            }
        }
    }

    if let Some(name) = non_empty(&lookup.name) {
        if let Some(lead) = store.find_lead_by_name(name).await? {
            return found(lead, MatchTier::Name);
        }
    }

    Ok(None)
}
