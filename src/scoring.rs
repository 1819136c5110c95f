//! Lead priority scoring.

use serde::Serialize;

use crate::models::{GrantType, LeadFields, PaymentMethod, PriorityLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LeadPriority {
    pub score: i32,
    pub level: PriorityLevel,
}

fn size_points(system_size_kw: f64) -> i32 {
    match system_size_kw {
        kw if kw >= 10.0 => 30,
        kw if kw >= 7.0 => 25,
        kw if kw >= 5.0 => 20,
        kw if kw >= 3.0 => 10,
        kw if kw > 0.0 => 5,
        _ => 0,
    }
}

fn price_points(total_price: f64) -> i32 {
    match total_price {
        p if p >= 15_000.0 => 25,
        p if p >= 10_000.0 => 20,
        p if p >= 6_000.0 => 15,
        p if p >= 3_000.0 => 10,
        p if p > 0.0 => 5,
        _ => 0,
    }
}

fn has_text(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Additive score out of 100 from the lead's current values.
pub fn calculate_lead_priority(lead: &LeadFields) -> LeadPriority {
    let mut score = size_points(lead.system_size_kw.unwrap_or(0.0))
        + price_points(lead.total_price.unwrap_or(0.0));

    if lead.battery_kwh.is_some_and(|kwh| kwh > 0.0) || has_text(&lead.battery_id) {
        score += 15;
    }
    if lead.grant_type.is_some_and(|g| g != GrantType::None) {
        score += 10;
    }
    if lead.payment_method == Some(PaymentMethod::Loan) {
        score += 10;
    }
    if lead.monthly_bill.is_some_and(|b| b > 0.0) || lead.consumption_kwh.is_some_and(|c| c > 0.0) {
        score += 5;
    }
    if has_text(&lead.address) {
        score += 5;
    }

    let level = if score >= 70 {
        PriorityLevel::High
    } else if score >= 40 {
        PriorityLevel::Medium
    } else {
        PriorityLevel::Low
    };

    LeadPriority { score, level }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_lead_is_low() {
        let priority = calculate_lead_priority(&LeadFields::default());
        assert_eq!(priority.score, 0);
        assert_eq!(priority.level, PriorityLevel::Low);
    }

    #[test]
    fn test_full_lead_scores_100() {
        let lead = LeadFields {
            system_size_kw: Some(10.0),
            total_price: Some(21_200.0),
            battery_kwh: Some(10.0),
            grant_type: Some(GrantType::PvBattery),
            payment_method: Some(PaymentMethod::Loan),
            monthly_bill: Some(200.0),
            address: Some("Triq il-Kbira, Mosta".to_string()),
            ..LeadFields::default()
        };
        let priority = calculate_lead_priority(&lead);
        assert_eq!(priority.score, 100);
        assert_eq!(priority.level, PriorityLevel::High);
    }

    #[test]
    fn test_bucket_boundaries() {
        assert_eq!(size_points(7.0), 25);
        assert_eq!(size_points(6.99), 20);
        assert_eq!(size_points(0.1), 5);
        assert_eq!(price_points(6_000.0), 15);
        assert_eq!(price_points(2_999.0), 5);
        assert_eq!(price_points(0.0), 0);
    }

    #[test]
    fn test_essential_with_battery_is_high() {
        // 20 size + 25 price + 15 battery + 10 grant + 5 consumption
        let lead = LeadFields {
            system_size_kw: Some(5.22),
            total_price: Some(18_400.0),
            battery_id: Some("battery-15kwh".to_string()),
            grant_type: Some(GrantType::PvBattery),
            payment_method: Some(PaymentMethod::Cash),
            monthly_bill: Some(150.0),
            address: Some("   ".to_string()),
            ..LeadFields::default()
        };
        let priority = calculate_lead_priority(&lead);
        assert_eq!(priority.score, 75);
        assert_eq!(priority.level, PriorityLevel::High);
    }

    #[test]
    fn test_declined_grant_earns_nothing() {
        let lead = LeadFields {
            grant_type: Some(GrantType::None),
            system_size_kw: Some(7.4),
            total_price: Some(8_600.0),
            ..LeadFields::default()
        };
        let priority = calculate_lead_priority(&lead);
        assert_eq!(priority.score, 40);
        assert_eq!(priority.level, PriorityLevel::Medium);
    }
}
