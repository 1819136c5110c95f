//! Tariff and grant calculations.
//!
//! All functions are pure and take the scheme explicitly so a quote can be
//! re-priced against an older scheme year. Inputs are clamped instead of
//! rejected: a zero or negative bill yields zero consumption, never an error.

use crate::grant_scheme::GrantScheme;
use crate::models::{GrantType, Location};

/// Sentinel returned by [`calculate_payback_years`] when savings never repay the cost.
pub const PAYBACK_NEVER: f64 = 99.0;

/// Years covered by [`calculate_25_year_savings`].
pub const LIFETIME_YEARS: i32 = 25;

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Monthly consumption (kWh) implied by a monthly bill.
///
/// `household_size` 0 marks a business customer, which gets no eco-reduction rebate.
pub fn estimate_consumption(scheme: &GrantScheme, monthly_bill: f64, household_size: i32) -> f64 {
    let billable = (monthly_bill - scheme.standing_charge_monthly).max(0.0);
    let mut kwh = billable / scheme.blended_rate;
    if household_size > 0 {
        // The rebate made the bill smaller than the energy actually used.
        kwh /= 1.0 - scheme.eco_reduction;
    }
    kwh.round()
}

/// Yearly production of a PV system.
pub fn annual_production_kwh(scheme: &GrantScheme, system_size_kw: f64) -> f64 {
    (system_size_kw.max(0.0) * scheme.specific_yield).round()
}

fn pv_grant(scheme: &GrantScheme, system_size_kw: f64, system_price: Option<f64>) -> f64 {
    let mut grant = scheme.pv_per_kwp * system_size_kw.max(0.0);
    if let Some(price) = system_price {
        grant = grant.min(scheme.pv_percentage * price.max(0.0));
    }
    grant.min(scheme.pv_cap)
}

fn battery_grant(
    scheme: &GrantScheme,
    battery_kwh: f64,
    location: Location,
    battery_price: Option<f64>,
) -> f64 {
    let terms = scheme.battery_grant(location);
    let mut grant = terms.per_kwh * battery_kwh.max(0.0);
    if let Some(price) = battery_price {
        grant = grant.min(terms.percentage * price.max(0.0));
    }
    grant.min(terms.cap)
}

/// Grant in euros for a system/battery selection.
///
/// When a price is supplied the percentage-of-price cap applies on top of the
/// per-unit rate; without one the result is an estimate from the per-unit rate
/// alone. Quotes built from the catalog always pass prices.
pub fn calculate_grant_amount(
    scheme: &GrantScheme,
    system_size_kw: f64,
    battery_kwh: f64,
    grant_type: GrantType,
    location: Location,
    system_price: Option<f64>,
    battery_price: Option<f64>,
) -> f64 {
    match grant_type {
        GrantType::None => 0.0,
        GrantType::PvOnly => pv_grant(scheme, system_size_kw, system_price).round(),
        GrantType::PvBattery => {
            let pv = pv_grant(scheme, system_size_kw, system_price);
            let battery = battery_grant(scheme, battery_kwh, location, battery_price);
            (pv + battery).min(scheme.max_total(location)).round()
        }
    }
}

/// Yearly savings of a PV system: self-consumed share valued at the blended
/// rate, exported share at the feed-in tariff of the chosen grant path.
pub fn calculate_annual_savings_with_grant(
    scheme: &GrantScheme,
    annual_production_kwh: f64,
    grant_type: GrantType,
) -> f64 {
    let production = annual_production_kwh.max(0.0);
    let self_consumed = production * scheme.self_consumption_ratio;
    let exported = production * (1.0 - scheme.self_consumption_ratio);
    (self_consumed * scheme.self_consumption_rate(grant_type)
        + exported * scheme.feed_in_tariff(grant_type))
    .round()
}

/// Yearly savings of a battery added without PV: the battery shifts load out of
/// the household's marginal tariff band.
pub fn calculate_battery_only_savings(
    scheme: &GrantScheme,
    battery_kwh: f64,
    annual_consumption_kwh: f64,
) -> f64 {
    let throughput =
        battery_kwh.max(0.0) * scheme.battery_round_trip_efficiency * scheme.battery_cycles_per_year;
    (scheme.marginal_rate(annual_consumption_kwh.max(0.0)) * throughput).round()
}

/// Years until savings repay the cost, to one decimal. [`PAYBACK_NEVER`] when
/// there are no savings.
pub fn calculate_payback_years(total_cost: f64, annual_savings: f64) -> f64 {
    if !annual_savings.is_finite() || annual_savings <= 0.0 {
        return PAYBACK_NEVER;
    }
    if total_cost <= 0.0 {
        return 0.0;
    }
    round_to(total_cost / annual_savings, 1).min(PAYBACK_NEVER)
}

/// Savings over the panel lifetime with compounding yearly degradation.
pub fn calculate_25_year_savings(scheme: &GrantScheme, annual_savings: f64) -> f64 {
    let retained = 1.0 - scheme.annual_degradation;
    (0..LIFETIME_YEARS)
        .map(|year| annual_savings * retained.powi(year))
        .sum::<f64>()
        .round()
}
