//! Versioned grant and tariff constants.
//!
//! A scheme is immutable for its year. When policy changes, add a new
//! constant and point [`CURRENT`] at it instead of editing the old one.

use crate::models::{GrantType, Location};

/// One progressive tariff band: consumption up to `up_to_kwh` (annual) is billed at `rate`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TariffBand {
    pub up_to_kwh: f64,
    pub rate: f64,
}

/// Per-island battery grant terms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryGrant {
    pub per_kwh: f64,
    pub percentage: f64,
    pub cap: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GrantScheme {
    pub year: u16,
    /// Fixed monthly standing charge on the electricity bill (€).
    pub standing_charge_monthly: f64,
    /// Flat €/kWh used to turn a bill back into consumption.
    pub blended_rate: f64,
    /// Residential eco-reduction rebate share.
    pub eco_reduction: f64,
    /// €/kWh value of self-consumed energy when the grant is taken.
    pub blended_rate_with_grant: f64,
    /// €/kWh value of self-consumed energy when the grant is declined.
    pub blended_rate_without_grant: f64,
    pub fit_with_grant: f64,
    pub fit_without_grant: f64,
    pub self_consumption_ratio: f64,
    pub pv_per_kwp: f64,
    pub pv_percentage: f64,
    pub pv_cap: f64,
    pub battery_malta: BatteryGrant,
    pub battery_gozo: BatteryGrant,
    pub max_total_malta: f64,
    pub max_total_gozo: f64,
    /// kWh produced per installed kWp per year.
    pub specific_yield: f64,
    pub annual_degradation: f64,
    pub battery_round_trip_efficiency: f64,
    pub battery_cycles_per_year: f64,
    pub tariff_bands: &'static [TariffBand],
    /// Rate above the last band.
    pub top_band_rate: f64,
    pub loan_rate_percent: f64,
    pub loan_terms_months: &'static [u32],
}

impl GrantScheme {
    pub fn battery_grant(&self, location: Location) -> BatteryGrant {
        match location {
            Location::Malta => self.battery_malta,
            Location::Gozo => self.battery_gozo,
        }
    }

    pub fn max_total(&self, location: Location) -> f64 {
        match location {
            Location::Malta => self.max_total_malta,
            Location::Gozo => self.max_total_gozo,
        }
    }

    pub fn feed_in_tariff(&self, grant_type: GrantType) -> f64 {
        if grant_type.takes_grant() {
            self.fit_with_grant
        } else {
            self.fit_without_grant
        }
    }

    pub fn self_consumption_rate(&self, grant_type: GrantType) -> f64 {
        if grant_type.takes_grant() {
            self.blended_rate_with_grant
        } else {
            self.blended_rate_without_grant
        }
    }

    /// Marginal rate of the band an annual consumption falls into.
    pub fn marginal_rate(&self, annual_kwh: f64) -> f64 {
        self.tariff_bands
            .iter()
            .find(|band| annual_kwh <= band.up_to_kwh)
            .map(|band| band.rate)
            .unwrap_or(self.top_band_rate)
    }
}

const RESIDENTIAL_BANDS_2025: [TariffBand; 4] = [
    TariffBand {
        up_to_kwh: 2_000.0,
        rate: 0.1047,
    },
    TariffBand {
        up_to_kwh: 6_000.0,
        rate: 0.1298,
    },
    TariffBand {
        up_to_kwh: 10_000.0,
        rate: 0.1607,
    },
    TariffBand {
        up_to_kwh: 20_000.0,
        rate: 0.3420,
    },
];

pub const SCHEME_2025: GrantScheme = GrantScheme {
    year: 2025,
    standing_charge_monthly: 5.62,
    blended_rate: 0.15,
    eco_reduction: 0.10,
    blended_rate_with_grant: 0.15,
    blended_rate_without_grant: 0.15,
    fit_with_grant: 0.105,
    fit_without_grant: 0.15,
    self_consumption_ratio: 0.70,
    pv_per_kwp: 750.0,
    pv_percentage: 0.50,
    pv_cap: 3_000.0,
    battery_malta: BatteryGrant {
        per_kwh: 720.0,
        percentage: 0.80,
        cap: 7_200.0,
    },
    battery_gozo: BatteryGrant {
        per_kwh: 855.0,
        percentage: 0.95,
        cap: 8_550.0,
    },
    max_total_malta: 10_200.0,
    max_total_gozo: 11_550.0,
    specific_yield: 1_600.0,
    annual_degradation: 0.005,
    battery_round_trip_efficiency: 0.90,
    battery_cycles_per_year: 300.0,
    tariff_bands: &RESIDENTIAL_BANDS_2025,
    top_band_rate: 0.6076,
    loan_rate_percent: 4.75,
    loan_terms_months: &[36, 60, 84, 120],
};

/// The scheme new quotes are priced against.
pub const CURRENT: &GrantScheme = &SCHEME_2025;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declining_grant_raises_fit() {
        assert!(CURRENT.feed_in_tariff(GrantType::None) > CURRENT.feed_in_tariff(GrantType::PvOnly));
        assert_eq!(CURRENT.feed_in_tariff(GrantType::PvBattery), 0.105);
    }

    #[test]
    fn test_marginal_rate_bands() {
        assert_eq!(CURRENT.marginal_rate(1_500.0), 0.1047);
        assert_eq!(CURRENT.marginal_rate(2_000.0), 0.1047);
        assert_eq!(CURRENT.marginal_rate(2_001.0), 0.1298);
        assert_eq!(CURRENT.marginal_rate(12_000.0), 0.3420);
        assert_eq!(CURRENT.marginal_rate(25_000.0), 0.6076);
    }

    #[test]
    fn test_caps_fit_inside_island_maximum() {
        assert!(CURRENT.pv_cap + CURRENT.battery_malta.cap <= CURRENT.max_total_malta);
        assert!(CURRENT.pv_cap + CURRENT.battery_gozo.cap <= CURRENT.max_total_gozo);
    }
}
