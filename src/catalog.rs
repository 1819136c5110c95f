//! Static system and battery catalog.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemPackage {
    pub id: &'static str,
    pub name: &'static str,
    pub size_kw: f64,
    pub panel_count: u32,
    pub list_price: f64,
    /// Share of the price the grant scheme recognises.
    pub eligible_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatteryOption {
    pub id: &'static str,
    pub name: &'static str,
    pub capacity_kwh: f64,
    pub unit_count: u32,
    pub list_price: f64,
    pub eligible_price: f64,
}

pub const SYSTEM_PACKAGES: [SystemPackage; 4] = [
    SystemPackage {
        id: "starter-3kw",
        name: "Starter 3kW",
        size_kw: 3.04,
        panel_count: 7,
        list_price: 4_200.0,
        eligible_price: 4_200.0,
    },
    SystemPackage {
        id: "essential-5kw",
        name: "Essential 5kW",
        size_kw: 5.22,
        panel_count: 12,
        list_price: 6_400.0,
        eligible_price: 6_400.0,
    },
    SystemPackage {
        id: "plus-7kw",
        name: "Plus 7kW",
        size_kw: 7.40,
        panel_count: 17,
        list_price: 8_600.0,
        eligible_price: 8_300.0,
    },
    SystemPackage {
        id: "max-10kw",
        name: "Max 10kW",
        size_kw: 10.0,
        panel_count: 23,
        list_price: 11_200.0,
        eligible_price: 10_600.0,
    },
];

pub const BATTERY_OPTIONS: [BatteryOption; 3] = [
    BatteryOption {
        id: "battery-5kwh",
        name: "Battery 5kWh",
        capacity_kwh: 5.0,
        unit_count: 1,
        list_price: 4_800.0,
        eligible_price: 4_800.0,
    },
    BatteryOption {
        id: "battery-10kwh",
        name: "Battery 10kWh",
        capacity_kwh: 10.0,
        unit_count: 2,
        list_price: 8_900.0,
        eligible_price: 8_900.0,
    },
    BatteryOption {
        id: "battery-15kwh",
        name: "Battery 15kWh",
        capacity_kwh: 15.0,
        unit_count: 3,
        list_price: 12_000.0,
        eligible_price: 12_000.0,
    },
];

pub fn find_system(id: &str) -> Option<&'static SystemPackage> {
    SYSTEM_PACKAGES.iter().find(|p| p.id == id)
}

pub fn find_battery(id: &str) -> Option<&'static BatteryOption> {
    BATTERY_OPTIONS.iter().find(|b| b.id == id)
}

/// Smallest package whose yearly production covers `annual_kwh`, else the largest one.
pub fn recommend_system(annual_kwh: f64, specific_yield: f64) -> &'static SystemPackage {
    SYSTEM_PACKAGES
        .iter()
        .find(|p| p.size_kw * specific_yield >= annual_kwh)
        .unwrap_or(&SYSTEM_PACKAGES[SYSTEM_PACKAGES.len() - 1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_id() {
        assert_eq!(find_system("essential-5kw").map(|p| p.name), Some("Essential 5kW"));
        assert_eq!(find_battery("battery-10kwh").map(|b| b.capacity_kwh), Some(10.0));
        assert!(find_system("unknown").is_none());
    }

    #[test]
    fn test_recommendation_covers_consumption() {
        assert_eq!(recommend_system(4_000.0, 1_600.0).id, "starter-3kw");
        assert_eq!(recommend_system(8_000.0, 1_600.0).id, "essential-5kw");
        assert_eq!(recommend_system(90_000.0, 1_600.0).id, "max-10kw");
    }
}
