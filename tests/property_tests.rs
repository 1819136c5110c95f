/// Property-based tests using proptest
/// Tests invariants of the pricing formulas, phone/email checks and the wizard reducer
use proptest::prelude::*;
use solar_leads::core::dedup::normalize_phone;
use solar_leads::core::financing::calculate_monthly_payment;
use solar_leads::core::models::{GrantType, Location};
use solar_leads::core::tariff::{
    calculate_25_year_savings, calculate_grant_amount, calculate_payback_years,
    estimate_consumption, PAYBACK_NEVER,
};
use solar_leads::core::wizard::{reduce, WizardAction, WizardState, TOTAL_STEPS};
use solar_leads::grant_scheme::CURRENT;
use solar_leads::validation::{is_valid_email, validate_mt_phone};

fn location() -> impl Strategy<Value = Location> {
    prop_oneof![Just(Location::Malta), Just(Location::Gozo)]
}

fn grant_type() -> impl Strategy<Value = GrantType> {
    prop_oneof![
        Just(GrantType::None),
        Just(GrantType::PvOnly),
        Just(GrantType::PvBattery)
    ]
}

// Property: the combined grant never exceeds the island maximum
proptest! {
    #[test]
    fn grant_is_capped_per_island(
        system_kw in 0.0f64..50.0,
        battery_kwh in 0.0f64..60.0,
        grant_type in grant_type(),
        location in location(),
        system_price in proptest::option::of(0.0f64..60_000.0),
        battery_price in proptest::option::of(0.0f64..60_000.0),
    ) {
        let grant = calculate_grant_amount(
            CURRENT, system_kw, battery_kwh, grant_type, location, system_price, battery_price,
        );
        prop_assert!(grant >= 0.0);
        prop_assert!(grant <= CURRENT.max_total(location));
        if grant_type == GrantType::None {
            prop_assert_eq!(grant, 0.0);
        }
        if grant_type == GrantType::PvOnly {
            prop_assert!(grant <= CURRENT.pv_cap);
        }
    }

    #[test]
    fn grant_with_price_never_exceeds_estimate(
        system_kw in 0.0f64..20.0,
        battery_kwh in 0.0f64..20.0,
        location in location(),
        system_price in 0.0f64..30_000.0,
        battery_price in 0.0f64..30_000.0,
    ) {
        let estimate = calculate_grant_amount(
            CURRENT, system_kw, battery_kwh, GrantType::PvBattery, location, None, None,
        );
        let priced = calculate_grant_amount(
            CURRENT,
            system_kw,
            battery_kwh,
            GrantType::PvBattery,
            location,
            Some(system_price),
            Some(battery_price),
        );
        prop_assert!(priced <= estimate);
    }
}

// Property: consumption is zero up to the standing charge and grows with the bill
proptest! {
    #[test]
    fn no_consumption_at_or_below_standing_charge(
        bill in -100.0f64..=5.62,
        household in 0i32..8,
    ) {
        prop_assert_eq!(estimate_consumption(CURRENT, bill, household), 0.0);
    }

    #[test]
    fn consumption_is_monotonic_in_bill(
        a in 0.0f64..2_000.0,
        b in 0.0f64..2_000.0,
        household in 0i32..8,
    ) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(
            estimate_consumption(CURRENT, low, household)
                <= estimate_consumption(CURRENT, high, household)
        );
    }
}

// Property: payback and lifetime savings
proptest! {
    #[test]
    fn payback_never_without_savings(cost in 0.0f64..100_000.0, savings in -5_000.0f64..=0.0) {
        prop_assert_eq!(calculate_payback_years(cost, savings), PAYBACK_NEVER);
    }

    #[test]
    fn payback_is_bounded(cost in 0.0f64..100_000.0, savings in 1.0f64..10_000.0) {
        let years = calculate_payback_years(cost, savings);
        prop_assert!((0.0..=PAYBACK_NEVER).contains(&years));
    }

    #[test]
    fn lifetime_savings_reflect_degradation(annual in 0.0f64..10_000.0) {
        let lifetime = calculate_25_year_savings(CURRENT, annual);
        let floor = 25.0 * annual * (1.0 - CURRENT.annual_degradation).powi(24);
        prop_assert!(lifetime <= (25.0 * annual).round());
        prop_assert!(lifetime >= floor.round() - 1.0);
    }

    #[test]
    fn loan_repays_at_least_the_principal(
        principal in 0.0f64..100_000.0,
        term_index in 0usize..4,
    ) {
        let term = CURRENT.loan_terms_months[term_index];
        let payment = calculate_monthly_payment(principal, CURRENT.loan_rate_percent, term).unwrap();
        // cent rounding can shave at most half a cent per month
        prop_assert!(payment * term as f64 >= principal - 0.005 * term as f64);
    }
}

// Property: contact checks never panic, normalised phones are E.164-shaped
proptest! {
    #[test]
    fn email_validation_never_panics(email in "\\PC*") {
        let _ = is_valid_email(&email);
    }

    #[test]
    fn phone_validation_never_panics(phone in "\\PC*") {
        let _ = validate_mt_phone(&phone);
    }

    #[test]
    fn normalized_phone_is_plus_and_digits(phone in "\\PC*") {
        if let Some(normalized) = normalize_phone(&phone) {
            prop_assert!(normalized.starts_with('+'));
            prop_assert!(normalized.len() > 1);
            prop_assert!(normalized[1..].chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn bare_maltese_numbers_get_country_code(number in 20000000u32..=99999999u32) {
        let normalized = normalize_phone(&number.to_string()).unwrap();
        prop_assert_eq!(normalized, format!("+356{}", number));
    }
}

fn step_action() -> impl Strategy<Value = WizardAction> {
    prop_oneof![
        Just(WizardAction::NextStep),
        Just(WizardAction::PrevStep),
        (-5i32..15).prop_map(|step| WizardAction::SetStep { step }),
    ]
}

// Property: navigation never leaves the step range and highest_step never drops
proptest! {
    #[test]
    fn wizard_steps_stay_in_range(
        actions in proptest::collection::vec(step_action(), 0..40),
        prefilled in proptest::bool::ANY,
    ) {
        let mut state = WizardState { prefilled, ..WizardState::default() };
        for action in actions {
            let previous_highest = state.highest_step;
            state = reduce(&state, action);
            prop_assert!((1..=TOTAL_STEPS).contains(&state.current_step));
            prop_assert!(state.highest_step >= previous_highest);
            prop_assert!(state.highest_step >= state.current_step);
        }
    }
}
