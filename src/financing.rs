//! Loan amortisation for the financing step.

use serde::Serialize;

use crate::errors::AppError;
use crate::grant_scheme::GrantScheme;
use crate::tariff::round_to;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancingOption {
    pub term_months: u32,
    /// Annual rate in percent.
    pub rate: f64,
    pub monthly_payment: f64,
    pub total_cost: f64,
}

/// Monthly payment of an amortising loan (PMT), rounded to cents.
///
/// PMT = P × r × (1 + r)^n / ((1 + r)^n − 1), with r the monthly rate.
/// A zero rate falls back to straight division.
pub fn calculate_monthly_payment(
    principal: f64,
    annual_rate_percent: f64,
    term_months: u32,
) -> Result<f64, AppError> {
    if !principal.is_finite() || principal < 0.0 {
        return Err(AppError::BadRequest(
            "principal must be a non-negative amount".to_string(),
        ));
    }
    if !annual_rate_percent.is_finite() || annual_rate_percent < 0.0 {
        return Err(AppError::BadRequest(
            "rate must be a non-negative percentage".to_string(),
        ));
    }
    if term_months == 0 {
        return Err(AppError::BadRequest(
            "term must be at least one month".to_string(),
        ));
    }

    let n = term_months as f64;
    let monthly_rate = annual_rate_percent / 100.0 / 12.0;
    if monthly_rate == 0.0 {
        return Ok(round_to(principal / n, 2));
    }

    let factor = (1.0 + monthly_rate).powi(term_months as i32);
    Ok(round_to(
        principal * monthly_rate * factor / (factor - 1.0),
        2,
    ))
}

/// One option per term of the scheme's ladder, all at the scheme rate.
pub fn get_financing_options(
    scheme: &GrantScheme,
    total_price: f64,
) -> Result<Vec<FinancingOption>, AppError> {
    scheme
        .loan_terms_months
        .iter()
        .map(|&term| {
            let monthly_payment =
                calculate_monthly_payment(total_price, scheme.loan_rate_percent, term)?;
            Ok(FinancingOption {
                term_months: term,
                rate: scheme.loan_rate_percent,
                monthly_payment,
                total_cost: (monthly_payment * term as f64).round(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grant_scheme::CURRENT;

    #[test]
    fn test_zero_rate_is_simple_division() {
        assert_eq!(calculate_monthly_payment(12_000.0, 0.0, 120).unwrap(), 100.0);
    }

    #[test]
    fn test_pmt_matches_reference_value() {
        // 10,000 over 60 months at 6% → 193.33
        assert_eq!(calculate_monthly_payment(10_000.0, 6.0, 60).unwrap(), 193.33);
    }

    #[test]
    fn test_rejects_negative_inputs() {
        assert!(calculate_monthly_payment(-1.0, 4.75, 60).is_err());
        assert!(calculate_monthly_payment(1000.0, -0.5, 60).is_err());
        assert!(calculate_monthly_payment(1000.0, 4.75, 0).is_err());
    }

    #[test]
    fn test_options_follow_term_ladder() {
        let options = get_financing_options(CURRENT, 8_200.0).unwrap();
        let terms: Vec<u32> = options.iter().map(|o| o.term_months).collect();
        assert_eq!(terms, vec![36, 60, 84, 120]);
        for option in &options {
            assert_eq!(option.rate, 4.75);
            assert_eq!(
                option.total_cost,
                (option.monthly_payment * option.term_months as f64).round()
            );
            assert!(option.total_cost >= 8_200.0);
        }
        // longer terms pay less per month
        assert!(options.windows(2).all(|w| w[0].monthly_payment > w[1].monthly_payment));
    }

    #[test]
    fn test_zero_price_gives_zero_payments() {
        let options = get_financing_options(CURRENT, 0.0).unwrap();
        assert!(options.iter().all(|o| o.monthly_payment == 0.0 && o.total_cost == 0.0));
    }
}
