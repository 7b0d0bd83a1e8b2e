use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::errors::{LendingError, Result};

/// installment amount and totals for a reducing-balance loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmiQuote {
    pub emi: Money,
    pub total_payable: Money,
    pub total_interest: Money,
}

/// calculate the equated monthly installment for a loan
///
/// `EMI = P * r * (1 + r)^n / ((1 + r)^n - 1)` with `r` the monthly rate,
/// or `P / n` when the rate is zero. The quoted total payable is the
/// rounded installment times the tenure; the funded schedule settles the
/// exact figure in its last installment.
pub fn calculate_emi(principal: Money, annual_rate: Rate, tenure_months: u32) -> Result<EmiQuote> {
    if !principal.is_positive() {
        return Err(LendingError::validation(format!(
            "principal must be positive, got {}",
            principal
        )));
    }
    if annual_rate.as_decimal() < Decimal::ZERO {
        return Err(LendingError::validation(format!(
            "interest rate must not be negative, got {}",
            annual_rate
        )));
    }
    if tenure_months == 0 {
        return Err(LendingError::validation("tenure must be at least one month"));
    }

    let raw = raw_emi(principal.as_decimal(), annual_rate.monthly_rate().as_decimal(), tenure_months)?;
    let emi = Money::from_decimal(raw);
    let total_payable = Money::from_decimal(emi.as_decimal() * Decimal::from(tenure_months));
    let total_interest = total_payable - principal;

    Ok(EmiQuote {
        emi,
        total_payable,
        total_interest,
    })
}

/// unrounded installment
fn raw_emi(principal: Decimal, monthly_rate: Decimal, months: u32) -> Result<Decimal> {
    let n = Decimal::from(months);

    if monthly_rate.is_zero() {
        return Ok(principal / n);
    }

    let compound = compound_factor(monthly_rate, months)?;
    let numerator = principal * monthly_rate * compound;
    let denominator = compound - Decimal::ONE;

    numerator
        .checked_div(denominator)
        .ok_or_else(|| LendingError::Internal {
            message: "emi denominator vanished".to_string(),
        })
}

/// (1 + r)^n by repeated multiplication
fn compound_factor(rate: Decimal, periods: u32) -> Result<Decimal> {
    let base = Decimal::ONE + rate;
    let mut factor = Decimal::ONE;
    for _ in 0..periods {
        factor = factor.checked_mul(base).ok_or_else(|| LendingError::Internal {
            message: "compound factor overflow".to_string(),
        })?;
    }
    Ok(factor)
}
