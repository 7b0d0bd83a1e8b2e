use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{LendingError, Result};

/// engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LendingConfig {
    pub loan_limits: LoanLimits,
    pub wallet: WalletLimits,
    pub credit: CreditConfig,
    pub policy: ApplicationPolicy,
}

/// accepted ranges for a loan application, inclusive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanLimits {
    pub min_amount: Money,
    pub max_amount: Money,
    /// annual percentage, e.g. 12 for 12%
    pub min_rate_percent: Decimal,
    pub max_rate_percent: Decimal,
    pub min_tenure_months: u32,
    pub max_tenure_months: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletLimits {
    /// ceiling for a single top-up
    pub max_topup: Money,
}

/// credit score bounds, deltas and risk thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditConfig {
    pub min_score: i32,
    pub max_score: i32,
    pub initial_score: i32,
    pub rejection_delta: i32,
    pub on_time_emi_delta: i32,
    pub late_emi_delta: i32,
    /// scores at or above this are low risk
    pub low_risk_threshold: i32,
    /// scores below this are high risk
    pub high_risk_threshold: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationPolicy {
    /// when set, any approved/funded/active loan also blocks a new application;
    /// a pending application always blocks
    pub block_on_open_loans: bool,
}

impl LendingConfig {
    /// configuration matching the historical platform
    pub fn standard() -> Self {
        Self {
            loan_limits: LoanLimits {
                min_amount: Money::from_major(100),
                max_amount: Money::from_major(500_000),
                min_rate_percent: dec!(1),
                max_rate_percent: dec!(50),
                min_tenure_months: 1,
                max_tenure_months: 60,
            },
            wallet: WalletLimits {
                max_topup: Money::from_major(100_000),
            },
            credit: CreditConfig {
                min_score: 300,
                max_score: 850,
                initial_score: 650,
                rejection_delta: -5,
                on_time_emi_delta: 5,
                late_emi_delta: 3,
                low_risk_threshold: 750,
                high_risk_threshold: 600,
            },
            policy: ApplicationPolicy {
                block_on_open_loans: false,
            },
        }
    }

    /// parse from json and validate
    pub fn from_json(json: &str) -> Result<Self> {
        let config: LendingConfig = serde_json::from_str(json)
            .map_err(|e| LendingError::validation(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| LendingError::Internal {
            message: format!("config serialization failed: {}", e),
        })
    }

    /// reject inverted or non-positive ranges
    pub fn validate(&self) -> Result<()> {
        let limits = &self.loan_limits;
        if !limits.min_amount.is_positive() || limits.min_amount > limits.max_amount {
            return Err(LendingError::validation("loan amount range is invalid"));
        }
        if limits.min_rate_percent <= Decimal::ZERO || limits.min_rate_percent > limits.max_rate_percent {
            return Err(LendingError::validation("interest rate range is invalid"));
        }
        if limits.min_tenure_months == 0 || limits.min_tenure_months > limits.max_tenure_months {
            return Err(LendingError::validation("tenure range is invalid"));
        }
        if !self.wallet.max_topup.is_positive() {
            return Err(LendingError::validation("top-up ceiling must be positive"));
        }

        let credit = &self.credit;
        if credit.min_score > credit.max_score {
            return Err(LendingError::validation("credit score bounds are inverted"));
        }
        if credit.initial_score < credit.min_score || credit.initial_score > credit.max_score {
            return Err(LendingError::validation("initial credit score is out of bounds"));
        }
        if credit.high_risk_threshold > credit.low_risk_threshold {
            return Err(LendingError::validation("risk thresholds are inverted"));
        }
        Ok(())
    }
}

impl Default for LendingConfig {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_is_valid() {
        let config = LendingConfig::standard();
        assert!(config.validate().is_ok());
        assert_eq!(config.loan_limits.max_amount, Money::from_major(500_000));
        assert_eq!(config.credit.initial_score, 650);
    }

    #[test]
    fn test_json_round_trip_keeps_values() {
        let mut config = LendingConfig::standard();
        config.policy.block_on_open_loans = true;
        config.wallet.max_topup = Money::from_major(25_000);

        let json = config.to_json_pretty().unwrap();
        let parsed = LendingConfig::from_json(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_rejects_inverted_ranges() {
        let mut config = LendingConfig::standard();
        config.loan_limits.min_tenure_months = 61;
        assert!(matches!(config.validate(), Err(LendingError::Validation { .. })));

        let mut config = LendingConfig::standard();
        config.credit.initial_score = 900;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_reports_parse_errors() {
        let err = LendingConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, LendingError::Validation { .. }));
    }
}
