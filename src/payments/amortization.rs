use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::errors::{LendingError, Result};
use crate::types::InstallmentStatus;

/// one row of the repayment schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installment {
    /// 1-indexed
    pub installment_no: u32,
    pub due_date: DateTime<Utc>,
    pub amount: Money,
    pub principal: Money,
    pub interest: Money,
    /// outstanding principal after this installment
    pub balance: Money,
    pub status: InstallmentStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub paid_amount: Option<Money>,
}

impl Installment {
    pub fn is_pending(&self) -> bool {
        self.status != InstallmentStatus::Paid
    }

    pub fn is_paid(&self) -> bool {
        self.status == InstallmentStatus::Paid
    }

    /// unpaid and past its due date
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && now > self.due_date
    }

    /// record payment of the full installment amount
    pub fn mark_paid(&mut self, now: DateTime<Utc>) {
        self.status = InstallmentStatus::Paid;
        self.paid_at = Some(now);
        self.paid_amount = Some(self.amount);
    }
}

/// reducing-balance amortization schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmortizationSchedule {
    pub principal: Money,
    pub interest_rate: Rate,
    pub tenure_months: u32,
    pub start_date: DateTime<Utc>,
    pub emi: Money,
    pub installments: Vec<Installment>,
}

impl AmortizationSchedule {
    /// generate the schedule for a funded loan
    ///
    /// each month the interest is charged on the running balance and the
    /// rest of the installment retires principal. The final installment
    /// retires whatever balance is left plus its interest, so its amount can
    /// differ from the EMI by the accumulated rounding. Due dates fall on the
    /// same day of each following month, clamped to the month end.
    pub fn generate(
        principal: Money,
        interest_rate: Rate,
        tenure_months: u32,
        emi: Money,
        start_date: DateTime<Utc>,
    ) -> Result<Self> {
        if tenure_months == 0 {
            return Err(LendingError::validation("tenure must be at least one month"));
        }
        if !emi.is_positive() {
            return Err(LendingError::validation(format!(
                "installment must be positive, got {}",
                emi
            )));
        }

        let monthly_rate = interest_rate.monthly_rate().as_decimal();
        let mut installments = Vec::with_capacity(tenure_months as usize);
        let mut balance = principal;

        for i in 1..=tenure_months {
            let due_date = add_months(start_date, i)?;
            let interest = Money::from_decimal(balance.as_decimal() * monthly_rate);
            let (principal_portion, amount) = if i == tenure_months {
                (balance, balance + interest)
            } else {
                (emi - interest, emi)
            };
            balance = balance.saturating_sub(principal_portion);

            installments.push(Installment {
                installment_no: i,
                due_date,
                amount,
                principal: principal_portion,
                interest,
                balance,
                status: InstallmentStatus::Pending,
                paid_at: None,
                paid_amount: None,
            });
        }

        Ok(Self {
            principal,
            interest_rate,
            tenure_months,
            start_date,
            emi,
            installments,
        })
    }

    pub fn get(&self, installment_no: u32) -> Option<&Installment> {
        installment_no
            .checked_sub(1)
            .and_then(|idx| self.installments.get(idx as usize))
    }

    pub fn total_principal(&self) -> Money {
        self.installments.iter().map(|i| i.principal).sum()
    }

    pub fn total_interest(&self) -> Money {
        self.installments.iter().map(|i| i.interest).sum()
    }

    pub fn total_amount(&self) -> Money {
        self.installments.iter().map(|i| i.amount).sum()
    }

    pub fn into_installments(self) -> Vec<Installment> {
        self.installments
    }
}

/// add calendar months, clamping to the last day of the target month
fn add_months(date: DateTime<Utc>, months: u32) -> Result<DateTime<Utc>> {
    date.checked_add_months(Months::new(months))
        .ok_or_else(|| LendingError::Internal {
            message: format!("due date out of range: {} + {} months", date, months),
        })
}
