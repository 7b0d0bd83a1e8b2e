use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::payments::Installment;
use crate::types::{LoanId, LoanStatus, RiskScore, Role, UserId};

/// one credit score change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditHistoryEntry {
    pub timestamp: DateTime<Utc>,
    /// score after the change
    pub score: i32,
    pub delta: i32,
    pub reason: String,
}

/// platform account with its wallet and credit profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub verified: bool,

    // wallet
    pub wallet: Money,

    // credit
    pub credit_score: i32,
    pub credit_history: Vec<CreditHistoryEntry>,

    // counters
    pub total_borrowed: Money,
    pub total_repaid: Money,
    pub total_funded: Money,
    pub total_returns: Money,
    pub active_loans_count: u32,

    pub created_at: DateTime<Utc>,
    /// bumped by the store on every committed write
    pub version: u64,
}

impl User {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        role: Role,
        initial_score: i32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email.into(),
            role,
            verified: false,
            wallet: Money::ZERO,
            credit_score: initial_score,
            credit_history: Vec::new(),
            total_borrowed: Money::ZERO,
            total_repaid: Money::ZERO,
            total_funded: Money::ZERO,
            total_returns: Money::ZERO,
            active_loans_count: 0,
            created_at,
            version: 0,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// decrement the active loan counter without going below zero
    pub fn close_active_loan(&mut self) {
        self.active_loans_count = self.active_loans_count.saturating_sub(1);
    }
}

/// loan application and, once funded, the running loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub borrower: UserId,
    pub lender: Option<UserId>,

    // terms
    pub amount: Money,
    pub interest_rate: Rate,
    pub tenure_months: u32,
    pub purpose: String,
    pub description: Option<String>,

    pub status: LoanStatus,

    // quote
    pub emi: Money,
    pub total_payable: Money,
    pub total_interest: Money,

    // repayment
    pub remaining_amount: Money,
    pub paid_amount: Money,
    pub schedule: Vec<Installment>,

    pub risk_score: RiskScore,
    pub admin_note: Option<String>,

    // dates
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub funded_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    pub version: u64,
}

impl Loan {
    /// whole percentage of the payable amount already repaid
    pub fn progress(&self) -> u32 {
        Money::percent_of(self.paid_amount, self.total_payable)
    }

    /// lowest-numbered installment not yet paid
    pub fn next_pending_installment(&self) -> Option<&Installment> {
        self.schedule.iter().find(|i| i.is_pending())
    }

    pub fn installment_mut(&mut self, installment_no: u32) -> Option<&mut Installment> {
        self.schedule
            .iter_mut()
            .find(|i| i.installment_no == installment_no)
    }

    pub fn paid_installments(&self) -> usize {
        self.schedule.iter().filter(|i| i.is_paid()).count()
    }

    pub fn all_paid(&self) -> bool {
        !self.schedule.is_empty() && self.schedule.iter().all(|i| i.is_paid())
    }

    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.borrower == user
    }
}
