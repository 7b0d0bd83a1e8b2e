//! serialization support for loans and wallets

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::payments::Installment;
use crate::state::{Loan, User};
use crate::types::{short_ref, LoanId, LoanStatus, RiskScore, Role, UserId};

/// serializable view of a loan
#[derive(Debug, Serialize, Deserialize)]
pub struct LoanView {
    pub id: LoanId,
    pub reference: String,
    pub borrower: UserId,
    pub lender: Option<UserId>,
    pub status: LoanStatus,
    pub purpose: String,
    pub description: Option<String>,
    pub risk_score: RiskScore,
    pub admin_note: Option<String>,
    pub terms: TermsView,
    pub repayment: RepaymentView,
    pub dates: DatesView,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TermsView {
    pub amount: Money,
    pub interest_rate: Rate,
    pub tenure_months: u32,
    pub emi: Money,
    pub total_payable: Money,
    pub total_interest: Money,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RepaymentView {
    pub paid_amount: Money,
    pub remaining_amount: Money,
    /// whole percent of the payable amount repaid
    pub progress: u32,
    pub installments_paid: usize,
    pub installments_total: usize,
    pub next_due_date: Option<DateTime<Utc>>,
    pub next_due_amount: Option<Money>,
    pub overdue: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatesView {
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub funded_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl LoanView {
    /// overdue status is evaluated at `now`
    pub fn from_loan(loan: &Loan, now: DateTime<Utc>) -> Self {
        let next = loan.next_pending_installment();
        LoanView {
            id: loan.id,
            reference: short_ref(&loan.id),
            borrower: loan.borrower,
            lender: loan.lender,
            status: loan.status,
            purpose: loan.purpose.clone(),
            description: loan.description.clone(),
            risk_score: loan.risk_score,
            admin_note: loan.admin_note.clone(),
            terms: TermsView {
                amount: loan.amount,
                interest_rate: loan.interest_rate,
                tenure_months: loan.tenure_months,
                emi: loan.emi,
                total_payable: loan.total_payable,
                total_interest: loan.total_interest,
            },
            repayment: RepaymentView {
                paid_amount: loan.paid_amount,
                remaining_amount: loan.remaining_amount,
                progress: loan.progress(),
                installments_paid: loan.paid_installments(),
                installments_total: loan.schedule.len(),
                next_due_date: next.map(|i| i.due_date),
                next_due_amount: next.map(|i| i.amount),
                overdue: loan.status == LoanStatus::Active && next.map_or(false, |i| i.is_overdue(now)),
            },
            dates: DatesView {
                created_at: loan.created_at,
                approved_at: loan.approved_at,
                funded_at: loan.funded_at,
                completed_at: loan.completed_at,
            },
        }
    }

    /// convert to pretty-printed json string
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// repayment schedule with the loan totals it belongs to
#[derive(Debug, Serialize, Deserialize)]
pub struct ScheduleView {
    pub loan_id: LoanId,
    pub status: LoanStatus,
    pub amount: Money,
    pub emi: Money,
    pub total_payable: Money,
    pub total_interest: Money,
    pub paid_amount: Money,
    pub remaining_amount: Money,
    pub installments: Vec<Installment>,
}

impl ScheduleView {
    pub fn from_loan(loan: &Loan) -> Self {
        ScheduleView {
            loan_id: loan.id,
            status: loan.status,
            amount: loan.amount,
            emi: loan.emi,
            total_payable: loan.total_payable,
            total_interest: loan.total_interest,
            paid_amount: loan.paid_amount,
            remaining_amount: loan.remaining_amount,
            installments: loan.schedule.clone(),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// wallet balance and lifetime counters
#[derive(Debug, Serialize, Deserialize)]
pub struct WalletView {
    pub user: UserId,
    pub name: String,
    pub role: Role,
    pub wallet: Money,
    pub credit_score: i32,
    pub total_borrowed: Money,
    pub total_repaid: Money,
    pub total_funded: Money,
    pub total_returns: Money,
    pub active_loans_count: u32,
}

impl WalletView {
    pub fn from_user(user: &User) -> Self {
        WalletView {
            user: user.id,
            name: user.name.clone(),
            role: user.role,
            wallet: user.wallet,
            credit_score: user.credit_score,
            total_borrowed: user.total_borrowed,
            total_repaid: user.total_repaid,
            total_funded: user.total_funded,
            total_returns: user.total_returns,
            active_loans_count: user.active_loans_count,
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
