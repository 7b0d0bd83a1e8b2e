use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// unique identifier for a user
pub type UserId = Uuid;

/// unique identifier for a loan
pub type LoanId = Uuid;

/// unique identifier for a ledger entry
pub type TransactionId = Uuid;

/// user role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Borrower,
    Lender,
    Admin,
}

/// loan status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    /// application submitted, awaiting admin review
    Pending,
    /// approved by admin, visible to lenders
    Approved,
    /// turned down by admin
    Rejected,
    /// funded but not yet disbursed; not produced by the funding transition
    Funded,
    /// funded and under repayment
    Active,
    /// every installment paid
    Completed,
    /// written off by an admin
    Defaulted,
}

impl LoanStatus {
    /// statuses that count as an open application or loan for a borrower
    pub const OPEN: [LoanStatus; 4] = [
        LoanStatus::Pending,
        LoanStatus::Approved,
        LoanStatus::Funded,
        LoanStatus::Active,
    ];

    /// statuses a lender sees when no explicit filter is given
    pub const LENDER_VISIBLE: [LoanStatus; 4] = [
        LoanStatus::Approved,
        LoanStatus::Funded,
        LoanStatus::Active,
        LoanStatus::Completed,
    ];

    /// legal edges of the lifecycle graph
    pub fn can_transition_to(&self, next: LoanStatus) -> bool {
        use LoanStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Approved, Rejected)
                | (Approved, Funded)
                | (Approved, Active)
                | (Funded, Active)
                | (Active, Completed)
                | (Active, Defaulted)
        )
    }
}

/// installment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallmentStatus {
    Pending,
    Paid,
    Overdue,
}

/// coarse borrower risk bucket derived from credit score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskScore {
    Low,
    Medium,
    High,
}

/// ledger entry taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Topup,
    LoanFunded,
    LoanReceived,
    EmiPaid,
    EmiReceived,
    Refund,
}

impl TransactionKind {
    /// side of the ledger this kind always lands on
    pub fn direction(&self) -> Direction {
        match self {
            TransactionKind::Topup
            | TransactionKind::LoanReceived
            | TransactionKind::EmiReceived
            | TransactionKind::Refund => Direction::Credit,
            TransactionKind::LoanFunded | TransactionKind::EmiPaid => Direction::Debit,
        }
    }
}

/// paired ledger kinds for a transfer: (debit side, credit side)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferKinds {
    pub debit: TransactionKind,
    pub credit: TransactionKind,
}

impl TransferKinds {
    pub const FUNDING: TransferKinds = TransferKinds {
        debit: TransactionKind::LoanFunded,
        credit: TransactionKind::LoanReceived,
    };

    pub const REPAYMENT: TransferKinds = TransferKinds {
        debit: TransactionKind::EmiPaid,
        credit: TransactionKind::EmiReceived,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Credit,
    Debit,
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoanStatus::Pending => "pending",
            LoanStatus::Approved => "approved",
            LoanStatus::Rejected => "rejected",
            LoanStatus::Funded => "funded",
            LoanStatus::Active => "active",
            LoanStatus::Completed => "completed",
            LoanStatus::Defaulted => "defaulted",
        };
        f.write_str(s)
    }
}

/// short human reference for a loan, the last six hex digits of its id
pub fn short_ref(id: &Uuid) -> String {
    let simple = id.simple().to_string();
    simple[simple.len() - 6..].to_uppercase()
}
