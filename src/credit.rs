use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::CreditConfig;
use crate::state::{CreditHistoryEntry, User};
use crate::types::RiskScore;

/// demo actions for the credit simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditAction {
    OnTimePayment,
    LatePayment,
    MissedPayment,
    NewLoan,
    LoanClosed,
}

impl CreditAction {
    pub fn delta(&self) -> i32 {
        match self {
            CreditAction::OnTimePayment => 5,
            CreditAction::LatePayment => -15,
            CreditAction::MissedPayment => -30,
            CreditAction::NewLoan => -10,
            CreditAction::LoanClosed => 20,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            CreditAction::OnTimePayment => "Simulated: on-time payment",
            CreditAction::LatePayment => "Simulated: late payment",
            CreditAction::MissedPayment => "Simulated: missed payment",
            CreditAction::NewLoan => "Simulated: new loan inquiry",
            CreditAction::LoanClosed => "Simulated: loan fully repaid",
        }
    }
}

/// current score with its full history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditReport {
    pub score: i32,
    pub risk: RiskScore,
    pub history: Vec<CreditHistoryEntry>,
}

/// bounded credit score adjustments
#[derive(Debug, Clone)]
pub struct CreditScorer {
    config: CreditConfig,
}

impl CreditScorer {
    pub fn new(config: CreditConfig) -> Self {
        Self { config }
    }

    /// apply `delta`, clamped to the score bounds, and append to history
    ///
    /// returns the resulting score. The history records the requested delta
    /// even when clamping absorbs part of it.
    pub fn adjust(&self, user: &mut User, delta: i32, reason: impl Into<String>, now: DateTime<Utc>) -> i32 {
        let score = user
            .credit_score
            .saturating_add(delta)
            .clamp(self.config.min_score, self.config.max_score);

        user.credit_history.push(CreditHistoryEntry {
            timestamp: now,
            score,
            delta,
            reason: reason.into(),
        });
        user.credit_score = score;
        score
    }

    pub fn simulate(&self, user: &mut User, action: CreditAction, now: DateTime<Utc>) -> i32 {
        self.adjust(user, action.delta(), action.reason(), now)
    }

    pub fn on_rejection(&self, user: &mut User, now: DateTime<Utc>) -> i32 {
        self.adjust(user, self.config.rejection_delta, "Loan application rejected", now)
    }

    /// reward for an installment, smaller when it was paid after its due date
    pub fn on_installment_paid(&self, user: &mut User, installment_no: u32, late: bool, now: DateTime<Utc>) -> i32 {
        if late {
            self.adjust(
                user,
                self.config.late_emi_delta,
                format!("EMI #{} paid late", installment_no),
                now,
            )
        } else {
            self.adjust(
                user,
                self.config.on_time_emi_delta,
                format!("EMI #{} paid on time", installment_no),
                now,
            )
        }
    }

    pub fn risk_score(&self, score: i32) -> RiskScore {
        if score >= self.config.low_risk_threshold {
            RiskScore::Low
        } else if score < self.config.high_risk_threshold {
            RiskScore::High
        } else {
            RiskScore::Medium
        }
    }

    pub fn report(&self, user: &User) -> CreditReport {
        CreditReport {
            score: user.credit_score,
            risk: self.risk_score(user.credit_score),
            history: user.credit_history.clone(),
        }
    }
}
