use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::WalletLimits;
use crate::decimal::Money;
use crate::errors::{LendingError, Result};
use crate::state::User;
use crate::types::{Direction, LoanId, TransactionId, TransactionKind, TransferKinds, UserId};

/// write-once wallet ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub user: UserId,
    pub loan: Option<LoanId>,
    pub kind: TransactionKind,
    pub amount: Money,
    pub direction: Direction,
    pub balance_before: Money,
    pub balance_after: Money,
    pub description: String,
    /// unique external reference
    pub reference: String,
    pub installment_no: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    fn record(
        user: &User,
        kind: TransactionKind,
        amount: Money,
        balance_before: Money,
        memo: &TransferMemo,
        description: String,
        now: DateTime<Utc>,
    ) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            user: user.id,
            loan: memo.loan,
            kind,
            amount,
            direction: kind.direction(),
            balance_before,
            balance_after: user.wallet,
            description,
            reference: reference_for(&id),
            installment_no: memo.installment_no,
            created_at: now,
        }
    }

    /// signed effect on the wallet
    pub fn signed_amount(&self) -> Money {
        match self.direction {
            Direction::Credit => self.amount,
            Direction::Debit => Money::ZERO - self.amount,
        }
    }
}

/// context attached to both legs of a transfer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferMemo {
    pub loan: Option<LoanId>,
    pub installment_no: Option<u32>,
    pub debit_description: String,
    pub credit_description: String,
}

/// debit and credit legs of one transfer
#[derive(Debug, Clone, PartialEq)]
pub struct TransferReceipt {
    pub debit: Transaction,
    pub credit: Transaction,
}

impl TransferReceipt {
    pub fn into_vec(self) -> Vec<Transaction> {
        vec![self.debit, self.credit]
    }
}

/// moves simulated funds between wallets
///
/// the ledger only mutates the in-memory copies handed to it; the caller
/// stages the users and the returned records into one unit of work.
#[derive(Debug, Clone)]
pub struct WalletLedger {
    limits: WalletLimits,
}

impl WalletLedger {
    pub fn new(limits: WalletLimits) -> Self {
        Self { limits }
    }

    /// debit `from` and credit `to` by `amount`
    ///
    /// every check runs before either wallet changes, so a rejected
    /// transfer leaves both users untouched.
    pub fn transfer(
        &self,
        from: &mut User,
        to: &mut User,
        amount: Money,
        kinds: TransferKinds,
        memo: TransferMemo,
        now: DateTime<Utc>,
    ) -> Result<TransferReceipt> {
        if !amount.is_positive() {
            return Err(LendingError::validation(format!(
                "transfer amount must be positive, got {}",
                amount
            )));
        }
        if from.id == to.id {
            return Err(LendingError::validation("cannot transfer to the same wallet"));
        }
        if from.wallet < amount {
            return Err(LendingError::InsufficientFunds {
                available: from.wallet,
                requested: amount,
            });
        }

        let from_before = from.wallet;
        from.wallet -= amount;
        let debit = Transaction::record(
            from,
            kinds.debit,
            amount,
            from_before,
            &memo,
            memo.debit_description.clone(),
            now,
        );

        let to_before = to.wallet;
        to.wallet += amount;
        let credit = Transaction::record(
            to,
            kinds.credit,
            amount,
            to_before,
            &memo,
            memo.credit_description.clone(),
            now,
        );

        Ok(TransferReceipt { debit, credit })
    }

    /// credit a wallet from outside the platform
    pub fn top_up(&self, user: &mut User, amount: Money, now: DateTime<Utc>) -> Result<Transaction> {
        if !amount.is_positive() {
            return Err(LendingError::validation(format!(
                "top-up amount must be positive, got {}",
                amount
            )));
        }
        if amount > self.limits.max_topup {
            return Err(LendingError::validation(format!(
                "top-up amount {} exceeds the limit of {}",
                amount, self.limits.max_topup
            )));
        }

        let before = user.wallet;
        user.wallet += amount;
        Ok(Transaction::record(
            user,
            TransactionKind::Topup,
            amount,
            before,
            &TransferMemo::default(),
            "Wallet top-up".to_string(),
            now,
        ))
    }
}

fn reference_for(id: &TransactionId) -> String {
    format!("TXN-{}", id.simple()).to_uppercase()
}
