use hourglass_rs::SafeTimeProvider;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::LendingConfig;
use crate::credit::{CreditAction, CreditReport, CreditScorer};
use crate::decimal::{Money, Rate};
use crate::errors::{LendingError, Result};
use crate::events::{Dispatcher, Event, Notification, NotificationKind, NotificationSink, Outbox, Recipient};
use crate::ledger::{Transaction, TransferMemo, WalletLedger};
use crate::payments::{calculate_emi, AmortizationSchedule, Installment};
use crate::state::{Loan, User};
use crate::store::{LendingStore, LoanFilter, Page, Pagination, TransactionFilter, UnitOfWork, UserFilter};
use crate::types::{short_ref, LoanId, LoanStatus, Role, TransferKinds, UserId};

const DEFAULT_REJECTION_NOTE: &str = "Application does not meet requirements";

/// result of a mutating operation plus the notifications it produced
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    pub value: T,
    pub notifications: Vec<Notification>,
}

impl<T> Outcome<T> {
    fn new(value: T, outbox: &mut Outbox) -> Self {
        Self {
            value,
            notifications: outbox.take(),
        }
    }
}

/// borrower input for a new application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanApplication {
    pub amount: Money,
    /// annual percentage, e.g. 12 for 12%
    pub interest_rate: Decimal,
    pub tenure_months: u32,
    pub purpose: String,
    pub description: Option<String>,
}

/// outcome of paying one installment
#[derive(Debug, Clone, PartialEq)]
pub struct Repayment {
    pub loan: Loan,
    pub installment: Installment,
    pub late: bool,
    pub credit_score: i32,
}

/// loan lifecycle engine over a store
pub struct LendingEngine<S: LendingStore> {
    store: S,
    config: LendingConfig,
    ledger: WalletLedger,
    scorer: CreditScorer,
}

impl<S: LendingStore> LendingEngine<S> {
    pub fn new(store: S, config: LendingConfig) -> Result<Self> {
        config.validate()?;
        let ledger = WalletLedger::new(config.wallet.clone());
        let scorer = CreditScorer::new(config.credit.clone());
        Ok(Self {
            store,
            config,
            ledger,
            scorer,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LendingConfig {
        &self.config
    }

    /// deliver notifications, resolving admin broadcasts against the store
    pub fn dispatch(&self, notifications: &[Notification], sink: &dyn NotificationSink) -> Result<usize> {
        Dispatcher::new(&self.store, sink).dispatch(notifications)
    }

    // ---- accounts ----

    #[instrument(name = "lending.register_user", skip(self, time), err)]
    pub fn register_user(&self, name: &str, email: &str, role: Role, time: &SafeTimeProvider) -> Result<User> {
        let name = name.trim();
        let email = email.trim().to_lowercase();
        if name.is_empty() {
            return Err(LendingError::validation("name is required"));
        }
        if !email.contains('@') {
            return Err(LendingError::validation(format!("invalid email address: {}", email)));
        }
        let taken = self
            .store
            .find_users(&UserFilter::default())?
            .iter()
            .any(|u| u.email == email);
        if taken {
            return Err(LendingError::validation("email already registered"));
        }

        let user = User::new(name, email, role, self.config.credit.initial_score, time.now());
        let id = user.id;
        let mut work = UnitOfWork::new();
        work.stage_user(user);
        let user = self.store.commit(work)?.user(id)?;

        info!(user_id = %id, ?role, "user registered");
        Ok(user)
    }

    #[instrument(name = "lending.verify_user", skip(self, time), err)]
    pub fn verify_user(
        &self,
        admin_id: UserId,
        user_id: UserId,
        verified: bool,
        time: &SafeTimeProvider,
    ) -> Result<Outcome<User>> {
        self.require_admin(admin_id)?;
        let mut user = self.store.user(user_id)?;
        let now = time.now();
        user.verified = verified;

        let mut work = UnitOfWork::new();
        work.stage_user(user);
        let user = self.store.commit(work)?.user(user_id)?;

        let mut outbox = Outbox::new();
        let event = Event::AccountVerified {
            user: user_id,
            verified,
            timestamp: now,
        };
        let (title, message) = if verified {
            (
                "Account Verified",
                "Your account has been verified by admin. You can now apply for loans.",
            )
        } else {
            ("Account Unverified", "Your account verification has been revoked.")
        };
        outbox.notify(NotificationKind::AccountVerified, Recipient::User(user_id), title, message, &event);

        info!(%user_id, verified, "verification changed");
        Ok(Outcome::new(user, &mut outbox))
    }

    /// admin listing of users
    pub fn users(&self, admin_id: UserId, filter: &UserFilter) -> Result<Vec<User>> {
        self.require_admin(admin_id)?;
        self.store.find_users(filter)
    }

    pub fn user(&self, user_id: UserId) -> Result<User> {
        self.store.user(user_id)
    }

    // ---- wallet ----

    #[instrument(name = "lending.top_up", skip(self, time), err)]
    pub fn top_up(&self, user_id: UserId, amount: Money, time: &SafeTimeProvider) -> Result<Outcome<Transaction>> {
        let mut user = self.store.user(user_id)?;
        let now = time.now();
        let txn = self.ledger.top_up(&mut user, amount, now).map_err(|e| {
            warn!(%user_id, %amount, error = %e, "top-up rejected");
            e
        })?;
        let balance = user.wallet;

        let mut work = UnitOfWork::new();
        work.stage_user(user).record(txn.clone());
        self.store.commit(work)?;

        let mut outbox = Outbox::new();
        let event = Event::WalletToppedUp {
            user: user_id,
            amount,
            balance,
            timestamp: now,
        };
        outbox.notify(
            NotificationKind::Topup,
            Recipient::User(user_id),
            "Wallet Topped Up",
            format!("{} added to your wallet. New balance: {}", amount, balance),
            &event,
        );

        info!(%user_id, %amount, %balance, "wallet topped up");
        Ok(Outcome::new(txn, &mut outbox))
    }

    /// own ledger entries, newest first
    pub fn transactions(&self, user_id: UserId, mut filter: TransactionFilter) -> Result<Page<Transaction>> {
        self.store.user(user_id)?;
        filter.user = Some(user_id);
        self.store.find_transactions(&filter)
    }

    // ---- credit ----

    pub fn credit_report(&self, user_id: UserId) -> Result<CreditReport> {
        let user = self.store.user(user_id)?;
        Ok(self.scorer.report(&user))
    }

    #[instrument(name = "lending.simulate_credit", skip(self, time), err)]
    pub fn simulate(&self, user_id: UserId, action: CreditAction, time: &SafeTimeProvider) -> Result<Outcome<CreditReport>> {
        let mut user = self.store.user(user_id)?;
        let now = time.now();
        let old_score = user.credit_score;
        let new_score = self.scorer.simulate(&mut user, action, now);

        let mut work = UnitOfWork::new();
        work.stage_user(user);
        let user = self.store.commit(work)?.user(user_id)?;

        let mut outbox = Outbox::new();
        let event = Event::CreditScoreChanged {
            user: user_id,
            old_score,
            new_score,
            reason: action.reason().to_string(),
            timestamp: now,
        };
        outbox.notify(
            NotificationKind::CreditScore,
            Recipient::User(user_id),
            "Credit Score Updated",
            format!("{} ({} -> {})", action.reason(), old_score, new_score),
            &event,
        );

        Ok(Outcome::new(self.scorer.report(&user), &mut outbox))
    }

    // ---- lifecycle ----

    /// submit a loan application for admin review
    #[instrument(name = "lending.apply", skip(self, application, time), fields(amount = %application.amount), err)]
    pub fn apply(
        &self,
        borrower_id: UserId,
        application: LoanApplication,
        time: &SafeTimeProvider,
    ) -> Result<Outcome<Loan>> {
        let borrower = self.store.user(borrower_id)?;
        if borrower.role != Role::Borrower {
            return Err(LendingError::access_denied("only borrowers can apply for loans"));
        }
        if !borrower.verified {
            warn!(%borrower_id, "unverified borrower applied");
            return Err(LendingError::access_denied(
                "your account must be verified to apply for loans",
            ));
        }
        self.validate_application(&application)?;

        let blocking: &[LoanStatus] = if self.config.policy.block_on_open_loans {
            &LoanStatus::OPEN
        } else {
            &[LoanStatus::Pending]
        };
        let mut open = LoanFilter::for_borrower(borrower_id).with_statuses(blocking);
        open.pagination = Pagination::new(1, 1);
        if let Some(existing) = self.store.find_loans(&open)?.items.first() {
            warn!(%borrower_id, existing = %existing.id, "application blocked by open loan");
            let message = if existing.status == LoanStatus::Pending {
                "you already have a pending loan application".to_string()
            } else {
                format!("you already have an open loan ({})", existing.status)
            };
            return Err(LendingError::invalid_transition(existing.status, message));
        }

        let rate = Rate::from_percentage_decimal(application.interest_rate);
        let quote = calculate_emi(application.amount, rate, application.tenure_months)?;
        let now = time.now();

        let loan = Loan {
            id: Uuid::new_v4(),
            borrower: borrower_id,
            lender: None,
            amount: application.amount,
            interest_rate: rate,
            tenure_months: application.tenure_months,
            purpose: application.purpose.trim().to_string(),
            description: application.description.filter(|d| !d.trim().is_empty()),
            status: LoanStatus::Pending,
            emi: quote.emi,
            total_payable: quote.total_payable,
            total_interest: quote.total_interest,
            remaining_amount: quote.total_payable,
            paid_amount: Money::ZERO,
            schedule: Vec::new(),
            risk_score: self.scorer.risk_score(borrower.credit_score),
            admin_note: None,
            created_at: now,
            approved_at: None,
            funded_at: None,
            completed_at: None,
            version: 0,
        };
        let loan_id = loan.id;

        // staging the unchanged borrower serializes concurrent applications
        let borrower_name = borrower.name.clone();
        let mut work = UnitOfWork::new();
        work.stage_user(borrower).stage_loan(loan);
        let loan = self.store.commit(work)?.loan(loan_id)?;

        let mut outbox = Outbox::new();
        let event = Event::LoanApplied {
            loan_id,
            borrower: borrower_id,
            borrower_name: borrower_name.clone(),
            amount: loan.amount,
            purpose: loan.purpose.clone(),
            timestamp: now,
        };
        outbox.notify(
            NotificationKind::LoanApplied,
            Recipient::Admins,
            "New Loan Application",
            format!("{} applied for a {} loan for \"{}\"", borrower_name, loan.amount, loan.purpose),
            &event,
        );
        outbox.notify(
            NotificationKind::LoanApplied,
            Recipient::User(borrower_id),
            "Loan Application Submitted",
            format!(
                "Your loan application for {} has been submitted and is pending admin review.",
                loan.amount
            ),
            &event,
        );

        info!(%loan_id, %borrower_id, emi = %loan.emi, risk = ?loan.risk_score, "loan applied");
        Ok(Outcome::new(loan, &mut outbox))
    }

    #[instrument(name = "lending.approve", skip(self, time), err)]
    pub fn approve(
        &self,
        admin_id: UserId,
        loan_id: LoanId,
        note: Option<String>,
        time: &SafeTimeProvider,
    ) -> Result<Outcome<Loan>> {
        self.require_admin(admin_id)?;
        let mut loan = self.store.loan(loan_id)?;
        self.guard_transition(&loan, LoanStatus::Approved, "only pending loans can be approved")?;

        let now = time.now();
        loan.status = LoanStatus::Approved;
        loan.approved_at = Some(now);
        loan.admin_note = note.clone();

        let mut work = UnitOfWork::new();
        work.stage_loan(loan);
        let loan = self.store.commit(work)?.loan(loan_id)?;

        let mut outbox = Outbox::new();
        let event = Event::LoanApproved {
            loan_id,
            borrower: loan.borrower,
            amount: loan.amount,
            note,
            timestamp: now,
        };
        outbox.notify(
            NotificationKind::LoanApproved,
            Recipient::User(loan.borrower),
            "Loan Approved",
            format!(
                "Your loan application for {} has been approved by admin. It will be visible to lenders for funding.",
                loan.amount
            ),
            &event,
        );

        info!(%loan_id, "loan approved");
        Ok(Outcome::new(loan, &mut outbox))
    }

    #[instrument(name = "lending.reject", skip(self, time), err)]
    pub fn reject(
        &self,
        admin_id: UserId,
        loan_id: LoanId,
        note: Option<String>,
        time: &SafeTimeProvider,
    ) -> Result<Outcome<Loan>> {
        self.require_admin(admin_id)?;
        let mut loan = self.store.loan(loan_id)?;
        self.guard_transition(&loan, LoanStatus::Rejected, "cannot reject this loan")?;
        let mut borrower = self.store.user(loan.borrower)?;

        let now = time.now();
        let reason = note
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REJECTION_NOTE.to_string());
        loan.status = LoanStatus::Rejected;
        loan.admin_note = Some(reason.clone());
        self.scorer.on_rejection(&mut borrower, now);

        let mut work = UnitOfWork::new();
        work.stage_loan(loan).stage_user(borrower);
        let loan = self.store.commit(work)?.loan(loan_id)?;

        let mut outbox = Outbox::new();
        let event = Event::LoanRejected {
            loan_id,
            borrower: loan.borrower,
            amount: loan.amount,
            reason: reason.clone(),
            timestamp: now,
        };
        outbox.notify(
            NotificationKind::LoanRejected,
            Recipient::User(loan.borrower),
            "Loan Application Rejected",
            format!(
                "Your loan application for {} has been rejected. Reason: {}",
                loan.amount, reason
            ),
            &event,
        );

        info!(%loan_id, %reason, "loan rejected");
        Ok(Outcome::new(loan, &mut outbox))
    }

    /// fund an approved loan from the lender's wallet and start repayment
    #[instrument(name = "lending.fund", skip(self, time), err)]
    pub fn fund(&self, lender_id: UserId, loan_id: LoanId, time: &SafeTimeProvider) -> Result<Outcome<Loan>> {
        let mut lender = self.store.user(lender_id)?;
        if lender.role != Role::Lender {
            return Err(LendingError::access_denied("only lenders can fund loans"));
        }
        let mut loan = self.store.loan(loan_id)?;
        if loan.status != LoanStatus::Approved {
            warn!(%loan_id, status = %loan.status, "funding rejected");
            return Err(LendingError::invalid_transition(
                loan.status,
                "loan must be approved before funding",
            ));
        }
        let mut borrower = self.store.user(loan.borrower)?;

        let now = time.now();
        let memo = TransferMemo {
            loan: Some(loan_id),
            installment_no: None,
            debit_description: format!("Funded loan #{} for {}", short_ref(&loan_id), borrower.name),
            credit_description: format!("Loan disbursed from {}", lender.name),
        };
        let receipt = self
            .ledger
            .transfer(&mut lender, &mut borrower, loan.amount, TransferKinds::FUNDING, memo, now)
            .map_err(|e| {
                warn!(%loan_id, %lender_id, error = %e, "funding transfer rejected");
                e
            })?;

        let schedule = AmortizationSchedule::generate(
            loan.amount,
            loan.interest_rate,
            loan.tenure_months,
            loan.emi,
            now,
        )?;
        loan.lender = Some(lender_id);
        loan.status = LoanStatus::Active;
        loan.funded_at = Some(now);
        // the schedule's last installment carries the rounding, so totals follow it
        loan.total_payable = schedule.total_amount();
        loan.total_interest = loan.total_payable - loan.amount;
        loan.remaining_amount = loan.total_payable;
        loan.schedule = schedule.into_installments();

        lender.total_funded += loan.amount;
        borrower.total_borrowed += loan.amount;
        borrower.active_loans_count += 1;

        let borrower_name = borrower.name.clone();
        let lender_name = lender.name.clone();
        let borrower_id = borrower.id;
        let mut work = UnitOfWork::new();
        work.stage_loan(loan)
            .stage_user(lender)
            .stage_user(borrower)
            .record_all(receipt.into_vec());
        let loan = self.store.commit(work)?.loan(loan_id)?;

        let first_due = loan.schedule.first().map(|i| i.due_date);
        let mut outbox = Outbox::new();
        let event = Event::LoanFunded {
            loan_id,
            borrower: borrower_id,
            lender: lender_id,
            amount: loan.amount,
            total_payable: loan.total_payable,
            first_due,
            timestamp: now,
        };
        outbox.notify(
            NotificationKind::LoanFunded,
            Recipient::User(lender_id),
            "Loan Funded Successfully",
            format!(
                "You funded a {} loan for {}. You will receive {} back.",
                loan.amount, borrower_name, loan.total_payable
            ),
            &event,
        );
        let due_text = first_due
            .map(|d| d.format("%a %b %d %Y").to_string())
            .unwrap_or_default();
        outbox.notify(
            NotificationKind::LoanFunded,
            Recipient::User(borrower_id),
            "Loan Disbursed",
            format!(
                "{} has been credited to your wallet by {}. First EMI of {} is due on {}.",
                loan.amount, lender_name, loan.emi, due_text
            ),
            &event,
        );

        info!(%loan_id, %lender_id, amount = %loan.amount, "loan funded");
        Ok(Outcome::new(loan, &mut outbox))
    }

    /// pay the lowest-numbered pending installment
    pub fn repay_next_installment(
        &self,
        borrower_id: UserId,
        loan_id: LoanId,
        time: &SafeTimeProvider,
    ) -> Result<Outcome<Repayment>> {
        let loan = self.store.loan(loan_id)?;
        self.guard_repayable(&loan, borrower_id)?;
        let next = loan
            .next_pending_installment()
            .map(|i| i.installment_no)
            .ok_or_else(|| LendingError::invalid_transition(loan.status, "all EMIs have been paid"))?;
        self.repay_installment(borrower_id, loan_id, next, time)
    }

    /// pay one installment; only the lowest-numbered pending one is accepted
    #[instrument(name = "lending.repay", skip(self, time), err)]
    pub fn repay_installment(
        &self,
        borrower_id: UserId,
        loan_id: LoanId,
        installment_no: u32,
        time: &SafeTimeProvider,
    ) -> Result<Outcome<Repayment>> {
        let mut loan = self.store.loan(loan_id)?;
        self.guard_repayable(&loan, borrower_id)?;

        if installment_no == 0 || installment_no > loan.tenure_months {
            return Err(LendingError::validation(format!(
                "installment #{} does not exist, the loan has {}",
                installment_no, loan.tenure_months
            )));
        }
        let next = loan
            .next_pending_installment()
            .cloned()
            .ok_or_else(|| LendingError::invalid_transition(loan.status, "all EMIs have been paid"))?;
        if next.installment_no != installment_no {
            warn!(%loan_id, installment_no, next = next.installment_no, "out-of-order repayment");
            let message = if installment_no < next.installment_no {
                format!("installment #{} is already paid", installment_no)
            } else {
                format!("installment #{} must be paid first", next.installment_no)
            };
            return Err(LendingError::invalid_transition(loan.status, message));
        }

        let lender_id = loan.lender.ok_or_else(|| LendingError::Internal {
            message: format!("active loan {} has no lender", loan_id),
        })?;
        let mut borrower = self.store.user(borrower_id)?;
        let mut lender = self.store.user(lender_id)?;

        let now = time.now();
        let late = next.is_overdue(now);
        let amount = next.amount;
        let memo = TransferMemo {
            loan: Some(loan_id),
            installment_no: Some(installment_no),
            debit_description: format!("EMI #{} paid for loan #{}", installment_no, short_ref(&loan_id)),
            credit_description: format!("EMI #{} received from {}", installment_no, borrower.name),
        };
        let receipt = self
            .ledger
            .transfer(&mut borrower, &mut lender, amount, TransferKinds::REPAYMENT, memo, now)
            .map_err(|e| {
                warn!(%loan_id, installment_no, error = %e, "repayment transfer rejected");
                e
            })?;

        let installment = loan
            .installment_mut(installment_no)
            .ok_or_else(|| LendingError::Internal {
                message: format!("installment #{} missing from loan {}", installment_no, loan_id),
            })?;
        installment.mark_paid(now);
        let installment = installment.clone();

        loan.paid_amount += amount;
        loan.remaining_amount = loan.total_payable.saturating_sub(loan.paid_amount);
        borrower.total_repaid += amount;
        lender.total_returns += amount;

        let old_score = borrower.credit_score;
        let credit_score = self.scorer.on_installment_paid(&mut borrower, installment_no, late, now);
        let credit_delta = credit_score - old_score;

        let completed = loan.all_paid();
        if completed {
            loan.status = LoanStatus::Completed;
            loan.completed_at = Some(now);
            borrower.close_active_loan();
        }

        let borrower_name = borrower.name.clone();
        let mut work = UnitOfWork::new();
        work.stage_loan(loan)
            .stage_user(borrower)
            .stage_user(lender)
            .record_all(receipt.into_vec());
        let loan = self.store.commit(work)?.loan(loan_id)?;

        let mut outbox = Outbox::new();
        if completed {
            let event = Event::LoanFullyRepaid {
                loan_id,
                borrower: borrower_id,
                lender: lender_id,
                amount: loan.amount,
                total_paid: loan.paid_amount,
                timestamp: now,
            };
            outbox.notify(
                NotificationKind::LoanFullyRepaid,
                Recipient::User(borrower_id),
                "Loan Fully Repaid",
                format!("Congratulations! You've fully repaid your {} loan.", loan.amount),
                &event,
            );
            outbox.notify(
                NotificationKind::LoanFullyRepaid,
                Recipient::User(lender_id),
                "Loan Repaid Fully",
                format!(
                    "The loan of {} you funded has been fully repaid. Total received: {}.",
                    loan.amount, loan.paid_amount
                ),
                &event,
            );
        }

        let event = Event::EmiPaid {
            loan_id,
            borrower: borrower_id,
            lender: lender_id,
            installment_no,
            amount,
            late,
            credit_delta,
            timestamp: now,
        };
        outbox.notify(
            NotificationKind::EmiPaid,
            Recipient::User(borrower_id),
            format!("EMI #{} Paid", installment_no),
            format!("Your EMI of {} has been paid. Credit score {:+}.", amount, credit_delta),
            &event,
        );
        outbox.notify(
            NotificationKind::EmiReceived,
            Recipient::User(lender_id),
            format!("EMI Received from {}", borrower_name),
            format!("{} received as EMI #{}.", amount, installment_no),
            &event,
        );

        info!(%loan_id, installment_no, %amount, late, completed, "installment paid");
        let repayment = Repayment {
            loan,
            installment,
            late,
            credit_score,
        };
        Ok(Outcome::new(repayment, &mut outbox))
    }

    /// write off an active loan; there is no automatic trigger
    #[instrument(name = "lending.mark_defaulted", skip(self, time), err)]
    pub fn mark_defaulted(
        &self,
        admin_id: UserId,
        loan_id: LoanId,
        note: Option<String>,
        time: &SafeTimeProvider,
    ) -> Result<Outcome<Loan>> {
        self.require_admin(admin_id)?;
        let mut loan = self.store.loan(loan_id)?;
        self.guard_transition(&loan, LoanStatus::Defaulted, "only active loans can be marked defaulted")?;
        let mut borrower = self.store.user(loan.borrower)?;

        let now = time.now();
        loan.status = LoanStatus::Defaulted;
        if note.is_some() {
            loan.admin_note = note.clone();
        }
        borrower.close_active_loan();

        let mut work = UnitOfWork::new();
        work.stage_loan(loan).stage_user(borrower);
        let loan = self.store.commit(work)?.loan(loan_id)?;

        let mut outbox = Outbox::new();
        let event = Event::LoanDefaulted {
            loan_id,
            borrower: loan.borrower,
            outstanding: loan.remaining_amount,
            note,
            timestamp: now,
        };
        let message = format!(
            "Loan #{} has been marked defaulted with {} outstanding.",
            short_ref(&loan_id),
            loan.remaining_amount
        );
        outbox.notify(
            NotificationKind::LoanDefaulted,
            Recipient::User(loan.borrower),
            "Loan Defaulted",
            message.clone(),
            &event,
        );
        if let Some(lender) = loan.lender {
            outbox.notify(NotificationKind::LoanDefaulted, Recipient::User(lender), "Loan Defaulted", message, &event);
        }

        warn!(%loan_id, outstanding = %loan.remaining_amount, "loan marked defaulted");
        Ok(Outcome::new(loan, &mut outbox))
    }

    // ---- reads ----

    pub fn loan(&self, viewer_id: UserId, loan_id: LoanId) -> Result<Loan> {
        let viewer = self.store.user(viewer_id)?;
        let loan = self.store.loan(loan_id)?;
        if viewer.role == Role::Borrower && !loan.is_owned_by(viewer_id) {
            return Err(LendingError::access_denied("borrowers may only view their own loans"));
        }
        Ok(loan)
    }

    pub fn schedule(&self, viewer_id: UserId, loan_id: LoanId) -> Result<Vec<Installment>> {
        Ok(self.loan(viewer_id, loan_id)?.schedule)
    }

    /// loans visible to the viewer, newest first
    ///
    /// borrowers see their own loans, lenders see the marketplace statuses
    /// unless a status set is given, admins see everything.
    pub fn list_loans(&self, viewer_id: UserId, mut filter: LoanFilter) -> Result<Page<Loan>> {
        let viewer = self.store.user(viewer_id)?;
        match viewer.role {
            Role::Borrower => {
                filter.borrower = Some(viewer_id);
            }
            Role::Lender => {
                if filter.statuses.as_ref().map_or(true, |s| s.is_empty()) {
                    filter.statuses = Some(LoanStatus::LENDER_VISIBLE.to_vec());
                }
            }
            Role::Admin => {}
        }
        self.store.find_loans(&filter)
    }

    // ---- guards ----

    fn require_admin(&self, user_id: UserId) -> Result<User> {
        let user = self.store.user(user_id)?;
        if !user.is_admin() {
            warn!(%user_id, "admin operation attempted by non-admin");
            return Err(LendingError::access_denied("admin privileges required"));
        }
        Ok(user)
    }

    fn guard_transition(&self, loan: &Loan, next: LoanStatus, message: &str) -> Result<()> {
        if !loan.status.can_transition_to(next) {
            warn!(loan_id = %loan.id, from = %loan.status, to = %next, "illegal transition");
            return Err(LendingError::invalid_transition(loan.status, message));
        }
        Ok(())
    }

    fn guard_repayable(&self, loan: &Loan, borrower_id: UserId) -> Result<()> {
        if !loan.is_owned_by(borrower_id) {
            return Err(LendingError::access_denied("only the borrower can repay this loan"));
        }
        if loan.status != LoanStatus::Active {
            return Err(LendingError::invalid_transition(loan.status, "loan is not active"));
        }
        Ok(())
    }

    fn validate_application(&self, application: &LoanApplication) -> Result<()> {
        let limits = &self.config.loan_limits;
        if application.amount < limits.min_amount || application.amount > limits.max_amount {
            return Err(LendingError::validation(format!(
                "amount must be between {} and {}",
                limits.min_amount, limits.max_amount
            )));
        }
        if application.interest_rate < limits.min_rate_percent || application.interest_rate > limits.max_rate_percent {
            return Err(LendingError::validation(format!(
                "interest rate must be between {}% and {}%",
                limits.min_rate_percent, limits.max_rate_percent
            )));
        }
        if application.tenure_months < limits.min_tenure_months || application.tenure_months > limits.max_tenure_months {
            return Err(LendingError::validation(format!(
                "tenure must be between {} and {} months",
                limits.min_tenure_months, limits.max_tenure_months
            )));
        }
        if application.purpose.trim().is_empty() {
            return Err(LendingError::validation("purpose is required"));
        }
        Ok(())
    }
}
