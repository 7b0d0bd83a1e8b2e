use chrono::{Duration, TimeZone, Utc};
use micro_lending_rs::{
    LendingConfig, LendingEngine, LendingError, LendingStore, LoanApplication, LoanFilter, LoanStatus, MemorySink,
    MemoryStore, Money, NotificationKind, Pagination, Recipient, Role, SafeTimeProvider, TimeSource,
    TransactionFilter, TransactionKind, UserId,
};
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;

struct Platform {
    engine: LendingEngine<MemoryStore>,
    time: SafeTimeProvider,
    admin: UserId,
    borrower: UserId,
    lender: UserId,
}

fn platform_with(config: LendingConfig) -> Platform {
    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    ));
    let engine = LendingEngine::new(MemoryStore::new(), config).unwrap();
    let admin = engine.register_user("Admin", "admin@example.com", Role::Admin, &time).unwrap().id;
    let borrower = engine.register_user("Priya", "priya@example.com", Role::Borrower, &time).unwrap().id;
    let lender = engine.register_user("Arjun", "arjun@example.com", Role::Lender, &time).unwrap().id;
    engine.verify_user(admin, borrower, true, &time).unwrap();

    Platform {
        engine,
        time,
        admin,
        borrower,
        lender,
    }
}

fn platform() -> Platform {
    platform_with(LendingConfig::standard())
}

fn application(amount: i64, rate: rust_decimal::Decimal, tenure: u32) -> LoanApplication {
    LoanApplication {
        amount: Money::from_major(amount),
        interest_rate: rate,
        tenure_months: tenure,
        purpose: "dairy cattle".to_string(),
        description: Some("two cows".to_string()),
    }
}

fn money(s: &str) -> Money {
    Money::from_str_exact(s).unwrap()
}

/// apply, approve and fund a loan
fn active_loan(p: &Platform, amount: i64, tenure: u32) -> micro_lending_rs::Loan {
    let loan = p
        .engine
        .apply(p.borrower, application(amount, dec!(12), tenure), &p.time)
        .unwrap()
        .value;
    p.engine.approve(p.admin, loan.id, None, &p.time).unwrap();
    p.engine.fund(p.lender, loan.id, &p.time).unwrap().value
}

#[test]
fn test_reference_loan_full_lifecycle() {
    let p = platform();
    p.engine.top_up(p.lender, Money::from_major(15_000), &p.time).unwrap();
    p.engine.top_up(p.borrower, Money::from_major(1_000), &p.time).unwrap();

    let loan = active_loan(&p, 12_000, 12);
    assert_eq!(loan.status, LoanStatus::Active);
    assert_eq!(loan.lender, Some(p.lender));
    assert_eq!(loan.emi, money("1066.19"));
    assert_eq!(loan.schedule.len(), 12);
    assert_eq!(loan.schedule[11].balance, Money::ZERO);
    assert_eq!(loan.schedule[11].amount, money("1066.14"));
    assert_eq!(loan.total_payable, money("12794.23"));
    assert_eq!(loan.total_interest, money("794.23"));
    assert_eq!(loan.remaining_amount, loan.total_payable);

    let borrower = p.engine.user(p.borrower).unwrap();
    assert_eq!(borrower.wallet, Money::from_major(13_000));
    assert_eq!(borrower.total_borrowed, Money::from_major(12_000));
    assert_eq!(borrower.active_loans_count, 1);
    let lender = p.engine.user(p.lender).unwrap();
    assert_eq!(lender.wallet, Money::from_major(3_000));
    assert_eq!(lender.total_funded, Money::from_major(12_000));

    for n in 1..=11 {
        let paid = p.engine.repay_next_installment(p.borrower, loan.id, &p.time).unwrap();
        assert_eq!(paid.value.installment.installment_no, n);
        assert!(!paid.value.late);
        assert_eq!(paid.notifications.len(), 2);
    }
    assert_eq!(p.engine.user(p.borrower).unwrap().active_loans_count, 1);

    let last = p.engine.repay_next_installment(p.borrower, loan.id, &p.time).unwrap();
    let loan = last.value.loan;
    assert_eq!(loan.status, LoanStatus::Completed);
    assert!(loan.completed_at.is_some());
    assert_eq!(loan.paid_amount, loan.total_payable);
    assert_eq!(loan.paid_amount, money("12794.23"));
    assert_eq!(loan.remaining_amount, Money::ZERO);
    assert_eq!(loan.progress(), 100);

    let kinds: Vec<NotificationKind> = last.notifications.iter().map(|n| n.kind).collect();
    assert_eq!(
        kinds,
        vec![
            NotificationKind::LoanFullyRepaid,
            NotificationKind::LoanFullyRepaid,
            NotificationKind::EmiPaid,
            NotificationKind::EmiReceived,
        ]
    );

    let borrower = p.engine.user(p.borrower).unwrap();
    assert_eq!(borrower.active_loans_count, 0);
    assert_eq!(borrower.wallet, money("205.77"));
    assert_eq!(borrower.total_repaid, money("12794.23"));
    assert_eq!(borrower.credit_score, 650 + 12 * 5);
    assert_eq!(borrower.credit_history.len(), 12);

    let lender = p.engine.user(p.lender).unwrap();
    assert_eq!(lender.wallet, money("15794.23"));
    assert_eq!(lender.total_returns, money("12794.23"));

    // nothing left to pay and the counter does not move again
    let err = p.engine.repay_next_installment(p.borrower, loan.id, &p.time).unwrap_err();
    assert!(matches!(
        err,
        LendingError::InvalidStateTransition {
            current: LoanStatus::Completed,
            ..
        }
    ));
    assert_eq!(p.engine.user(p.borrower).unwrap().active_loans_count, 0);
}

#[test]
fn test_ledger_records_every_movement() {
    let p = platform();
    p.engine.top_up(p.lender, Money::from_major(5_000), &p.time).unwrap();
    let loan = active_loan(&p, 3_000, 3);
    p.engine.repay_next_installment(p.borrower, loan.id, &p.time).unwrap();

    let borrower_txns = p.engine.transactions(p.borrower, TransactionFilter::default()).unwrap();
    assert_eq!(borrower_txns.total, 2);

    let filter = TransactionFilter {
        kind: Some(TransactionKind::EmiPaid),
        ..Default::default()
    };
    let emi = p.engine.transactions(p.borrower, filter).unwrap();
    assert_eq!(emi.total, 1);
    let txn = &emi.items[0];
    assert_eq!(txn.installment_no, Some(1));
    assert_eq!(txn.loan, Some(loan.id));
    assert_eq!(txn.balance_after, txn.balance_before - txn.amount);

    let lender_txns = p.engine.transactions(p.lender, TransactionFilter::default()).unwrap();
    let kinds: Vec<TransactionKind> = lender_txns.items.iter().map(|t| t.kind).collect();
    assert_eq!(kinds.len(), 3);
    assert!(kinds.contains(&TransactionKind::Topup));
    assert!(kinds.contains(&TransactionKind::LoanFunded));
    assert!(kinds.contains(&TransactionKind::EmiReceived));

    // wallets reconcile with the ledger
    for user in [p.borrower, p.lender] {
        let wallet = p.engine.user(user).unwrap().wallet;
        let page = p
            .engine
            .transactions(
                user,
                TransactionFilter {
                    pagination: Pagination::new(1, 100),
                    ..Default::default()
                },
            )
            .unwrap();
        let net: Money = page.items.iter().map(|t| t.signed_amount()).sum();
        assert_eq!(net, wallet);
    }
}

#[test]
fn test_second_pending_application_is_blocked() {
    let p = platform();
    let first = p.engine.apply(p.borrower, application(5_000, dec!(10), 6), &p.time).unwrap().value;

    let err = p
        .engine
        .apply(p.borrower, application(2_000, dec!(10), 6), &p.time)
        .unwrap_err();
    assert!(matches!(
        err,
        LendingError::InvalidStateTransition {
            current: LoanStatus::Pending,
            ..
        }
    ));

    // once approved the borrower may apply again
    p.engine.approve(p.admin, first.id, None, &p.time).unwrap();
    assert!(p.engine.apply(p.borrower, application(2_000, dec!(10), 6), &p.time).is_ok());
}

#[test]
fn test_strict_policy_blocks_any_open_loan() {
    let mut config = LendingConfig::standard();
    config.policy.block_on_open_loans = true;
    let p = platform_with(config);

    let first = p.engine.apply(p.borrower, application(5_000, dec!(10), 6), &p.time).unwrap().value;
    p.engine.approve(p.admin, first.id, None, &p.time).unwrap();

    let err = p
        .engine
        .apply(p.borrower, application(2_000, dec!(10), 6), &p.time)
        .unwrap_err();
    assert!(matches!(
        err,
        LendingError::InvalidStateTransition {
            current: LoanStatus::Approved,
            ..
        }
    ));
}

#[test]
fn test_insufficient_funds_changes_nothing() {
    let p = platform();
    p.engine.top_up(p.lender, Money::from_major(5_000), &p.time).unwrap();
    let loan = p
        .engine
        .apply(p.borrower, application(10_000, dec!(12), 12), &p.time)
        .unwrap()
        .value;
    let approved = p.engine.approve(p.admin, loan.id, None, &p.time).unwrap().value;
    let txns_before = p.engine.store().transaction_count().unwrap();

    let err = p.engine.fund(p.lender, loan.id, &p.time).unwrap_err();
    assert_eq!(
        err,
        LendingError::InsufficientFunds {
            available: Money::from_major(5_000),
            requested: Money::from_major(10_000),
        }
    );
    assert!(err.is_business_rejection());

    let lender = p.engine.user(p.lender).unwrap();
    assert_eq!(lender.wallet, Money::from_major(5_000));
    assert_eq!(lender.total_funded, Money::ZERO);
    let borrower = p.engine.user(p.borrower).unwrap();
    assert_eq!(borrower.wallet, Money::ZERO);
    assert_eq!(borrower.active_loans_count, 0);

    let stored = p.engine.store().loan(loan.id).unwrap();
    assert_eq!(stored, approved);
    assert_eq!(p.engine.store().transaction_count().unwrap(), txns_before);
}

#[test]
fn test_funding_requires_approval_and_lender_role() {
    let p = platform();
    p.engine.top_up(p.lender, Money::from_major(50_000), &p.time).unwrap();
    let loan = p.engine.apply(p.borrower, application(5_000, dec!(12), 6), &p.time).unwrap().value;

    let err = p.engine.fund(p.lender, loan.id, &p.time).unwrap_err();
    assert!(matches!(
        err,
        LendingError::InvalidStateTransition {
            current: LoanStatus::Pending,
            ..
        }
    ));

    p.engine.approve(p.admin, loan.id, None, &p.time).unwrap();
    let err = p.engine.fund(p.borrower, loan.id, &p.time).unwrap_err();
    assert!(matches!(err, LendingError::AccessDenied { .. }));

    p.engine.fund(p.lender, loan.id, &p.time).unwrap();
    let err = p.engine.fund(p.lender, loan.id, &p.time).unwrap_err();
    assert!(matches!(
        err,
        LendingError::InvalidStateTransition {
            current: LoanStatus::Active,
            ..
        }
    ));
}

#[test]
fn test_installments_are_paid_in_order() {
    let p = platform();
    p.engine.top_up(p.lender, Money::from_major(10_000), &p.time).unwrap();
    let loan = active_loan(&p, 6_000, 6);

    let err = p.engine.repay_installment(p.borrower, loan.id, 3, &p.time).unwrap_err();
    assert!(matches!(err, LendingError::InvalidStateTransition { .. }));

    p.engine.repay_installment(p.borrower, loan.id, 1, &p.time).unwrap();

    let err = p.engine.repay_installment(p.borrower, loan.id, 1, &p.time).unwrap_err();
    assert!(matches!(err, LendingError::InvalidStateTransition { .. }));

    let err = p.engine.repay_installment(p.borrower, loan.id, 7, &p.time).unwrap_err();
    assert!(matches!(err, LendingError::Validation { .. }));

    let paid = p.engine.repay_installment(p.borrower, loan.id, 2, &p.time).unwrap();
    assert_eq!(paid.value.loan.paid_installments(), 2);
}

#[test]
fn test_repayment_checks_owner_and_wallet() {
    let p = platform();
    p.engine.top_up(p.lender, Money::from_major(10_000), &p.time).unwrap();
    let loan = active_loan(&p, 1_000, 1);

    let err = p.engine.repay_next_installment(p.lender, loan.id, &p.time).unwrap_err();
    assert!(matches!(err, LendingError::AccessDenied { .. }));

    // the borrower received 1000 but owes 1010 for a single month at 12%
    let err = p.engine.repay_next_installment(p.borrower, loan.id, &p.time).unwrap_err();
    assert_eq!(
        err,
        LendingError::InsufficientFunds {
            available: Money::from_major(1_000),
            requested: Money::from_major(1_010),
        }
    );
    let stored = p.engine.store().loan(loan.id).unwrap();
    assert_eq!(stored.paid_amount, Money::ZERO);
    assert!(stored.schedule[0].is_pending());
}

#[test]
fn test_late_payment_earns_smaller_credit_bump() {
    let p = platform();
    p.engine.top_up(p.lender, Money::from_major(10_000), &p.time).unwrap();
    let loan = active_loan(&p, 2_400, 12);

    p.time.test_control().unwrap().advance(Duration::days(45));
    let paid = p.engine.repay_next_installment(p.borrower, loan.id, &p.time).unwrap();

    assert!(paid.value.late);
    assert_eq!(paid.value.credit_score, 653);
    let history = p.engine.credit_report(p.borrower).unwrap().history;
    assert_eq!(history.last().unwrap().delta, 3);
}

#[test]
fn test_rejection_lowers_score_and_records_note() {
    let p = platform();
    let loan = p.engine.apply(p.borrower, application(5_000, dec!(12), 6), &p.time).unwrap().value;

    let outcome = p
        .engine
        .reject(p.admin, loan.id, Some("income not verified".to_string()), &p.time)
        .unwrap();
    assert_eq!(outcome.value.status, LoanStatus::Rejected);
    assert_eq!(outcome.value.admin_note.as_deref(), Some("income not verified"));
    assert_eq!(outcome.notifications[0].kind, NotificationKind::LoanRejected);
    assert_eq!(outcome.notifications[0].recipient, Recipient::User(p.borrower));

    let report = p.engine.credit_report(p.borrower).unwrap();
    assert_eq!(report.score, 645);
    assert_eq!(report.history[0].delta, -5);

    let err = p.engine.reject(p.admin, loan.id, None, &p.time).unwrap_err();
    assert!(matches!(err, LendingError::InvalidStateTransition { .. }));
}

#[test]
fn test_manual_default_closes_active_loan() {
    let p = platform();
    p.engine.top_up(p.lender, Money::from_major(10_000), &p.time).unwrap();
    let loan = active_loan(&p, 5_000, 6);

    let err = p.engine.mark_defaulted(p.lender, loan.id, None, &p.time).unwrap_err();
    assert!(matches!(err, LendingError::AccessDenied { .. }));

    let outcome = p
        .engine
        .mark_defaulted(p.admin, loan.id, Some("borrower unreachable".to_string()), &p.time)
        .unwrap();
    assert_eq!(outcome.value.status, LoanStatus::Defaulted);
    assert_eq!(outcome.notifications.len(), 2);
    assert_eq!(p.engine.user(p.borrower).unwrap().active_loans_count, 0);

    let err = p.engine.repay_next_installment(p.borrower, loan.id, &p.time).unwrap_err();
    assert!(matches!(
        err,
        LendingError::InvalidStateTransition {
            current: LoanStatus::Defaulted,
            ..
        }
    ));
}

#[test]
fn test_admin_broadcast_reaches_every_admin() {
    let p = platform();
    let second_admin = p
        .engine
        .register_user("Admin Two", "admin2@example.com", Role::Admin, &p.time)
        .unwrap()
        .id;

    let outcome = p.engine.apply(p.borrower, application(5_000, dec!(12), 6), &p.time).unwrap();
    let sink = MemorySink::new();
    let delivered = p.engine.dispatch(&outcome.notifications, &sink).unwrap();

    assert_eq!(delivered, 3);
    assert_eq!(sink.delivered_to(p.admin).len(), 1);
    assert_eq!(sink.delivered_to(second_admin).len(), 1);
    let own = sink.delivered_to(p.borrower);
    assert_eq!(own.len(), 1);
    assert_eq!(own[0].title, "Loan Application Submitted");
    assert_eq!(own[0].loan_id(), Some(outcome.value.id));
}

#[test]
fn test_listing_by_role() {
    let p = platform();
    let other = p
        .engine
        .register_user("Dev", "dev@example.com", Role::Borrower, &p.time)
        .unwrap()
        .id;
    p.engine.verify_user(p.admin, other, true, &p.time).unwrap();

    let first = p.engine.apply(p.borrower, application(1_000, dec!(12), 6), &p.time).unwrap().value;
    p.time.test_control().unwrap().advance(Duration::hours(1));
    let second = p.engine.apply(other, application(2_000, dec!(12), 6), &p.time).unwrap().value;

    let own = p.engine.list_loans(p.borrower, LoanFilter::default()).unwrap();
    assert_eq!(own.total, 1);
    assert_eq!(own.items[0].id, first.id);

    let all = p.engine.list_loans(p.admin, LoanFilter::default()).unwrap();
    let ids: Vec<_> = all.items.iter().map(|l| l.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);

    p.engine.approve(p.admin, first.id, None, &p.time).unwrap();
    let market = p.engine.list_loans(p.lender, LoanFilter::default()).unwrap();
    assert_eq!(market.total, 1);

    let pending_only = LoanFilter::default().with_statuses(&[LoanStatus::Pending]);
    let page = p.engine.list_loans(p.lender, pending_only).unwrap();
    assert_eq!(page.items[0].id, second.id);

    let paged = LoanFilter {
        pagination: Pagination::new(2, 1),
        ..Default::default()
    };
    let page = p.engine.list_loans(p.admin, paged).unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].id, first.id);
}
