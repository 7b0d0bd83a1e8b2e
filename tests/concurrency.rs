use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{DateTime, TimeZone, Utc};
use micro_lending_rs::{
    LendingConfig, LendingEngine, LendingError, LendingStore, LoanApplication, LoanStatus, MemoryStore, Money,
    Role, SafeTimeProvider, TimeSource, UnitOfWork,
};
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

#[test]
fn test_racing_lenders_fund_a_loan_once() {
    let time = SafeTimeProvider::new(TimeSource::Test(start()));
    let engine = Arc::new(LendingEngine::new(MemoryStore::new(), LendingConfig::standard()).unwrap());

    let admin = engine.register_user("Admin", "admin@example.com", Role::Admin, &time).unwrap().id;
    let borrower = engine.register_user("Nila", "nila@example.com", Role::Borrower, &time).unwrap().id;
    engine.verify_user(admin, borrower, true, &time).unwrap();

    let lenders: Vec<_> = (0..6)
        .map(|i| {
            let id = engine
                .register_user(&format!("Lender {}", i), &format!("lender{}@example.com", i), Role::Lender, &time)
                .unwrap()
                .id;
            engine.top_up(id, Money::from_major(20_000), &time).unwrap();
            id
        })
        .collect();

    let loan = engine
        .apply(
            borrower,
            LoanApplication {
                amount: Money::from_major(10_000),
                interest_rate: dec!(15),
                tenure_months: 10,
                purpose: "auto rickshaw".to_string(),
                description: None,
            },
            &time,
        )
        .unwrap()
        .value;
    engine.approve(admin, loan.id, None, &time).unwrap();

    let barrier = Arc::new(Barrier::new(lenders.len()));
    let handles: Vec<_> = lenders
        .iter()
        .copied()
        .map(|lender| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            let loan_id = loan.id;
            thread::spawn(move || {
                let time = SafeTimeProvider::new(TimeSource::Test(start()));
                barrier.wait();
                engine.fund(lender, loan_id, &time).map(|o| o.value)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for result in &results {
        if let Err(err) = result {
            assert!(
                matches!(err, LendingError::Conflict { .. } | LendingError::InvalidStateTransition { .. }),
                "unexpected error: {:?}",
                err
            );
        }
    }

    // the borrower was credited exactly once and exactly one lender paid
    let borrower = engine.user(borrower).unwrap();
    assert_eq!(borrower.wallet, Money::from_major(10_000));
    assert_eq!(borrower.active_loans_count, 1);

    let debited: Vec<_> = lenders
        .iter()
        .filter(|id| engine.user(**id).unwrap().wallet == Money::from_major(10_000))
        .collect();
    assert_eq!(debited.len(), 1);

    let stored = engine.store().loan(loan.id).unwrap();
    assert_eq!(stored.status, LoanStatus::Active);
    assert_eq!(stored.lender, Some(*debited[0]));
}

#[test]
fn test_stale_loan_snapshot_is_rejected_at_commit() {
    let time = SafeTimeProvider::new(TimeSource::Test(start()));
    let engine = LendingEngine::new(MemoryStore::new(), LendingConfig::standard()).unwrap();
    let admin = engine.register_user("Admin", "admin@example.com", Role::Admin, &time).unwrap().id;
    let borrower = engine.register_user("Isha", "isha@example.com", Role::Borrower, &time).unwrap().id;
    engine.verify_user(admin, borrower, true, &time).unwrap();
    let loan = engine
        .apply(
            borrower,
            LoanApplication {
                amount: Money::from_major(4_000),
                interest_rate: dec!(18),
                tenure_months: 4,
                purpose: "stall repairs".to_string(),
                description: None,
            },
            &time,
        )
        .unwrap()
        .value;

    // a caller holding the pending snapshot loses to the approval
    let stale = engine.store().loan(loan.id).unwrap();
    engine.approve(admin, loan.id, None, &time).unwrap();

    let mut rewrite = stale;
    rewrite.purpose = "something else".to_string();
    let mut work = UnitOfWork::new();
    work.stage_loan(rewrite);
    let err = engine.store().commit(work).unwrap_err();

    assert!(err.is_conflict());
    let stored = engine.store().loan(loan.id).unwrap();
    assert_eq!(stored.status, LoanStatus::Approved);
    assert_eq!(stored.purpose, "stall repairs");
}
