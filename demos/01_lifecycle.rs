/// lifecycle - apply, approve, fund and repay a loan with a controlled clock
use micro_lending_rs::{
    LendingConfig, LendingEngine, LoanApplication, LoanView, MemorySink, MemoryStore, Money, Role,
    SafeTimeProvider, TimeSource, WalletView,
};
use chrono::{Duration, TimeZone, Utc};
use rust_decimal_macros::dec;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== loan lifecycle ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    ));
    let controller = time.test_control().unwrap();
    let engine = LendingEngine::new(MemoryStore::new(), LendingConfig::standard())?;
    let sink = MemorySink::new();

    // 1. accounts
    let admin = engine.register_user("Ops", "ops@example.com", Role::Admin, &time)?;
    let borrower = engine.register_user("Meera", "meera@example.com", Role::Borrower, &time)?;
    let lender = engine.register_user("Karan", "karan@example.com", Role::Lender, &time)?;
    engine.verify_user(admin.id, borrower.id, true, &time)?;
    engine.top_up(lender.id, Money::from_major(50_000), &time)?;
    engine.top_up(borrower.id, Money::from_major(2_000), &time)?;

    // 2. application and review
    let applied = engine.apply(
        borrower.id,
        LoanApplication {
            amount: Money::from_major(12_000),
            interest_rate: dec!(12),
            tenure_months: 12,
            purpose: "tailoring shop".to_string(),
            description: None,
        },
        &time,
    )?;
    engine.dispatch(&applied.notifications, &sink)?;
    let loan_id = applied.value.id;
    println!("applied: emi {}", applied.value.emi);

    engine.approve(admin.id, loan_id, Some("verified income".to_string()), &time)?;

    // 3. funding
    let funded = engine.fund(lender.id, loan_id, &time)?;
    engine.dispatch(&funded.notifications, &sink)?;
    println!("funded on {}", time.now().format("%Y-%m-%d"));

    // 4. repayment, one installment a month
    for _ in 0..12 {
        controller.advance(Duration::days(30));
        let paid = engine.repay_next_installment(borrower.id, loan_id, &time)?;
        engine.dispatch(&paid.notifications, &sink)?;
        println!(
            "  {} paid #{} (late: {}), credit score {}",
            time.now().format("%Y-%m-%d"),
            paid.value.installment.installment_no,
            paid.value.late,
            paid.value.credit_score
        );
    }

    let loan = engine.loan(borrower.id, loan_id)?;
    println!("\n{}", LoanView::from_loan(&loan, time.now()).to_json_pretty()?);
    println!("{}", WalletView::from_user(&engine.user(lender.id)?).to_json_pretty()?);
    println!("notifications delivered: {}", sink.delivered().len());

    Ok(())
}
