/// quick start - price a loan and print its repayment schedule
use micro_lending_rs::{calculate_emi, AmortizationSchedule, Money, Rate};
use chrono::Utc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 12,000 over 12 months at 12% a year
    let principal = Money::from_major(12_000);
    let rate = Rate::from_percentage(12);
    let quote = calculate_emi(principal, rate, 12)?;

    println!("emi:            {}", quote.emi);
    println!("total payable:  {}", quote.total_payable);
    println!("total interest: {}", quote.total_interest);

    let schedule = AmortizationSchedule::generate(principal, rate, 12, quote.emi, Utc::now())?;
    for row in &schedule.installments {
        println!(
            "  #{:>2} {}  interest {:>8}  principal {:>8}  balance {:>9}",
            row.installment_no,
            row.due_date.format("%Y-%m-%d"),
            row.interest,
            row.principal,
            row.balance
        );
    }

    Ok(())
}
