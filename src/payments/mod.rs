pub mod amortization;
pub mod emi;

pub use amortization::{AmortizationSchedule, Installment};
pub use emi::{calculate_emi, EmiQuote};
