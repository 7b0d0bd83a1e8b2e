pub mod config;
pub mod credit;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod lending;
pub mod payments;
pub mod state;
pub mod store;
pub mod types;
pub mod views;

// re-export key types
pub use config::LendingConfig;
pub use credit::{CreditAction, CreditReport, CreditScorer};
pub use decimal::{Money, Rate};
pub use errors::{LendingError, Result};
pub use events::{
    Dispatcher, Event, MemorySink, Notification, NotificationKind, NotificationSink, Outbox, Recipient,
};
pub use ledger::{Transaction, TransferMemo, TransferReceipt, WalletLedger};
pub use lending::{LendingEngine, LoanApplication, Outcome, Repayment};
pub use payments::{calculate_emi, AmortizationSchedule, EmiQuote, Installment};
pub use state::{CreditHistoryEntry, Loan, User};
pub use store::{
    Committed, LendingStore, LoanFilter, MemoryStore, Page, Pagination, TransactionFilter, UnitOfWork,
    UserFilter,
};
pub use types::{
    Direction, InstallmentStatus, LoanId, LoanStatus, RiskScore, Role, TransactionId, TransactionKind,
    TransferKinds, UserId,
};
pub use views::{LoanView, ScheduleView, WalletView};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
