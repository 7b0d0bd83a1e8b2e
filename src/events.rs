use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::decimal::Money;
use crate::errors::Result;
use crate::store::{LendingStore, UserFilter};
use crate::types::{LoanId, UserId};

/// domain events raised by lifecycle operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // application events
    LoanApplied {
        loan_id: LoanId,
        borrower: UserId,
        borrower_name: String,
        amount: Money,
        purpose: String,
        timestamp: DateTime<Utc>,
    },
    LoanApproved {
        loan_id: LoanId,
        borrower: UserId,
        amount: Money,
        note: Option<String>,
        timestamp: DateTime<Utc>,
    },
    LoanRejected {
        loan_id: LoanId,
        borrower: UserId,
        amount: Money,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    // funding and repayment events
    LoanFunded {
        loan_id: LoanId,
        borrower: UserId,
        lender: UserId,
        amount: Money,
        total_payable: Money,
        first_due: Option<DateTime<Utc>>,
        timestamp: DateTime<Utc>,
    },
    EmiPaid {
        loan_id: LoanId,
        borrower: UserId,
        lender: UserId,
        installment_no: u32,
        amount: Money,
        late: bool,
        credit_delta: i32,
        timestamp: DateTime<Utc>,
    },
    LoanFullyRepaid {
        loan_id: LoanId,
        borrower: UserId,
        lender: UserId,
        amount: Money,
        total_paid: Money,
        timestamp: DateTime<Utc>,
    },
    LoanDefaulted {
        loan_id: LoanId,
        borrower: UserId,
        outstanding: Money,
        note: Option<String>,
        timestamp: DateTime<Utc>,
    },

    // account events
    WalletToppedUp {
        user: UserId,
        amount: Money,
        balance: Money,
        timestamp: DateTime<Utc>,
    },
    AccountVerified {
        user: UserId,
        verified: bool,
        timestamp: DateTime<Utc>,
    },
    CreditScoreChanged {
        user: UserId,
        old_score: i32,
        new_score: i32,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

/// notification category shown to the recipient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    LoanApplied,
    LoanApproved,
    LoanRejected,
    LoanFunded,
    EmiPaid,
    EmiReceived,
    LoanFullyRepaid,
    LoanDefaulted,
    Topup,
    CreditScore,
    AccountVerified,
}

/// who a notification is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    User(UserId),
    /// every admin at delivery time
    Admins,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub recipient: Recipient,
    pub title: String,
    pub message: String,
    pub event: Event,
}

impl Notification {
    pub fn loan_id(&self) -> Option<LoanId> {
        match &self.event {
            Event::LoanApplied { loan_id, .. }
            | Event::LoanApproved { loan_id, .. }
            | Event::LoanRejected { loan_id, .. }
            | Event::LoanFunded { loan_id, .. }
            | Event::EmiPaid { loan_id, .. }
            | Event::LoanFullyRepaid { loan_id, .. }
            | Event::LoanDefaulted { loan_id, .. } => Some(*loan_id),
            Event::WalletToppedUp { .. } | Event::AccountVerified { .. } | Event::CreditScoreChanged { .. } => None,
        }
    }
}

/// notifications collected while an operation runs
#[derive(Debug, Default)]
pub struct Outbox {
    notifications: Vec<Notification>,
}

impl Outbox {
    pub fn new() -> Self {
        Self {
            notifications: Vec::new(),
        }
    }

    pub fn emit(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }

    pub fn notify(
        &mut self,
        kind: NotificationKind,
        recipient: Recipient,
        title: impl Into<String>,
        message: impl Into<String>,
        event: &Event,
    ) {
        self.emit(Notification {
            kind,
            recipient,
            title: title.into(),
            message: message.into(),
            event: event.clone(),
        });
    }

    pub fn take(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }
}

/// delivery transport for resolved notifications
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, user: UserId, notification: &Notification) -> Result<()>;
}

/// sink that keeps every delivery in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    delivered: Mutex<Vec<(UserId, Notification)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// a poisoned lock still yields every delivery recorded before the panic
    pub fn delivered(&self) -> Vec<(UserId, Notification)> {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn delivered_to(&self, user: UserId) -> Vec<Notification> {
        self.delivered()
            .into_iter()
            .filter(|(to, _)| *to == user)
            .map(|(_, n)| n)
            .collect()
    }
}

impl NotificationSink for MemorySink {
    fn deliver(&self, user: UserId, notification: &Notification) -> Result<()> {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((user, notification.clone()));
        Ok(())
    }
}

/// resolves recipients against the store and hands each copy to the sink
pub struct Dispatcher<'a, S: LendingStore + ?Sized> {
    store: &'a S,
    sink: &'a dyn NotificationSink,
}

impl<'a, S: LendingStore + ?Sized> Dispatcher<'a, S> {
    pub fn new(store: &'a S, sink: &'a dyn NotificationSink) -> Self {
        Self { store, sink }
    }

    /// returns the number of deliveries made
    pub fn dispatch(&self, notifications: &[Notification]) -> Result<usize> {
        let mut delivered = 0;
        let mut admins: Option<Vec<UserId>> = None;

        for notification in notifications {
            match notification.recipient {
                Recipient::User(user) => {
                    self.sink.deliver(user, notification)?;
                    delivered += 1;
                }
                Recipient::Admins => {
                    if admins.is_none() {
                        let resolved = self
                            .store
                            .find_users(&UserFilter::admins())?
                            .into_iter()
                            .map(|u| u.id)
                            .collect();
                        admins = Some(resolved);
                    }
                    for admin in admins.iter().flatten() {
                        self.sink.deliver(*admin, notification)?;
                        delivered += 1;
                    }
                }
            }
            debug!(kind = ?notification.kind, "notification dispatched");
        }

        Ok(delivered)
    }
}
