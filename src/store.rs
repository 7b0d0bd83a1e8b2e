use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{LendingError, Result};
use crate::ledger::Transaction;
use crate::state::{Loan, User};
use crate::types::{LoanId, LoanStatus, Role, TransactionKind, UserId};

/// page request, 1-indexed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    pub const DEFAULT_LIMIT: u32 = 20;
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(page: u32, limit: u32) -> Self {
        Self { page, limit }
    }

    pub fn validate(&self) -> Result<()> {
        if self.page == 0 {
            return Err(LendingError::validation("page numbers start at 1"));
        }
        if self.limit == 0 || self.limit > Self::MAX_LIMIT {
            return Err(LendingError::validation(format!(
                "page limit must be between 1 and {}",
                Self::MAX_LIMIT
            )));
        }
        Ok(())
    }

    fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize).saturating_mul(self.limit as usize)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

/// one page of results plus the unpaginated total
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: u32,
    pub limit: u32,
}

impl<T> Page<T> {
    /// slice an already ordered result set
    pub fn from_ordered(all: Vec<T>, pagination: Pagination) -> Self {
        let total = all.len();
        let items = all
            .into_iter()
            .skip(pagination.offset())
            .take(pagination.limit as usize)
            .collect();
        Self {
            items,
            total,
            page: pagination.page,
            limit: pagination.limit,
        }
    }

    pub fn pages(&self) -> usize {
        if self.limit == 0 {
            return 0;
        }
        self.total.div_ceil(self.limit as usize)
    }
}

/// loan query; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoanFilter {
    pub borrower: Option<UserId>,
    pub lender: Option<UserId>,
    pub statuses: Option<Vec<LoanStatus>>,
    pub pagination: Pagination,
}

impl LoanFilter {
    pub fn for_borrower(borrower: UserId) -> Self {
        Self {
            borrower: Some(borrower),
            ..Default::default()
        }
    }

    pub fn with_statuses(mut self, statuses: &[LoanStatus]) -> Self {
        self.statuses = Some(statuses.to_vec());
        self
    }

    pub fn matches(&self, loan: &Loan) -> bool {
        self.borrower.map_or(true, |b| loan.borrower == b)
            && self.lender.map_or(true, |l| loan.lender == Some(l))
            && self
                .statuses
                .as_ref()
                .map_or(true, |s| s.contains(&loan.status))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub verified: Option<bool>,
}

impl UserFilter {
    pub fn admins() -> Self {
        Self {
            role: Some(Role::Admin),
            verified: None,
        }
    }

    pub fn matches(&self, user: &User) -> bool {
        self.role.map_or(true, |r| user.role == r) && self.verified.map_or(true, |v| user.verified == v)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionFilter {
    pub user: Option<UserId>,
    pub loan: Option<LoanId>,
    pub kind: Option<TransactionKind>,
    pub pagination: Pagination,
}

impl TransactionFilter {
    pub fn matches(&self, txn: &Transaction) -> bool {
        self.user.map_or(true, |u| txn.user == u)
            && self.loan.map_or(true, |l| txn.loan == Some(l))
            && self.kind.map_or(true, |k| txn.kind == k)
    }
}

/// writes staged by one operation, committed all together or not at all
///
/// each staged user and loan carries the version it was read at; a
/// version of 0 with an unknown id is an insert.
#[derive(Debug, Clone, Default)]
pub struct UnitOfWork {
    users: Vec<User>,
    loans: Vec<Loan>,
    transactions: Vec<Transaction>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// stage a user, replacing an earlier staged copy of the same id
    pub fn stage_user(&mut self, user: User) -> &mut Self {
        match self.users.iter_mut().find(|u| u.id == user.id) {
            Some(slot) => *slot = user,
            None => self.users.push(user),
        }
        self
    }

    pub fn stage_loan(&mut self, loan: Loan) -> &mut Self {
        match self.loans.iter_mut().find(|l| l.id == loan.id) {
            Some(slot) => *slot = loan,
            None => self.loans.push(loan),
        }
        self
    }

    pub fn record(&mut self, transaction: Transaction) -> &mut Self {
        self.transactions.push(transaction);
        self
    }

    pub fn record_all(&mut self, transactions: impl IntoIterator<Item = Transaction>) -> &mut Self {
        self.transactions.extend(transactions);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.loans.is_empty() && self.transactions.is_empty()
    }
}

/// entities as stored by a successful commit, with their new versions
#[derive(Debug, Clone, Default)]
pub struct Committed {
    pub users: Vec<User>,
    pub loans: Vec<Loan>,
    pub transactions: Vec<Transaction>,
}

impl Committed {
    pub fn user(&self, id: UserId) -> Result<User> {
        self.users
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .ok_or_else(|| LendingError::Internal {
                message: format!("user {} missing from commit", id),
            })
    }

    pub fn loan(&self, id: LoanId) -> Result<Loan> {
        self.loans
            .iter()
            .find(|l| l.id == id)
            .cloned()
            .ok_or_else(|| LendingError::Internal {
                message: format!("loan {} missing from commit", id),
            })
    }
}

/// persistence consumed by the lending engine
pub trait LendingStore: Send + Sync {
    fn user(&self, id: UserId) -> Result<User>;

    fn loan(&self, id: LoanId) -> Result<Loan>;

    fn find_users(&self, filter: &UserFilter) -> Result<Vec<User>>;

    /// newest first
    fn find_loans(&self, filter: &LoanFilter) -> Result<Page<Loan>>;

    /// newest first
    fn find_transactions(&self, filter: &TransactionFilter) -> Result<Page<Transaction>>;

    /// apply every staged write atomically, failing with `Conflict` if any
    /// staged entity changed since it was read
    fn commit(&self, work: UnitOfWork) -> Result<Committed>;
}

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    /// insertion order doubles as the tie-breaker for equal timestamps
    loans: Vec<Loan>,
    loan_index: HashMap<LoanId, usize>,
    transactions: Vec<Transaction>,
}

/// in-memory store guarded by a single lock
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| LendingError::Internal {
            message: "store lock poisoned".to_string(),
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| LendingError::Internal {
            message: "store lock poisoned".to_string(),
        })
    }

    pub fn transaction_count(&self) -> Result<usize> {
        Ok(self.read()?.transactions.len())
    }
}

fn check_version(entity: &'static str, id: uuid::Uuid, stored: Option<u64>, staged: u64) -> Result<()> {
    let fresh = match stored {
        Some(current) => current == staged,
        None => staged == 0,
    };
    if fresh {
        Ok(())
    } else {
        warn!(entity, %id, staged, stored = ?stored, "stale write rejected");
        Err(LendingError::Conflict {
            entity,
            id: id.to_string(),
        })
    }
}

impl LendingStore for MemoryStore {
    fn user(&self, id: UserId) -> Result<User> {
        self.read()?
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| LendingError::NotFound {
                entity: "user",
                id: id.to_string(),
            })
    }

    fn loan(&self, id: LoanId) -> Result<Loan> {
        let tables = self.read()?;
        tables
            .loan_index
            .get(&id)
            .and_then(|&idx| tables.loans.get(idx))
            .cloned()
            .ok_or_else(|| LendingError::NotFound {
                entity: "loan",
                id: id.to_string(),
            })
    }

    fn find_users(&self, filter: &UserFilter) -> Result<Vec<User>> {
        let tables = self.read()?;
        let mut users: Vec<User> = tables.users.values().filter(|u| filter.matches(u)).cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.email.cmp(&b.email)));
        Ok(users)
    }

    fn find_loans(&self, filter: &LoanFilter) -> Result<Page<Loan>> {
        filter.pagination.validate()?;
        let tables = self.read()?;
        let mut loans: Vec<Loan> = tables.loans.iter().rev().filter(|l| filter.matches(l)).cloned().collect();
        loans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Page::from_ordered(loans, filter.pagination))
    }

    fn find_transactions(&self, filter: &TransactionFilter) -> Result<Page<Transaction>> {
        filter.pagination.validate()?;
        let tables = self.read()?;
        let mut txns: Vec<Transaction> = tables
            .transactions
            .iter()
            .rev()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        txns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Page::from_ordered(txns, filter.pagination))
    }

    fn commit(&self, work: UnitOfWork) -> Result<Committed> {
        let mut tables = self.write()?;

        // verify everything before touching anything
        for user in &work.users {
            let stored = tables.users.get(&user.id).map(|u| u.version);
            check_version("user", user.id, stored, user.version)?;
        }
        for loan in &work.loans {
            let stored = tables
                .loan_index
                .get(&loan.id)
                .and_then(|&idx| tables.loans.get(idx))
                .map(|l| l.version);
            check_version("loan", loan.id, stored, loan.version)?;
        }
        for txn in &work.transactions {
            if tables.transactions.iter().any(|t| t.id == txn.id || t.reference == txn.reference) {
                return Err(LendingError::Conflict {
                    entity: "transaction",
                    id: txn.id.to_string(),
                });
            }
        }

        let mut committed = Committed::default();

        for mut user in work.users {
            user.version += 1;
            tables.users.insert(user.id, user.clone());
            committed.users.push(user);
        }
        for mut loan in work.loans {
            loan.version += 1;
            match tables.loan_index.get(&loan.id).copied() {
                Some(idx) => tables.loans[idx] = loan.clone(),
                None => {
                    let idx = tables.loans.len();
                    tables.loan_index.insert(loan.id, idx);
                    tables.loans.push(loan.clone());
                }
            }
            committed.loans.push(loan);
        }
        tables.transactions.extend(work.transactions.iter().cloned());
        committed.transactions = work.transactions;

        debug!(
            users = committed.users.len(),
            loans = committed.loans.len(),
            transactions = committed.transactions.len(),
            "unit of work committed"
        );
        Ok(committed)
    }
}
