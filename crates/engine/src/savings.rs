use serde::{Deserialize, Serialize};
use spendiq_core::{Direction, Money, Transaction};
use std::collections::BTreeSet;

use crate::util::{mask_account, normalize_account};

/// Configured savings account identifiers, stored normalized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct SavingsAccounts {
    accounts: BTreeSet<String>,
}

impl SavingsAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an account. Input that is blank after normalization is ignored.
    /// Returns whether the set changed.
    pub fn add(&mut self, raw: &str) -> bool {
        let account = normalize_account(raw);
        if account.is_empty() {
            return false;
        }
        let added = self.accounts.insert(account);
        if added {
            tracing::debug!(account = %mask_account(raw), "savings account added");
        }
        added
    }

    pub fn remove(&mut self, raw: &str) -> bool {
        self.accounts.remove(&normalize_account(raw))
    }

    pub fn contains(&self, raw: &str) -> bool {
        self.accounts.contains(&normalize_account(raw))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.accounts.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for SavingsAccounts {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut accounts = SavingsAccounts::new();
        for raw in iter {
            accounts.add(raw.as_ref());
        }
        accounts
    }
}

impl From<Vec<String>> for SavingsAccounts {
    fn from(raw: Vec<String>) -> Self {
        raw.into_iter().collect()
    }
}

impl From<SavingsAccounts> for Vec<String> {
    fn from(accounts: SavingsAccounts) -> Self {
        accounts.accounts.into_iter().collect()
    }
}

/// True when any raw statement line mentions `account`, ignoring whitespace and case.
pub fn matches(tx: &Transaction, account: &str) -> bool {
    let account = normalize_account(account);
    if account.is_empty() {
        return false;
    }
    tx.raw_lines
        .iter()
        .any(|line| normalize_account(line).contains(&account))
}

pub fn matches_any(tx: &Transaction, accounts: &SavingsAccounts) -> bool {
    accounts.iter().any(|account| matches(tx, account))
}

/// Direction of money relative to the savings account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SavingsFlow {
    In,
    Out,
}

/// A debit from the analyzed account moves money into savings; a credit moves
/// it back out.
pub fn flow(tx: &Transaction) -> SavingsFlow {
    match tx.direction {
        Direction::Debit => SavingsFlow::In,
        Direction::Credit => SavingsFlow::Out,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavingsSummary {
    pub transaction_count: usize,
    pub savings_in: Money,
    pub savings_out: Money,
    pub net: Money,
}

impl SavingsSummary {
    fn record(&mut self, tx: &Transaction) {
        let amount = tx.magnitude();
        match flow(tx) {
            SavingsFlow::In => self.savings_in = self.savings_in + amount,
            SavingsFlow::Out => self.savings_out = self.savings_out + amount,
        }
        self.transaction_count += 1;
        self.net = self.savings_in - self.savings_out;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub account: String,
    #[serde(flatten)]
    pub summary: SavingsSummary,
}

/// Totals over every transaction that matches at least one account.
pub fn summarize(transactions: &[Transaction], accounts: &SavingsAccounts) -> SavingsSummary {
    let mut summary = SavingsSummary::default();
    for tx in transactions.iter().filter(|tx| matches_any(tx, accounts)) {
        summary.record(tx);
    }
    summary
}

/// One summary per configured account, each over that account's own matches.
/// A transaction mentioning two accounts counts toward both.
pub fn summarize_by_account(
    transactions: &[Transaction],
    accounts: &SavingsAccounts,
) -> Vec<AccountSummary> {
    accounts
        .iter()
        .map(|account| {
            let mut summary = SavingsSummary::default();
            for tx in transactions.iter().filter(|tx| matches(tx, account)) {
                summary.record(tx);
            }
            AccountSummary {
                account: account.to_string(),
                summary,
            }
        })
        .collect()
}
