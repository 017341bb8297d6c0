use serde::{Deserialize, Serialize};
use std::fmt;

use super::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Debit,
    Credit,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Debit => write!(f, "debit"),
            Direction::Credit => write!(f, "credit"),
        }
    }
}

/// One statement row as emitted by the statement parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub date: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub merchant: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
    pub direction: Direction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, alias = "raw_lines", skip_serializing_if = "Vec::is_empty")]
    pub raw_lines: Vec<String>,
}

impl Transaction {
    pub fn new(date: &str, title: &str, merchant: &str, amount: Option<f64>, direction: Direction) -> Self {
        Transaction {
            date: date.to_string(),
            title: title.to_string(),
            merchant: merchant.to_string(),
            method: None,
            amount,
            direction,
            category: None,
            raw_lines: Vec::new(),
        }
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    pub fn with_raw_lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.raw_lines = lines.into_iter().map(Into::into).collect();
        self
    }

    /// Amount formatted the way single-transaction override keys expect it:
    /// two decimals, or empty when the parser could not read an amount.
    pub fn amount_key(&self) -> String {
        match self.amount {
            Some(a) if a.is_finite() => format!("{a:.2}"),
            Some(_) | None => String::new(),
        }
    }

    /// Unsigned amount as money; `None` amounts count as zero.
    pub fn magnitude(&self) -> Money {
        self.amount.map(Money::from_amount).unwrap_or_default().abs()
    }

    pub fn category_name(&self) -> Option<&str> {
        self.category.as_deref()
    }
}

/// Header metadata found on the statement's first page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementDetails {
    #[serde(default, alias = "account_holder")]
    pub account_holder: Option<String>,
    #[serde(default, alias = "account_number")]
    pub account_number: Option<String>,
    #[serde(default, alias = "account_type")]
    pub account_type: Option<String>,
    #[serde(default, alias = "statement_period")]
    pub statement_period: Option<String>,
}

impl StatementDetails {
    pub fn is_empty(&self) -> bool {
        self.account_holder.is_none()
            && self.account_number.is_none()
            && self.account_type.is_none()
            && self.statement_period.is_none()
    }
}
